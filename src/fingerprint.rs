//! Cache-key and disk-filename derivation.
//!
//! The memory cache is keyed by the full (params, source) fingerprint so the
//! same URL decoded at two sizes occupies two entries. Disk files are keyed
//! by the source alone: the stored bytes are the raw download, and every
//! params variant decodes from the same file.

use sha2::{Digest, Sha256};

use crate::params::RequestParams;

/// Reserved filename suffix marking an animated source.
pub const ANIMATED_SUFFIX: &str = ".gif";

/// Deterministic memory-cache key for a (source, params) pair.
///
/// Every decode-relevant field participates, so differing width/height/mode
/// values never collide for the same source.
pub fn cache_key(source: &str, params: &RequestParams) -> String {
    format!(
        "w{}h{}s{}c{}r{}g{}o{}a{}d{}|{}",
        params.width,
        params.height,
        params.scale as u8,
        params.circular as u8,
        params.corner_radius.map_or(-1, |r| r as i64),
        params.grayscale as u8,
        params.rotate as u8,
        params.animated as u8,
        params.cache_dir,
        source
    )
}

/// Disk filename for a source identifier: lowercase SHA-256 hex, with the
/// reserved suffix appended for animated sources so they can be recognized
/// without re-reading the URL.
pub fn disk_file_name(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    let mut name = format!("{:x}", hasher.finalize());
    if is_animated_source(source) {
        name.push_str(ANIMATED_SUFFIX);
    }
    name
}

/// Whether a source identifier refers to an animated image.
pub fn is_animated_source(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    lower.ends_with(ANIMATED_SUFFIX)
}
