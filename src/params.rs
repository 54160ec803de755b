//! Request parameters and engine configuration.

use std::path::PathBuf;
use std::sync::Arc;

use crate::decode::ImageHandle;

/// How many bytes the disk store may hold before a sweep is triggered.
pub const DEFAULT_MAX_DISK_BYTES: u64 = 500 * 1024 * 1024;

/// Minimum free space on the storage volume before a sweep is triggered.
pub const DEFAULT_MIN_FREE_BYTES: u64 = 5 * 1024 * 1024;

/// Fraction of files removed by one eviction sweep.
pub const DEFAULT_CLEAN_PERCENT: f32 = 0.4;

/// Immutable per-request rendering requirements.
///
/// Built once through [`RequestParams::builder`], then shared freely across
/// threads behind an `Arc`. Two requests with equal params and equal source
/// produce the same cache key.
#[derive(Clone)]
pub struct RequestParams {
    pub width: u32,
    pub height: u32,
    /// Apply the scale/crop-to-aspect step after decode.
    pub scale: bool,
    /// Mask the result to a circle. Takes precedence over `corner_radius`.
    pub circular: bool,
    /// Corner radius for a rounded-rectangle mask, if any.
    pub corner_radius: Option<u32>,
    pub grayscale: bool,
    /// Rotate landscape results a quarter turn.
    pub rotate: bool,
    /// Whether the engine decodes animated sources itself. When false the
    /// caller is handed the raw file path instead.
    pub animated: bool,
    /// Image shown in the slot while work is in flight.
    pub placeholder: Option<ImageHandle>,
    /// Cache subdirectory label, part of the fingerprint.
    pub cache_dir: String,
}

impl RequestParams {
    /// Start building params for a target size.
    pub fn builder(width: u32, height: u32) -> RequestParamsBuilder {
        RequestParamsBuilder {
            params: RequestParams {
                width,
                height,
                scale: false,
                circular: false,
                corner_radius: None,
                grayscale: false,
                rotate: false,
                animated: true,
                placeholder: None,
                cache_dir: "images".to_string(),
            },
        }
    }
}

impl std::fmt::Debug for RequestParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestParams")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("scale", &self.scale)
            .field("circular", &self.circular)
            .field("corner_radius", &self.corner_radius)
            .field("grayscale", &self.grayscale)
            .field("rotate", &self.rotate)
            .field("animated", &self.animated)
            .field("cache_dir", &self.cache_dir)
            .finish()
    }
}

/// Fluent builder for [`RequestParams`].
pub struct RequestParamsBuilder {
    params: RequestParams,
}

impl RequestParamsBuilder {
    pub fn scale(mut self, value: bool) -> Self {
        self.params.scale = value;
        self
    }

    pub fn circular(mut self, value: bool) -> Self {
        self.params.circular = value;
        self
    }

    pub fn corner_radius(mut self, radius: u32) -> Self {
        self.params.corner_radius = Some(radius);
        self
    }

    pub fn grayscale(mut self, value: bool) -> Self {
        self.params.grayscale = value;
        self
    }

    pub fn rotate(mut self, value: bool) -> Self {
        self.params.rotate = value;
        self
    }

    pub fn animated(mut self, value: bool) -> Self {
        self.params.animated = value;
        self
    }

    pub fn placeholder(mut self, image: ImageHandle) -> Self {
        self.params.placeholder = Some(image);
        self
    }

    pub fn cache_dir(mut self, label: impl Into<String>) -> Self {
        self.params.cache_dir = label.into();
        self
    }

    /// Finish the builder. The returned params are immutable and cheap to
    /// share behind the `Arc`.
    pub fn build(self) -> Arc<RequestParams> {
        Arc::new(self.params)
    }
}

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Directory for persisted downloads. `None` keeps downloads in memory.
    pub cache_dir: Option<PathBuf>,
    /// Among equal-priority tasks, service oldest submissions first (`true`)
    /// or newest first (`false`).
    pub time_sort_asc: bool,
    /// Run the disk eviction sweep after writes.
    pub auto_clean: bool,
    /// Memory-cache byte budget. `None` derives an eighth of the
    /// environment's reported total memory.
    pub memory_budget: Option<usize>,
    /// Worker threads for the search/decode pool. `None` uses the CPU count.
    pub search_workers: Option<usize>,
    pub search_queue: usize,
    /// Worker threads for the download pool. `None` uses the CPU count.
    pub download_workers: Option<usize>,
    pub download_queue: usize,
    pub max_disk_bytes: u64,
    pub min_free_bytes: u64,
    pub clean_percent: f32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            time_sort_asc: true,
            auto_clean: true,
            memory_budget: None,
            search_workers: None,
            search_queue: 20,
            download_workers: None,
            download_queue: 6,
            max_disk_bytes: DEFAULT_MAX_DISK_BYTES,
            min_free_bytes: DEFAULT_MIN_FREE_BYTES,
            clean_percent: DEFAULT_CLEAN_PERCENT,
        }
    }
}
