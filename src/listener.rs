//! Caller-facing load callbacks and the internal download observer set.

use std::path::Path;

use bytes::Bytes;

use crate::binding::DisplaySlot;
use crate::decode::ImageHandle;

/// Callbacks a caller attaches to a load request.
///
/// All methods except [`LoadListener::on_ready`] default to no-ops.
/// Callbacks fire on pool worker threads, never on the requesting thread,
/// and are suppressed entirely once the slot has been rebound.
pub trait LoadListener: Send + Sync {
    /// A download is about to be scheduled for this slot.
    fn on_pre_start(&self, _slot: &DisplaySlot, _source: &str) {}

    /// The placeholder to show while work is in flight, if the request
    /// configured one.
    fn on_placeholder(&self, _slot: &DisplaySlot, _image: Option<ImageHandle>) {}

    /// The download started.
    fn on_start(&self) {}

    /// Download progress, throttled to at most one call per 300 ms.
    fn on_progress(&self, _percent: u8) {}

    /// The decoded image is ready for this slot. `from_cache` is true when
    /// it came from local storage rather than a fresh download.
    fn on_ready(&self, slot: &DisplaySlot, image: ImageHandle, from_cache: bool);

    /// The source is an animated image and the request declined engine-side
    /// animated handling; the caller takes the file from here.
    fn on_animated_source(&self, _path: &Path) {}

    /// The load failed. Re-requesting is the only retry.
    fn on_error(&self) {}
}

/// Member of a download task's listener set. One download fans out to every
/// observer that merged into it; each observer finishes the work (decode,
/// cache, notify) for its own request.
pub(crate) trait DownloadObserver: Send + Sync {
    fn on_start(&self);
    fn on_progress(&self, percent: u8);
    /// The payload was persisted at the store path for the source.
    fn on_finish(&self);
    /// No disk store is configured; the payload stayed in memory.
    fn on_finish_in_memory(&self, data: Bytes);
    fn on_error(&self);
}
