//! fastimage_core - Concurrent image load-and-cache engine.
//!
//! Given a remote URL or local path plus rendering requirements, the engine
//! returns a decoded, ready-to-render image through listener callbacks:
//! - Two-tier cache: in-memory LRU (byte budget) over an on-disk file store
//! - Two bounded priority worker pools (search/decode and download) with
//!   identity-deduplicated tasks — one in-flight fetch per source
//! - Slot bindings with cooperative cancellation: rebinding a display slot
//!   silently discards stale completions
//! - Disk eviction sweeps that keep persisted downloads under a size and
//!   free-space budget
//!
//! ```no_run
//! use std::sync::Arc;
//! use fastimage_core::{CacheLoader, DisplaySlot, ImageHandle, LoadListener, RequestParams};
//!
//! struct SetImage;
//! impl LoadListener for SetImage {
//!     fn on_ready(&self, _slot: &DisplaySlot, image: ImageHandle, _from_cache: bool) {
//!         println!("{}x{}", image.width(), image.height());
//!     }
//! }
//!
//! let loader = CacheLoader::with_defaults("/tmp/imagecache").unwrap();
//! let slot = DisplaySlot::new();
//! let params = RequestParams::builder(320, 240).scale(true).build();
//! loader.load_remote("http://example.com/a.jpg", &slot, params, Arc::new(SetImage));
//! ```

mod binding;
mod decode;
mod disk_store;
mod env;
mod error;
mod fetch;
mod fingerprint;
mod listener;
mod loader;
mod memory_cache;
mod params;
mod pool;
#[cfg(test)]
pub(crate) mod test_utils;
mod transform;

pub use binding::{CancelToken, DisplaySlot, SlotRef, TaskTicket};
pub use decode::{
    decode_bytes, decode_file, subsample_factor, AnimatedDecoder, DecodedImage,
    FirstFrameDecoder, ImageHandle,
};
pub use disk_store::DiskStore;
pub use env::{Environment, SystemEnvironment};
pub use error::{LoadError, LoadResult};
pub use fetch::{ByteFetcher, UreqFetcher};
pub use fingerprint::{cache_key, disk_file_name, is_animated_source, ANIMATED_SUFFIX};
pub use listener::LoadListener;
pub use loader::CacheLoader;
pub use memory_cache::{CacheStats, MemoryCache};
pub use params::{LoaderConfig, RequestParams, RequestParamsBuilder};
pub use pool::{PoolTask, PutOutcome, TaskPool, TaskPriority};
pub use transform::{circular_mask, grayscale, rotate_quarter, rounded_mask};
