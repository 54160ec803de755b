//! Shared fixtures for module tests.

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

use crate::decode::{DecodedImage, ImageHandle};
use crate::env::Environment;
use crate::error::{LoadError, LoadResult};
use crate::fetch::ByteFetcher;

/// In-memory decoded image of the given size (RGBA, 4 bytes per pixel).
pub fn test_image(width: u32, height: u32) -> ImageHandle {
    let buffer = RgbaImage::from_pixel(width, height, Rgba([180, 90, 45, 255]));
    Arc::new(DecodedImage::new(DynamicImage::ImageRgba8(buffer)))
}

/// PNG-encoded bytes of a solid image.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        width,
        height,
        Rgba([180, 90, 45, 255]),
    ));
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("failed to encode test PNG");
    buf
}

/// GIF-encoded bytes of a solid image.
pub fn gif_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        width,
        height,
        Rgba([180, 90, 45, 255]),
    ));
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Gif)
        .expect("failed to encode test GIF");
    buf
}

/// Write a PNG fixture at `path`, regardless of the path's extension.
pub fn write_test_png(path: &Path, width: u32, height: u32) {
    std::fs::write(path, png_bytes(width, height)).expect("failed to write test PNG");
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Environment with scripted answers.
pub struct FakeEnvironment {
    pub network: bool,
    pub usable_space: u64,
    pub total_memory: u64,
}

impl Default for FakeEnvironment {
    fn default() -> Self {
        Self {
            network: true,
            usable_space: u64::MAX,
            total_memory: 512 * 1024 * 1024,
        }
    }
}

impl Environment for FakeEnvironment {
    fn network_available(&self) -> bool {
        self.network
    }

    fn storage_available(&self, dir: &Path) -> bool {
        dir.is_dir() || std::fs::create_dir_all(dir).is_ok()
    }

    fn usable_space(&self, _dir: &Path) -> u64 {
        self.usable_space
    }

    fn total_memory(&self) -> u64 {
        self.total_memory
    }
}

/// Fetcher serving a fixed payload, with call counting and optional delay.
pub struct FakeFetcher {
    payload: Vec<u8>,
    fail: bool,
    delay: Duration,
    fetches: AtomicUsize,
}

impl FakeFetcher {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            fail: false,
            delay: Duration::ZERO,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    fn serve(&self, url: &str) -> LoadResult<&[u8]> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        std::thread::sleep(self.delay);
        if self.fail {
            return Err(LoadError::Fetch {
                url: url.to_string(),
                reason: "scripted failure".into(),
            });
        }
        Ok(&self.payload)
    }
}

impl ByteFetcher for FakeFetcher {
    fn fetch_to_file(&self, url: &str, dest: &Path, progress: &dyn Fn(u8)) -> LoadResult<()> {
        let payload = self.serve(url)?;
        progress(50);
        progress(100);
        std::fs::write(dest, payload)?;
        Ok(())
    }

    fn fetch_to_memory(&self, url: &str) -> LoadResult<Bytes> {
        let payload = self.serve(url)?;
        Ok(Bytes::copy_from_slice(payload))
    }
}
