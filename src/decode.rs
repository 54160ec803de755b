//! Image decoding sized to a request.
//!
//! The pipeline probes dimensions without allocating pixels, picks an
//! integer subsampling factor that bounds the pixel budget, decodes and
//! immediately reduces the frame to the 1/factor size, then applies the
//! request's scale/crop and transform steps. JPEG sources go through
//! zune-jpeg; everything else goes through the image crate. Neither
//! decoder exposes decode-at-scale, so the factor bounds every buffer
//! that outlives the decode call rather than the decoder's own transient
//! frame.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbImage};
use zune_jpeg::JpegDecoder;

use crate::error::{LoadError, LoadResult};
use crate::params::RequestParams;
use crate::transform;

/// Decoded, ready-to-render image.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    image: DynamicImage,
}

/// Shared handle to a decoded image; cache entries and listener payloads.
pub type ImageHandle = Arc<DecodedImage>;

impl DecodedImage {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Pixel-buffer size, used for memory-cache weighting.
    pub fn size_bytes(&self) -> usize {
        self.image.as_bytes().len()
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

/// External decoder for animated container formats.
pub trait AnimatedDecoder: Send + Sync {
    fn decode_frames(&self, data: &[u8]) -> Option<DynamicImage>;
}

/// Default animated decoder: first GIF frame.
pub struct FirstFrameDecoder;

impl AnimatedDecoder for FirstFrameDecoder {
    fn decode_frames(&self, data: &[u8]) -> Option<DynamicImage> {
        image::load_from_memory_with_format(data, ImageFormat::Gif).ok()
    }
}

fn is_jpeg(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8
}

/// Read dimensions from the container header without allocating pixels.
fn probe_dimensions(data: &[u8]) -> LoadResult<(u32, u32)> {
    if is_jpeg(data) {
        let mut decoder = JpegDecoder::new(data);
        decoder
            .decode_headers()
            .map_err(|e| LoadError::Decode(format!("failed to parse JPEG header: {e:?}")))?;
        let info = decoder
            .info()
            .ok_or_else(|| LoadError::Decode("no image info in JPEG header".into()))?;
        return Ok((info.width as u32, info.height as u32));
    }
    image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(LoadError::Io)?
        .into_dimensions()
        .map_err(|e| LoadError::Decode(format!("failed to probe dimensions: {e}")))
}

/// Integer subsampling factor for decoding `width`×`height` toward a
/// `req_width`×`req_height` target.
///
/// The factor starts at the rounded ratio of the dominant dimension and is
/// raised until total pixels fit within three times the requested area. A
/// resulting factor of exactly 3 is promoted to 4; callers depend on that
/// step. Zero target dimensions disable subsampling.
pub fn subsample_factor(width: u32, height: u32, req_width: u32, req_height: u32) -> u32 {
    let mut factor: u32 = 1;
    if req_width == 0 || req_height == 0 {
        return factor;
    }
    if height > req_height || width > req_width {
        factor = if width > height {
            (height as f32 / req_height as f32).round() as u32
        } else {
            (width as f32 / req_width as f32).round() as u32
        };
        factor = factor.max(1);
        let total_pixels = width as f64 * height as f64;
        let pixel_cap = req_width as f64 * req_height as f64 * 3.0;
        while total_pixels / (factor as f64 * factor as f64) > pixel_cap {
            factor += 1;
        }
    }
    if factor == 3 {
        4
    } else {
        factor
    }
}

/// Decode raw container bytes to pixels at full resolution.
fn decode_pixels(data: &[u8]) -> LoadResult<DynamicImage> {
    if is_jpeg(data) {
        let mut decoder = JpegDecoder::new(data);
        let pixels = decoder
            .decode()
            .map_err(|e| LoadError::Decode(format!("failed to decode JPEG: {e:?}")))?;
        let info = decoder
            .info()
            .ok_or_else(|| LoadError::Decode("no image info after JPEG decode".into()))?;
        let width = info.width as u32;
        let height = info.height as u32;
        let rgb = if info.components == 1 {
            pixels.iter().flat_map(|&gray| [gray, gray, gray]).collect()
        } else {
            pixels
        };
        let buffer = RgbImage::from_raw(width, height, rgb)
            .ok_or_else(|| LoadError::Decode("JPEG pixel buffer size mismatch".into()))?;
        return Ok(DynamicImage::ImageRgb8(buffer));
    }
    image::load_from_memory(data).map_err(|e| LoadError::Decode(format!("{e}")))
}

/// Scale/crop a decoded image to the requested dimensions.
///
/// The branch taken depends on the width/height scale ratios: images already
/// within the target are untouched; a wide-enough-only image is center
/// cropped to the target aspect; a tall-enough-only image is cropped from
/// the top; images exceeding both dimensions are uniformly scaled by the
/// larger ratio. Callers rely on the crop-vs-scale choice, not pixels.
fn scale_crop(image: DynamicImage, query_w: u32, query_h: u32) -> DynamicImage {
    if query_w == 0 || query_h == 0 {
        return image;
    }
    let res_w = image.width();
    let res_h = image.height();
    if res_w == 0 || res_h == 0 {
        return image;
    }
    let scale_w = query_w as f32 / res_w as f32;
    let scale_h = query_h as f32 / res_h as f32;

    if scale_w >= 1.0 && scale_h >= 1.0 {
        image
    } else if scale_h >= 1.0 {
        let cut_h = res_h;
        let cut_w = ((query_w as u64 * cut_h as u64 / query_h as u64) as u32)
            .clamp(1, res_w);
        let cut_x = res_w / 2 - cut_w / 2;
        image.crop_imm(cut_x, 0, cut_w, cut_h)
    } else if scale_w >= 1.0 {
        let cut_w = res_w;
        let cut_h = ((query_h as u64 * cut_w as u64 / query_w as u64) as u32)
            .clamp(1, res_h);
        image.crop_imm(0, 0, cut_w, cut_h)
    } else {
        let scale = scale_w.max(scale_h);
        let new_w = ((res_w as f32 * scale).round() as u32).max(1);
        let new_h = ((res_h as f32 * scale).round() as u32).max(1);
        image.resize_exact(new_w, new_h, FilterType::Triangle)
    }
}

fn apply_transforms(mut image: DynamicImage, params: &RequestParams) -> DynamicImage {
    if params.rotate && image.width() > image.height() {
        image = transform::rotate_quarter(image);
    }
    if params.grayscale {
        image = transform::grayscale(image);
    }
    if params.circular {
        image = transform::circular_mask(image);
    } else if let Some(radius) = params.corner_radius {
        image = transform::rounded_mask(image, radius);
    }
    image
}

/// Decode in-memory bytes for a request.
pub fn decode_bytes(data: &[u8], params: &RequestParams) -> LoadResult<DecodedImage> {
    decode_inner(data, params, None)
}

/// Decode a cached file for a request.
///
/// A file whose header probe fails or reports degenerate dimensions is
/// deleted so the next request falls through to a fresh fetch.
pub fn decode_file(path: &Path, params: &RequestParams) -> LoadResult<DecodedImage> {
    let data = std::fs::read(path)?;
    decode_inner(&data, params, Some(path))
}

fn decode_inner(
    data: &[u8],
    params: &RequestParams,
    source: Option<&Path>,
) -> LoadResult<DecodedImage> {
    let (width, height) = match probe_dimensions(data) {
        Ok((w, h)) if w >= 1 && h >= 1 => (w, h),
        _ => {
            if let Some(path) = source {
                let _ = std::fs::remove_file(path);
                return Err(LoadError::CorruptSource(path.display().to_string()));
            }
            return Err(LoadError::Decode("degenerate source dimensions".into()));
        }
    };

    let factor = subsample_factor(width, height, params.width, params.height);
    // The decoders produce whole frames only; the reduction happens right
    // here so nothing past this point holds the full-size buffer.
    let mut image = decode_pixels(data)?;
    if factor > 1 {
        image = image.resize_exact(
            (width / factor).max(1),
            (height / factor).max(1),
            FilterType::Triangle,
        );
    }
    if params.scale {
        image = scale_crop(image, params.width, params.height);
    }
    Ok(DecodedImage::new(apply_transforms(image, params)))
}
