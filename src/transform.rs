//! Pure image-to-image transforms applied after base decode.
//!
//! Order is fixed by the decode pipeline: rotation, then grayscale, then
//! rounding (circular mask wins over rounded corners when both are set).

use image::DynamicImage;

/// Rotate a quarter turn clockwise.
pub fn rotate_quarter(image: DynamicImage) -> DynamicImage {
    image.rotate90()
}

/// Convert to grayscale.
pub fn grayscale(image: DynamicImage) -> DynamicImage {
    image.grayscale()
}

/// Mask everything outside the largest centered circle to transparent.
pub fn circular_mask(image: DynamicImage) -> DynamicImage {
    let mut rgba = image.to_rgba8();
    let (w, h) = rgba.dimensions();
    if w == 0 || h == 0 {
        return DynamicImage::ImageRgba8(rgba);
    }
    let cx = (w as i64 - 1) / 2;
    let cy = (h as i64 - 1) / 2;
    let r = (w.min(h) as i64) / 2;
    for (x, y, pixel) in rgba.enumerate_pixels_mut() {
        let dx = x as i64 - cx;
        let dy = y as i64 - cy;
        if dx * dx + dy * dy > r * r {
            pixel.0[3] = 0;
        }
    }
    DynamicImage::ImageRgba8(rgba)
}

/// Mask the four corners outside quarter-circles of `radius` to transparent.
pub fn rounded_mask(image: DynamicImage, radius: u32) -> DynamicImage {
    let mut rgba = image.to_rgba8();
    let (w, h) = rgba.dimensions();
    if w == 0 || h == 0 || radius == 0 {
        return DynamicImage::ImageRgba8(rgba);
    }
    let r = radius.min(w / 2).min(h / 2) as i64;
    let (wi, hi) = (w as i64, h as i64);
    for (x, y, pixel) in rgba.enumerate_pixels_mut() {
        let x = x as i64;
        let y = y as i64;
        if (x >= r && x < wi - r) || (y >= r && y < hi - r) {
            continue;
        }
        let cx = if x < r { r } else { wi - 1 - r };
        let cy = if y < r { r } else { hi - 1 - r };
        let dx = x - cx;
        let dy = y - cy;
        if dx * dx + dy * dy > r * r {
            pixel.0[3] = 0;
        }
    }
    DynamicImage::ImageRgba8(rgba)
}
