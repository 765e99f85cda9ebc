//! Centered crop to a target aspect ratio.

use crate::enhance::AspectRatio;
use crate::error::{BackdropError, Result};
use image::{DynamicImage, GenericImageView};

/// A crop window inside a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    /// Left edge in source pixels.
    pub x: u32,
    /// Top edge in source pixels.
    pub y: u32,
    /// Window width.
    pub width: u32,
    /// Window height.
    pub height: u32,
}

/// Computes the largest centered window of ratio `ratio_w:ratio_h`.
///
/// The narrower dimension is kept whole; the other is trimmed equally from
/// both sides.
pub fn centered_crop_rect(width: u32, height: u32, ratio_w: u32, ratio_h: u32) -> CropRect {
    let (w, h) = (u64::from(width), u64::from(height));
    let (rw, rh) = (u64::from(ratio_w.max(1)), u64::from(ratio_h.max(1)));

    if w * rh > h * rw {
        // too wide: keep full height
        let crop_w = ((h * rw + rh / 2) / rh).clamp(1, w) as u32;
        CropRect {
            x: (width - crop_w) / 2,
            y: 0,
            width: crop_w,
            height,
        }
    } else {
        let crop_h = ((w * rh + rw / 2) / rw).clamp(1, h) as u32;
        CropRect {
            x: 0,
            y: (height - crop_h) / 2,
            width,
            height: crop_h,
        }
    }
}

/// Crops `image` to `ratio`, centered.
pub fn crop_to_aspect(image: &DynamicImage, ratio: AspectRatio) -> Result<DynamicImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(BackdropError::Canvas(format!(
            "cannot crop a {width}x{height} image"
        )));
    }
    let (rw, rh) = ratio.parts();
    let rect = centered_crop_rect(width, height, rw, rh);
    tracing::debug!(?rect, %ratio, "cropping to aspect ratio");
    Ok(image.crop_imm(rect.x, rect.y, rect.width, rect.height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_wide_source_to_square() {
        let rect = centered_crop_rect(1000, 500, 1, 1);
        assert_eq!(
            rect,
            CropRect {
                x: 250,
                y: 0,
                width: 500,
                height: 500
            }
        );
    }

    #[test]
    fn test_tall_source_to_landscape() {
        let rect = centered_crop_rect(1080, 1920, 16, 9);
        assert_eq!(rect.width, 1080);
        assert_eq!(rect.height, 608);
        assert_eq!(rect.y, (1920 - 608) / 2);
    }

    #[test]
    fn test_ratio_holds_within_rounding_and_is_centered() {
        let sources = [(1920, 1080), (1080, 1920), (777, 333), (1, 1), (5000, 17), (640, 480)];
        for (w, h) in sources {
            for ratio in AspectRatio::ALL {
                let (rw, rh) = ratio.parts();
                let rect = centered_crop_rect(w, h, rw, rh);

                assert!(rect.width <= w && rect.height <= h);
                assert!(rect.x + rect.width <= w && rect.y + rect.height <= h);
                // one pixel of rounding on the trimmed side
                let got = f64::from(rect.width) / f64::from(rect.height);
                let tol = ratio.value() / f64::from(rect.width.min(rect.height));
                assert!(
                    (got - ratio.value()).abs() <= tol + 1e-9,
                    "{w}x{h} -> {rect:?} for {ratio}"
                );
                // centered: margins differ by at most one pixel
                let left = rect.x;
                let right = w - rect.x - rect.width;
                let top = rect.y;
                let bottom = h - rect.y - rect.height;
                assert!(left.abs_diff(right) <= 1 && top.abs_diff(bottom) <= 1);
            }
        }
    }

    #[test]
    fn test_crop_to_aspect_takes_center_pixels() {
        let mut img = RgbaImage::from_pixel(300, 100, Rgba([0, 0, 0, 255]));
        for y in 0..100 {
            for x in 100..200 {
                img.put_pixel(x, y, Rgba([255, 0, 0, 255]));
            }
        }
        let cropped = crop_to_aspect(&DynamicImage::ImageRgba8(img), AspectRatio::Square).unwrap();
        assert_eq!(cropped.dimensions(), (100, 100));
        assert!(cropped
            .to_rgba8()
            .pixels()
            .all(|p| *p == Rgba([255, 0, 0, 255])));
    }

    #[test]
    fn test_empty_image_is_a_canvas_error() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(0, 10));
        assert!(matches!(
            crop_to_aspect(&img, AspectRatio::Square),
            Err(BackdropError::Canvas(_))
        ));
    }
}
