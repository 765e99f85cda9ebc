//! Watermark scaling and placement.

use crate::enhance::SourceImage;
use crate::error::{BackdropError, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Distance kept between the watermark and both canvas edges.
pub const WATERMARK_PADDING: i64 = 20;

/// Corner the watermark is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Corner {
    /// Upper left.
    TopLeft,
    /// Upper right.
    TopRight,
    /// Lower left.
    BottomLeft,
    /// Lower right.
    #[default]
    BottomRight,
}

impl Corner {
    /// Kebab-case name, as accepted by `FromStr`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopLeft => "top-left",
            Self::TopRight => "top-right",
            Self::BottomLeft => "bottom-left",
            Self::BottomRight => "bottom-right",
        }
    }
}

impl FromStr for Corner {
    type Err = BackdropError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "top-left" => Ok(Self::TopLeft),
            "top-right" => Ok(Self::TopRight),
            "bottom-left" => Ok(Self::BottomLeft),
            "bottom-right" => Ok(Self::BottomRight),
            other => Err(BackdropError::InvalidRequest(format!(
                "unknown corner: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Corner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a watermark is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WatermarkSpec {
    /// Global alpha in `[0, 1]`.
    pub opacity: f32,
    /// Watermark width as a fraction of the base width, in `(0, 1]`.
    pub size: f32,
    /// Corner the watermark is anchored to.
    pub corner: Corner,
}

impl Default for WatermarkSpec {
    fn default() -> Self {
        Self {
            opacity: 0.7,
            size: 0.2,
            corner: Corner::BottomRight,
        }
    }
}

impl WatermarkSpec {
    /// Returns a copy with opacity and size clamped to their ranges.
    pub fn clamped(self) -> Self {
        let opacity = if self.opacity.is_finite() {
            self.opacity.clamp(0.0, 1.0)
        } else {
            1.0
        };
        let size = if self.size.is_finite() {
            self.size.clamp(0.0, 1.0)
        } else {
            Self::default().size
        };
        Self {
            opacity,
            size,
            corner: self.corner,
        }
    }
}

/// A watermark image and its drawing parameters.
#[derive(Debug, Clone)]
pub struct Watermark {
    /// Encoded watermark image.
    pub image: SourceImage,
    /// Opacity, size and corner.
    pub spec: WatermarkSpec,
}

/// Pixel rectangle of a placed watermark; may extend past the base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Left edge; negative when the mark overhangs the left side.
    pub x: i64,
    /// Top edge; negative when the mark overhangs the top.
    pub y: i64,
    /// Scaled width.
    pub width: u32,
    /// Scaled height, keeping the mark's aspect ratio.
    pub height: u32,
}

/// Sizes and anchors a `mark_w`x`mark_h` watermark on a `base_w`x`base_h` image.
pub fn watermark_placement(
    (base_w, base_h): (u32, u32),
    (mark_w, mark_h): (u32, u32),
    spec: &WatermarkSpec,
) -> Result<Placement> {
    let spec = spec.clamped();
    if mark_w == 0 || mark_h == 0 {
        return Err(BackdropError::Canvas("watermark image is empty".into()));
    }
    let width = (spec.size * base_w as f32).round() as u32;
    let height = (f64::from(mark_h) * f64::from(width) / f64::from(mark_w)).round() as u32;
    if width == 0 || height == 0 {
        return Err(BackdropError::Canvas(format!(
            "watermark would be {width}x{height} on a {base_w}x{base_h} image"
        )));
    }

    let right = i64::from(base_w) - i64::from(width) - WATERMARK_PADDING;
    let bottom = i64::from(base_h) - i64::from(height) - WATERMARK_PADDING;
    let (x, y) = match spec.corner {
        Corner::TopLeft => (WATERMARK_PADDING, WATERMARK_PADDING),
        Corner::TopRight => (right, WATERMARK_PADDING),
        Corner::BottomLeft => (WATERMARK_PADDING, bottom),
        Corner::BottomRight => (right, bottom),
    };

    Ok(Placement {
        x,
        y,
        width,
        height,
    })
}

/// Draws `mark` onto a copy of `base` according to `spec`.
pub fn apply_watermark(
    base: &DynamicImage,
    mark: &DynamicImage,
    spec: &WatermarkSpec,
) -> Result<DynamicImage> {
    let spec = spec.clamped();
    let placement = watermark_placement(base.dimensions(), mark.dimensions(), &spec)?;

    let mut scaled = mark
        .resize_exact(placement.width, placement.height, FilterType::Lanczos3)
        .to_rgba8();
    if spec.opacity < 1.0 {
        for px in scaled.pixels_mut() {
            px[3] = (f32::from(px[3]) * spec.opacity).round() as u8;
        }
    }

    let mut canvas = base.to_rgba8();
    imageops::overlay(&mut canvas, &scaled, placement.x, placement.y);

    tracing::debug!(
        ?placement,
        opacity = spec.opacity,
        corner = %spec.corner,
        "applied watermark"
    );
    Ok(DynamicImage::ImageRgba8(canvas))
}
