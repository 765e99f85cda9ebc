//! Core types for background enhancement.

use crate::color::Color;
use crate::error::{BackdropError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format (modern, efficient).
    WebP,
}

impl ImageFormat {
    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Parses a MIME type such as `image/jpeg`.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.trim().to_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Attempts to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }
}

/// Target aspect ratios offered for the finished photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 1:1 square aspect ratio.
    #[default]
    #[serde(rename = "1:1")]
    Square,
    /// 16:9 landscape (widescreen) aspect ratio.
    #[serde(rename = "16:9")]
    Landscape,
    /// 9:16 portrait (tall) aspect ratio.
    #[serde(rename = "9:16")]
    Portrait,
    /// 4:3 standard landscape aspect ratio.
    #[serde(rename = "4:3")]
    Standard,
    /// 3:4 standard portrait aspect ratio.
    #[serde(rename = "3:4")]
    StandardPortrait,
    /// 21:9 ultrawide aspect ratio.
    #[serde(rename = "21:9")]
    Ultrawide,
}

impl AspectRatio {
    /// All supported ratios, in menu order.
    pub const ALL: [AspectRatio; 6] = [
        Self::Square,
        Self::Landscape,
        Self::Portrait,
        Self::Standard,
        Self::StandardPortrait,
        Self::Ultrawide,
    ];

    /// Returns the aspect ratio as a string (e.g., "16:9").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
            Self::Standard => "4:3",
            Self::StandardPortrait => "3:4",
            Self::Ultrawide => "21:9",
        }
    }

    /// Returns `(width, height)` terms of the ratio.
    pub fn parts(&self) -> (u32, u32) {
        match self {
            Self::Square => (1, 1),
            Self::Landscape => (16, 9),
            Self::Portrait => (9, 16),
            Self::Standard => (4, 3),
            Self::StandardPortrait => (3, 4),
            Self::Ultrawide => (21, 9),
        }
    }

    /// Returns width divided by height.
    pub fn value(&self) -> f64 {
        let (w, h) = self.parts();
        f64::from(w) / f64::from(h)
    }

    /// Human description used in prompts.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Square => "a square 1:1",
            Self::Landscape => "a landscape 16:9",
            Self::Portrait => "a vertical 9:16",
            Self::Standard => "a landscape 4:3",
            Self::StandardPortrait => "a portrait 3:4",
            Self::Ultrawide => "an ultrawide 21:9",
        }
    }
}

impl FromStr for AspectRatio {
    type Err = BackdropError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s.trim())
            .ok_or_else(|| BackdropError::InvalidRequest(format!("unsupported aspect ratio: {s}")))
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user-supplied image, held in memory until it is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    /// Raw encoded bytes.
    pub data: Vec<u8>,
    /// Detected format.
    pub format: ImageFormat,
    /// Original file name, if the image came from a file.
    pub file_name: Option<String>,
}

impl SourceImage {
    /// Wraps raw bytes, detecting the format from magic bytes (PNG fallback).
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let format = ImageFormat::from_magic_bytes(&data).unwrap_or_default();
        Self {
            data,
            format,
            file_name: None,
        }
    }

    /// Reads an image file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let format = ImageFormat::from_magic_bytes(&data)
            .or_else(|| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .and_then(ImageFormat::from_extension)
            })
            .unwrap_or_default();
        Ok(Self {
            data,
            format,
            file_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
        })
    }

    /// Parses a `data:<mime>;base64,<payload>` URL.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| BackdropError::Decode("not a data URL".into()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| BackdropError::Decode("data URL has no payload".into()))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| BackdropError::Decode("data URL is not base64-encoded".into()))?;
        let data = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| BackdropError::Decode(e.to_string()))?;
        let format = ImageFormat::from_mime_type(mime)
            .or_else(|| ImageFormat::from_magic_bytes(&data))
            .unwrap_or_default();
        Ok(Self {
            data,
            format,
            file_name: None,
        })
    }

    /// Sets the original file name.
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Name of the finished PNG; `image-enhanced.png` when the source had no file name.
    pub fn output_file_name(&self) -> String {
        crate::compose::output_file_name(self.file_name.as_deref().unwrap_or(""))
    }

    /// Encodes the image data as base64.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Returns the image as a data URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.format.mime_type(), self.to_base64())
    }
}

/// Background treatment requested for the product photo.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum BackgroundStyle {
    /// Clean studio gradient chosen by the model.
    #[default]
    Default,
    /// A single flat color.
    Solid {
        /// Backdrop color.
        color: Color,
    },
    /// A two-color gradient.
    Gradient {
        /// Starting color.
        from: Color,
        /// Ending color.
        to: Color,
    },
    /// Keep the existing scene, blurred behind the product.
    Blur,
    /// Replace the background with a second uploaded image.
    Custom {
        /// The replacement scene.
        image: SourceImage,
    },
}

impl BackgroundStyle {
    /// Short name for logs and metadata.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Solid { .. } => "solid",
            Self::Gradient { .. } => "gradient",
            Self::Blur => "blur",
            Self::Custom { .. } => "custom",
        }
    }

    /// The replacement background image, for the custom style.
    pub fn background_image(&self) -> Option<&SourceImage> {
        match self {
            Self::Custom { image } => Some(image),
            _ => None,
        }
    }
}

/// A request to re-background a product photo.
#[derive(Debug, Clone)]
pub struct EnhanceRequest {
    /// The product photo.
    pub image: SourceImage,
    /// Requested background treatment.
    pub style: BackgroundStyle,
    /// Target aspect ratio.
    pub aspect_ratio: AspectRatio,
}

impl EnhanceRequest {
    /// Creates a request with the default background and a square ratio.
    pub fn new(image: SourceImage) -> Self {
        Self {
            image,
            style: BackgroundStyle::default(),
            aspect_ratio: AspectRatio::default(),
        }
    }

    /// Sets the background style.
    pub fn with_style(mut self, style: BackgroundStyle) -> Self {
        self.style = style;
        self
    }

    /// Sets the aspect ratio.
    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = ratio;
        self
    }
}

/// Metadata about the enhancement call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnhanceMetadata {
    /// Model used for generation.
    pub model: Option<String>,
    /// Round-trip duration in milliseconds.
    pub duration_ms: Option<u64>,
    /// Any text the model sent alongside the image.
    pub text: Option<String>,
}

/// An image returned by the model.
#[derive(Debug, Clone)]
#[must_use = "enhanced image should be saved or composed"]
pub struct EnhancedImage {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// Image format.
    pub format: ImageFormat,
    /// Call metadata.
    pub metadata: EnhanceMetadata,
}

impl EnhancedImage {
    /// Creates a new enhanced image.
    pub fn new(data: Vec<u8>, format: ImageFormat, metadata: EnhanceMetadata) -> Self {
        Self {
            data,
            format,
            metadata,
        }
    }
}
