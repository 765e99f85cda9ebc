//! Compositing pipeline: crop, title, subtitle, watermark.

use crate::compose::crop::crop_to_aspect;
use crate::compose::text::{draw_subtitle, draw_title, Subtitle, TitleLayout, TitleSegment, Typeface};
use crate::compose::watermark::{apply_watermark, Watermark, WatermarkSpec};
use crate::enhance::AspectRatio;
use crate::error::{BackdropError, Result};
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;

const OUTPUT_SUFFIX: &str = "-enhanced";

/// Decodes encoded image bytes.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| BackdropError::ImageLoad(e.to_string()))
}

/// Encodes an image as PNG.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Name of the downloadable artifact for an uploaded file name.
pub fn output_file_name(original: &str) -> String {
    let stem = Path::new(original)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "image".to_string());
    format!("{stem}{OUTPUT_SUFFIX}.png")
}

/// Everything drawn on top of an enhanced image, applied in a fixed order.
#[derive(Debug, Clone, Default)]
pub struct Composition {
    /// Crop target.
    pub aspect_ratio: AspectRatio,
    /// Title segments, drawn left to right.
    pub title: Vec<TitleSegment>,
    /// Line under the title.
    pub subtitle: Option<Subtitle>,
    /// Stamped last, over any text.
    pub watermark: Option<Watermark>,
}

impl Composition {
    /// Creates a composition that only crops.
    pub fn new(aspect_ratio: AspectRatio) -> Self {
        Self {
            aspect_ratio,
            ..Self::default()
        }
    }

    /// Appends a title segment.
    pub fn with_title_segment(mut self, segment: TitleSegment) -> Self {
        self.title.push(segment);
        self
    }

    /// Sets the subtitle.
    pub fn with_subtitle(mut self, subtitle: Subtitle) -> Self {
        self.subtitle = Some(subtitle);
        self
    }

    /// Sets the watermark.
    pub fn with_watermark(mut self, watermark: Watermark) -> Self {
        self.watermark = Some(watermark);
        self
    }

    /// True if any title or subtitle text will be drawn.
    pub fn has_text(&self) -> bool {
        self.title.iter().any(|s| !s.text.trim().is_empty())
            || self
                .subtitle
                .as_ref()
                .is_some_and(|s| !s.text.trim().is_empty())
    }

    /// Runs every stage on a decoded image.
    ///
    /// `typeface` is only required when there is text to draw.
    pub fn render(&self, base: &DynamicImage, typeface: Option<&Typeface>) -> Result<DynamicImage> {
        let mut image = crop_to_aspect(base, self.aspect_ratio)?;

        if self.has_text() {
            let face = typeface.ok_or_else(|| {
                BackdropError::InvalidRequest(
                    "no font available for title text; pass a font file".into(),
                )
            })?;
            let (titled, layout) = title_stage(image, face, &self.title);
            image = match &self.subtitle {
                Some(subtitle) => subtitle_stage(titled, face, subtitle, layout.as_ref()),
                None => titled,
            };
        }

        if let Some(watermark) = &self.watermark {
            let mark = decode_image(&watermark.image.data)?;
            image = watermark_stage(&image, &mark, &watermark.spec)?;
        }

        Ok(image)
    }

    /// Decodes `base`, runs every stage and returns PNG bytes.
    pub fn apply(&self, base: &[u8], typeface: Option<&Typeface>) -> Result<Vec<u8>> {
        let decoded = decode_image(base)?;
        let rendered = self.render(&decoded, typeface)?;
        encode_png(&rendered)
    }
}

/// Crops and draws title and subtitle on encoded image bytes.
///
/// Without any text the cropped image is returned as-is.
pub fn compose_text(
    base: &[u8],
    aspect_ratio: AspectRatio,
    title: &[TitleSegment],
    subtitle: Option<&Subtitle>,
    typeface: &Typeface,
) -> Result<Vec<u8>> {
    let composition = Composition {
        aspect_ratio,
        title: title.to_vec(),
        subtitle: subtitle.cloned(),
        watermark: None,
    };
    composition.apply(base, Some(typeface))
}

/// Draws a watermark on encoded image bytes.
pub fn compose_watermark(base: &[u8], mark: &[u8], spec: &WatermarkSpec) -> Result<Vec<u8>> {
    let base = decode_image(base)?;
    let mark = decode_image(mark)?;
    encode_png(&watermark_stage(&base, &mark, spec)?)
}

fn title_stage(
    image: DynamicImage,
    face: &Typeface,
    segments: &[TitleSegment],
) -> (DynamicImage, Option<TitleLayout>) {
    let mut canvas = image.into_rgba8();
    let layout = draw_title(&mut canvas, face, segments);
    (DynamicImage::ImageRgba8(canvas), layout)
}

fn subtitle_stage(
    image: DynamicImage,
    face: &Typeface,
    subtitle: &Subtitle,
    title: Option<&TitleLayout>,
) -> DynamicImage {
    let mut canvas = image.into_rgba8();
    draw_subtitle(&mut canvas, face, subtitle, title);
    DynamicImage::ImageRgba8(canvas)
}

fn watermark_stage(
    image: &DynamicImage,
    mark: &DynamicImage,
    spec: &WatermarkSpec,
) -> Result<DynamicImage> {
    apply_watermark(image, mark, spec)
}
