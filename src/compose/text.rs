//! Title and subtitle rendering.
//!
//! Titles are sized to fit: the font size is searched downward from
//! [`MAX_TITLE_SIZE`] until the uppercased, space-joined text fits inside the
//! canvas minus [`HORIZONTAL_MARGIN`] on each side. Each segment is drawn with
//! its own color over a block extrusion and a soft drop shadow.

use crate::color::Color;
use crate::error::{BackdropError, Result};
use image::{imageops, Rgba, RgbaImage};
use rusttype::{point, Font, Scale};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest title font size tried, in pixels.
pub const MAX_TITLE_SIZE: f32 = 200.0;
/// Smallest font size ever used.
pub const MIN_FONT_SIZE: f32 = 10.0;
/// Space kept clear on the left and on the right of text.
pub const HORIZONTAL_MARGIN: f32 = 40.0;
/// Subtitle size relative to the title.
pub const SUBTITLE_SCALE: f32 = 0.4;

const TOP_FRACTION: f32 = 0.05;
const EXTRUSION_FRACTION: f32 = 0.06;
const EXTRUSION_COLOR: Rgba<u8> = Rgba([18, 18, 18, 235]);

/// Well-known bold sans-serif fonts, tried in order by [`Typeface::discover`].
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Bold.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSansBold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

/// Measures rendered text width.
pub trait TextMeasure {
    /// Width in pixels of `text` at font size `px`.
    fn text_width(&self, text: &str, px: f32) -> f32;
}

/// A loaded font used for all title and subtitle text.
#[derive(Clone)]
pub struct Typeface {
    font: Font<'static>,
}

impl std::fmt::Debug for Typeface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Typeface")
            .field("glyphs", &self.font.glyph_count())
            .finish()
    }
}

impl Typeface {
    /// Parses a TrueType/OpenType font.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Font::try_from_vec(data)
            .map(|font| Self { font })
            .ok_or_else(|| BackdropError::InvalidRequest("unsupported font data".into()))
    }

    /// Loads a font file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bytes(std::fs::read(path)?)
    }

    /// Finds a bold sans-serif system font.
    pub fn discover() -> Option<Self> {
        SYSTEM_FONT_CANDIDATES
            .iter()
            .map(Path::new)
            .filter(|p| p.exists())
            .find_map(|p| match Self::from_file(p) {
                Ok(face) => {
                    tracing::debug!(path = %p.display(), "using system font");
                    Some(face)
                }
                Err(e) => {
                    tracing::warn!(path = %p.display(), "skipping unreadable font: {e}");
                    None
                }
            })
    }

    fn ascent(&self, px: f32) -> f32 {
        self.font.v_metrics(Scale::uniform(px)).ascent
    }
}

impl TextMeasure for Typeface {
    fn text_width(&self, text: &str, px: f32) -> f32 {
        self.font
            .layout(text, Scale::uniform(px), point(0.0, 0.0))
            .last()
            .map(|g| g.position().x + g.unpositioned().h_metrics().advance_width)
            .unwrap_or(0.0)
    }
}

/// One colored run of a title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleSegment {
    /// Text of the run; uppercased when drawn.
    pub text: String,
    /// Fill color of the run.
    pub color: Color,
}

impl TitleSegment {
    /// Creates a segment.
    pub fn new(text: impl Into<String>, color: Color) -> Self {
        Self {
            text: text.into(),
            color,
        }
    }
}

/// A single line under the title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtitle {
    /// Text, drawn as given.
    pub text: String,
    /// Fill color.
    pub color: Color,
}

impl Subtitle {
    /// Creates a subtitle.
    pub fn new(text: impl Into<String>, color: Color) -> Self {
        Self {
            text: text.into(),
            color,
        }
    }
}

/// Where a title ended up on the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TitleLayout {
    /// Fitted font size in pixels.
    pub font_size: f32,
    /// Left edge of the first segment.
    pub x: f32,
    /// Top of the text line.
    pub y: f32,
    /// Combined advance width of all segments.
    pub width: f32,
}

/// Returns the largest integral size in `[min, max]` whose width fits in
/// `max_width`, or `min` when nothing fits.
pub fn fit_font_size<M: TextMeasure>(
    measure: &M,
    text: &str,
    max_width: f32,
    max: f32,
    min: f32,
) -> f32 {
    let mut size = max.floor();
    while size > min {
        if measure.text_width(text, size) <= max_width {
            return size;
        }
        size -= 1.0;
    }
    min
}

/// Segments that will actually be drawn: trimmed, non-empty, uppercased.
pub fn title_runs(segments: &[TitleSegment]) -> Vec<TitleSegment> {
    segments
        .iter()
        .filter(|s| !s.text.trim().is_empty())
        .map(|s| TitleSegment::new(s.text.trim().to_uppercase(), s.color))
        .collect()
}

/// Usable text width for a canvas.
pub fn available_width(canvas_width: u32) -> f32 {
    (canvas_width as f32 - 2.0 * HORIZONTAL_MARGIN).max(0.0)
}

/// Chooses the title font size for the given segments and canvas width.
pub fn title_font_size<M: TextMeasure>(
    measure: &M,
    segments: &[TitleSegment],
    canvas_width: u32,
) -> Option<f32> {
    let runs = title_runs(segments);
    if runs.is_empty() {
        return None;
    }
    let joined = runs
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    Some(fit_font_size(
        measure,
        &joined,
        available_width(canvas_width),
        MAX_TITLE_SIZE,
        MIN_FONT_SIZE,
    ))
}

/// Draws the title near the top of `canvas`.
///
/// Returns `None` without touching the canvas when no segment has text.
pub fn draw_title(
    canvas: &mut RgbaImage,
    face: &Typeface,
    segments: &[TitleSegment],
) -> Option<TitleLayout> {
    let runs = title_runs(segments);
    let size = title_font_size(face, &runs, canvas.width())?;

    let joined = runs
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let width = face.text_width(&joined, size);
    let x = ((canvas.width() as f32 - width) / 2.0).max(0.0);
    let y = canvas.height() as f32 * TOP_FRACTION;
    let space = face.text_width(" ", size);

    let mut placed = Vec::with_capacity(runs.len());
    let mut cursor = x;
    for run in &runs {
        placed.push((cursor, run));
        cursor += face.text_width(&run.text, size) + space;
    }

    // Back to front across all segments so no shadow lands on a fill.
    let shadow_offset = (size * 0.08).max(1.0);
    let shadow_sigma = (size * 0.08).max(1.0);
    for (sx, run) in &placed {
        draw_soft_shadow(
            canvas,
            face,
            &run.text,
            size,
            sx + shadow_offset,
            y + shadow_offset,
            shadow_sigma,
            Rgba([0, 0, 0, 115]),
        );
    }

    let depth = (size * EXTRUSION_FRACTION).round().max(1.0) as u32;
    for (sx, run) in &placed {
        for i in (1..=depth).rev() {
            let d = i as f32;
            draw_text(canvas, face, &run.text, size, sx + d, y + d, EXTRUSION_COLOR);
        }
    }

    for (sx, run) in &placed {
        draw_text(canvas, face, &run.text, size, *sx, y, run.color.with_alpha(255));
    }

    tracing::debug!(font_size = size, segments = runs.len(), "drew title");
    Some(TitleLayout {
        font_size: size,
        x,
        y,
        width,
    })
}

/// Draws the subtitle below `title`, or near the top when there is no title.
///
/// Returns the font size used, or `None` for empty text.
pub fn draw_subtitle(
    canvas: &mut RgbaImage,
    face: &Typeface,
    subtitle: &Subtitle,
    title: Option<&TitleLayout>,
) -> Option<f32> {
    let text = subtitle.text.trim();
    if text.is_empty() {
        return None;
    }

    let start = title
        .map(|t| (t.font_size * SUBTITLE_SCALE).round())
        .unwrap_or(MAX_TITLE_SIZE * SUBTITLE_SCALE)
        .max(MIN_FONT_SIZE);
    let size = fit_font_size(
        face,
        text,
        available_width(canvas.width()),
        start,
        MIN_FONT_SIZE,
    );

    let width = face.text_width(text, size);
    let x = ((canvas.width() as f32 - width) / 2.0).max(0.0);
    let y = match title {
        Some(t) => t.y + t.font_size * 1.15 + size * 0.3,
        None => canvas.height() as f32 * TOP_FRACTION,
    };

    let offset = (size / 15.0).round().max(1.0);
    draw_text(canvas, face, text, size, x + offset, y + offset, Rgba([0, 0, 0, 150]));
    draw_text(canvas, face, text, size, x, y, subtitle.color.with_alpha(255));

    tracing::debug!(font_size = size, "drew subtitle");
    Some(size)
}

/// Rasterizes `text` with its top-left at `(x, y)`, blending over `canvas`.
fn draw_text(
    canvas: &mut RgbaImage,
    face: &Typeface,
    text: &str,
    px: f32,
    x: f32,
    y: f32,
    color: Rgba<u8>,
) {
    let baseline = y + face.ascent(px);
    let (w, h) = (canvas.width() as i32, canvas.height() as i32);

    for glyph in face
        .font
        .layout(text, Scale::uniform(px), point(x, baseline))
    {
        let Some(bb) = glyph.pixel_bounding_box() else {
            continue;
        };
        glyph.draw(|gx, gy, coverage| {
            let px = gx as i32 + bb.min.x;
            let py = gy as i32 + bb.min.y;
            if px < 0 || py < 0 || px >= w || py >= h {
                return;
            }
            blend(canvas.get_pixel_mut(px as u32, py as u32), color, coverage);
        });
    }
}

/// Draws a blurred copy of `text` on a scratch layer and composites it.
#[allow(clippy::too_many_arguments)]
fn draw_soft_shadow(
    canvas: &mut RgbaImage,
    face: &Typeface,
    text: &str,
    px: f32,
    x: f32,
    y: f32,
    sigma: f32,
    color: Rgba<u8>,
) {
    let pad = (sigma * 3.0).ceil();
    let layer_w = (face.text_width(text, px) + 2.0 * pad).ceil() as u32;
    let layer_h = (px * 1.3 + 2.0 * pad).ceil() as u32;
    if layer_w == 0 || layer_h == 0 {
        return;
    }

    let mut layer = RgbaImage::new(layer_w, layer_h);
    draw_text(&mut layer, face, text, px, pad, pad, color);
    let blurred = imageops::blur(&layer, sigma);
    imageops::overlay(
        canvas,
        &blurred,
        (x - pad).round() as i64,
        (y - pad).round() as i64,
    );
}

/// Source-over blend of `color` at `coverage` onto `dst`.
fn blend(dst: &mut Rgba<u8>, color: Rgba<u8>, coverage: f32) {
    let sa = (f32::from(color[3]) / 255.0) * coverage.clamp(0.0, 1.0);
    if sa <= 0.0 {
        return;
    }
    let da = f32::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for i in 0..3 {
        let s = f32::from(color[i]);
        let d = f32::from(dst[i]);
        dst[i] = ((s * sa + d * da * (1.0 - sa)) / out_a).round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every character advances `advance * px`.
    struct FixedAdvance(f32);

    impl TextMeasure for FixedAdvance {
        fn text_width(&self, text: &str, px: f32) -> f32 {
            text.chars().count() as f32 * self.0 * px
        }
    }

    fn seg(text: &str) -> TitleSegment {
        TitleSegment::new(text, Color::WHITE)
    }

    #[test]
    fn test_short_title_uses_max_size() {
        let size = title_font_size(&FixedAdvance(0.5), &[seg("hi")], 2000);
        assert_eq!(size, Some(MAX_TITLE_SIZE));
    }

    #[test]
    fn test_fit_is_largest_size_that_fits() {
        // "HELLO WORLD" = 11 chars * 0.6 = 6.6 px per px; 920 / 6.6 = 139.39
        let measure = FixedAdvance(0.6);
        let size = title_font_size(&measure, &[seg("hello"), seg("world")], 1000).unwrap();
        assert_eq!(size, 139.0);
        assert!(measure.text_width("HELLO WORLD", size) <= 920.0);
        assert!(measure.text_width("HELLO WORLD", size + 1.0) > 920.0);
    }

    #[test]
    fn test_fit_never_drops_below_min() {
        let long = "x".repeat(500);
        let size = title_font_size(&FixedAdvance(1.0), &[seg(&long)], 400).unwrap();
        assert_eq!(size, MIN_FONT_SIZE);

        // canvas narrower than the margins
        let size = title_font_size(&FixedAdvance(1.0), &[seg("a")], 50).unwrap();
        assert_eq!(size, MIN_FONT_SIZE);
    }

    #[test]
    fn test_size_bounds_hold_across_widths() {
        let measure = FixedAdvance(0.55);
        for width in [0, 80, 81, 300, 1080, 4096] {
            for text in ["a", "summer sale", "the quick brown fox jumps"] {
                let size = title_font_size(&measure, &[seg(text)], width).unwrap();
                assert!((MIN_FONT_SIZE..=MAX_TITLE_SIZE).contains(&size));
            }
        }
    }

    #[test]
    fn test_blank_segments_are_dropped_and_text_uppercased() {
        let runs = title_runs(&[seg("  "), seg(" new "), seg(""), seg("Arrivals")]);
        let texts: Vec<_> = runs.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, ["NEW", "ARRIVALS"]);
        assert_eq!(title_font_size(&FixedAdvance(1.0), &[seg(" ")], 1000), None);
    }

    #[test]
    fn test_blend_over_opaque() {
        let mut px = Rgba([255, 255, 255, 255]);
        blend(&mut px, Rgba([0, 0, 0, 255]), 1.0);
        assert_eq!(px, Rgba([0, 0, 0, 255]));

        let mut px = Rgba([255, 255, 255, 255]);
        blend(&mut px, Rgba([0, 0, 0, 255]), 0.5);
        assert_eq!(px[3], 255);
        assert!((127..=128).contains(&px[0]));

        let mut px = Rgba([10, 20, 30, 255]);
        blend(&mut px, Rgba([0, 0, 0, 0]), 1.0);
        assert_eq!(px, Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_draw_title_with_system_font() {
        let Some(face) = Typeface::discover() else {
            eprintln!("no system font found, skipping");
            return;
        };
        let mut canvas = RgbaImage::from_pixel(800, 600, Rgba([255, 255, 255, 255]));
        let layout = draw_title(
            &mut canvas,
            &face,
            &[
                TitleSegment::new("big", Color::rgb(255, 0, 0)),
                TitleSegment::new("sale", Color::rgb(0, 0, 255)),
            ],
        )
        .unwrap();

        assert!(layout.font_size <= MAX_TITLE_SIZE && layout.font_size >= MIN_FONT_SIZE);
        assert!(layout.width <= available_width(800));
        assert!(canvas.pixels().any(|p| p[0] > 200 && p[1] < 60 && p[2] < 60));
        assert!(canvas.pixels().any(|p| p[2] > 200 && p[0] < 60 && p[1] < 60));

        let sub = draw_subtitle(
            &mut canvas,
            &face,
            &Subtitle::new("Limited time", Color::rgb(0, 160, 0)),
            Some(&layout),
        )
        .unwrap();
        assert!(sub <= (layout.font_size * SUBTITLE_SCALE).round());
    }

    #[test]
    fn test_empty_title_leaves_canvas_untouched() {
        let Some(face) = Typeface::discover() else {
            return;
        };
        let mut canvas = RgbaImage::from_pixel(200, 200, Rgba([9, 9, 9, 255]));
        let before = canvas.clone();
        assert!(draw_title(&mut canvas, &face, &[seg("   ")]).is_none());
        assert!(draw_subtitle(&mut canvas, &face, &Subtitle::new("", Color::WHITE), None).is_none());
        assert_eq!(canvas, before);
    }

    #[test]
    fn test_rejects_non_font_bytes() {
        assert!(Typeface::from_bytes(vec![0; 64]).is_err());
    }
}
