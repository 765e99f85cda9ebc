//! Local compositing on top of an enhanced image.
//!
//! Stages run in a fixed order, each producing a new image from the previous
//! one: crop to the aspect ratio, title, subtitle, watermark.

pub mod crop;
mod pipeline;
pub mod text;
pub mod watermark;

pub use crop::{centered_crop_rect, crop_to_aspect, CropRect};
pub use pipeline::{
    compose_text, compose_watermark, decode_image, encode_png, output_file_name, Composition,
};
pub use text::{
    fit_font_size, Subtitle, TextMeasure, TitleLayout, TitleSegment, Typeface, MAX_TITLE_SIZE,
    MIN_FONT_SIZE,
};
pub use watermark::{apply_watermark, watermark_placement, Corner, Placement, Watermark, WatermarkSpec};
