#![warn(missing_docs)]

//! Backdrop - product photo background enhancement.
//!
//! A product photo is sent to a generative image model (Gemini) with an
//! instruction describing the wanted background. The returned image is then
//! cropped to the target aspect ratio and finished locally with a fitted
//! title, an optional subtitle and a watermark.
//!
//! # Quick Start
//!
//! ```no_run
//! use backdrop::{
//!     AspectRatio, BackgroundStyle, Color, Composition, EnhanceRequest, GeminiEnhancer,
//!     SourceImage, Studio, TitleSegment, Typeface,
//! };
//!
//! #[tokio::main]
//! async fn main() -> backdrop::Result<()> {
//!     let studio = Studio::new(GeminiEnhancer::builder().build()?);
//!     let request = EnhanceRequest::new(SourceImage::from_path("mug.jpg")?)
//!         .with_style(BackgroundStyle::Solid { color: "#f4efe6".parse()? })
//!         .with_aspect_ratio(AspectRatio::Square);
//!
//!     let composition = Composition::new(AspectRatio::Square)
//!         .with_title_segment(TitleSegment::new("summer", Color::WHITE))
//!         .with_title_segment(TitleSegment::new("sale", "#ffcc00".parse()?));
//!     let typeface = Typeface::discover();
//!
//!     let (_, png) = studio
//!         .enhance_and_compose(&request, &composition, typeface.as_ref())
//!         .await?;
//!     std::fs::write(backdrop::output_file_name("mug.jpg"), png)?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `gemini` (default): the Gemini enhancer
//! - `cli`: the `backdrop` command-line tool

mod color;
pub mod compose;
pub mod config;
pub mod enhance;
mod error;
#[cfg(feature = "cli")]
#[doc(hidden)]
pub mod logging;
mod studio;
pub mod usage;

pub use color::Color;
pub use error::{BackdropError, Result};

pub use compose::{
    output_file_name, Composition, Corner, Subtitle, TitleSegment, Typeface, Watermark,
    WatermarkSpec,
};
pub use enhance::{
    AspectRatio, BackgroundEnhancer, BackgroundStyle, EnhanceRequest, EnhancedImage, ImageFormat,
    SourceImage,
};
pub use studio::{Enhancement, Studio};
pub use usage::{UsageState, UsageStore, UsageSummary};

#[cfg(feature = "gemini")]
pub use enhance::providers::{GeminiEnhancer, GeminiEnhancerBuilder, GeminiModel};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::compose::{Composition, Subtitle, TitleSegment, Typeface, Watermark};
    pub use crate::enhance::{BackgroundEnhancer, EnhanceRequest, SourceImage};
    pub use crate::error::{BackdropError, Result};
    pub use crate::studio::Studio;

    #[cfg(feature = "gemini")]
    pub use crate::enhance::providers::GeminiEnhancer;
}
