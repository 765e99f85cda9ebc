//! Background enhancement through a remote image model.

pub mod prompt;
mod provider;
pub mod providers;
mod types;

pub use prompt::{build_instruction, SYSTEM_INSTRUCTION};
pub use provider::BackgroundEnhancer;
pub use types::{
    AspectRatio, BackgroundStyle, EnhanceMetadata, EnhanceRequest, EnhancedImage, ImageFormat,
    SourceImage,
};
