//! Remote enhancers.

#[cfg(feature = "gemini")]
mod gemini;

#[cfg(feature = "gemini")]
pub use gemini::{GeminiEnhancer, GeminiEnhancerBuilder, GeminiModel};
