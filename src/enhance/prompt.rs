//! Instruction text sent alongside the product photo.

use crate::enhance::types::{AspectRatio, BackgroundStyle};

/// Fixed system instruction: the model must answer with an image only.
pub const SYSTEM_INSTRUCTION: &str = "You are a professional product photo editor. \
You only ever respond with an edited image. Never reply with conversational text, \
questions, explanations or descriptions. Keep the product itself unchanged: same shape, \
colors, labels, logos and proportions.";

/// Builds the natural-language instruction for a background treatment and ratio.
pub fn build_instruction(style: &BackgroundStyle, aspect_ratio: AspectRatio) -> String {
    let background = match style {
        BackgroundStyle::Default => "Replace the background with a clean, professional studio \
             gradient that complements the product, with soft, even lighting and a subtle \
             natural shadow beneath the product."
            .to_string(),
        BackgroundStyle::Solid { color } => format!(
            "Replace the background with a seamless solid {color} backdrop. Light the product \
             evenly and add a subtle natural shadow so it sits on the backdrop."
        ),
        BackgroundStyle::Gradient { from, to } => format!(
            "Replace the background with a smooth gradient from {from} to {to}. Light the \
             product evenly and add a subtle natural shadow beneath it."
        ),
        BackgroundStyle::Blur => "Keep the existing background but apply a strong, \
             photographic depth-of-field blur to it so the product stands out in sharp focus. \
             Improve the lighting on the product."
            .to_string(),
        BackgroundStyle::Custom { .. } => "The first image is the product. The second image is \
             the new background. Cut the product out of the first image and place it naturally \
             into the second image, matching perspective, lighting and shadows."
            .to_string(),
    };

    format!(
        "{background} Enhance the product's sharpness, color and contrast for an \
         e-commerce listing. Compose the final image in {} aspect ratio with the product \
         centered and fully visible.",
        aspect_ratio.describe()
    )
}
