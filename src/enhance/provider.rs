//! Background enhancer trait.

use crate::enhance::types::{EnhanceRequest, EnhancedImage};
use crate::error::Result;
use async_trait::async_trait;

/// A remote model that re-backgrounds product photos.
#[async_trait]
pub trait BackgroundEnhancer: Send + Sync {
    /// Sends the photo and instruction, returning the generated image.
    ///
    /// No retry is performed; every failure is returned to the caller.
    async fn enhance(&self, request: &EnhanceRequest) -> Result<EnhancedImage>;

    /// Returns the name of this enhancer for display.
    fn name(&self) -> &str;

    /// Checks if the backing service is reachable and authenticated.
    async fn health_check(&self) -> Result<()>;
}
