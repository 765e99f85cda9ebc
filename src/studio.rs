//! One enhancement at a time, with usage bookkeeping.

use crate::compose::{Composition, Typeface};
use crate::enhance::{BackgroundEnhancer, EnhanceRequest, EnhancedImage};
use crate::error::{BackdropError, Result};
use crate::usage::{local_today, UsageStore, UsageSummary};
use tokio::sync::Mutex;

/// Result of a successful enhancement.
#[derive(Debug, Clone)]
pub struct Enhancement {
    /// Image returned by the model, before compositing.
    pub image: EnhancedImage,
    /// Counters after this enhancement, when a store is attached.
    pub usage: Option<UsageSummary>,
}

/// Runs enhancements against a remote model.
///
/// A second request submitted while one is in flight is rejected with
/// [`BackdropError::Busy`] instead of being queued. In-flight requests are
/// never cancelled.
pub struct Studio<E> {
    enhancer: E,
    usage: Option<UsageStore>,
    in_flight: Mutex<()>,
}

impl<E: BackgroundEnhancer> Studio<E> {
    /// Wraps `enhancer`; no usage is recorded until a store is attached.
    pub fn new(enhancer: E) -> Self {
        Self {
            enhancer,
            usage: None,
            in_flight: Mutex::new(()),
        }
    }

    /// Counts successful enhancements in `store`.
    pub fn with_usage_store(mut self, store: UsageStore) -> Self {
        self.usage = Some(store);
        self
    }

    /// The wrapped enhancer.
    pub fn enhancer(&self) -> &E {
        &self.enhancer
    }

    /// True while an enhancement is outstanding.
    pub fn is_busy(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Sends `request` to the model and records usage on success.
    pub async fn enhance(&self, request: &EnhanceRequest) -> Result<Enhancement> {
        let _guard = self.in_flight.try_lock().map_err(|_| BackdropError::Busy)?;

        tracing::info!(
            enhancer = self.enhancer.name(),
            style = request.style.name(),
            aspect_ratio = %request.aspect_ratio,
            "enhancing product photo"
        );
        let image = match self.enhancer.enhance(request).await {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(error = %e, "enhancement failed");
                return Err(e);
            }
        };

        let usage = match &self.usage {
            Some(store) => record_usage(store.clone()).await,
            None => None,
        };

        Ok(Enhancement { image, usage })
    }

    /// Enhances, then runs `composition` on the result; returns PNG bytes.
    pub async fn enhance_and_compose(
        &self,
        request: &EnhanceRequest,
        composition: &Composition,
        typeface: Option<&Typeface>,
    ) -> Result<(Enhancement, Vec<u8>)> {
        let enhancement = self.enhance(request).await?;
        let png = composition.apply(&enhancement.image.data, typeface)?;
        Ok((enhancement, png))
    }
}

/// Counts one enhancement on the blocking pool; failures are logged and dropped.
async fn record_usage(store: UsageStore) -> Option<UsageSummary> {
    match tokio::task::spawn_blocking(move || store.record(local_today())).await {
        Ok(Ok(summary)) => Some(summary),
        Ok(Err(e)) => {
            tracing::warn!("failed to save usage counters: {e}");
            None
        }
        Err(e) => {
            tracing::warn!("usage recording task failed: {e}");
            None
        }
    }
}
