//! Outbound email providers

pub mod noop;
pub mod ses;

pub use noop::NoopProvider;
pub use ses::SesProvider;

use async_trait::async_trait;
use courier_config::{EmailConfig, ProviderKind};
use courier_error::AppResult;
use std::sync::Arc;

/// Delivers a prepared raw payload to a recipient
#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_raw(&self, recipient: &str, raw: &str) -> AppResult<()>;
}

/// Provider selected by configuration
pub async fn from_config(config: &EmailConfig) -> Arc<dyn EmailProvider> {
    match config.provider {
        ProviderKind::Noop => Arc::new(NoopProvider),
        ProviderKind::Ses => Arc::new(
            SesProvider::from_env(config.aws_region.clone(), config.source_email.clone()).await,
        ),
    }
}
