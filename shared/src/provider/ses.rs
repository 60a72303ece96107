use super::EmailProvider;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sesv2::Client;
use aws_sdk_sesv2::error::DisplayErrorContext;
use aws_sdk_sesv2::primitives::Blob;
use aws_sdk_sesv2::types::{Destination, EmailContent, RawMessage};
use courier_error::{AppError, AppResult};

/// Sends prepared MIME payloads through AWS SES v2
pub struct SesProvider {
    client: Client,
    source: String,
}

impl SesProvider {
    pub fn new(client: Client, source: impl Into<String>) -> Self {
        Self {
            client,
            source: source.into(),
        }
    }

    /// Build a client from the default credential chain, pinned to `region`
    /// when one is given.
    pub async fn from_env(region: Option<String>, source: impl Into<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let sdk_config = loader.load().await;
        Self::new(Client::new(&sdk_config), source)
    }
}

#[async_trait]
impl EmailProvider for SesProvider {
    async fn send_raw(&self, recipient: &str, raw: &str) -> AppResult<()> {
        if recipient.is_empty() {
            return Err(AppError::provider("recipient is required"));
        }
        if raw.is_empty() {
            return Err(AppError::provider("raw content is required"));
        }

        let message = RawMessage::builder()
            .data(Blob::new(raw.as_bytes()))
            .build()
            .map_err(|e| AppError::provider(format!("build raw message: {}", e)))?;

        let output = self
            .client
            .send_email()
            .from_email_address(&self.source)
            .destination(Destination::builder().to_addresses(recipient).build())
            .content(EmailContent::builder().raw(message).build())
            .send()
            .await
            .map_err(|e| {
                AppError::provider(format!("ses send raw email: {}", DisplayErrorContext(&e)))
            })?;

        tracing::debug!(
            recipient = %recipient,
            message_id = output.message_id().unwrap_or_default(),
            "SES accepted email"
        );
        Ok(())
    }
}
