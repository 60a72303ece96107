// ============================================================================
// Email Configuration
// ============================================================================

/// Outbound provider selection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    /// Accepts every send without contacting anything
    Noop,
    /// AWS SES v2 `SendEmail` with a raw MIME payload
    Ses,
}

impl ProviderKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "noop" => Some(ProviderKind::Noop),
            "ses" => Some(ProviderKind::Ses),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    /// Address used in the `From:` header and as the SES sender
    pub source_email: String,
    pub provider: ProviderKind,
    /// AWS region for SES; required when `provider` is `Ses`
    pub aws_region: Option<String>,
}

impl EmailConfig {
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        let source_email = std::env::var("EMAIL_SOURCE")
            .map_err(|_| anyhow::anyhow!("EMAIL_SOURCE environment variable is required"))?;

        let provider = match std::env::var("EMAIL_PROVIDER") {
            Ok(value) => ProviderKind::parse(&value)
                .ok_or_else(|| anyhow::anyhow!("Unsupported EMAIL_PROVIDER '{}'", value))?,
            Err(_) => ProviderKind::Noop,
        };

        let aws_region = std::env::var("AWS_REGION")
            .ok()
            .filter(|region| !region.trim().is_empty());
        if provider == ProviderKind::Ses && aws_region.is_none() {
            anyhow::bail!(
                "AWS_REGION environment variable is required when EMAIL_PROVIDER=ses"
            );
        }

        Ok(Self {
            source_email,
            provider,
            aws_region,
        })
    }
}
