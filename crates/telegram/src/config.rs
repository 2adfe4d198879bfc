use serde::Deserialize;

use gridkit_platforms::PlatformError;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram credential schema: a bot token, plus an optional API base
/// override for self-hosted Bot API servers.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramCredentials {
    pub bot_token: String,
    #[serde(default)]
    pub api_base_url: Option<String>,
}

impl TelegramCredentials {
    pub fn parse(credentials: &serde_json::Value) -> Result<Self, PlatformError> {
        let parsed: Self = serde_json::from_value(credentials.clone())
            .map_err(|e| PlatformError::invalid_credentials(format!("telegram: {e}")))?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Bot tokens look like `<numeric bot id>:<secret>`.
    pub fn validate(&self) -> Result<(), PlatformError> {
        let Some((id, secret)) = self.bot_token.split_once(':') else {
            return Err(PlatformError::invalid_credentials(
                "botToken must have the form <bot-id>:<secret>",
            ));
        };
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PlatformError::invalid_credentials(
                "botToken bot id must be numeric",
            ));
        }
        if secret.len() < 16 {
            return Err(PlatformError::invalid_credentials(
                "botToken secret is too short",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn api_base(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_API_BASE)
    }
}
