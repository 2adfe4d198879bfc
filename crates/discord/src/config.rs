use serde::Deserialize;

use gridkit_platforms::PlatformError;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordCredentials {
    pub bot_token: String,
    #[serde(default)]
    pub api_base_url: Option<String>,
}

impl DiscordCredentials {
    pub fn parse(credentials: &serde_json::Value) -> Result<Self, PlatformError> {
        let parsed: Self = serde_json::from_value(credentials.clone())
            .map_err(|e| PlatformError::invalid_credentials(format!("discord: {e}")))?;
        if parsed.bot_token.trim().is_empty() {
            return Err(PlatformError::invalid_credentials(
                "botToken must not be empty",
            ));
        }
        Ok(parsed)
    }

    #[must_use]
    pub fn api_base(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_API_BASE)
    }
}
