use serde::Deserialize;

use gridkit_platforms::PlatformError;

/// Evolution API credential schema: the server URL, its API key, and the
/// WhatsApp instance name.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolutionCredentials {
    pub server_url: String,
    pub api_key: String,
    pub instance_name: String,
}

impl EvolutionCredentials {
    pub fn parse(credentials: &serde_json::Value) -> Result<Self, PlatformError> {
        let parsed: Self = serde_json::from_value(credentials.clone())
            .map_err(|e| PlatformError::invalid_credentials(format!("whatsapp-evo: {e}")))?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), PlatformError> {
        let url = url::Url::parse(&self.server_url).map_err(|e| {
            PlatformError::invalid_credentials(format!("serverUrl is not a valid url: {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PlatformError::invalid_credentials(
                "serverUrl must be http(s)",
            ));
        }
        if self.api_key.trim().is_empty() {
            return Err(PlatformError::invalid_credentials("apiKey must not be empty"));
        }
        if self.instance_name.trim().is_empty() {
            return Err(PlatformError::invalid_credentials(
                "instanceName must not be empty",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn base(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_credentials_accepted() {
        let creds = EvolutionCredentials::parse(&serde_json::json!({
            "serverUrl": "https://evo.example.com/",
            "apiKey": "evo-key",
            "instanceName": "main"
        }))
        .unwrap();
        assert_eq!(creds.base(), "https://evo.example.com");
    }

    #[test]
    fn missing_or_bad_fields_rejected() {
        assert!(EvolutionCredentials::parse(&serde_json::json!({})).is_err());
        assert!(
            EvolutionCredentials::parse(&serde_json::json!({
                "serverUrl": "ftp://evo.example.com",
                "apiKey": "k",
                "instanceName": "main"
            }))
            .is_err()
        );
        assert!(
            EvolutionCredentials::parse(&serde_json::json!({
                "serverUrl": "https://evo.example.com",
                "apiKey": " ",
                "instanceName": "main"
            }))
            .is_err()
        );
    }
}
