//! Persisted entity records and their insert/update forms.

use {
    chrono::{DateTime, Utc},
    serde::Serialize,
};

use gridkit_common::Environment;

// ── Projects ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub environment: Environment,
    pub owner_id: String,
    pub is_default: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProject {
    pub slug: String,
    pub name: String,
    pub environment: Environment,
    pub owner_id: String,
    pub is_default: bool,
}

// ── API keys ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyRecord {
    pub id: String,
    pub project_id: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub key_prefix: String,
    pub key_suffix: String,
    pub name: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKeyRecord {
    /// A key is valid iff it has not been revoked and has not expired.
    #[must_use]
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at.is_none_or(|exp| exp > now)
    }
}

#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub project_id: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub key_suffix: String,
    pub name: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

// ── Platform configs ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PlatformConfigRecord {
    pub id: String,
    pub project_id: String,
    pub platform: String,
    pub credentials_encrypted: String,
    pub is_active: bool,
    pub test_mode: bool,
    pub webhook_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPlatformConfig {
    pub project_id: String,
    pub platform: String,
    pub credentials_encrypted: String,
    pub is_active: bool,
    pub test_mode: bool,
    pub webhook_token: String,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct PlatformConfigUpdate {
    pub credentials_encrypted: Option<String>,
    pub is_active: Option<bool>,
    pub test_mode: Option<bool>,
}

// ── Message outcomes ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SentStatus {
    Pending,
    Sent,
    Failed,
}

impl SentStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "sent" => Self::Sent,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessageRecord {
    pub id: String,
    pub job_id: String,
    pub platform_config_id: String,
    pub platform: String,
    pub target_type: String,
    pub target_chat_id: String,
    pub target_user_id: Option<String>,
    pub status: SentStatus,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSentMessage {
    pub job_id: String,
    pub platform_config_id: String,
    pub platform: String,
    pub target_type: String,
    pub target_chat_id: String,
    pub target_user_id: Option<String>,
}

// ── Inbound events ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedMessageRecord {
    pub id: String,
    pub platform_config_id: String,
    pub provider_message_id: String,
    pub provider_chat_id: String,
    pub provider_user_id: String,
    pub text: Option<String>,
    pub raw: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReceivedMessage {
    pub platform_config_id: String,
    pub provider_message_id: String,
    pub provider_chat_id: String,
    pub provider_user_id: String,
    pub text: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedReactionRecord {
    pub id: String,
    pub platform_config_id: String,
    pub provider_message_id: String,
    pub provider_user_id: String,
    pub emoji: String,
    pub reaction_type: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReceivedReaction {
    pub platform_config_id: String,
    pub provider_message_id: String,
    pub provider_user_id: String,
    pub emoji: String,
    /// "added" or "removed".
    pub reaction_type: String,
}
