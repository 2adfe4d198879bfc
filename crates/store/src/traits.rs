//! Repository contracts. The relational layer is a collaborator behind
//! these traits; everything above them is storage-agnostic.

use {async_trait::async_trait, chrono::{DateTime, Utc}};

use crate::{
    error::Result,
    records::{
        ApiKeyRecord, NewApiKey, NewPlatformConfig, NewProject, NewReceivedMessage,
        NewReceivedReaction, NewSentMessage, PlatformConfigRecord, PlatformConfigUpdate,
        ProjectRecord, ReceivedMessageRecord, ReceivedReactionRecord, SentMessageRecord,
        SentStatus,
    },
};

#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Insert a project. Fails with `Conflict` on slug collision or on a
    /// second default project for the same owner.
    async fn create_project(&self, project: NewProject) -> Result<ProjectRecord>;

    async fn find_project_by_slug(&self, slug: &str) -> Result<Option<ProjectRecord>>;

    async fn find_project_by_id(&self, id: &str) -> Result<Option<ProjectRecord>>;

    async fn list_projects(&self) -> Result<Vec<ProjectRecord>>;

    /// Delete a project and its dependents atomically. Refused with
    /// `Conflict` while any active (non-revoked) API key references it.
    async fn delete_project(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// Insert a key. Fails with `Conflict` on a colliding prefix.
    async fn insert_api_key(&self, key: NewApiKey) -> Result<ApiKeyRecord>;

    async fn find_api_key_by_prefix(&self, prefix: &str) -> Result<Option<ApiKeyRecord>>;

    async fn list_api_keys(&self, project_id: &str) -> Result<Vec<ApiKeyRecord>>;

    /// Revoke immediately; subsequent lookups see `revoked_at` set.
    async fn revoke_api_key(&self, id: &str) -> Result<()>;

    /// Best-effort usage stamp; callers fire-and-forget.
    async fn touch_api_key(&self, id: &str, at: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
pub trait PlatformConfigStore: Send + Sync {
    async fn insert_platform(&self, config: NewPlatformConfig) -> Result<PlatformConfigRecord>;

    async fn find_platform_by_id(&self, id: &str) -> Result<Option<PlatformConfigRecord>>;

    async fn find_platform_by_webhook_token(
        &self,
        token: &str,
    ) -> Result<Option<PlatformConfigRecord>>;

    async fn list_platforms(&self, project_id: &str) -> Result<Vec<PlatformConfigRecord>>;

    async fn update_platform(
        &self,
        id: &str,
        update: PlatformConfigUpdate,
    ) -> Result<PlatformConfigRecord>;

    async fn delete_platform(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a pending per-target row. Idempotent on
    /// `(job_id, platform_config_id, target_chat_id)`: re-inserting
    /// returns the existing row, so worker retries never double-record.
    async fn insert_sent(&self, message: NewSentMessage) -> Result<SentMessageRecord>;

    async fn mark_sent(&self, id: &str, provider_message_id: &str) -> Result<()>;

    async fn mark_failed(&self, id: &str, error_message: &str) -> Result<()>;

    async fn sent_for_job(&self, job_id: &str) -> Result<Vec<SentMessageRecord>>;

    async fn find_sent_for_target(
        &self,
        job_id: &str,
        platform_config_id: &str,
        target_chat_id: &str,
    ) -> Result<Option<SentMessageRecord>>;

    /// Insert an inbound message; returns false when the unique key
    /// already exists (duplicate delivery, silently ignored).
    async fn insert_received_message(&self, message: NewReceivedMessage) -> Result<bool>;

    /// Insert an inbound reaction; returns false on duplicate.
    async fn insert_received_reaction(&self, reaction: NewReceivedReaction) -> Result<bool>;

    async fn list_received_messages(
        &self,
        platform_config_id: &str,
    ) -> Result<Vec<ReceivedMessageRecord>>;

    async fn list_received_reactions(
        &self,
        platform_config_id: &str,
    ) -> Result<Vec<ReceivedReactionRecord>>;

    async fn count_sent_with_status(&self, job_id: &str, status: SentStatus) -> Result<usize>;
}
