//! Shared gateway state, constructor-wired at process start.

use std::sync::Arc;

use {
    gridkit_attachments::AttachmentFetcher,
    gridkit_dispatch::TenantEventSink,
    gridkit_platforms::{PlatformLifecycleService, PlatformRegistry},
    gridkit_queue::QueueBackend,
    gridkit_store::{ApiKeyStore, MessageStore, PlatformConfigStore, ProjectStore},
    gridkit_vault::CredentialVault,
};

use crate::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub projects: Arc<dyn ProjectStore>,
    pub api_keys: Arc<dyn ApiKeyStore>,
    pub platform_configs: Arc<dyn PlatformConfigStore>,
    pub messages: Arc<dyn MessageStore>,
    pub registry: Arc<PlatformRegistry>,
    pub lifecycle: Arc<PlatformLifecycleService>,
    pub queue: Arc<dyn QueueBackend>,
    pub vault: Arc<CredentialVault>,
    pub fetcher: Arc<AttachmentFetcher>,
    pub events: Arc<dyn TenantEventSink>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Load a project by slug, 404-ing on absence.
    pub async fn project_by_slug(
        &self,
        slug: &str,
    ) -> Result<gridkit_store::ProjectRecord, crate::error::ApiError> {
        self.projects
            .find_project_by_slug(slug)
            .await?
            .ok_or_else(|| {
                crate::error::ApiError::new(gridkit_common::Error::not_found(format!(
                    "project {slug} not found"
                )))
            })
    }
}
