//! CRUD over platform configurations, with lifecycle events fired to the
//! owning provider on exactly the transitions that change runtime state.

use std::sync::Arc;

use {
    serde::{Deserialize, Serialize},
    tracing::{info, warn},
};

use {
    gridkit_common::Error,
    gridkit_store::{
        PlatformConfigRecord, PlatformConfigStore, PlatformConfigUpdate, ProjectRecord,
        records::NewPlatformConfig,
    },
    gridkit_vault::{CredentialVault, random_token},
};

use crate::{
    events::{PlatformEvent, PlatformEventKind},
    registry::PlatformRegistry,
};

/// Webhook tokens are 24 random bytes, base64url, unguessable and URL-safe.
const WEBHOOK_TOKEN_BYTES: usize = 24;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlatform {
    pub platform: String,
    pub credentials: serde_json::Value,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub test_mode: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlatform {
    #[serde(default)]
    pub credentials: Option<serde_json::Value>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub test_mode: Option<bool>,
}

/// API view of a platform config. Credentials are masked except in
/// [`PlatformLifecycleService::find_one`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformView {
    pub id: String,
    pub project_id: String,
    pub platform: String,
    pub credentials: serde_json::Value,
    pub is_active: bool,
    pub test_mode: bool,
    pub webhook_url: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

pub struct PlatformLifecycleService {
    store: Arc<dyn PlatformConfigStore>,
    vault: Arc<CredentialVault>,
    registry: Arc<PlatformRegistry>,
    api_base_url: String,
}

impl PlatformLifecycleService {
    #[must_use]
    pub fn new(
        store: Arc<dyn PlatformConfigStore>,
        vault: Arc<CredentialVault>,
        registry: Arc<PlatformRegistry>,
        api_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            vault,
            registry,
            api_base_url: api_base_url.into(),
        }
    }

    pub async fn create(
        &self,
        project: &ProjectRecord,
        input: CreatePlatform,
    ) -> Result<PlatformView, Error> {
        // Unknown provider names are allowed: operators may stage configs
        // before the provider ships. Known providers validate up front.
        if let Some(provider) = self.registry.provider(&input.platform) {
            provider.validate_credentials(&input.credentials)?;
        }

        let encrypted = self
            .vault
            .encrypt_json(&input.credentials)
            .map_err(|e| Error::internal("credential encryption", e))?;

        let record = self
            .store
            .insert_platform(NewPlatformConfig {
                project_id: project.id.clone(),
                platform: input.platform.to_ascii_lowercase(),
                credentials_encrypted: encrypted,
                is_active: input.is_active,
                test_mode: input.test_mode,
                webhook_token: random_token(WEBHOOK_TOKEN_BYTES),
            })
            .await?;

        info!(
            project = %project.slug,
            platform = %record.platform,
            platform_config_id = %record.id,
            "platform config created"
        );

        if record.is_active {
            self.fire_event(PlatformEventKind::Created, &record, input.credentials)
                .await;
        }

        Ok(self.masked_view(&record))
    }

    pub async fn find_all(&self, project: &ProjectRecord) -> Result<Vec<PlatformView>, Error> {
        let records = self.store.list_platforms(&project.id).await?;
        Ok(records.iter().map(|r| self.masked_view(r)).collect())
    }

    /// Single config with decrypted credentials; callers gate this behind
    /// the write scope.
    pub async fn find_one(
        &self,
        project: &ProjectRecord,
        id: &str,
    ) -> Result<PlatformView, Error> {
        let record = self.owned_config(project, id).await?;
        let credentials = self
            .vault
            .decrypt_json(&record.credentials_encrypted)
            .map_err(|e| Error::internal("credential decryption", e))?;
        Ok(self.view(&record, credentials))
    }

    pub async fn update(
        &self,
        project: &ProjectRecord,
        id: &str,
        input: UpdatePlatform,
    ) -> Result<PlatformView, Error> {
        let existing = self.owned_config(project, id).await?;
        let was_active = existing.is_active;

        let credentials_encrypted = match &input.credentials {
            Some(credentials) => {
                if let Some(provider) = self.registry.provider(&existing.platform) {
                    provider.validate_credentials(credentials)?;
                }
                Some(
                    self.vault
                        .encrypt_json(credentials)
                        .map_err(|e| Error::internal("credential encryption", e))?,
                )
            },
            None => None,
        };

        let updated = self
            .store
            .update_platform(id, PlatformConfigUpdate {
                credentials_encrypted,
                is_active: input.is_active,
                test_mode: input.test_mode,
            })
            .await?;

        match (was_active, updated.is_active) {
            (false, true) => {
                let credentials = self.decrypt_or_null(&updated);
                self.fire_event(PlatformEventKind::Activated, &updated, credentials)
                    .await;
            },
            (true, false) => {
                let credentials = self.decrypt_or_null(&updated);
                self.fire_event(PlatformEventKind::Deactivated, &updated, credentials)
                    .await;
                self.registry.remove_adapters_for_config(&updated.id).await;
            },
            _ => {},
        }

        Ok(self.masked_view(&updated))
    }

    /// Delete a config. The provider always receives a `deleted` event
    /// first, with decrypted credentials, so it can clean up remote state.
    pub async fn remove(&self, project: &ProjectRecord, id: &str) -> Result<(), Error> {
        let record = self.owned_config(project, id).await?;

        let credentials = self.decrypt_or_null(&record);
        self.fire_event(PlatformEventKind::Deleted, &record, credentials)
            .await;
        self.registry.remove_adapters_for_config(&record.id).await;
        self.store.delete_platform(&record.id).await?;

        info!(
            project = %project.slug,
            platform = %record.platform,
            platform_config_id = %record.id,
            "platform config deleted"
        );
        Ok(())
    }

    /// Provider-specific external webhook registration. Idempotent at the
    /// provider (re-registering the same URL is a no-op upstream).
    pub async fn register_webhook(
        &self,
        project: &ProjectRecord,
        id: &str,
    ) -> Result<(String, serde_json::Value), Error> {
        let record = self.owned_config(project, id).await?;
        if !record.is_active {
            return Err(Error::conflict("platform config is not active"));
        }

        let provider = self.registry.provider(&record.platform).ok_or_else(|| {
            Error::unsupported(format!(
                "no provider registered for platform {}",
                record.platform
            ))
        })?;

        let credentials = self
            .vault
            .decrypt_json(&record.credentials_encrypted)
            .map_err(|e| Error::internal("credential decryption", e))?;
        let webhook_url = self.webhook_url(&record);
        let info = provider.register_webhook(&credentials, &webhook_url).await?;

        info!(
            platform = %record.platform,
            platform_config_id = %record.id,
            webhook_url = %webhook_url,
            "external webhook registered"
        );
        Ok((webhook_url, info))
    }

    async fn owned_config(
        &self,
        project: &ProjectRecord,
        id: &str,
    ) -> Result<PlatformConfigRecord, Error> {
        let record = self.store.find_platform_by_id(id).await?;
        // Configs of other projects are indistinguishable from absent ones.
        match record {
            Some(record) if record.project_id == project.id => Ok(record),
            _ => Err(Error::not_found(format!("platform config {id} not found"))),
        }
    }

    async fn fire_event(
        &self,
        kind: PlatformEventKind,
        record: &PlatformConfigRecord,
        credentials: serde_json::Value,
    ) {
        // Unknown providers are skipped silently: the config persists so
        // operators can stage it before deploying the provider.
        let Some(provider) = self.registry.provider(&record.platform) else {
            return;
        };
        let event = PlatformEvent {
            kind,
            project_id: record.project_id.clone(),
            platform_config_id: record.id.clone(),
            platform: record.platform.clone(),
            credentials,
            test_mode: record.test_mode,
        };
        provider.on_platform_event(&event).await;
    }

    fn decrypt_or_null(&self, record: &PlatformConfigRecord) -> serde_json::Value {
        match self.vault.decrypt_json(&record.credentials_encrypted) {
            Ok(credentials) => credentials,
            Err(err) => {
                warn!(
                    platform_config_id = %record.id,
                    error = %err,
                    "credential decryption failed while firing lifecycle event"
                );
                serde_json::Value::Null
            },
        }
    }

    fn webhook_url(&self, record: &PlatformConfigRecord) -> String {
        format!(
            "{}/webhooks/{}/{}",
            self.api_base_url, record.platform, record.webhook_token
        )
    }

    fn masked_view(&self, record: &PlatformConfigRecord) -> PlatformView {
        let masked = match self.vault.decrypt_json(&record.credentials_encrypted) {
            Ok(credentials) => mask_credentials(&credentials),
            Err(_) => serde_json::Value::Null,
        };
        self.view(record, masked)
    }

    fn view(&self, record: &PlatformConfigRecord, credentials: serde_json::Value) -> PlatformView {
        PlatformView {
            id: record.id.clone(),
            project_id: record.project_id.clone(),
            platform: record.platform.clone(),
            credentials,
            is_active: record.is_active,
            test_mode: record.test_mode,
            webhook_url: self.webhook_url(record),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Mask every string leaf of a credential object, keeping just enough to
/// recognize the value.
#[must_use]
pub fn mask_credentials(credentials: &serde_json::Value) -> serde_json::Value {
    match credentials {
        serde_json::Value::String(s) => serde_json::Value::String(mask_string(s)),
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), mask_credentials(v)))
                .collect(),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(mask_credentials).collect())
        },
        other => other.clone(),
    }
}

fn mask_string(s: &str) -> String {
    if s.len() <= 8 {
        "****".to_string()
    } else {
        let tail: String = s.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
        format!("****{tail}")
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testing::MockProvider,
        gridkit_common::Environment,
        gridkit_store::{ProjectStore, SqliteStore, records::NewProject},
        std::sync::Arc,
    };

    struct Fixture {
        service: PlatformLifecycleService,
        provider: Arc<MockProvider>,
        project: ProjectRecord,
        store: Arc<SqliteStore>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let project = store
            .create_project(NewProject {
                slug: "acme".into(),
                name: "Acme".into(),
                environment: Environment::Development,
                owner_id: "owner_1".into(),
                is_default: false,
            })
            .await
            .unwrap();

        let provider = Arc::new(MockProvider::new("mock"));
        let registry = Arc::new(PlatformRegistry::new([
            Arc::clone(&provider) as Arc<dyn crate::PlatformProvider>
        ]));
        let vault = Arc::new(CredentialVault::ephemeral());
        let service = PlatformLifecycleService::new(
            Arc::clone(&store) as Arc<dyn PlatformConfigStore>,
            vault,
            registry,
            "https://api.example.com",
        );
        Fixture {
            service,
            provider,
            project,
            store,
        }
    }

    fn creds() -> serde_json::Value {
        serde_json::json!({"botToken": "123456:secret-token-value"})
    }

    #[tokio::test]
    async fn create_active_fires_created_once() {
        let fx = fixture().await;
        fx.service
            .create(&fx.project, CreatePlatform {
                platform: "mock".into(),
                credentials: creds(),
                is_active: true,
                test_mode: false,
            })
            .await
            .unwrap();

        let events = fx.provider.recorded_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, PlatformEventKind::Created);
    }

    #[tokio::test]
    async fn create_inactive_fires_nothing() {
        let fx = fixture().await;
        fx.service
            .create(&fx.project, CreatePlatform {
                platform: "mock".into(),
                credentials: creds(),
                is_active: false,
                test_mode: false,
            })
            .await
            .unwrap();
        assert!(fx.provider.recorded_events().is_empty());
    }

    #[tokio::test]
    async fn activation_flips_fire_matching_events() {
        let fx = fixture().await;
        let view = fx
            .service
            .create(&fx.project, CreatePlatform {
                platform: "mock".into(),
                credentials: creds(),
                is_active: false,
                test_mode: false,
            })
            .await
            .unwrap();

        fx.service
            .update(&fx.project, &view.id, UpdatePlatform {
                is_active: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        fx.service
            .update(&fx.project, &view.id, UpdatePlatform {
                is_active: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();
        // Unchanged flag: no event.
        fx.service
            .update(&fx.project, &view.id, UpdatePlatform {
                is_active: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();

        let kinds: Vec<PlatformEventKind> =
            fx.provider.recorded_events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![
            PlatformEventKind::Activated,
            PlatformEventKind::Deactivated
        ]);
    }

    #[tokio::test]
    async fn delete_fires_deleted_with_decrypted_credentials() {
        let fx = fixture().await;
        let view = fx
            .service
            .create(&fx.project, CreatePlatform {
                platform: "mock".into(),
                credentials: creds(),
                is_active: false,
                test_mode: false,
            })
            .await
            .unwrap();

        fx.service.remove(&fx.project, &view.id).await.unwrap();

        let events = fx.provider.recorded_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, PlatformEventKind::Deleted);
        assert_eq!(events[0].credentials, creds());
    }

    #[tokio::test]
    async fn credential_rotation_reencrypts_without_events() {
        let fx = fixture().await;
        let view = fx
            .service
            .create(&fx.project, CreatePlatform {
                platform: "mock".into(),
                credentials: creds(),
                is_active: true,
                test_mode: false,
            })
            .await
            .unwrap();
        let before = fx
            .store
            .find_platform_by_id(&view.id)
            .await
            .unwrap()
            .unwrap();
        fx.provider.clear_events();

        let rotated = serde_json::json!({"botToken": "999999:rotated-token"});
        fx.service
            .update(&fx.project, &view.id, UpdatePlatform {
                credentials: Some(rotated.clone()),
                ..Default::default()
            })
            .await
            .unwrap();

        let after = fx
            .store
            .find_platform_by_id(&view.id)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(after.credentials_encrypted, before.credentials_encrypted);
        assert!(fx.provider.recorded_events().is_empty());

        let decrypted = fx.service.find_one(&fx.project, &view.id).await.unwrap();
        assert_eq!(decrypted.credentials, rotated);
    }

    #[tokio::test]
    async fn listing_masks_credentials() {
        let fx = fixture().await;
        fx.service
            .create(&fx.project, CreatePlatform {
                platform: "mock".into(),
                credentials: creds(),
                is_active: true,
                test_mode: false,
            })
            .await
            .unwrap();

        let views = fx.service.find_all(&fx.project).await.unwrap();
        let token = views[0].credentials["botToken"].as_str().unwrap();
        assert!(token.starts_with("****"));
        assert!(!token.contains("secret-token"));
    }

    #[tokio::test]
    async fn foreign_project_sees_not_found() {
        let fx = fixture().await;
        let view = fx
            .service
            .create(&fx.project, CreatePlatform {
                platform: "mock".into(),
                credentials: creds(),
                is_active: true,
                test_mode: false,
            })
            .await
            .unwrap();

        let other = fx
            .store
            .create_project(NewProject {
                slug: "other".into(),
                name: "Other".into(),
                environment: Environment::Development,
                owner_id: "owner_2".into(),
                is_default: false,
            })
            .await
            .unwrap();

        let err = fx.service.find_one(&other, &view.id).await.unwrap_err();
        assert_eq!(err.code(), "NotFound");
    }

    #[tokio::test]
    async fn unknown_provider_config_persists_without_events() {
        let fx = fixture().await;
        let view = fx
            .service
            .create(&fx.project, CreatePlatform {
                platform: "matrix".into(),
                credentials: serde_json::json!({"accessToken": "syt_aaaa_bbbb_cccc"}),
                is_active: true,
                test_mode: false,
            })
            .await
            .unwrap();
        assert_eq!(view.platform, "matrix");
        assert!(fx.provider.recorded_events().is_empty());
    }

    #[test]
    fn masking_keeps_shape() {
        let masked = mask_credentials(&serde_json::json!({
            "token": "0123456789abcdef",
            "short": "abc",
            "nested": {"apiKey": "zzzzyyyyxxxx9876"},
            "flag": true,
        }));
        assert_eq!(masked["token"], "****cdef");
        assert_eq!(masked["short"], "****");
        assert_eq!(masked["nested"]["apiKey"], "****9876");
        assert_eq!(masked["flag"], true);
    }
}
