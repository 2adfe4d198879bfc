//! SQLite-backed implementation of the repository contracts.

use std::{str::FromStr, time::Duration};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    sqlx::{
        Row,
        sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    },
    uuid::Uuid,
};

use crate::{
    error::{Result, StoreError},
    records::*,
    traits::{ApiKeyStore, MessageStore, PlatformConfigStore, ProjectStore},
};

use gridkit_common::Environment;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Repository implementation over a single SQLite pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

fn unique_conflict(err: sqlx::Error, message: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(message.to_string())
        },
        _ => StoreError::Database(err),
    }
}

impl SqliteStore {
    /// Open a pool at the given URL and create the schema.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let connect = SqliteConnectOptions::from_str(database_url)
            .map_err(StoreError::Database)?
            .create_if_missing(true);

        let mut options = SqlitePoolOptions::new().acquire_timeout(ACQUIRE_TIMEOUT);
        // Every pooled connection to :memory: would get its own database.
        if database_url.contains(":memory:") {
            options = options.max_connections(1);
        }

        let pool = options.connect_with(connect).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Fresh in-memory store, one per caller. Test construction path.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS projects (
                id          TEXT PRIMARY KEY,
                slug        TEXT NOT NULL UNIQUE,
                name        TEXT NOT NULL,
                environment TEXT NOT NULL,
                owner_id    TEXT NOT NULL,
                is_default  INTEGER NOT NULL DEFAULT 0,
                is_active   INTEGER NOT NULL DEFAULT 1,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_projects_owner_default
                 ON projects(owner_id) WHERE is_default = 1",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS api_keys (
                id           TEXT PRIMARY KEY,
                project_id   TEXT NOT NULL REFERENCES projects(id),
                key_hash     TEXT NOT NULL,
                key_prefix   TEXT NOT NULL UNIQUE,
                key_suffix   TEXT NOT NULL,
                name         TEXT NOT NULL,
                expires_at   TEXT,
                revoked_at   TEXT,
                last_used_at TEXT,
                created_at   TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS api_key_scopes (
                api_key_id TEXT NOT NULL REFERENCES api_keys(id) ON DELETE CASCADE,
                scope      TEXT NOT NULL,
                PRIMARY KEY (api_key_id, scope)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS project_platforms (
                id                    TEXT PRIMARY KEY,
                project_id            TEXT NOT NULL REFERENCES projects(id),
                platform              TEXT NOT NULL,
                credentials_encrypted TEXT NOT NULL,
                is_active             INTEGER NOT NULL DEFAULT 1,
                test_mode             INTEGER NOT NULL DEFAULT 0,
                webhook_token         TEXT NOT NULL UNIQUE,
                created_at            TEXT NOT NULL,
                updated_at            TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sent_messages (
                id                  TEXT PRIMARY KEY,
                job_id              TEXT NOT NULL,
                platform_config_id  TEXT NOT NULL,
                platform            TEXT NOT NULL,
                target_type         TEXT NOT NULL,
                target_chat_id      TEXT NOT NULL,
                target_user_id      TEXT,
                status              TEXT NOT NULL DEFAULT 'pending',
                provider_message_id TEXT,
                error_message       TEXT,
                sent_at             TEXT,
                created_at          TEXT NOT NULL,
                UNIQUE (job_id, platform_config_id, target_chat_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS received_messages (
                id                  TEXT PRIMARY KEY,
                platform_config_id  TEXT NOT NULL,
                provider_message_id TEXT NOT NULL,
                provider_chat_id    TEXT NOT NULL,
                provider_user_id    TEXT NOT NULL,
                text                TEXT,
                raw                 TEXT NOT NULL,
                received_at         TEXT NOT NULL,
                UNIQUE (platform_config_id, provider_message_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS received_reactions (
                id                  TEXT PRIMARY KEY,
                platform_config_id  TEXT NOT NULL,
                provider_message_id TEXT NOT NULL,
                provider_user_id    TEXT NOT NULL,
                emoji               TEXT NOT NULL,
                reaction_type       TEXT NOT NULL,
                received_at         TEXT NOT NULL,
                UNIQUE (platform_config_id, provider_message_id, provider_user_id, emoji, reaction_type)
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_scopes(&self, api_key_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT scope FROM api_key_scopes WHERE api_key_id = ? ORDER BY scope")
                .bind(api_key_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }
}

fn project_from_row(row: &sqlx::sqlite::SqliteRow) -> ProjectRecord {
    ProjectRecord {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        environment: Environment::parse_or_development(row.get::<String, _>("environment").as_str()),
        owner_id: row.get("owner_id"),
        is_default: row.get("is_default"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn platform_from_row(row: &sqlx::sqlite::SqliteRow) -> PlatformConfigRecord {
    PlatformConfigRecord {
        id: row.get("id"),
        project_id: row.get("project_id"),
        platform: row.get("platform"),
        credentials_encrypted: row.get("credentials_encrypted"),
        is_active: row.get("is_active"),
        test_mode: row.get("test_mode"),
        webhook_token: row.get("webhook_token"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn api_key_from_row(row: &sqlx::sqlite::SqliteRow) -> ApiKeyRecord {
    ApiKeyRecord {
        id: row.get("id"),
        project_id: row.get("project_id"),
        key_hash: row.get("key_hash"),
        key_prefix: row.get("key_prefix"),
        key_suffix: row.get("key_suffix"),
        name: row.get("name"),
        scopes: Vec::new(),
        expires_at: row.get("expires_at"),
        revoked_at: row.get("revoked_at"),
        last_used_at: row.get("last_used_at"),
        created_at: row.get("created_at"),
    }
}

fn sent_from_row(row: &sqlx::sqlite::SqliteRow) -> SentMessageRecord {
    SentMessageRecord {
        id: row.get("id"),
        job_id: row.get("job_id"),
        platform_config_id: row.get("platform_config_id"),
        platform: row.get("platform"),
        target_type: row.get("target_type"),
        target_chat_id: row.get("target_chat_id"),
        target_user_id: row.get("target_user_id"),
        status: SentStatus::parse(row.get::<String, _>("status").as_str()),
        provider_message_id: row.get("provider_message_id"),
        error_message: row.get("error_message"),
        sent_at: row.get("sent_at"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl ProjectStore for SqliteStore {
    async fn create_project(&self, project: NewProject) -> Result<ProjectRecord> {
        let now = Utc::now();
        let id = new_id("proj");
        sqlx::query(
            "INSERT INTO projects (id, slug, name, environment, owner_id, is_default, is_active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(&id)
        .bind(&project.slug)
        .bind(&project.name)
        .bind(project.environment.as_str())
        .bind(&project.owner_id)
        .bind(project.is_default)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_conflict(e, "project slug already exists (or owner already has a default project)"))?;

        self.find_project_by_id(&id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("project {id} vanished after insert")))
    }

    async fn find_project_by_slug(&self, slug: &str) -> Result<Option<ProjectRecord>> {
        let row = sqlx::query("SELECT * FROM projects WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(project_from_row))
    }

    async fn find_project_by_id(&self, id: &str) -> Result<Option<ProjectRecord>> {
        let row = sqlx::query("SELECT * FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(project_from_row))
    }

    async fn list_projects(&self) -> Result<Vec<ProjectRecord>> {
        let rows = sqlx::query("SELECT * FROM projects ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(project_from_row).collect())
    }

    async fn delete_project(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let (active_keys,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM api_keys WHERE project_id = ? AND revoked_at IS NULL",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if active_keys > 0 {
            return Err(StoreError::Conflict(format!(
                "project has {active_keys} active API key(s); revoke them first"
            )));
        }

        sqlx::query(
            "DELETE FROM api_key_scopes WHERE api_key_id IN
                 (SELECT id FROM api_keys WHERE project_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM api_keys WHERE project_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM project_platforms WHERE project_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("project {id} not found")));
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ApiKeyStore for SqliteStore {
    async fn insert_api_key(&self, key: NewApiKey) -> Result<ApiKeyRecord> {
        let now = Utc::now();
        let id = new_id("key");

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO api_keys (id, project_id, key_hash, key_prefix, key_suffix, name, expires_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&key.project_id)
        .bind(&key.key_hash)
        .bind(&key.key_prefix)
        .bind(&key.key_suffix)
        .bind(&key.name)
        .bind(key.expires_at)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_conflict(e, "API key prefix collision, retry generation"))?;

        for scope in &key.scopes {
            sqlx::query("INSERT OR IGNORE INTO api_key_scopes (api_key_id, scope) VALUES (?, ?)")
                .bind(&id)
                .bind(scope)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        let mut record = self
            .find_key_row(&id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("api key {id} vanished after insert")))?;
        record.scopes = self.load_scopes(&id).await?;
        Ok(record)
    }

    async fn find_api_key_by_prefix(&self, prefix: &str) -> Result<Option<ApiKeyRecord>> {
        let row = sqlx::query("SELECT * FROM api_keys WHERE key_prefix = ?")
            .bind(prefix)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let mut record = api_key_from_row(&row);
        record.scopes = self.load_scopes(&record.id).await?;
        Ok(Some(record))
    }

    async fn list_api_keys(&self, project_id: &str) -> Result<Vec<ApiKeyRecord>> {
        let rows = sqlx::query("SELECT * FROM api_keys WHERE project_id = ? ORDER BY created_at")
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = api_key_from_row(row);
            record.scopes = self.load_scopes(&record.id).await?;
            records.push(record);
        }
        Ok(records)
    }

    async fn revoke_api_key(&self, id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE api_keys SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("api key {id} not found or already revoked")));
        }
        Ok(())
    }

    async fn touch_api_key(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

impl SqliteStore {
    async fn find_key_row(&self, id: &str) -> Result<Option<ApiKeyRecord>> {
        let row = sqlx::query("SELECT * FROM api_keys WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(api_key_from_row))
    }
}

#[async_trait]
impl PlatformConfigStore for SqliteStore {
    async fn insert_platform(&self, config: NewPlatformConfig) -> Result<PlatformConfigRecord> {
        let now = Utc::now();
        let id = new_id("pc");
        sqlx::query(
            "INSERT INTO project_platforms (id, project_id, platform, credentials_encrypted, is_active, test_mode, webhook_token, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&config.project_id)
        .bind(&config.platform)
        .bind(&config.credentials_encrypted)
        .bind(config.is_active)
        .bind(config.test_mode)
        .bind(&config.webhook_token)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_conflict(e, "webhook token collision, retry generation"))?;

        self.find_platform_by_id(&id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("platform {id} vanished after insert")))
    }

    async fn find_platform_by_id(&self, id: &str) -> Result<Option<PlatformConfigRecord>> {
        let row = sqlx::query("SELECT * FROM project_platforms WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(platform_from_row))
    }

    async fn find_platform_by_webhook_token(
        &self,
        token: &str,
    ) -> Result<Option<PlatformConfigRecord>> {
        let row = sqlx::query("SELECT * FROM project_platforms WHERE webhook_token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(platform_from_row))
    }

    async fn list_platforms(&self, project_id: &str) -> Result<Vec<PlatformConfigRecord>> {
        let rows =
            sqlx::query("SELECT * FROM project_platforms WHERE project_id = ? ORDER BY created_at")
                .bind(project_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.iter().map(platform_from_row).collect())
    }

    async fn update_platform(
        &self,
        id: &str,
        update: PlatformConfigUpdate,
    ) -> Result<PlatformConfigRecord> {
        let existing = self
            .find_platform_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("platform {id} not found")))?;

        sqlx::query(
            "UPDATE project_platforms
                 SET credentials_encrypted = ?, is_active = ?, test_mode = ?, updated_at = ?
                 WHERE id = ?",
        )
        .bind(update.credentials_encrypted.as_ref().unwrap_or(&existing.credentials_encrypted))
        .bind(update.is_active.unwrap_or(existing.is_active))
        .bind(update.test_mode.unwrap_or(existing.test_mode))
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.find_platform_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("platform {id} vanished after update")))
    }

    async fn delete_platform(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM project_platforms WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("platform {id} not found")));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn insert_sent(&self, message: NewSentMessage) -> Result<SentMessageRecord> {
        let now = Utc::now();
        let id = new_id("sm");
        sqlx::query(
            "INSERT OR IGNORE INTO sent_messages
                 (id, job_id, platform_config_id, platform, target_type, target_chat_id, target_user_id, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?)",
        )
        .bind(&id)
        .bind(&message.job_id)
        .bind(&message.platform_config_id)
        .bind(&message.platform)
        .bind(&message.target_type)
        .bind(&message.target_chat_id)
        .bind(&message.target_user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_sent_for_target(
            &message.job_id,
            &message.platform_config_id,
            &message.target_chat_id,
        )
        .await?
        .ok_or_else(|| StoreError::NotFound("sent message vanished after insert".into()))
    }

    async fn mark_sent(&self, id: &str, provider_message_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE sent_messages SET status = 'sent', provider_message_id = ?, error_message = NULL, sent_at = ?
                 WHERE id = ?",
        )
        .bind(provider_message_id)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: &str, error_message: &str) -> Result<()> {
        sqlx::query("UPDATE sent_messages SET status = 'failed', error_message = ? WHERE id = ?")
            .bind(error_message)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn sent_for_job(&self, job_id: &str) -> Result<Vec<SentMessageRecord>> {
        let rows = sqlx::query("SELECT * FROM sent_messages WHERE job_id = ? ORDER BY created_at")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(sent_from_row).collect())
    }

    async fn find_sent_for_target(
        &self,
        job_id: &str,
        platform_config_id: &str,
        target_chat_id: &str,
    ) -> Result<Option<SentMessageRecord>> {
        let row = sqlx::query(
            "SELECT * FROM sent_messages
                 WHERE job_id = ? AND platform_config_id = ? AND target_chat_id = ?",
        )
        .bind(job_id)
        .bind(platform_config_id)
        .bind(target_chat_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(sent_from_row))
    }

    async fn insert_received_message(&self, message: NewReceivedMessage) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO received_messages
                 (id, platform_config_id, provider_message_id, provider_chat_id, provider_user_id, text, raw, received_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new_id("rm"))
        .bind(&message.platform_config_id)
        .bind(&message.provider_message_id)
        .bind(&message.provider_chat_id)
        .bind(&message.provider_user_id)
        .bind(&message.text)
        .bind(serde_json::to_string(&message.raw)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_received_reaction(&self, reaction: NewReceivedReaction) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO received_reactions
                 (id, platform_config_id, provider_message_id, provider_user_id, emoji, reaction_type, received_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new_id("rr"))
        .bind(&reaction.platform_config_id)
        .bind(&reaction.provider_message_id)
        .bind(&reaction.provider_user_id)
        .bind(&reaction.emoji)
        .bind(&reaction.reaction_type)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_received_messages(
        &self,
        platform_config_id: &str,
    ) -> Result<Vec<ReceivedMessageRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM received_messages WHERE platform_config_id = ? ORDER BY received_at",
        )
        .bind(platform_config_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(ReceivedMessageRecord {
                    id: row.get("id"),
                    platform_config_id: row.get("platform_config_id"),
                    provider_message_id: row.get("provider_message_id"),
                    provider_chat_id: row.get("provider_chat_id"),
                    provider_user_id: row.get("provider_user_id"),
                    text: row.get("text"),
                    raw: serde_json::from_str(row.get::<String, _>("raw").as_str())?,
                    received_at: row.get("received_at"),
                })
            })
            .collect()
    }

    async fn list_received_reactions(
        &self,
        platform_config_id: &str,
    ) -> Result<Vec<ReceivedReactionRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM received_reactions WHERE platform_config_id = ? ORDER BY received_at",
        )
        .bind(platform_config_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| ReceivedReactionRecord {
                id: row.get("id"),
                platform_config_id: row.get("platform_config_id"),
                provider_message_id: row.get("provider_message_id"),
                provider_user_id: row.get("provider_user_id"),
                emoji: row.get("emoji"),
                reaction_type: row.get("reaction_type"),
                received_at: row.get("received_at"),
            })
            .collect())
    }

    async fn count_sent_with_status(&self, job_id: &str, status: SentStatus) -> Result<usize> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sent_messages WHERE job_id = ? AND status = ?")
                .bind(job_id)
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }
}
