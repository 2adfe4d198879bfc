//! End-to-end exercises of the HTTP surface against an in-memory queue,
//! an in-memory SQLite store, and the scripted mock provider.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{sync::Arc, time::Duration};

use {
    axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
    },
    tower::ServiceExt,
};

use {
    gridkit_attachments::AttachmentFetcher,
    gridkit_common::Environment,
    gridkit_dispatch::{DispatchOrchestrator, NullEventSink},
    gridkit_gateway::{AppState, RateLimiter, build_router},
    gridkit_platforms::{
        PlatformLifecycleService, PlatformRegistry, testing::MockProvider,
    },
    gridkit_queue::{
        JobHandler, JobOptions, MemoryQueue, QueueBackend, WorkerPool, worker::WorkerConfig,
    },
    gridkit_store::{
        ApiKeyStore, MessageStore, PlatformConfigStore, ProjectStore, SqliteStore,
        records::{NewApiKey, NewProject},
    },
    gridkit_vault::{CredentialVault, generate_api_key, hash_api_key, key_prefix, key_suffix,
        KeyEnv},
};

struct TestApp {
    router: Router,
    store: Arc<SqliteStore>,
    queue: Arc<dyn QueueBackend>,
    provider: Arc<MockProvider>,
    state: AppState,
    admin_key: String,
    project_slug: String,
}

async fn test_app() -> TestApp {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let vault = Arc::new(CredentialVault::ephemeral());
    let provider = Arc::new(MockProvider::new("mock"));
    let registry = Arc::new(PlatformRegistry::new([
        Arc::clone(&provider) as Arc<dyn gridkit_platforms::PlatformProvider>
    ]));
    let queue: Arc<dyn QueueBackend> = Arc::new(MemoryQueue::new(JobOptions {
        backoff_base: Duration::from_millis(10),
        ..Default::default()
    }));
    let lifecycle = Arc::new(PlatformLifecycleService::new(
        Arc::clone(&store) as Arc<dyn PlatformConfigStore>,
        Arc::clone(&vault),
        Arc::clone(&registry),
        "https://api.example.com",
    ));

    let state = AppState {
        projects: Arc::clone(&store) as Arc<dyn ProjectStore>,
        api_keys: Arc::clone(&store) as Arc<dyn ApiKeyStore>,
        platform_configs: Arc::clone(&store) as Arc<dyn PlatformConfigStore>,
        messages: Arc::clone(&store) as Arc<dyn MessageStore>,
        registry: Arc::clone(&registry),
        lifecycle,
        queue: Arc::clone(&queue),
        vault: Arc::clone(&vault),
        fetcher: Arc::new(AttachmentFetcher::default()),
        events: Arc::new(NullEventSink),
        limiter: Arc::new(RateLimiter::default_policy()),
    };

    let project = store
        .create_project(NewProject {
            slug: "acme".into(),
            name: "Acme".into(),
            environment: Environment::Development,
            owner_id: "owner_1".into(),
            is_default: true,
        })
        .await
        .unwrap();

    let admin_key = seed_key(&store, &project.id, &["*"]).await;

    TestApp {
        router: build_router(state.clone()),
        store,
        queue,
        provider,
        state,
        admin_key,
        project_slug: project.slug,
    }
}

async fn seed_key(store: &SqliteStore, project_id: &str, scopes: &[&str]) -> String {
    let secret = generate_api_key(KeyEnv::Test);
    store
        .insert_api_key(NewApiKey {
            project_id: project_id.into(),
            key_hash: hash_api_key(&secret),
            key_prefix: key_prefix(&secret).to_string(),
            key_suffix: key_suffix(&secret).to_string(),
            name: "seeded".into(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            expires_at: None,
        })
        .await
        .unwrap();
    secret
}

impl TestApp {
    async fn request(
        &self,
        method: &str,
        path: &str,
        api_key: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(key) = api_key {
            builder = builder.header("x-api-key", key);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, value)
    }

    async fn create_platform(&self, credentials: serde_json::Value) -> serde_json::Value {
        let (status, body) = self
            .request(
                "POST",
                &format!("/api/v1/projects/{}/platforms", self.project_slug),
                Some(&self.admin_key),
                Some(serde_json::json!({
                    "platform": "mock",
                    "credentials": credentials,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "platform create failed: {body}");
        body
    }

    fn start_worker(&self) -> Arc<WorkerPool> {
        let orchestrator = DispatchOrchestrator::new(
            Arc::clone(&self.state.projects),
            Arc::clone(&self.state.platform_configs),
            Arc::clone(&self.state.messages),
            Arc::clone(&self.state.registry),
            Arc::clone(&self.state.vault),
            AttachmentFetcher::default(),
            Arc::new(NullEventSink),
        );
        let pool = Arc::new(WorkerPool::new(
            Arc::clone(&self.queue),
            Arc::new(orchestrator) as Arc<dyn JobHandler>,
            JobOptions {
                backoff_base: Duration::from_millis(10),
                ..Default::default()
            },
            WorkerConfig {
                concurrency: 2,
                poll_interval: Duration::from_millis(5),
                shutdown_grace: Duration::from_millis(500),
                ..Default::default()
            },
        ));
        pool
    }

    async fn wait_for_delivery(&self, job_id: &str, expected: &str) -> serde_json::Value {
        for _ in 0..200 {
            let (status, body) = self
                .request(
                    "GET",
                    &format!(
                        "/api/v1/projects/{}/messages/status/{job_id}",
                        self.project_slug
                    ),
                    Some(&self.admin_key),
                    None,
                )
                .await;
            // A job with no recorded targets reports completed; wait for
            // the real fan-out rows before judging the outcome.
            let summary = &body["delivery"]["summary"];
            let settled = body["state"] == "completed" || body["state"] == "failed";
            if status == StatusCode::OK
                && settled
                && summary["total"].as_u64().unwrap_or(0) > 0
                && summary["pending"] == 0
                && body["delivery"]["overallStatus"] == expected
            {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never reached overall status {expected}");
    }
}

#[tokio::test]
async fn health_is_open() {
    let app = test_app().await;
    let (status, body) = app.request("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "healthy");
}

#[tokio::test]
async fn missing_key_is_unauthorized() {
    let app = test_app().await;
    let (status, body) = app
        .request("GET", "/api/v1/projects/acme/platforms", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "Unauthorized");
}

#[tokio::test]
async fn simple_send_completes_end_to_end() {
    let app = test_app().await;
    let platform = app.create_platform(serde_json::json!({"token": "ok"})).await;
    let platform_id = platform["id"].as_str().unwrap();

    let pool = app.start_worker();
    pool.start().await;

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/projects/acme/messages/send",
            Some(&app.admin_key),
            Some(serde_json::json!({
                "targets": [{"platformId": platform_id, "type": "channel", "id": "C1"}],
                "content": {"text": "hello"},
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "queued");
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let status_body = app.wait_for_delivery(&job_id, "completed").await;
    assert_eq!(status_body["state"], "completed");
    let results = status_body["delivery"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["status"], "sent");
    assert!(results[0]["providerMessageId"].is_string());

    pool.shutdown().await;
}

#[tokio::test]
async fn fan_out_with_one_failing_platform_is_partial() {
    let app = test_app().await;
    let good = app.create_platform(serde_json::json!({"token": "ok"})).await;
    let bad = app
        .create_platform(serde_json::json!({"failSend": "permanent"}))
        .await;
    let good_id = good["id"].as_str().unwrap();
    let bad_id = bad["id"].as_str().unwrap();

    let pool = app.start_worker();
    pool.start().await;

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/projects/acme/messages/send",
            Some(&app.admin_key),
            Some(serde_json::json!({
                "targets": [
                    {"platformId": good_id, "type": "channel", "id": "C1"},
                    {"platformId": bad_id, "type": "user", "id": "U1"},
                ],
                "content": {"text": "multi"},
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let status_body = app.wait_for_delivery(&job_id, "partial").await;
    let summary = &status_body["delivery"]["summary"];
    assert_eq!(summary["total"], 2);
    assert_eq!(summary["successful"], 1);
    assert_eq!(summary["failed"], 1);

    pool.shutdown().await;
}

#[tokio::test]
async fn metadata_url_attachment_is_rejected_before_enqueue() {
    let app = test_app().await;
    let platform = app.create_platform(serde_json::json!({"token": "ok"})).await;
    let platform_id = platform["id"].as_str().unwrap();

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/projects/acme/messages/send",
            Some(&app.admin_key),
            Some(serde_json::json!({
                "targets": [{"platformId": platform_id, "type": "channel", "id": "C1"}],
                "content": {
                    "attachments": [{"url": "http://169.254.169.254/latest/meta-data"}]
                },
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BadRequest");
    assert!(body["message"].as_str().unwrap().contains("metadata"));

    // Nothing was enqueued.
    assert_eq!(app.queue.metrics().await.unwrap().total, 0);
}

#[tokio::test]
async fn scope_enforcement_splits_read_and_send() {
    let app = test_app().await;
    let platform = app.create_platform(serde_json::json!({"token": "ok"})).await;
    let platform_id = platform["id"].as_str().unwrap();

    // Queue a job with the admin key so there is something to read.
    let (_, body) = app
        .request(
            "POST",
            "/api/v1/projects/acme/messages/send",
            Some(&app.admin_key),
            Some(serde_json::json!({
                "targets": [{"platformId": platform_id, "type": "channel", "id": "C1"}],
                "content": {"text": "hello"},
            })),
        )
        .await;
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let project = app.store.find_project_by_slug("acme").await.unwrap().unwrap();
    let read_only = seed_key(&app.store, &project.id, &["messages:read"]).await;

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/projects/acme/messages/send",
            Some(&read_only),
            Some(serde_json::json!({
                "targets": [{"platformId": platform_id, "type": "channel", "id": "C1"}],
                "content": {"text": "nope"},
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "Forbidden");

    let (status, _) = app
        .request(
            "GET",
            &format!("/api/v1/projects/acme/messages/status/{job_id}"),
            Some(&read_only),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn cross_tenant_platform_is_bad_request_naming_the_mismatch() {
    let app = test_app().await;

    let other = app
        .store
        .create_project(NewProject {
            slug: "rival".into(),
            name: "Rival".into(),
            environment: Environment::Development,
            owner_id: "owner_2".into(),
            is_default: false,
        })
        .await
        .unwrap();
    let foreign = {
        let encrypted = app.state.vault.encrypt_json(&serde_json::json!({})).unwrap();
        app.store
            .insert_platform(gridkit_store::records::NewPlatformConfig {
                project_id: other.id,
                platform: "mock".into(),
                credentials_encrypted: encrypted,
                is_active: true,
                test_mode: false,
                webhook_token: "tok-foreign".into(),
            })
            .await
            .unwrap()
    };

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/projects/acme/messages/send",
            Some(&app.admin_key),
            Some(serde_json::json!({
                "targets": [{"platformId": foreign.id, "type": "channel", "id": "C1"}],
                "content": {"text": "sneaky"},
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BadRequest");
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .contains("does not belong to project acme")
    );
}

#[tokio::test]
async fn foreign_project_cannot_read_or_retry_a_job() {
    let app = test_app().await;
    let platform = app.create_platform(serde_json::json!({"token": "ok"})).await;
    let platform_id = platform["id"].as_str().unwrap();

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/projects/acme/messages/send",
            Some(&app.admin_key),
            Some(serde_json::json!({
                "targets": [{"platformId": platform_id, "type": "channel", "id": "C1"}],
                "content": {"text": "private"},
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let rival = app
        .store
        .create_project(NewProject {
            slug: "rival".into(),
            name: "Rival".into(),
            environment: Environment::Development,
            owner_id: "owner_2".into(),
            is_default: false,
        })
        .await
        .unwrap();
    let rival_key = seed_key(&app.store, &rival.id, &["*"]).await;

    // Job ids are one global sequence; addressing another tenant's job
    // through your own project must look like a missing job.
    let (status, body) = app
        .request(
            "GET",
            &format!("/api/v1/projects/rival/messages/status/{job_id}"),
            Some(&rival_key),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");
    assert_eq!(body["code"], "NotFound");

    let (status, _) = app
        .request(
            "POST",
            &format!("/api/v1/projects/rival/messages/retry/{job_id}"),
            Some(&rival_key),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The owning project still sees it.
    let (status, _) = app
        .request(
            "GET",
            &format!("/api/v1/projects/acme/messages/status/{job_id}"),
            Some(&app.admin_key),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn key_revocation_is_immediate() {
    let app = test_app().await;

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/projects/acme/keys",
            Some(&app.admin_key),
            Some(serde_json::json!({
                "name": "short-lived",
                "scopes": ["messages:read"],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let secret = body["key"].as_str().unwrap().to_string();
    let key_id = body["id"].as_str().unwrap().to_string();
    assert!(secret.starts_with("gk_test_"));

    // The fresh key works.
    let (status, _) = app
        .request(
            "GET",
            "/api/v1/projects/acme/messages/queue/metrics",
            Some(&secret),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(
            "DELETE",
            &format!("/api/v1/projects/acme/keys/{key_id}"),
            Some(&app.admin_key),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(
            "GET",
            "/api/v1/projects/acme/messages/queue/metrics",
            Some(&secret),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn inbound_webhook_is_idempotent() {
    let app = test_app().await;
    let platform = app.create_platform(serde_json::json!({"token": "ok"})).await;
    let platform_id = platform["id"].as_str().unwrap().to_string();
    let webhook_url = platform["webhookUrl"].as_str().unwrap();
    let token = webhook_url.rsplit('/').next().unwrap();

    let envelope = serde_json::json!({
        "events": [
            {"type": "message", "id": "m1", "chatId": "c1", "userId": "u1", "text": "hi"}
        ]
    });
    for _ in 0..2 {
        let (status, body) = app
            .request(
                "POST",
                &format!("/webhooks/mock/{token}"),
                None,
                Some(envelope.clone()),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    let rows = app.store.list_received_messages(&platform_id).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn replayed_reactions_store_once() {
    let app = test_app().await;
    let platform = app.create_platform(serde_json::json!({"token": "ok"})).await;
    let platform_id = platform["id"].as_str().unwrap().to_string();
    let token = platform["webhookUrl"]
        .as_str()
        .unwrap()
        .rsplit('/')
        .next()
        .unwrap()
        .to_string();

    let envelope = serde_json::json!({
        "events": [
            {"type": "reaction_added", "messageId": "m1", "userId": "u1", "emoji": "👍"}
        ]
    });
    for _ in 0..10 {
        let (status, _) = app
            .request(
                "POST",
                &format!("/webhooks/mock/{token}"),
                None,
                Some(envelope.clone()),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let rows = app.store.list_received_reactions(&platform_id).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn unknown_webhook_token_is_not_found() {
    let app = test_app().await;
    let (status, _) = app
        .request(
            "POST",
            "/webhooks/mock/does-not-exist",
            None,
            Some(serde_json::json!({"events": []})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn inactive_platform_webhook_is_gone() {
    let app = test_app().await;
    let platform = app.create_platform(serde_json::json!({"token": "ok"})).await;
    let platform_id = platform["id"].as_str().unwrap();
    let token = platform["webhookUrl"]
        .as_str()
        .unwrap()
        .rsplit('/')
        .next()
        .unwrap()
        .to_string();

    let (status, _) = app
        .request(
            "PATCH",
            &format!("/api/v1/projects/acme/platforms/{platform_id}"),
            Some(&app.admin_key),
            Some(serde_json::json!({"isActive": false})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(
            "POST",
            &format!("/webhooks/mock/{token}"),
            None,
            Some(serde_json::json!({"events": []})),
        )
        .await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn register_webhook_requires_active_config_and_hits_provider() {
    let app = test_app().await;
    let platform = app.create_platform(serde_json::json!({"token": "ok"})).await;
    let platform_id = platform["id"].as_str().unwrap();

    let (status, body) = app
        .request(
            "POST",
            &format!("/api/v1/projects/acme/platforms/{platform_id}/register-webhook"),
            Some(&app.admin_key),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(
        body["webhookUrl"]
            .as_str()
            .unwrap()
            .starts_with("https://api.example.com/webhooks/mock/")
    );
    assert_eq!(app.provider.registered_webhooks().len(), 1);
}

#[tokio::test]
async fn retry_endpoint_requires_failed_job() {
    let app = test_app().await;
    let platform = app.create_platform(serde_json::json!({"token": "ok"})).await;
    let platform_id = platform["id"].as_str().unwrap();

    let (_, body) = app
        .request(
            "POST",
            "/api/v1/projects/acme/messages/send",
            Some(&app.admin_key),
            Some(serde_json::json!({
                "targets": [{"platformId": platform_id, "type": "channel", "id": "C1"}],
                "content": {"text": "hello"},
            })),
        )
        .await;
    let job_id = body["jobId"].as_str().unwrap();

    // Still waiting, not failed: retry must conflict.
    let (status, body) = app
        .request(
            "POST",
            &format!("/api/v1/projects/acme/messages/retry/{job_id}"),
            Some(&app.admin_key),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
}
