//! The dispatch orchestrator: invoked by the worker for one job.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {async_trait::async_trait, tracing::{info, warn}};

use {
    gridkit_attachments::{AttachmentError, AttachmentFetcher, ResolvedAttachment},
    gridkit_common::types::{MessageJobData, SendTarget},
    gridkit_platforms::{ConnectionKey, OutboundMessage, PlatformRegistry},
    gridkit_queue::{JobError, JobHandler, JobRecord},
    gridkit_store::{
        MessageStore, PlatformConfigRecord, PlatformConfigStore, ProjectStore, SentStatus,
        records::NewSentMessage,
    },
    gridkit_vault::CredentialVault,
};

use crate::events::{TenantEvent, TenantEventSink};

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

pub struct DispatchOrchestrator {
    projects: Arc<dyn ProjectStore>,
    platforms: Arc<dyn PlatformConfigStore>,
    messages: Arc<dyn MessageStore>,
    registry: Arc<PlatformRegistry>,
    vault: Arc<CredentialVault>,
    fetcher: AttachmentFetcher,
    events: Arc<dyn TenantEventSink>,
    send_timeout: Duration,
}

/// Outcome of one target's delivery attempt within the fan-out.
enum TargetOutcome {
    Sent,
    SkippedAlreadySent,
    Failed { message: String, retryable: bool },
}

impl DispatchOrchestrator {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        platforms: Arc<dyn PlatformConfigStore>,
        messages: Arc<dyn MessageStore>,
        registry: Arc<PlatformRegistry>,
        vault: Arc<CredentialVault>,
        fetcher: AttachmentFetcher,
        events: Arc<dyn TenantEventSink>,
    ) -> Self {
        Self {
            projects,
            platforms,
            messages,
            registry,
            vault,
            fetcher,
            events,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    async fn deliver_target(
        &self,
        job_id: &str,
        data: &MessageJobData,
        target: &SendTarget,
        config: Option<&PlatformConfigRecord>,
        credentials: Option<&serde_json::Value>,
        attachments: &[ResolvedAttachment],
    ) -> TargetOutcome {
        let platform_name = config.map_or("unknown", |c| c.platform.as_str());
        let row = match self
            .messages
            .insert_sent(NewSentMessage {
                job_id: job_id.to_string(),
                platform_config_id: target.platform_id.clone(),
                platform: platform_name.to_string(),
                target_type: target.target_type.as_str().to_string(),
                target_chat_id: target.id.clone(),
                target_user_id: matches!(
                    target.target_type,
                    gridkit_common::types::TargetType::User
                )
                .then(|| target.id.clone()),
            })
            .await
        {
            Ok(row) => row,
            Err(err) => {
                return TargetOutcome::Failed {
                    message: format!("outcome recording failed: {err}"),
                    retryable: true,
                };
            },
        };

        // Retries must not re-send targets that already went out.
        if row.status == SentStatus::Sent {
            return TargetOutcome::SkippedAlreadySent;
        }

        let failure = |message: String, retryable: bool| TargetOutcome::Failed {
            message,
            retryable,
        };

        let (config, credentials) = match (config, credentials) {
            (Some(config), Some(credentials)) => (config, credentials),
            _ => {
                let message = format!("platform config {} unavailable", target.platform_id);
                self.record_failure(&row.id, job_id, data, target, platform_name, &message)
                    .await;
                return failure(message, false);
            },
        };

        let key = ConnectionKey::new(&data.project_id, &config.id);
        let adapter = match self
            .registry
            .obtain_adapter(&config.platform, key, credentials.clone())
            .await
        {
            Ok(adapter) => adapter,
            Err(err) => {
                let retryable = err.is_retryable();
                let message = format!("adapter unavailable: {err}");
                self.record_failure(&row.id, job_id, data, target, &config.platform, &message)
                    .await;
                return failure(message, retryable);
            },
        };

        let outbound = OutboundMessage {
            target: target.clone(),
            text: data.request.content.text.clone(),
            buttons: data.request.content.buttons.clone(),
            embeds: data.request.content.embeds.clone(),
            attachments: attachments.to_vec(),
            reply_to: data
                .request
                .options
                .as_ref()
                .and_then(|o| o.reply_to.clone()),
            silent: data.request.options.as_ref().is_some_and(|o| o.silent),
        };

        let sent = tokio::time::timeout(self.send_timeout, adapter.send_message(&outbound)).await;
        match sent {
            Ok(Ok(outcome)) => {
                if let Err(err) = self
                    .messages
                    .mark_sent(&row.id, &outcome.provider_message_id)
                    .await
                {
                    warn!(job_id, row_id = %row.id, error = %err, "failed to record sent outcome");
                }
                self.events
                    .emit(TenantEvent::MessageSent {
                        project_id: data.project_id.clone(),
                        job_id: job_id.to_string(),
                        platform_config_id: config.id.clone(),
                        platform: config.platform.clone(),
                        target_chat_id: target.id.clone(),
                        provider_message_id: outcome.provider_message_id,
                        tracking_id: tracking_id(data),
                    })
                    .await;
                TargetOutcome::Sent
            },
            Ok(Err(err)) => {
                let retryable = err.is_retryable();
                let message = err.to_string();
                self.record_failure(&row.id, job_id, data, target, &config.platform, &message)
                    .await;
                failure(message, retryable)
            },
            Err(_) => {
                let message = format!(
                    "provider send timed out after {}s",
                    self.send_timeout.as_secs()
                );
                self.record_failure(&row.id, job_id, data, target, &config.platform, &message)
                    .await;
                failure(message, true)
            },
        }
    }

    async fn record_failure(
        &self,
        row_id: &str,
        job_id: &str,
        data: &MessageJobData,
        target: &SendTarget,
        platform: &str,
        message: &str,
    ) {
        if let Err(err) = self.messages.mark_failed(row_id, message).await {
            warn!(job_id, row_id, error = %err, "failed to record failure outcome");
        }
        self.events
            .emit(TenantEvent::MessageFailed {
                project_id: data.project_id.clone(),
                job_id: job_id.to_string(),
                platform_config_id: target.platform_id.clone(),
                platform: platform.to_string(),
                target_chat_id: target.id.clone(),
                error: message.to_string(),
                tracking_id: tracking_id(data),
            })
            .await;
    }
}

fn tracking_id(data: &MessageJobData) -> Option<String> {
    data.request
        .metadata
        .as_ref()
        .and_then(|m| m.tracking_id.clone())
}

#[async_trait]
impl JobHandler for DispatchOrchestrator {
    async fn handle(&self, job: &JobRecord) -> Result<(), JobError> {
        let data: MessageJobData = serde_json::from_value(job.data.clone())
            .map_err(|e| JobError::fatal(format!("malformed job payload: {e}")))?;

        let project = self
            .projects
            .find_project_by_id(&data.project_id)
            .await
            .map_err(|e| JobError::retryable(format!("project lookup failed: {e}")))?;
        let Some(project) = project.filter(|p| p.is_active) else {
            return Err(JobError::fatal(format!(
                "project {} is missing or inactive",
                data.project_slug
            )));
        };

        // Resolve attachments once per job; a transient download failure
        // retries the whole job before any target is attempted.
        let mut attachments = Vec::with_capacity(data.request.content.attachments.len());
        for attachment in &data.request.content.attachments {
            match self.fetcher.resolve(attachment).await {
                Ok(resolved) => attachments.push(resolved),
                Err(err @ AttachmentError::Download(_)) => {
                    return Err(JobError::retryable(err.to_string()));
                },
                Err(err) => return Err(JobError::fatal(err.to_string())),
            }
        }

        // Resolve and decrypt each distinct platform config up front.
        let mut configs: HashMap<String, Option<PlatformConfigRecord>> = HashMap::new();
        let mut credentials: HashMap<String, serde_json::Value> = HashMap::new();
        for target in &data.request.targets {
            if configs.contains_key(&target.platform_id) {
                continue;
            }
            let config = self
                .platforms
                .find_platform_by_id(&target.platform_id)
                .await
                .map_err(|e| JobError::retryable(format!("platform lookup failed: {e}")))?
                // Foreign and inactive configs are treated as absent: the
                // API validated ownership already, this is defense in depth.
                .filter(|c| c.project_id == project.id && c.is_active);

            if let Some(config) = &config
                && let Ok(creds) = self.vault.decrypt_json(&config.credentials_encrypted)
            {
                credentials.insert(config.id.clone(), creds);
            }
            configs.insert(target.platform_id.clone(), config);
        }

        let mut successful = 0usize;
        let mut failed = 0usize;
        let mut retryable_failure: Option<String> = None;
        let mut first_failure: Option<String> = None;

        for target in &data.request.targets {
            let config = configs.get(&target.platform_id).and_then(Option::as_ref);
            let creds = config.and_then(|c| credentials.get(&c.id));
            let outcome = self
                .deliver_target(&job.id, &data, target, config, creds, &attachments)
                .await;
            match outcome {
                TargetOutcome::Sent | TargetOutcome::SkippedAlreadySent => successful += 1,
                TargetOutcome::Failed { message, retryable } => {
                    failed += 1;
                    if retryable && retryable_failure.is_none() {
                        retryable_failure = Some(message.clone());
                    }
                    first_failure.get_or_insert(message);
                },
            }
        }

        info!(
            job_id = %job.id,
            project = %data.project_slug,
            targets = data.request.targets.len(),
            successful,
            failed,
            "fan-out finished"
        );

        // Retryable failures re-run the job; already-sent targets are
        // skipped on the next attempt via their recorded rows.
        if let Some(reason) = retryable_failure {
            return Err(JobError::retryable(reason));
        }
        if successful == 0 && failed > 0 {
            return Err(JobError::fatal(
                first_failure.unwrap_or_else(|| "all targets failed".to_string()),
            ));
        }
        Ok(())
    }
}
