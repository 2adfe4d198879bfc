//! Message endpoints: send, status, retry, queue metrics.

use {
    axum::{
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Json},
    },
    chrono::Utc,
    tracing::info,
};

use {
    gridkit_common::{Error, scopes, types::{MessageJobData, SendRequest}, validate_send_request},
    gridkit_dispatch::build_delivery_report,
    gridkit_queue::{JobRecord, JobState},
    gridkit_store::{ProjectRecord, SentMessageRecord},
};

use crate::{auth::AuthContext, error::ApiError, state::AppState};

/// Job ids are a single queue-wide sequence, so every lookup must prove
/// the job belongs to the addressed project before anything is revealed
/// or mutated. A live job carries its owner in the payload; once the job
/// is gone, ownership is derived from the recorded rows' platform
/// configs.
async fn job_belongs_to_project(
    state: &AppState,
    project: &ProjectRecord,
    job: Option<&JobRecord>,
    rows: &[SentMessageRecord],
) -> Result<bool, ApiError> {
    if let Some(job) = job {
        let owner = job
            .data
            .get("projectId")
            .and_then(serde_json::Value::as_str);
        return Ok(owner == Some(project.id.as_str()));
    }
    for row in rows {
        let config = state
            .platform_configs
            .find_platform_by_id(&row.platform_config_id)
            .await?;
        if config.is_some_and(|c| c.project_id == project.id) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn job_not_found(job_id: &str) -> ApiError {
    ApiError::new(Error::not_found(format!("job {job_id} not found")))
}

pub async fn send(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
    Json(request): Json<SendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_scope(&[scopes::MESSAGES_SEND])?;
    let project = state.project_by_slug(&slug).await?;
    auth.require_project(&project)?;

    if let Err(errors) = validate_send_request(&request) {
        return Err(ApiError::validation(errors));
    }

    // Up-front target validation: every target must name a live config of
    // this project before anything is enqueued.
    let mut platform_ids = Vec::new();
    for target in &request.targets {
        let config = state
            .platform_configs
            .find_platform_by_id(&target.platform_id)
            .await?;
        let Some(config) = config else {
            return Err(ApiError::new(Error::bad_request(format!(
                "platform {} not found",
                target.platform_id
            ))));
        };
        if config.project_id != project.id {
            // Deliberately BadRequest, not NotFound: the caller proved it
            // knows the id, the problem is the project mismatch.
            return Err(ApiError::new(Error::bad_request(format!(
                "platform {} does not belong to project {}",
                target.platform_id, project.slug
            ))));
        }
        if !config.is_active {
            return Err(ApiError::new(Error::bad_request(format!(
                "platform {} is not active",
                target.platform_id
            ))));
        }
        if !platform_ids.contains(&config.id) {
            platform_ids.push(config.id);
        }
    }

    // Attachment validation happens here so a blocked URL rejects the
    // request instead of surfacing as a failed job.
    for attachment in &request.content.attachments {
        state.fetcher.validate(attachment).await?;
    }

    let targets: Vec<String> = request.targets.iter().map(|t| t.id.clone()).collect();
    // Scheduled sends park in the delayed state until due.
    let delay = request
        .options
        .as_ref()
        .and_then(|o| o.scheduled)
        .and_then(|at| (at - Utc::now()).to_std().ok());
    let job_data = MessageJobData {
        project_id: project.id.clone(),
        project_slug: project.slug.clone(),
        request,
    };
    let payload = serde_json::to_value(&job_data)
        .map_err(|e| ApiError::new(Error::internal("job serialization", e)))?;
    let job_id = match delay {
        Some(delay) => state.queue.add_delayed(payload, delay).await?,
        None => state.queue.add(payload).await?,
    };

    info!(project = %project.slug, job_id = %job_id, targets = targets.len(), "send queued");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "jobId": job_id,
            "status": "queued",
            "targets": targets,
            "platformIds": platform_ids,
            "timestamp": Utc::now(),
            "message": "Message queued for delivery",
        })),
    ))
}

pub async fn status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((slug, job_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_scope(&[scopes::MESSAGES_READ])?;
    let project = state.project_by_slug(&slug).await?;
    auth.require_project(&project)?;

    let job = state.queue.status(&job_id).await?;
    let rows = state.messages.sent_for_job(&job_id).await?;
    if job.is_none() && rows.is_empty() {
        return Err(job_not_found(&job_id));
    }
    // Another tenant's job is indistinguishable from an absent one.
    if !job_belongs_to_project(&state, &project, job.as_ref(), &rows).await? {
        return Err(job_not_found(&job_id));
    }

    let delivery = build_delivery_report(&rows);
    // Completed jobs are removed from the queue; their state is derived
    // from the recorded per-target outcomes.
    let (job_state, progress, attempts_made, failed_reason) = match &job {
        Some(job) => (
            job.state.as_str().to_string(),
            job.progress,
            job.attempts_made,
            job.failed_reason.clone(),
        ),
        None => {
            let derived = match delivery.overall_status {
                gridkit_common::OverallStatus::Failed => JobState::Failed,
                _ => JobState::Completed,
            };
            (derived.as_str().to_string(), 100, 0, None)
        },
    };

    Ok(Json(serde_json::json!({
        "id": job_id,
        "state": job_state,
        "progress": progress,
        "attemptsMade": attempts_made,
        "failedReason": failed_reason,
        "delivery": delivery,
    })))
}

pub async fn retry(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((slug, job_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_scope(&[scopes::MESSAGES_SEND])?;
    let project = state.project_by_slug(&slug).await?;
    auth.require_project(&project)?;

    let job = state
        .queue
        .status(&job_id)
        .await?
        .ok_or_else(|| job_not_found(&job_id))?;
    if !job_belongs_to_project(&state, &project, Some(&job), &[]).await? {
        return Err(job_not_found(&job_id));
    }

    state.queue.retry(&job_id).await?;
    info!(project = %project.slug, job_id = %job_id, "failed job re-enqueued");
    Ok(Json(serde_json::json!({"success": true, "jobId": job_id})))
}

pub async fn queue_metrics(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_scope(&[scopes::MESSAGES_READ])?;
    let project = state.project_by_slug(&slug).await?;
    auth.require_project(&project)?;

    let metrics = state.queue.metrics().await?;
    Ok(Json(serde_json::to_value(metrics).map_err(|e| {
        ApiError::new(Error::internal("metrics serialization", e))
    })?))
}
