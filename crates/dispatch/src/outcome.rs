//! Per-target delivery accounting.

use serde::Serialize;

use {
    gridkit_common::types::{DeliverySummary, OverallStatus},
    gridkit_store::{SentMessageRecord, SentStatus},
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetResult {
    pub platform_config_id: String,
    pub platform: String,
    pub target_type: String,
    pub target_chat_id: String,
    pub status: SentStatus,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
}

/// Aggregated view of one job's fan-out, built from its `SentMessage`
/// rows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub overall_status: OverallStatus,
    pub summary: DeliverySummary,
    pub results: Vec<TargetResult>,
    pub errors: Vec<String>,
}

#[must_use]
pub fn build_delivery_report(rows: &[SentMessageRecord]) -> DeliveryReport {
    let mut summary = DeliverySummary {
        total: rows.len(),
        ..Default::default()
    };
    let mut results = Vec::with_capacity(rows.len());
    let mut errors = Vec::new();

    for row in rows {
        match row.status {
            SentStatus::Sent => summary.successful += 1,
            SentStatus::Failed => summary.failed += 1,
            SentStatus::Pending => summary.pending += 1,
        }
        if let Some(error) = &row.error_message {
            errors.push(error.clone());
        }
        results.push(TargetResult {
            platform_config_id: row.platform_config_id.clone(),
            platform: row.platform.clone(),
            target_type: row.target_type.clone(),
            target_chat_id: row.target_chat_id.clone(),
            status: row.status,
            provider_message_id: row.provider_message_id.clone(),
            error: row.error_message.clone(),
        });
    }

    DeliveryReport {
        overall_status: summary.overall(),
        summary,
        results,
        errors,
    }
}
