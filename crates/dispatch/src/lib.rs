//! Dispatch orchestration: one queue job fans out to N per-target
//! deliveries with idempotent outcome recording.

pub mod events;
pub mod orchestrator;
pub mod outcome;

pub use {
    events::{NullEventSink, TenantEvent, TenantEventSink, TracingEventSink},
    orchestrator::DispatchOrchestrator,
    outcome::{DeliveryReport, TargetResult, build_delivery_report},
};
