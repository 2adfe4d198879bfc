//! Shared contracts for the gridkit workspace: the domain error taxonomy,
//! the canonical send payload, and request validation.

pub mod error;
pub mod scopes;
pub mod types;
pub mod validate;

pub use {
    error::{Error, Result},
    types::{
        Attachment, Button, DeliverySummary, Embed, Environment, MessageContent, MessageJobData,
        OverallStatus, Priority, SendMetadata, SendOptions, SendRequest, SendTarget, TargetType,
    },
    validate::{FieldError, validate_send_request},
};
