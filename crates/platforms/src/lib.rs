//! Platform abstraction: the per-provider capability contract, the
//! process-wide registry of providers and live adapters, and the lifecycle
//! service that reacts to configuration changes.

pub mod contract;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod registry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use {
    contract::{
        AdapterState, ConnectionKey, ConnectionType, OutboundMessage, PlatformAdapter,
        PlatformProvider, SendOutcome, WebhookConfig,
    },
    error::PlatformError,
    events::{InboundEvent, InboundMessage, InboundReaction, PlatformEvent, PlatformEventKind},
    lifecycle::{CreatePlatform, PlatformLifecycleService, PlatformView, UpdatePlatform},
    registry::PlatformRegistry,
};
