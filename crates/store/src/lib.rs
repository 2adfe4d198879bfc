//! Persistence layer: entity records, repository contracts, and the SQLite
//! implementation.
//!
//! The rest of the workspace depends only on the traits in [`traits`];
//! [`SqliteStore`] is wired in at process start (and instantiated fresh,
//! in-memory, by tests).

pub mod error;
pub mod records;
pub mod sqlite;
pub mod traits;

pub use {
    error::StoreError,
    records::{
        ApiKeyRecord, NewApiKey, NewPlatformConfig, NewProject, NewReceivedMessage,
        NewReceivedReaction, NewSentMessage, PlatformConfigRecord, PlatformConfigUpdate,
        ProjectRecord, ReceivedMessageRecord, ReceivedReactionRecord, SentMessageRecord,
        SentStatus,
    },
    sqlite::SqliteStore,
    traits::{ApiKeyStore, MessageStore, PlatformConfigStore, ProjectStore},
};
