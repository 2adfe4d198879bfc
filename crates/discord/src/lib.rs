//! Discord provider over the REST API: channel and DM sends, reactions,
//! and parsing of forwarded gateway dispatch envelopes.

pub mod config;
pub mod inbound;
pub mod provider;
pub mod rest;

pub use {config::DiscordCredentials, provider::DiscordProvider};
