//! WhatsApp provider speaking to an Evolution API server.

pub mod config;
pub mod inbound;
pub mod provider;

pub use {config::EvolutionCredentials, provider::WhatsAppEvoProvider};
