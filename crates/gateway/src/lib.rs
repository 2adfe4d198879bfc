//! HTTP surface: route table, API-key guard, rate limiting, and the
//! inbound webhook router.

pub mod auth;
pub mod error;
pub mod keys;
pub mod messages;
pub mod platforms;
pub mod rate_limit;
pub mod server;
pub mod state;
pub mod webhooks;

pub use {
    auth::AuthContext,
    error::ApiError,
    rate_limit::RateLimiter,
    server::{build_router, serve},
    state::AppState,
};
