//! relay-axum: HTTP surface of the tenant relay gateway.
//!
//! Every tenant route takes the tenant id from `x-api-key`, resolves the
//! tenant through the profile cache, holds an admission permit for the
//! rest of the request and renders failures as Feathers-style JSON.

pub mod app;
mod error;
pub mod extract;
pub mod handlers;
pub mod state;

pub use app::{router, RelayApp};
pub use error::RelayAxumError;
pub use state::{HttpMetrics, RelayState};

use std::sync::Arc;

use relay_context::RelayContext;

pub fn build(ctx: Arc<RelayContext>) -> RelayApp {
    RelayApp::new(ctx)
}
