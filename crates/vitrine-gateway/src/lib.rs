#![forbid(unsafe_code)]

//! # vitrine-gateway
//!
//! Stateless HTTP surface over the backing object store.
//!
//! Endpoints:
//! - `GET/HEAD/DELETE /object?b=<bucket>&k=<key>` (aliases `bucket=`/`key=`) —
//!   byte-range-aware streaming proxy for one object.
//! - `GET /hls/playlist?b=<bucket>&k=<key>` — fetches an HLS manifest from the
//!   store and rewrites its references into `/object` URLs.
//!
//! The gateway holds no state between calls and does not deduplicate
//! concurrent requests for the same object; each request maps to exactly one
//! store operation.

mod params;
mod routes;

use std::sync::Arc;

use axum::{Router, routing::get};
use vitrine_store::ObjectStore;

pub use crate::params::ObjectParams;

/// Shared state for all gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub store: Arc<dyn ObjectStore>,
    /// Base URL under which clients reach this gateway; rewritten playlist
    /// references are rooted here.
    pub public_base: String,
}

/// Builds the gateway router.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route(
            "/object",
            get(routes::get_or_head_object).delete(routes::delete_object),
        )
        .route("/hls/playlist", get(routes::get_playlist))
        .with_state(state)
}
