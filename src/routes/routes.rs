//! Defines the HTTP surface of the gateway.
//!
//! ## Structure
//! - **Health endpoints** (always at the server root)
//!   - `GET /healthz`: liveness
//!   - `GET /readyz`: readiness (SQLite, bucket row, disk)
//!
//! - **WebDAV** (everything else, under the configured mount prefix)
//!   - `OPTIONS`, `GET`, `HEAD`, `PUT`, `DELETE`, `MKCOL`, `PROPFIND`, `COPY`, `MOVE`
//!
//! WebDAV verbs such as `PROPFIND` have no `MethodRouter` helper, so the
//! dispatcher is mounted as the router fallback and matches on the method
//! itself.

use crate::{
    handlers::{
        dav_handlers::dispatch,
        health_handlers::{healthz, readyz},
    },
    state::AppState,
};
use axum::{Router, routing::get};

/// Build the router. The caller attaches `AppState` with `with_state`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .fallback(dispatch)
}
