//! WebDAV gateway over a flat, prefix-addressed object store.
//!
//! Collections are emulated with marker objects and prefix queries; see
//! [`dav`] for the mapping and [`services::dav_service`] for the per-verb
//! operations.

pub mod config;
pub mod dav;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::Router;
use services::{
    dav_service::{DavService, DavSettings},
    storage_service::StorageService,
};
use state::AppState;
use std::sync::Arc;

/// Router with state attached, ready to serve.
pub fn app(storage: StorageService, settings: DavSettings) -> Router {
    let dav = DavService::new(Arc::new(storage.clone()), settings);
    routes::routes::routes().with_state(AppState { dav, storage })
}
