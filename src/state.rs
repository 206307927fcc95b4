use crate::services::{dav_service::DavService, storage_service::StorageService};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub dav: DavService,
    /// Concrete store, for readiness checks.
    pub storage: StorageService,
}
