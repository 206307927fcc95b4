//! HTTP handlers: the WebDAV dispatcher and health probes.

pub mod dav_handlers;
pub mod health_handlers;
