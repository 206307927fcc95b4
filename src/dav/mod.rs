//! Hierarchical WebDAV semantics emulated over a flat object store.
//!
//! - [`path`] turns request URLs into store-relative keys.
//! - [`collection`] decides whether a key is a file, an explicit or implicit
//!   collection, or nothing.
//! - [`listing`] enumerates collection members with prefix queries.
//! - [`render`] produces HTML listings and multistatus XML.

pub mod collection;
pub mod listing;
pub mod path;
pub mod render;
