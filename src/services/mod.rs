//! Store binding and the WebDAV operations built on top of it.

pub mod dav_service;
pub mod object_store;
pub mod storage_service;

#[cfg(test)]
pub(crate) mod test_support;
