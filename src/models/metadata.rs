//! Custom metadata attached to objects.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One key-value metadata entry of an object.
///
/// Collection markers carry `resourcetype = collection` here; COPY and MOVE
/// carry every entry over to the destination.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct ObjectMetadata {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Reference to the associated object.
    pub object_id: Uuid,

    /// Metadata key (e.g. "resourcetype").
    pub key: String,

    /// Metadata value as plain text.
    pub value: String,
}
