//! `MissionStore` trait — async interface for trade mission persistence.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::mission::model::TradeRecord;

/// Table holding one row per trade mission session.
pub const MISSIONS_TABLE: &str = "trademissions";

/// Backend-agnostic store for trade missions, keyed by session key.
#[async_trait]
pub trait MissionStore: Send + Sync {
    /// Create or migrate the schema.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Insert the record, or overwrite every non-key column if a row with
    /// the same session key already exists.
    async fn upsert_mission(&self, record: &TradeRecord) -> Result<(), DatabaseError>;

    /// Fetch the row for a session key.
    async fn get_mission(&self, session_key: &str) -> Result<Option<TradeRecord>, DatabaseError>;

    /// Delete the row for a session key. Returns whether a row existed.
    async fn delete_mission(&self, session_key: &str) -> Result<bool, DatabaseError>;
}
