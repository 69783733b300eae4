//! libSQL backend — async `MissionStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::mission::model::{MissionType, TradeRecord};
use crate::store::migrations;
use crate::store::traits::MissionStore;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Read a text column, treating NULL (legacy rows) as empty.
fn text(row: &libsql::Row, idx: i32) -> String {
    row.get::<String>(idx).unwrap_or_default()
}

fn mission_type_to_str(mission_type: Option<MissionType>) -> String {
    mission_type.map(|mt| mt.to_string()).unwrap_or_default()
}

/// Map a libsql Row to a TradeRecord.
///
/// Column order matches MISSION_COLUMNS.
fn row_to_mission(row: &libsql::Row) -> TradeRecord {
    TradeRecord {
        session_key: text(row, 0),
        username: text(row, 1),
        mission_type: text(row, 2).parse().ok(),
        system_name: text(row, 3),
        station_name: text(row, 4),
        pad_size: text(row, 5),
        commodity: text(row, 6),
        carrier_name: text(row, 7),
        profit: text(row, 8),
        quantity: text(row, 9),
    }
}

// ── Trait implementation ────────────────────────────────────────────

const MISSION_COLUMNS: &str = "session_key, username, mission_type, system_name, station_name, pad_size, commodity, carrier_name, profit, quantity";

#[async_trait]
impl MissionStore for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn upsert_mission(&self, record: &TradeRecord) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute(
            &format!(
                "INSERT INTO trademissions ({MISSION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT (session_key) DO UPDATE SET
                    username = excluded.username,
                    mission_type = excluded.mission_type,
                    system_name = excluded.system_name,
                    station_name = excluded.station_name,
                    pad_size = excluded.pad_size,
                    commodity = excluded.commodity,
                    carrier_name = excluded.carrier_name,
                    profit = excluded.profit,
                    quantity = excluded.quantity"
            ),
            params![
                record.session_key.as_str(),
                record.username.as_str(),
                mission_type_to_str(record.mission_type),
                record.system_name.as_str(),
                record.station_name.as_str(),
                record.pad_size.as_str(),
                record.commodity.as_str(),
                record.carrier_name.as_str(),
                record.profit.as_str(),
                record.quantity.as_str(),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("upsert_mission: {e}")))?;

        debug!(session_key = %record.session_key, "Trade mission upserted");
        Ok(())
    }

    async fn get_mission(&self, session_key: &str) -> Result<Option<TradeRecord>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {MISSION_COLUMNS} FROM trademissions WHERE session_key = ?1"),
                params![session_key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_mission: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_mission(&row))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_mission: {e}"))),
        }
    }

    async fn delete_mission(&self, session_key: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let count = conn
            .execute(
                "DELETE FROM trademissions WHERE session_key = ?1",
                params![session_key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_mission: {e}")))?;

        debug!(session_key, deleted = count > 0, "Trade mission delete");
        Ok(count > 0)
    }
}
