//! SurrealDB schema migrations and initialization
//!
//! Sets up every table a memory pool needs, with the uniqueness constraints
//! that back the storage trait guarantees.

use crate::error::StateError;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all MemAgent tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing MemAgent SurrealDB schema");

    init_records_table(db).await?;
    init_tombstones_table(db).await?;
    init_metadata_table(db).await?;
    init_history_table(db).await?;

    info!("MemAgent schema initialization complete");
    Ok(())
}

async fn run_definitions(db: &Surreal<Any>, table: &str, sql: &str) -> Result<()> {
    db.query(sql)
        .await
        .and_then(|res| res.check())
        .map_err(|e| StateError::SchemaSetup(format!("{table}: {e}")))?;
    Ok(())
}

/// Initialize `memory_records` table
///
/// Schema:
/// ```text
/// TABLE memory_records {
///   memory_id:   STRING (unique)
///   content:     STRING
///   user_id:     STRING? (indexed)
///   agent_id:    STRING? (indexed)
///   run_id:      STRING? (indexed)
///   embedding:   ARRAY<FLOAT>
///   created_at:  DATETIME
///   updated_at:  DATETIME
/// }
/// ```
async fn init_records_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing memory_records table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS memory_records SCHEMALESS;

        DEFINE INDEX IF NOT EXISTS idx_memory_id ON TABLE memory_records COLUMNS memory_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_user_id ON TABLE memory_records COLUMNS user_id;
        DEFINE INDEX IF NOT EXISTS idx_agent_id ON TABLE memory_records COLUMNS agent_id;
        DEFINE INDEX IF NOT EXISTS idx_run_id ON TABLE memory_records COLUMNS run_id;
        DEFINE INDEX IF NOT EXISTS idx_created_at ON TABLE memory_records COLUMNS created_at;
    "#;

    run_definitions(db, "memory_records", sql).await?;
    info!("✓ memory_records table initialized");
    Ok(())
}

/// Initialize `memory_tombstones` table
///
/// One row per removed memory id; inserting a record whose id has a
/// tombstone is rejected so ids are never resurrected.
async fn init_tombstones_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing memory_tombstones table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS memory_tombstones SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_tombstone_memory_id ON TABLE memory_tombstones COLUMNS memory_id UNIQUE;
    "#;

    run_definitions(db, "memory_tombstones", sql).await?;
    info!("✓ memory_tombstones table initialized");
    Ok(())
}

/// Initialize `memory_metadata` table
///
/// Rows are addressed directly as `memory_metadata:<memory_id>` so that
/// upserts are single-statement atomic read-modify-writes.
async fn init_metadata_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing memory_metadata table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS memory_metadata SCHEMALESS;

        DEFINE INDEX IF NOT EXISTS idx_metadata_memory_id ON TABLE memory_metadata COLUMNS memory_id UNIQUE;
    "#;

    run_definitions(db, "memory_metadata", sql).await?;
    info!("✓ memory_metadata table initialized");
    Ok(())
}

/// Initialize `memory_history` table
///
/// Schema:
/// ```text
/// TABLE memory_history {
///   entry_id:   STRING (unique)
///   memory_id:  STRING (not a foreign key; may outlive the record)
///   seq:        INT (monotonic within memory_id, 1-indexed)
///   action:     STRING (ADD | UPDATE | DELETE | DECAY)
///   payload:    STRING
///   timestamp:  DATETIME
/// }
/// ```
///
/// Constraints:
/// - `(memory_id, seq)` is unique; concurrent writers cannot interleave a
///   duplicate position into one record's history
/// - Rows are never updated
async fn init_history_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing memory_history table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS memory_history SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete FULL;

        DEFINE INDEX IF NOT EXISTS idx_entry_id ON TABLE memory_history COLUMNS entry_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_history_memory_seq ON TABLE memory_history COLUMNS memory_id, seq UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_history_memory_id ON TABLE memory_history COLUMNS memory_id;
    "#;

    run_definitions(db, "memory_history", sql).await?;
    info!("✓ memory_history table initialized");
    Ok(())
}
