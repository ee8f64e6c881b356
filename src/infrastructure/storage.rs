use crate::infrastructure::error::InfraError;
use rusqlite::Connection;
use std::path::Path;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

/// Creates the schedule database if needed and applies the key/value schema.
/// WAL mode keeps trigger-path writes from stalling a concurrent command
/// read. Idempotent; runs on every start.
pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = Connection::open(path)?;
    let _mode: String = connection.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
