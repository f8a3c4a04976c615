//! Connection bootstrap for file and in-memory stores.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and a busy timeout set.
//! - Returned connections have every migration applied.

use super::migrations::apply_migrations;
use super::DbResult;
use crate::config::StoreConfig;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens (or creates) a database file with default store settings.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_with_config(&StoreConfig::at_path(path.as_ref()))
}

/// Opens a private in-memory database with default store settings.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with_config(&StoreConfig::default())
}

/// Opens the database described by `config`.
///
/// # Side effects
/// - Emits `db_open` events with mode, duration and status.
pub fn open_with_config(config: &StoreConfig) -> DbResult<Connection> {
    let mode = if config.path.is_some() { "file" } else { "memory" };
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let result: DbResult<Connection> = match config.path.as_deref() {
        Some(path) => Connection::open(path),
        None => Connection::open_in_memory(),
    }
    .map_err(Into::into)
    .and_then(|mut conn| {
        bootstrap_connection(&mut conn, Duration::from_millis(config.busy_timeout_ms))?;
        Ok(conn)
    });

    match &result {
        Ok(_) => info!(
            "event=db_open module=db status=ok mode={mode} duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=db_open module=db status=error mode={mode} duration_ms={} error={err}",
            started_at.elapsed().as_millis()
        ),
    }
    result
}

fn bootstrap_connection(conn: &mut Connection, busy_timeout: Duration) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(busy_timeout)?;
    apply_migrations(conn)?;
    Ok(())
}
