#![allow(dead_code)]

use rusqlite::Connection;
use std::sync::{Arc, Mutex};

/// Shared log of step names in the order they ran
pub type RunLog = Arc<Mutex<Vec<&'static str>>>;

pub fn new_log() -> RunLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn ran(log: &RunLog) -> Vec<&'static str> {
    log.lock().unwrap().clone()
}

/// Step action that records `name` and creates a table of the same name
pub fn create_table_step(
    log: &RunLog,
    name: &'static str,
) -> impl Fn(u32, &rusqlite::Transaction<'_>) -> rusqlite::Result<()> {
    let log = log.clone();
    move |_, tx| {
        tx.execute_batch(&format!("CREATE TABLE {} (id INTEGER PRIMARY KEY)", name))?;
        log.lock().unwrap().push(name);
        Ok(())
    }
}

pub fn table_exists(conn: &Connection, name: &str) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get::<_, i64>(0),
    )
    .unwrap()
        > 0
}

pub fn stored_version(conn: &Connection) -> u32 {
    conn.query_row("SELECT version FROM version", [], |row| row.get(0))
        .unwrap()
}

pub fn version_rows(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM version", [], |row| row.get(0))
        .unwrap()
}
