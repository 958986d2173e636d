//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use hubsync_core::time::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(version = CURRENT_VERSION, "schema migrated");
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: a single ordered key-value table.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Every row the hub persists: messages, set indexes, signer index,
        -- sync id index and hub events. Key layout lives in hubsync_core::keys.
        CREATE TABLE kv (
            key BLOB PRIMARY KEY,
            value BLOB NOT NULL
        ) WITHOUT ROWID;
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"kv".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (99, 0)",
            [],
        )
        .unwrap();
        assert!(matches!(migrate(&mut conn), Err(StoreError::Migration(_))));
    }
}
