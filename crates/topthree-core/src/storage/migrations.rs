//! Database schema migrations for topthree.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: items and achievements.
///
/// `day_assigned` is a nullable ISO date; NULL means backlog.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS items (
            id                   TEXT PRIMARY KEY,
            title                TEXT NOT NULL,
            is_completed         INTEGER NOT NULL DEFAULT 0,
            day_assigned         TEXT,
            order_index          INTEGER NOT NULL DEFAULT 0,
            source_item_id       TEXT,
            notes                TEXT,
            calendar_event_id    TEXT,
            calendar_event_start TEXT,
            created_at           TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS achievements (
            id                    TEXT PRIMARY KEY,
            type                  TEXT NOT NULL UNIQUE,
            earned_at             TEXT NOT NULL,
            streak_count_at_award INTEGER NOT NULL
        );",
    )?;
    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: user stats singleton and day lookup indexes.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_stats (
            key                       TEXT PRIMARY KEY,
            longest_streak            INTEGER NOT NULL DEFAULT 0,
            current_streak            INTEGER NOT NULL DEFAULT 0,
            total_top1_completed      INTEGER NOT NULL DEFAULT 0,
            total_all_three_completed INTEGER NOT NULL DEFAULT 0,
            freeze_token_count        INTEGER NOT NULL DEFAULT 0,
            last_updated_at           TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_items_day ON items(day_assigned, order_index);
        CREATE INDEX IF NOT EXISTS idx_items_source ON items(source_item_id);",
    )?;
    set_schema_version(&tx, 2)?;
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_fresh_database_reaches_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), CURRENT_VERSION);
    }

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), CURRENT_VERSION);

        let tables: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('items', 'achievements', 'user_stats')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }
}
