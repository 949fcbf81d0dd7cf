//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "tours_and_steps",
        sql: r#"
            CREATE TABLE IF NOT EXISTS tours (
                id TEXT PRIMARY KEY,
                tour_id TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                description TEXT,
                page_path TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                shadow_rgb TEXT NOT NULL DEFAULT '0,0,0',
                shadow_opacity TEXT NOT NULL DEFAULT '0.2',
                interact INTEGER NOT NULL DEFAULT 0,
                card_transition TEXT,
                show_condition TEXT,
                bg_color TEXT NOT NULL,
                text_color TEXT NOT NULL,
                font_family TEXT NOT NULL,
                device_visibility TEXT NOT NULL DEFAULT 'all',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS steps (
                id TEXT PRIMARY KEY,
                tour_id TEXT NOT NULL REFERENCES tours(id) ON DELETE CASCADE,
                order_index INTEGER NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                icon TEXT,
                selector TEXT NOT NULL,
                side TEXT NOT NULL DEFAULT 'bottom',
                show_controls INTEGER NOT NULL DEFAULT 1,
                pointer_padding INTEGER NOT NULL DEFAULT 10,
                pointer_radius INTEGER NOT NULL DEFAULT 10,
                next_route TEXT,
                prev_route TEXT,
                translations TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_steps_tour_order ON steps(tour_id, order_index);
        "#,
    },
    Migration {
        version: 2,
        name: "tour_lookup_indexes",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_tours_created ON tours(created_at);
            CREATE INDEX IF NOT EXISTS idx_tours_active_device ON tours(is_active, device_visibility);
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    tracing::info!(
        version = get_current_version(conn).await?,
        "Database migrations complete"
    );

    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_conn() -> Connection {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap();
        db.connect().unwrap()
    }

    #[tokio::test]
    async fn migrations_create_all_tables() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        for table in ["tours", "steps", "_migrations"] {
            let mut rows = conn
                .query(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    libsql::params![table],
                )
                .await
                .unwrap();
            let row = rows.next().await.unwrap().unwrap();
            let count: i64 = row.get(0).unwrap();
            assert_eq!(count, 1, "Table '{}' should exist", table);
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();

        let version = get_current_version(&conn).await.unwrap();
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn version_tracking() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        let mut rows = conn
            .query("SELECT version, name FROM _migrations ORDER BY version", ())
            .await
            .unwrap();
        let row1 = rows.next().await.unwrap().unwrap();
        assert_eq!(row1.get::<i64>(0).unwrap(), 1);
        assert_eq!(row1.get::<String>(1).unwrap(), "tours_and_steps");

        let row2 = rows.next().await.unwrap().unwrap();
        assert_eq!(row2.get::<i64>(0).unwrap(), 2);
        assert_eq!(row2.get::<String>(1).unwrap(), "tour_lookup_indexes");
    }

    #[tokio::test]
    async fn tour_slug_is_unique() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        let insert = "INSERT INTO tours (id, tour_id, name, page_path, bg_color, text_color, font_family, created_at, updated_at) \
                      VALUES (?1, 'welcome', 'Welcome', '/', 'bg', 'text', 'font', 'now', 'now')";
        conn.execute(insert, libsql::params!["a"]).await.unwrap();
        assert!(conn.execute(insert, libsql::params!["b"]).await.is_err());
    }
}
