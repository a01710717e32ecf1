//! Database migrations using a versioned migration pattern.
//!
//! Each migration runs exactly once and is tracked in the `schema_migrations` table.
//! Migrations are applied in order by version number.

use rusqlite::{params, Connection};

/// A database migration with a version number, name, and SQL to execute.
pub struct Migration {
    /// Unique version number (migrations run in order)
    pub version: i64,
    /// Human-readable name for the migration
    pub name: &'static str,
    /// SQL to execute (can be multiple statements)
    pub sql: &'static str,
}

/// All migrations in order. New migrations should be added at the end.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_profiles_table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                namespace TEXT NOT NULL,
                user_id TEXT,
                advertising_id TEXT,
                install_id TEXT,
                ssaid TEXT,
                device_token TEXT,
                digest TEXT,
                extended INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_played TEXT,
                UNIQUE (namespace, name)
            );
        "#,
    },
    Migration {
        version: 2,
        name: "create_customers_table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS customers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                friend_link TEXT,
                friend_code TEXT,
                user_id TEXT,
                slots INTEGER NOT NULL DEFAULT 4,
                notes TEXT,
                created_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 3,
        name: "create_events_table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                starts_on TEXT,
                ends_on TEXT,
                created_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 4,
        name: "create_teams_table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS teams (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                customer_id INTEGER,
                slot_1 INTEGER,
                slot_2 INTEGER,
                slot_3 INTEGER,
                slot_4 INTEGER,
                created_at TEXT NOT NULL,
                FOREIGN KEY (event_id) REFERENCES events(id) ON DELETE CASCADE,
                FOREIGN KEY (customer_id) REFERENCES customers(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_teams_event ON teams(event_id);
        "#,
    },
    Migration {
        version: 5,
        name: "create_activity_log_table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS activity_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                category TEXT NOT NULL,
                description TEXT NOT NULL,
                profile_id INTEGER,
                created_at TEXT NOT NULL,
                FOREIGN KEY (profile_id) REFERENCES profiles(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_activity_created ON activity_log(created_at);
        "#,
    },
    Migration {
        version: 6,
        name: "add_profile_status_columns",
        sql: r#"
            ALTER TABLE profiles ADD COLUMN suspension TEXT NOT NULL DEFAULT '0';
            ALTER TABLE profiles ADD COLUMN has_error INTEGER NOT NULL DEFAULT 0;
            ALTER TABLE profiles ADD COLUMN note TEXT;
        "#,
    },
    Migration {
        version: 7,
        name: "add_profiles_deleted_at",
        sql: "ALTER TABLE profiles ADD COLUMN deleted_at TEXT;",
    },
    Migration {
        version: 8,
        name: "add_profiles_suspension_count",
        sql: "ALTER TABLE profiles ADD COLUMN suspension_count INTEGER NOT NULL DEFAULT 0;",
    },
];

/// Create the schema_migrations table if it doesn't exist.
fn ensure_migrations_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Get the set of already-applied migration versions.
fn get_applied_versions(conn: &Connection) -> rusqlite::Result<std::collections::HashSet<i64>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
    let versions = stmt
        .query_map([], |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<std::collections::HashSet<i64>>>()?;
    Ok(versions)
}

/// Run all pending migrations.
pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    ensure_migrations_table(conn)?;
    let applied = get_applied_versions(conn)?;

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }

        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );

        // Migration SQL and its bookkeeping row commit together
        let now = chrono::Utc::now().to_rfc3339();
        let tx = conn.transaction()?;
        let result = tx.execute_batch(migration.sql).and_then(|_| {
            tx.execute(
                "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![migration.version, migration.name, now],
            )
        });
        if let Err(e) = result.and_then(|_| tx.commit()) {
            tracing::error!(
                version = migration.version,
                name = migration.name,
                error = %e,
                "Migration failed"
            );
            return Err(e);
        }
    }

    Ok(())
}
