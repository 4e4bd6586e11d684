// src/db/schema.rs

//! Database schema definitions and migrations for mandex
//!
//! This module defines the SQLite schema for the index tables and provides
//! a migration system to evolve the schema over time.

use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        debug!("Schema is up to date");
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!("Schema migration complete. Now at version {}", SCHEMA_VERSION);
    Ok(())
}

/// Apply a specific migration version
fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        2 => migrate_v2(conn),
        _ => Err(Error::InitError(format!(
            "Unknown migration version: {}",
            version
        ))),
    }
}

/// Initial schema - Version 1
///
/// Creates the core index tables:
/// - packages: One row per package name, version only moves forward
/// - manual_pages: Extracted and rendered pages keyed by archive filename
/// - redirects: Append-only log of resolved symlink aliases
/// - index_meta: Singleton row with index freshness and package totals
/// - executions: One row per indexer run
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        CREATE TABLE packages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            repo TEXT NOT NULL,
            version TEXT NOT NULL,
            filename TEXT NOT NULL,
            arch TEXT,
            upstream TEXT,
            license TEXT,
            url TEXT NOT NULL,
            sha256 TEXT,
            man_paths TEXT NOT NULL DEFAULT '[]',
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE manual_pages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            package TEXT NOT NULL,
            repo TEXT NOT NULL,
            filename TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            section TEXT NOT NULL,
            locale TEXT NOT NULL,
            headings TEXT NOT NULL DEFAULT '[]',
            description TEXT,
            content TEXT NOT NULL,
            html_content TEXT NOT NULL DEFAULT '',
            txt_content TEXT NOT NULL DEFAULT '',
            so_resolved INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX idx_manual_pages_lookup ON manual_pages(name, section, locale);
        CREATE INDEX idx_manual_pages_package ON manual_pages(package);

        -- No uniqueness: repeated runs may append the same alias again
        CREATE TABLE redirects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_name TEXT NOT NULL,
            source_section TEXT NOT NULL,
            source_locale TEXT NOT NULL,
            target_name TEXT NOT NULL,
            target_section TEXT NOT NULL,
            target_locale TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX idx_redirects_source ON redirects(source_name, source_section, source_locale);

        CREATE TABLE index_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            timestamp INTEGER NOT NULL DEFAULT 0,
            haveman_pkgs INTEGER NOT NULL DEFAULT 0,
            total_pkgs INTEGER NOT NULL DEFAULT 0
        );

        INSERT INTO index_meta (id) VALUES (1);

        CREATE TABLE executions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            start_time INTEGER NOT NULL,
            execution_time INTEGER NOT NULL,
            updated_pkgs INTEGER NOT NULL,
            updated_pages INTEGER NOT NULL
        );
        ",
    )?;

    info!("Schema version 1 created successfully");
    Ok(())
}

/// Schema Version 2: Partial index for the `.so` post-pass
///
/// The post-pass scans unresolved stubs on every run. Ordinary pages never
/// mention `.so` and stay out of the index.
fn migrate_v2(conn: &Connection) -> Result<()> {
    debug!("Migrating to schema version 2");

    conn.execute_batch(
        "
        CREATE INDEX idx_manual_pages_unresolved ON manual_pages(filename)
            WHERE so_resolved = 0 AND instr(content, '.so') > 0;
        ",
    )?;

    info!("Schema version 2 applied successfully");
    Ok(())
}
