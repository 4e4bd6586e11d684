// src/db/models.rs

//! Data models for mandex database entities
//!
//! This module defines Rust structs that correspond to database tables
//! and provides methods for creating, reading and updating records.
//! Lookups with optional qualifiers are a fixed set of typed queries rather
//! than SQL assembled at runtime.

use crate::error::Result;
use crate::manpath::DEFAULT_LOCALE;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

/// Decode a JSON text column, mapping failures to a conversion error
fn json_column<T: serde::de::DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// A package observed in the repository index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub id: Option<i64>,
    pub name: String,
    pub repo: String,
    pub version: String,
    pub filename: String,
    pub arch: Option<String>,
    pub upstream: Option<String>,
    pub license: Option<String>,
    pub url: String,
    pub sha256: Option<String>,
    pub man_paths: Vec<String>,
}

const PACKAGE_COLUMNS: &str =
    "id, name, repo, version, filename, arch, upstream, license, url, sha256, man_paths";

impl Package {
    /// Create a new Package
    pub fn new(name: String, repo: String, version: String, filename: String, url: String) -> Self {
        Self {
            id: None,
            name,
            repo,
            version,
            filename,
            arch: None,
            upstream: None,
            license: None,
            url,
            sha256: None,
            man_paths: Vec::new(),
        }
    }

    /// Insert this package into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO packages (name, repo, version, filename, arch, upstream, license, url, sha256, man_paths)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &self.name,
                &self.repo,
                &self.version,
                &self.filename,
                &self.arch,
                &self.upstream,
                &self.license,
                &self.url,
                &self.sha256,
                serde_json::to_string(&self.man_paths)?,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Replace the stored row for this package name in place
    pub fn update(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "UPDATE packages SET repo = ?1, version = ?2, filename = ?3, arch = ?4, upstream = ?5,
             license = ?6, url = ?7, sha256 = ?8, man_paths = ?9, updated_at = CURRENT_TIMESTAMP
             WHERE name = ?10",
            params![
                &self.repo,
                &self.version,
                &self.filename,
                &self.arch,
                &self.upstream,
                &self.license,
                &self.url,
                &self.sha256,
                serde_json::to_string(&self.man_paths)?,
                &self.name,
            ],
        )?;
        Ok(())
    }

    /// Remove a package by name
    pub fn delete(conn: &Connection, name: &str) -> Result<()> {
        conn.execute("DELETE FROM packages WHERE name = ?1", [name])?;
        Ok(())
    }

    /// Find a package by name
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages WHERE name = ?1",
            PACKAGE_COLUMNS
        ))?;

        let package = stmt.query_row([name], Self::from_row).optional()?;

        Ok(package)
    }

    /// Stored version of a package, if it has been seen before
    pub fn version_of(conn: &Connection, name: &str) -> Result<Option<String>> {
        let version = conn
            .query_row(
                "SELECT version FROM packages WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }

    /// List all packages
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM packages ORDER BY name",
            PACKAGE_COLUMNS
        ))?;

        let packages = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(packages)
    }

    /// Count stored packages
    pub fn count(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM packages", [], |row| row.get(0))?)
    }

    /// Convert a database row to a Package
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            repo: row.get(2)?,
            version: row.get(3)?,
            filename: row.get(4)?,
            arch: row.get(5)?,
            upstream: row.get(6)?,
            license: row.get(7)?,
            url: row.get(8)?,
            sha256: row.get(9)?,
            man_paths: json_column(row, 10)?,
        })
    }
}

/// A section heading extracted from rendered HTML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub id: String,
    pub title: String,
}

/// A manual page extracted from a package archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualPage {
    pub id: Option<i64>,
    pub package: String,
    pub repo: String,
    pub filename: String,
    pub name: String,
    pub section: String,
    pub locale: String,
    pub headings: Vec<Heading>,
    pub description: Option<String>,
    pub content: String,
    pub html_content: String,
    pub txt_content: String,
    pub so_resolved: bool,
}

const MANUAL_PAGE_COLUMNS: &str = "id, package, repo, filename, name, section, locale, headings, \
     description, content, html_content, txt_content, so_resolved";

/// Prefer the default locale, then the lowest section, when a lookup is ambiguous
const MANUAL_PAGE_ORDER: &str = "ORDER BY locale != ?9, section, filename LIMIT 1";

impl ManualPage {
    /// Create a new unrendered ManualPage
    pub fn new(
        package: String,
        repo: String,
        filename: String,
        name: String,
        section: String,
        locale: String,
        content: String,
    ) -> Self {
        Self {
            id: None,
            package,
            repo,
            filename,
            name,
            section,
            locale,
            headings: Vec::new(),
            description: None,
            content,
            html_content: String::new(),
            txt_content: String::new(),
            so_resolved: false,
        }
    }

    /// Insert or replace this page, keyed by filename
    ///
    /// Skips the write entirely when the stored raw content is identical, so
    /// renders derived from unchanged content (including `.so` backfills)
    /// are never clobbered. A rewrite resets the `.so` resolution flag.
    ///
    /// Returns true when a row was written.
    pub fn upsert(&mut self, conn: &Connection) -> Result<bool> {
        let stored: Option<String> = conn
            .query_row(
                "SELECT content FROM manual_pages WHERE filename = ?1",
                [&self.filename],
                |row| row.get(0),
            )
            .optional()?;

        if stored.as_deref() == Some(self.content.as_str()) {
            return Ok(false);
        }

        conn.execute(
            "INSERT INTO manual_pages (package, repo, filename, name, section, locale, headings,
                 description, content, html_content, txt_content, so_resolved)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0)
             ON CONFLICT(filename) DO UPDATE SET
                 package = excluded.package,
                 repo = excluded.repo,
                 name = excluded.name,
                 section = excluded.section,
                 locale = excluded.locale,
                 headings = excluded.headings,
                 description = excluded.description,
                 content = excluded.content,
                 html_content = excluded.html_content,
                 txt_content = excluded.txt_content,
                 so_resolved = 0",
            params![
                &self.package,
                &self.repo,
                &self.filename,
                &self.name,
                &self.section,
                &self.locale,
                serde_json::to_string(&self.headings)?,
                &self.description,
                &self.content,
                &self.html_content,
                &self.txt_content,
            ],
        )?;

        self.so_resolved = false;
        self.id = conn
            .query_row(
                "SELECT id FROM manual_pages WHERE filename = ?1",
                [&self.filename],
                |row| row.get(0),
            )
            .optional()?;
        Ok(true)
    }

    /// Store backfilled renders for a `.so` stub and flag it resolved
    pub fn mark_so_resolved(&mut self, conn: &Connection) -> Result<()> {
        conn.execute(
            "UPDATE manual_pages SET headings = ?1, description = ?2, html_content = ?3,
             txt_content = ?4, so_resolved = 1 WHERE filename = ?5",
            params![
                serde_json::to_string(&self.headings)?,
                &self.description,
                &self.html_content,
                &self.txt_content,
                &self.filename,
            ],
        )?;
        self.so_resolved = true;
        Ok(())
    }

    /// Find a page by its archive filename
    pub fn find_by_filename(conn: &Connection, filename: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM manual_pages WHERE filename = ?1",
            MANUAL_PAGE_COLUMNS
        ))?;
        Ok(stmt.query_row([filename], Self::from_row).optional()?)
    }

    /// Find a page by name only
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Self>> {
        Self::query_one(
            conn,
            "name = ?1",
            params![name, None::<String>, None::<String>],
        )
    }

    /// Find a page by name and section
    pub fn find_by_name_and_section(
        conn: &Connection,
        name: &str,
        section: &str,
    ) -> Result<Option<Self>> {
        Self::query_one(
            conn,
            "name = ?1 AND section = ?2",
            params![name, section, None::<String>],
        )
    }

    /// Find a page by name and locale
    pub fn find_by_name_and_locale(
        conn: &Connection,
        name: &str,
        locale: &str,
    ) -> Result<Option<Self>> {
        Self::query_one(
            conn,
            "name = ?1 AND locale = ?3",
            params![name, None::<String>, locale],
        )
    }

    /// Find a page by name, section and locale
    pub fn find_by_name_section_locale(
        conn: &Connection,
        name: &str,
        section: &str,
        locale: &str,
    ) -> Result<Option<Self>> {
        Self::query_one(
            conn,
            "name = ?1 AND section = ?2 AND locale = ?3",
            params![name, section, locale],
        )
    }

    /// Progressively qualified lookup
    pub fn lookup(
        conn: &Connection,
        name: &str,
        section: Option<&str>,
        locale: Option<&str>,
    ) -> Result<Option<Self>> {
        match (section, locale) {
            (None, None) => Self::find_by_name(conn, name),
            (Some(section), None) => Self::find_by_name_and_section(conn, name, section),
            (None, Some(locale)) => Self::find_by_name_and_locale(conn, name, locale),
            (Some(section), Some(locale)) => {
                Self::find_by_name_section_locale(conn, name, section, locale)
            }
        }
    }

    /// Possible `.so` stubs the post-pass has not resolved yet
    ///
    /// Only pages whose raw content mentions `.so` are returned, and only
    /// the columns needed to follow the include. The filter matches the
    /// partial index on unresolved stubs.
    pub fn list_unresolved(conn: &Connection) -> Result<Vec<UnresolvedPage>> {
        let mut stmt = conn.prepare(
            "SELECT filename, locale, content FROM manual_pages
             WHERE so_resolved = 0 AND instr(content, '.so') > 0
             ORDER BY filename",
        )?;

        let pages = stmt
            .query_map([], |row| {
                Ok(UnresolvedPage {
                    filename: row.get(0)?,
                    locale: row.get(1)?,
                    content: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(pages)
    }

    /// Count stored pages
    pub fn count(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM manual_pages", [], |row| row.get(0))?)
    }

    /// Run one of the fixed lookup filters. Parameters are always
    /// (name, section, locale); `?9` is the preferred locale for ordering.
    fn query_one(
        conn: &Connection,
        filter: &'static str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Option<Self>> {
        let sql = format!(
            "SELECT {} FROM manual_pages WHERE {} {}",
            MANUAL_PAGE_COLUMNS, filter, MANUAL_PAGE_ORDER
        );
        let mut stmt = conn.prepare(&sql)?;
        for (idx, value) in params.iter().enumerate() {
            stmt.raw_bind_parameter(idx + 1, value)?;
        }
        stmt.raw_bind_parameter(9, DEFAULT_LOCALE)?;

        let mut rows = stmt.raw_query();
        match rows.next()? {
            Some(row) => Ok(Some(Self::from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Convert a database row to a ManualPage
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            package: row.get(1)?,
            repo: row.get(2)?,
            filename: row.get(3)?,
            name: row.get(4)?,
            section: row.get(5)?,
            locale: row.get(6)?,
            headings: json_column(row, 7)?,
            description: row.get(8)?,
            content: row.get(9)?,
            html_content: row.get(10)?,
            txt_content: row.get(11)?,
            so_resolved: row.get::<_, i64>(12)? != 0,
        })
    }
}

/// The parts of a stored page the `.so` post-pass reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedPage {
    pub filename: String,
    pub locale: String,
    pub content: String,
}

/// A resolved alias from one page to another in the same locale
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub source_name: String,
    pub source_section: String,
    pub source_locale: String,
    pub target_name: String,
    pub target_section: String,
    pub target_locale: String,
}

impl Redirect {
    /// Append a batch of redirects. Duplicates are kept.
    pub fn insert_batch(conn: &Connection, redirects: &[Redirect]) -> Result<usize> {
        let mut stmt = conn.prepare(
            "INSERT INTO redirects (source_name, source_section, source_locale,
                 target_name, target_section, target_locale)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;

        for r in redirects {
            stmt.execute(params![
                &r.source_name,
                &r.source_section,
                &r.source_locale,
                &r.target_name,
                &r.target_section,
                &r.target_locale,
            ])?;
        }

        Ok(redirects.len())
    }

    /// Find the redirect leaving a (name, section?, locale?) source
    pub fn find_by_source(
        conn: &Connection,
        name: &str,
        section: Option<&str>,
        locale: Option<&str>,
    ) -> Result<Option<Self>> {
        let filter = match (section, locale) {
            (None, None) => "source_name = ?1",
            (Some(_), None) => "source_name = ?1 AND source_section = ?2",
            (None, Some(_)) => "source_name = ?1 AND source_locale = ?3",
            (Some(_), Some(_)) => {
                "source_name = ?1 AND source_section = ?2 AND source_locale = ?3"
            }
        };

        let sql = format!(
            "SELECT source_name, source_section, source_locale, target_name, target_section, target_locale
             FROM redirects WHERE {} ORDER BY source_locale != ?4, source_section, id LIMIT 1",
            filter
        );
        let mut stmt = conn.prepare(&sql)?;
        stmt.raw_bind_parameter(1, name)?;
        if let Some(section) = section {
            stmt.raw_bind_parameter(2, section)?;
        }
        if let Some(locale) = locale {
            stmt.raw_bind_parameter(3, locale)?;
        }
        stmt.raw_bind_parameter(4, DEFAULT_LOCALE)?;

        let mut rows = stmt.raw_query();
        match rows.next()? {
            Some(row) => Ok(Some(Self::from_row(row)?)),
            None => Ok(None),
        }
    }

    /// List all redirects in insertion order
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT source_name, source_section, source_locale, target_name, target_section, target_locale
             FROM redirects ORDER BY id",
        )?;

        let redirects = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(redirects)
    }

    /// Count stored redirects
    pub fn count(conn: &Connection) -> Result<i64> {
        Ok(conn.query_row("SELECT COUNT(*) FROM redirects", [], |row| row.get(0))?)
    }

    /// Convert a database row to a Redirect
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            source_name: row.get(0)?,
            source_section: row.get(1)?,
            source_locale: row.get(2)?,
            target_name: row.get(3)?,
            target_section: row.get(4)?,
            target_locale: row.get(5)?,
        })
    }
}

/// Process-wide index bookkeeping (singleton row)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexMeta {
    /// Last-Modified of the index file we last accepted, unix seconds
    pub timestamp: i64,
    pub haveman_pkgs: i64,
    pub total_pkgs: i64,
}

impl IndexMeta {
    /// Read the singleton row
    pub fn get(conn: &Connection) -> Result<Self> {
        let meta = conn
            .query_row(
                "SELECT timestamp, haveman_pkgs, total_pkgs FROM index_meta WHERE id = 1",
                [],
                |row| {
                    Ok(Self {
                        timestamp: row.get(0)?,
                        haveman_pkgs: row.get(1)?,
                        total_pkgs: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(meta.unwrap_or_default())
    }

    /// Record the Last-Modified time of the accepted index file
    pub fn set_timestamp(conn: &Connection, timestamp: i64) -> Result<()> {
        conn.execute(
            "INSERT INTO index_meta (id, timestamp) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET timestamp = excluded.timestamp",
            [timestamp],
        )?;
        Ok(())
    }

    /// Record package totals from the latest index scan
    pub fn set_package_totals(conn: &Connection, haveman_pkgs: i64, total_pkgs: i64) -> Result<()> {
        conn.execute(
            "INSERT INTO index_meta (id, haveman_pkgs, total_pkgs) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET haveman_pkgs = excluded.haveman_pkgs,
                 total_pkgs = excluded.total_pkgs",
            [haveman_pkgs, total_pkgs],
        )?;
        Ok(())
    }
}

/// One indexer run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub id: Option<i64>,
    pub start_time: i64,
    pub execution_time: i64,
    pub updated_pkgs: i64,
    pub updated_pages: i64,
}

impl Execution {
    /// Create a new Execution record
    pub fn new(start_time: i64, execution_time: i64, updated_pkgs: i64, updated_pages: i64) -> Self {
        Self {
            id: None,
            start_time,
            execution_time,
            updated_pkgs,
            updated_pages,
        }
    }

    /// Append this execution
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO executions (start_time, execution_time, updated_pkgs, updated_pages)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                self.start_time,
                self.execution_time,
                self.updated_pkgs,
                self.updated_pages
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Most recent executions first
    pub fn list_recent(conn: &Connection, limit: usize) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, start_time, execution_time, updated_pkgs, updated_pages
             FROM executions ORDER BY id DESC LIMIT ?1",
        )?;

        let executions = stmt
            .query_map([limit as i64], |row| {
                Ok(Self {
                    id: Some(row.get(0)?),
                    start_time: row.get(1)?,
                    execution_time: row.get(2)?,
                    updated_pkgs: row.get(3)?,
                    updated_pages: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(executions)
    }
}
