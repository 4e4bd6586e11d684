// src/resolver/mod.rs

//! Redirect resolution
//!
//! Pages reach each other in two ways: symlink members in package archives,
//! which become rows in the redirect table, and `.so` include stubs, which
//! are backfilled with their target's render after extraction. Lookups then
//! follow redirect rows until a stored page is found.

pub mod so_links;
pub mod symlink;

pub use so_links::{SoStats, resolve_so_links, so_target};
pub use symlink::{SkipReason, SymlinkOutcome, resolve_symlink};

use crate::db::models::{ManualPage, Redirect};
use crate::error::Result;
use rusqlite::Connection;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Upper bound on redirect rows followed by one lookup
pub const MAX_REDIRECT_HOPS: usize = 16;

/// Look up a page, following redirects when no page matches directly
///
/// Each hop is keyed by (name, section, locale); revisiting one ends the
/// walk, as does exceeding `MAX_REDIRECT_HOPS`.
pub fn follow_redirects(
    conn: &Connection,
    name: &str,
    section: Option<&str>,
    locale: Option<&str>,
) -> Result<Option<ManualPage>> {
    let mut name = name.to_string();
    let mut section = section.map(str::to_string);
    let mut locale = locale.map(str::to_string);
    let mut visited: HashSet<(String, Option<String>, Option<String>)> = HashSet::new();

    for _ in 0..=MAX_REDIRECT_HOPS {
        if let Some(page) = ManualPage::lookup(conn, &name, section.as_deref(), locale.as_deref())? {
            return Ok(Some(page));
        }

        if !visited.insert((name.clone(), section.clone(), locale.clone())) {
            warn!("Redirect loop at {}", name);
            return Ok(None);
        }

        let Some(redirect) =
            Redirect::find_by_source(conn, &name, section.as_deref(), locale.as_deref())?
        else {
            return Ok(None);
        };

        debug!(
            "Redirect {}({}) -> {}({})",
            redirect.source_name, redirect.source_section, redirect.target_name, redirect.target_section
        );
        name = redirect.target_name;
        section = Some(redirect.target_section);
        locale = Some(redirect.target_locale);
    }

    warn!("Gave up following redirects after {} hops", MAX_REDIRECT_HOPS);
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use crate::manpath;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        schema::migrate(&conn).unwrap();
        (temp_file, conn)
    }

    fn store(conn: &Connection, path: &str) {
        let m = manpath::classify(path).unwrap();
        let mut page = ManualPage::new(
            "pkg".to_string(),
            "core".to_string(),
            path.to_string(),
            m.name,
            m.section,
            m.locale,
            format!(".TH {}", path),
        );
        page.upsert(conn).unwrap();
    }

    fn link(conn: &Connection, from: (&str, &str), to: (&str, &str)) {
        Redirect::insert_batch(
            conn,
            &[Redirect {
                source_name: from.0.to_string(),
                source_section: from.1.to_string(),
                source_locale: "en".to_string(),
                target_name: to.0.to_string(),
                target_section: to.1.to_string(),
                target_locale: "en".to_string(),
            }],
        )
        .unwrap();
    }

    #[test]
    fn test_direct_hit_needs_no_redirect() {
        let (_temp, conn) = create_test_db();
        store(&conn, "usr/share/man/man1/ls.1");

        let page = follow_redirects(&conn, "ls", None, None).unwrap().unwrap();
        assert_eq!(page.filename, "usr/share/man/man1/ls.1");
    }

    #[test]
    fn test_multi_hop_chain() {
        let (_temp, conn) = create_test_db();
        store(&conn, "usr/share/man/man8/mount.8");
        link(&conn, ("a", "1"), ("b", "1"));
        link(&conn, ("b", "1"), ("mount", "8"));

        let page = follow_redirects(&conn, "a", Some("1"), None).unwrap().unwrap();
        assert_eq!(page.name, "mount");
        assert_eq!(page.section, "8");
    }

    #[test]
    fn test_loop_terminates() {
        let (_temp, conn) = create_test_db();
        link(&conn, ("a", "1"), ("b", "1"));
        link(&conn, ("b", "1"), ("a", "1"));

        assert!(follow_redirects(&conn, "a", Some("1"), Some("en")).unwrap().is_none());
    }

    #[test]
    fn test_unknown_name() {
        let (_temp, conn) = create_test_db();
        assert!(follow_redirects(&conn, "nothing", None, None).unwrap().is_none());
    }
}
