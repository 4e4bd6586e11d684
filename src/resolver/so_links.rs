// src/resolver/so_links.rs

//! `.so` include dereferencing
//!
//! A page whose only request is `.so man1/other.1` is a stub: it has no
//! content of its own and renders as whatever it includes. Stubs are stored
//! unrendered during extraction; this post-pass copies the rendered target
//! into them once the target exists in the store.

use crate::db::models::{ManualPage, UnresolvedPage};
use crate::error::Result;
use crate::manpath::{self, MAN_ROOT};
use crate::packages::strip_compression_suffix;
use crate::render::{Renderer, render_page};
use regex::Regex;
use rusqlite::Connection;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static SO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\.so\s+(\S+)\s*$").unwrap());

/// Counters from one post-pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoStats {
    /// Stub pages examined
    pub stubs: usize,
    pub resolved: usize,
    pub unresolved: usize,
}

fn is_comment(line: &str) -> bool {
    line.starts_with(".\\\"")
        || line.starts_with("'\\\"")
        || line.starts_with(".\\#")
        || line.starts_with("\\\"")
        || line.starts_with("\\#")
}

/// Include path of a pure `.so` stub
///
/// Comment and blank lines are ignored; exactly one `.so` request must
/// remain.
pub fn so_target(content: &str) -> Option<&str> {
    let mut lines = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != "." && !is_comment(line));

    let line = lines.next()?;
    if lines.next().is_some() {
        return None;
    }
    SO_RE.captures(line).and_then(|caps| caps.get(1)).map(|m| m.as_str())
}

/// Archive path an include refers to. Includes are relative to the man
/// root unless they already name it.
fn include_path(include: &str) -> String {
    let include = strip_compression_suffix(include.trim_start_matches('/'));
    if include.starts_with(MAN_ROOT) {
        include.to_string()
    } else {
        format!("{}/{}", MAN_ROOT, include)
    }
}

/// Find the page an include names, preferring the stub's own locale
fn lookup_include(conn: &Connection, include: &str, locale: &str) -> Result<Option<ManualPage>> {
    let path = include_path(include);
    let target = match manpath::classify(&path) {
        Ok(m) => m,
        Err(e) => {
            warn!("Unrecognized .so target {}: {}", include, e.reason);
            return Ok(None);
        }
    };

    if let Some(page) =
        ManualPage::find_by_name_section_locale(conn, &target.name, &target.section, locale)?
    {
        return Ok(Some(page));
    }
    ManualPage::find_by_name_and_section(conn, &target.name, &target.section)
}

/// Follow includes from `stub` until a page with real content
///
/// Returns None on a missing target or a cycle.
fn final_target(conn: &Connection, stub: &UnresolvedPage) -> Result<Option<ManualPage>> {
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(stub.filename.clone());

    let mut include = match so_target(&stub.content) {
        Some(include) => include.to_string(),
        None => return Ok(None),
    };

    loop {
        let Some(page) = lookup_include(conn, &include, &stub.locale)? else {
            warn!("Target of .so in {} not found: {}", stub.filename, include);
            return Ok(None);
        };

        if !visited.insert(page.filename.clone()) {
            warn!("Cycle in .so chain starting at {}", stub.filename);
            return Ok(None);
        }

        match so_target(&page.content) {
            Some(next) => {
                debug!("{} is itself a stub for {}", page.filename, next);
                include = next.to_string();
            }
            None => return Ok(Some(page)),
        }
    }
}

/// Resolve every unresolved `.so` stub in the store
///
/// Resolved stubs get the rendered content of their final target and are
/// never scanned again. Missing targets, cycles and render failures leave
/// the stub unresolved for a later run.
pub fn resolve_so_links<R: Renderer + ?Sized>(conn: &Connection, renderer: &R) -> Result<SoStats> {
    let mut stats = SoStats::default();

    for stub in ManualPage::list_unresolved(conn)? {
        if so_target(&stub.content).is_none() {
            continue;
        }
        stats.stubs += 1;

        let Some(target) = final_target(conn, &stub)? else {
            stats.unresolved += 1;
            continue;
        };

        let rendered = match render_page(renderer, &target.content, &stub.locale) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!("Failed to render {} for {}: {}", target.filename, stub.filename, e);
                stats.unresolved += 1;
                continue;
            }
        };

        let Some(mut page) = ManualPage::find_by_filename(conn, &stub.filename)? else {
            stats.unresolved += 1;
            continue;
        };
        page.html_content = rendered.html;
        page.txt_content = rendered.text;
        page.headings = rendered.headings;
        page.description = rendered.description;
        page.mark_so_resolved(conn)?;

        debug!("Resolved .so link {} -> {}", page.filename, target.filename);
        stats.resolved += 1;
    }

    info!(
        ".so post-pass: {} stubs, {} resolved, {} unresolved",
        stats.stubs, stats.resolved, stats.unresolved
    );
    Ok(stats)
}
