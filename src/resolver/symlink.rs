// src/resolver/symlink.rs

//! Symlink members to redirects

use crate::db::models::Redirect;
use crate::manpath;
use tracing::warn;

/// Why a symlink produced no redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The link itself is not a man page path
    UnknownSource,
    /// The resolved target is not a man page path
    UnknownTarget(String),
    /// Source and target are filed under different locales
    CrossLocale,
    /// Source and target share name and section
    SameName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymlinkOutcome {
    Redirect(Redirect),
    Skipped(SkipReason),
}

/// Lexically normalize a relative path, collapsing `.` and `..`
///
/// `..` that climbs above the start is kept.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// Archive-relative path a symlink at `source` points to
pub fn resolve_target(source: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return normalize_path(absolute);
    }
    let parent = source.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    normalize_path(&format!("{}/{}", parent, target))
}

/// Turn one symlink into a redirect, or explain why not
///
/// Both paths are archive-relative with compression suffixes stripped.
pub fn resolve_symlink(source: &str, target: &str) -> SymlinkOutcome {
    let src = match manpath::classify(source) {
        Ok(m) => m,
        Err(e) => {
            warn!("Skipping symlink with unrecognized structure: {}", e.path);
            return SymlinkOutcome::Skipped(SkipReason::UnknownSource);
        }
    };

    let resolved = resolve_target(source, target);
    let dst = match manpath::classify(&resolved) {
        Ok(m) => m,
        Err(_) => {
            warn!("Skipping symlink {} with unknown target: {}", source, resolved);
            return SymlinkOutcome::Skipped(SkipReason::UnknownTarget(resolved));
        }
    };

    if src.base_locale() != dst.base_locale() {
        warn!("Skipping cross-language symlink from {} to {}", source, resolved);
        return SymlinkOutcome::Skipped(SkipReason::CrossLocale);
    }

    if src.name == dst.name && src.section == dst.section {
        warn!(
            "Skipping symlink from {} to {} (the base name is the same)",
            source, resolved
        );
        return SymlinkOutcome::Skipped(SkipReason::SameName);
    }

    SymlinkOutcome::Redirect(Redirect {
        source_name: src.name.clone(),
        source_section: src.section.clone(),
        source_locale: src.base_locale().to_string(),
        target_name: dst.name.clone(),
        target_section: dst.section.clone(),
        target_locale: dst.base_locale().to_string(),
    })
}
