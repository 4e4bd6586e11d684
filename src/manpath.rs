// src/manpath.rs

//! Man page path classification
//!
//! Maps an archive path such as `usr/share/man/ru/man1/ls.1` to the
//! `(name, section, locale)` triple the page is filed under. The directory
//! grammar is ambiguous (a locale directory and an arbitrary directory look
//! the same), so the locale is inferred from where the `man*` subdirectory
//! sits. Paths that fit neither shape are rejected; this happens constantly
//! during a walk and is never fatal.

use thiserror::Error;

/// Root of the man page hierarchy inside package archives
pub const MAN_ROOT: &str = "usr/share/man";

/// Locale assigned to pages filed directly under the root
pub const DEFAULT_LOCALE: &str = "en";

/// Prefix of the section subdirectories (`man1`, `man3p`, ...)
const SECTION_DIR_PREFIX: &str = "man";

/// A classified man page path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManPath {
    pub name: String,
    pub section: String,
    pub locale: String,
}

impl ManPath {
    /// Locale with any encoding suffix dropped (`ru.KOI8-R` → `ru`)
    pub fn base_locale(&self) -> &str {
        base_locale(&self.locale)
    }
}

/// A path that does not fit the man page layout
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognized man page path {path}: {reason}")]
pub struct UnknownManPath {
    pub path: String,
    pub reason: &'static str,
}

impl UnknownManPath {
    fn new(path: &str, reason: &'static str) -> Self {
        Self {
            path: path.to_string(),
            reason,
        }
    }
}

/// Returns true for non-directory entries below the man page root
pub fn is_man_path(path: &str) -> bool {
    path.starts_with(MAN_ROOT) && !path.ends_with('/')
}

/// Drop an encoding suffix from a locale
pub fn base_locale(locale: &str) -> &str {
    match locale.split_once('.') {
        Some((base, _)) => base,
        None => locale,
    }
}

/// Classify a path into name, section and locale
pub fn classify(path: &str) -> Result<ManPath, UnknownManPath> {
    let relative = path
        .strip_prefix(MAN_ROOT)
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or_else(|| UnknownManPath::new(path, "outside the man page root"))?;

    if relative.ends_with('/') {
        return Err(UnknownManPath::new(path, "directory entry"));
    }

    let parts: Vec<&str> = relative.split('/').filter(|p| !p.is_empty()).collect();
    let file_name = parts
        .last()
        .ok_or_else(|| UnknownManPath::new(path, "empty path"))?;

    let (name, section) = match file_name.rfind('.') {
        Some(pos) if pos > 0 => (&file_name[..pos], &file_name[pos + 1..]),
        _ => return Err(UnknownManPath::new(path, "empty section number")),
    };
    if section.is_empty() {
        return Err(UnknownManPath::new(path, "empty section number"));
    }

    // Only directories count; the file itself is the last part
    let dirs = &parts[..parts.len() - 1];
    let locale = match dirs {
        [first, ..] if first.starts_with(SECTION_DIR_PREFIX) => DEFAULT_LOCALE,
        [first, second, ..] if second.starts_with(SECTION_DIR_PREFIX) => *first,
        _ => return Err(UnknownManPath::new(path, "no section directory")),
    };

    Ok(ManPath {
        name: name.to_string(),
        section: section.to_string(),
        locale: locale.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(path: &str) -> (String, String, String) {
        let m = classify(path).unwrap();
        (m.name, m.section, m.locale)
    }

    #[test]
    fn test_classify_default_locale() {
        assert_eq!(
            triple("usr/share/man/man1/ls.1"),
            ("ls".into(), "1".into(), "en".into())
        );
        assert_eq!(
            triple("usr/share/man/man3/SSL_read.3ssl"),
            ("SSL_read".into(), "3ssl".into(), "en".into())
        );
    }

    #[test]
    fn test_classify_localized() {
        assert_eq!(
            triple("usr/share/man/ru/man1/ls.1"),
            ("ls".into(), "1".into(), "ru".into())
        );
        assert_eq!(
            triple("usr/share/man/ru.KOI8-R/man8/mount.8"),
            ("mount".into(), "8".into(), "ru.KOI8-R".into())
        );
    }

    #[test]
    fn test_dotted_names_keep_all_but_last_suffix() {
        assert_eq!(
            triple("usr/share/man/man1/gimp-2.10.1"),
            ("gimp-2.10".into(), "1".into(), "en".into())
        );
    }

    #[test]
    fn test_rejects_outside_root() {
        let err = classify("usr/share/doc/readme").unwrap_err();
        assert_eq!(err.path, "usr/share/doc/readme");
        assert!(classify("usr/share/manual/man1/ls.1").is_err());
        assert!(classify("usr/share/man").is_err());
    }

    #[test]
    fn test_rejects_missing_section() {
        assert!(classify("usr/share/man/man1/README").is_err());
        assert!(classify("usr/share/man/man1/ls.").is_err());
        assert!(classify("usr/share/man/man1/.hidden").is_err());
    }

    #[test]
    fn test_rejects_unknown_layout() {
        assert!(classify("usr/share/man/ls.1").is_err());
        assert!(classify("usr/share/man/whatis.db").is_err());
        assert!(classify("usr/share/man/de/extra/man1/ls.1").is_err());
        assert!(classify("usr/share/man/man1/").is_err());
    }

    #[test]
    fn test_is_man_path() {
        assert!(is_man_path("usr/share/man/man1/ls.1.gz"));
        assert!(!is_man_path("usr/share/man/man1/"));
        assert!(!is_man_path("usr/bin/ls"));
    }

    #[test]
    fn test_base_locale() {
        assert_eq!(base_locale("ru.KOI8-R"), "ru");
        assert_eq!(base_locale("pt_BR"), "pt_BR");
        let m = classify("usr/share/man/ja.UTF-8/man1/ls.1").unwrap();
        assert_eq!(m.base_locale(), "ja");
    }
}
