// src/repository/parsers/mod.rs

//! Repository index parsers
//!
//! This module provides parsers for native repository index formats:
//! - Arch Linux: {repo}.files.tar.gz with per-package desc and files entries

pub mod arch;

use serde::{Deserialize, Serialize};

/// One package as described by the repository index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Package name
    pub name: String,

    /// Full version string including epoch and release
    pub version: String,

    /// Archive file name on the mirror
    pub filename: String,

    /// Architecture (x86_64, any, ...)
    pub arch: Option<String>,

    /// Upstream project URL
    pub upstream: Option<String>,

    /// First license entry
    pub license: Option<String>,

    /// SHA-256 of the package archive, when the index carries one
    pub sha256: Option<String>,

    /// Full URL to download the package archive
    pub url: String,

    /// Man page members listed in the package manifest, in manifest order
    pub man_paths: Vec<String>,
}

impl PackageRecord {
    /// Create a record with no optional metadata
    pub fn new(name: String, version: String, filename: String, url: String) -> Self {
        Self {
            name,
            version,
            filename,
            arch: None,
            upstream: None,
            license: None,
            sha256: None,
            url,
            man_paths: Vec::new(),
        }
    }

    /// Whether the package ships any manual pages
    pub fn has_man_pages(&self) -> bool {
        !self.man_paths.is_empty()
    }
}

/// Parsed repository index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilesIndex {
    /// Packages with complete metadata, in directory order
    pub packages: Vec<PackageRecord>,

    /// Package directories carrying both `desc` and `files`, whether or not
    /// their metadata was usable
    pub total_pkgs: i64,
}
