// src/repository/diff.rs

//! Package diff against the stored package table
//!
//! Only packages that ship manual pages are tracked. A package is new when
//! its name has never been seen and updated when the index offers a strictly
//! newer version; everything else is left alone, so diffing the same index
//! twice yields nothing the second time.
//!
//! The diff writes the new rows up front. A package that then fails to
//! process is put back with [`revert_package`], so the next run sees it as
//! new or updated again.

use super::parsers::{FilesIndex, PackageRecord};
use crate::db::models::{IndexMeta, Package};
use crate::error::Result;
use crate::version;
use rusqlite::Connection;
use std::collections::HashMap;
use tracing::{debug, info};

/// Outcome of diffing one index against the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageDiff {
    /// Packages never seen before, in index order
    pub new: Vec<PackageRecord>,
    /// Packages whose stored version was replaced by a newer one
    pub updated: Vec<PackageRecord>,
    /// Stored rows overwritten by `updated`, keyed by package name
    pub replaced: HashMap<String, Package>,
    /// Index packages with at least one man page
    pub haveman_pkgs: i64,
    /// All package directories in the index
    pub total_pkgs: i64,
}

impl PackageDiff {
    /// New and updated packages, in processing order
    pub fn changed(&self) -> impl Iterator<Item = &PackageRecord> {
        self.new.iter().chain(self.updated.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.updated.is_empty()
    }
}

fn to_package(record: &PackageRecord, repo: &str) -> Package {
    let mut package = Package::new(
        record.name.clone(),
        repo.to_string(),
        record.version.clone(),
        record.filename.clone(),
        record.url.clone(),
    );
    package.arch = record.arch.clone();
    package.upstream = record.upstream.clone();
    package.license = record.license.clone();
    package.sha256 = record.sha256.clone();
    package.man_paths = record.man_paths.clone();
    package
}

/// Diff `index` against the package table and persist the result
///
/// New packages are inserted, updated ones replaced in place, and the
/// package totals written to the index metadata. Callers wanting atomicity
/// run this inside `db::transaction`.
pub fn diff_packages(conn: &Connection, repo: &str, index: &FilesIndex) -> Result<PackageDiff> {
    let mut diff = PackageDiff {
        total_pkgs: index.total_pkgs,
        ..Default::default()
    };

    for record in index.packages.iter().filter(|r| r.has_man_pages()) {
        diff.haveman_pkgs += 1;

        match Package::find_by_name(conn, &record.name)? {
            None => {
                to_package(record, repo).insert(conn)?;
                info!("New package: {} {}", record.name, record.version);
                diff.new.push(record.clone());
            }
            Some(stored) if version::is_newer(&record.version, &stored.version) => {
                to_package(record, repo).update(conn)?;
                info!(
                    "Package '{}' updated: {} -> {}",
                    record.name, stored.version, record.version
                );
                diff.updated.push(record.clone());
                diff.replaced.insert(record.name.clone(), stored);
            }
            Some(stored) => {
                debug!("Package {} unchanged at {}", record.name, stored.version);
            }
        }
    }

    IndexMeta::set_package_totals(conn, diff.haveman_pkgs, diff.total_pkgs)?;

    info!(
        "Package index parsed: {} new, {} updated, {} have man, {} total",
        diff.new.len(),
        diff.updated.len(),
        diff.haveman_pkgs,
        diff.total_pkgs
    );
    Ok(diff)
}

/// Undo what `diff` wrote for one package
///
/// An updated package gets its previous row back and a new one is removed.
pub fn revert_package(conn: &Connection, diff: &PackageDiff, name: &str) -> Result<()> {
    match diff.replaced.get(name) {
        Some(previous) => {
            previous.update(conn)?;
            debug!("Restored {} to {}", name, previous.version);
        }
        None => {
            Package::delete(conn, name)?;
            debug!("Forgot new package {}", name);
        }
    }
    Ok(())
}
