// src/repository/parsers/arch.rs

//! Arch Linux files index parser
//!
//! Parses {repo}.files.tar.gz, which holds one directory per package with a
//! `desc` file (metadata in a text format with %FIELD% markers) and a `files`
//! manifest listing every path the package installs.

use super::{FilesIndex, PackageRecord};
use crate::error::{Error, Result};
use crate::manpath::is_man_path;
use crate::packages::CompressionFormat;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Read;
use std::path::Path;
use tar::Archive;
use tracing::{debug, info, warn};

/// Arch Linux files index parser
pub struct ArchParser {
    /// Mirror base URL, used to build download URLs
    mirror: String,
}

/// desc and files contents of one package directory
#[derive(Default)]
struct PackageDir {
    desc: Option<String>,
    files: Option<String>,
}

impl ArchParser {
    /// Create a parser that builds download URLs under `mirror`
    pub fn new(mirror: &str) -> Self {
        Self {
            mirror: mirror.trim_end_matches('/').to_string(),
        }
    }

    /// Parse an index file on disk
    pub fn parse_file(&self, path: &Path) -> Result<FilesIndex> {
        debug!("Parsing files index: {}", path.display());
        let data = fs::read(path)?;
        self.parse_bytes(&data)
    }

    /// Parse a possibly compressed index tarball held in memory
    pub fn parse_bytes(&self, data: &[u8]) -> Result<FilesIndex> {
        let reader: Box<dyn Read + '_> = match CompressionFormat::from_magic_bytes(data) {
            Some(format) => format.reader(data)?,
            None => Box::new(data),
        };

        let mut archive = Archive::new(reader);
        // Directory order is the processing order
        let mut dirs: BTreeMap<String, PackageDir> = BTreeMap::new();

        for entry in archive
            .entries()
            .map_err(|e| Error::ParseError(format!("Failed to read index tarball: {}", e)))?
        {
            let mut entry = entry
                .map_err(|e| Error::ParseError(format!("Failed to read tarball entry: {}", e)))?;

            let path = entry
                .path()
                .map_err(|e| Error::ParseError(format!("Invalid path in tarball: {}", e)))?
                .to_string_lossy()
                .into_owned();

            let Some((dir, leaf)) = path.rsplit_once('/') else {
                continue;
            };
            if leaf != "desc" && leaf != "files" {
                continue;
            }

            let mut bytes = Vec::new();
            entry
                .read_to_end(&mut bytes)
                .map_err(|e| Error::ParseError(format!("Failed to read {}: {}", path, e)))?;
            let content = String::from_utf8_lossy(&bytes).into_owned();

            let slot = dirs.entry(dir.to_string()).or_default();
            if leaf == "desc" {
                slot.desc = Some(content);
            } else {
                slot.files = Some(content);
            }
        }

        let mut index = FilesIndex::default();
        for (dir, pkg) in dirs {
            let (Some(desc), Some(files)) = (pkg.desc, pkg.files) else {
                debug!("Skipping incomplete index entry {}", dir);
                continue;
            };
            index.total_pkgs += 1;

            match self.build_record(&parse_desc_file(&desc), &files) {
                Some(record) => index.packages.push(record),
                None => warn!("Missing metadata from package: {}/desc", dir),
            }
        }

        info!(
            "Parsed {} of {} packages from files index",
            index.packages.len(),
            index.total_pkgs
        );
        Ok(index)
    }

    fn build_record(
        &self,
        fields: &HashMap<String, Vec<String>>,
        files: &str,
    ) -> Option<PackageRecord> {
        let first = |key: &str| fields.get(key).and_then(|v| v.first()).cloned();

        let name = first("NAME")?;
        let version = first("VERSION")?;
        let filename = first("FILENAME")?;
        let url = format!("{}/{}", self.mirror, filename);

        let mut record = PackageRecord::new(name, version, filename, url);
        record.arch = first("ARCH");
        record.upstream = first("URL");
        record.license = first("LICENSE");
        record.sha256 = first("SHA256SUM");
        record.man_paths = parse_files_manifest(files);
        Some(record)
    }
}

/// Parse a desc file into its %FIELD% sections
fn parse_desc_file(content: &str) -> HashMap<String, Vec<String>> {
    let mut fields = HashMap::new();
    let mut current_field: Option<String> = None;
    let mut values: Vec<String> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();

        if trimmed.len() > 1 && trimmed.starts_with('%') && trimmed.ends_with('%') {
            if let Some(field) = current_field.take() {
                fields.insert(field, std::mem::take(&mut values));
            }
            current_field = Some(trimmed[1..trimmed.len() - 1].to_string());
        } else if !trimmed.is_empty() {
            values.push(trimmed.to_string());
        }
    }

    if let Some(field) = current_field {
        fields.insert(field, values);
    }

    fields
}

/// Man page entries of a files manifest
fn parse_files_manifest(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim_end)
        .filter(|line| is_man_path(line))
        .map(str::to_string)
        .collect()
}
