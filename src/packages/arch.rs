// src/packages/arch.rs

//! Arch Linux package archive reader
//!
//! Opens .pkg.tar.zst, .pkg.tar.xz and .pkg.tar.gz packages and extracts the
//! manual page members listed for them in the repository index.

use crate::decode::TextDecoder;
use crate::error::{Error, Result};
use crate::manpath::is_man_path;
use crate::packages::{
    CompressionFormat, ExtractedContents, ExtractedPage, ExtractedSymlink,
    strip_compression_suffix,
};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::debug;

/// Arch Linux package archive on disk
#[derive(Debug)]
pub struct ArchPackage {
    package_path: PathBuf,
    compression: CompressionFormat,
}

impl ArchPackage {
    /// Open a package, detecting its compression
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let package_path = path.as_ref().to_path_buf();
        let compression = Self::detect_compression(&package_path)?;
        Ok(Self {
            package_path,
            compression,
        })
    }

    /// Extension first, then magic bytes for oddly named downloads
    fn detect_compression(path: &Path) -> Result<CompressionFormat> {
        let name = path.to_string_lossy();
        if let Some(format) = CompressionFormat::from_extension(&name) {
            return Ok(format);
        }

        let mut magic = [0u8; 6];
        let mut file = File::open(path)?;
        let read = file.read(&mut magic)?;
        CompressionFormat::from_magic_bytes(&magic[..read]).ok_or_else(|| {
            Error::ParseError(format!(
                "Unsupported Arch package format: {}. Expected .pkg.tar.zst, .pkg.tar.xz, or .pkg.tar.gz",
                name
            ))
        })
    }

    /// Open and decompress the package archive
    fn open_archive(&self) -> Result<Archive<Box<dyn Read>>> {
        let file = File::open(&self.package_path)?;
        let reader = self.compression.reader(file)?;
        Ok(Archive::new(reader))
    }

    /// Package file name used in error reports
    fn display_name(&self) -> String {
        self.package_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.package_path.display().to_string())
    }

    /// Extract the listed members
    ///
    /// Symlinks are recorded without reading content. Hard links take the
    /// bytes of the member they point at. Regular members are decompressed
    /// when their name carries a compression suffix and decoded to text.
    /// Every listed member must be present in the archive.
    pub fn extract<S: AsRef<str>>(
        &self,
        member_paths: &[S],
        decoder: &TextDecoder,
    ) -> Result<ExtractedContents> {
        debug!("Extracting man pages from {:?}", self.package_path);

        let mut missing: BTreeSet<&str> = member_paths.iter().map(|p| p.as_ref()).collect();
        let mut contents = ExtractedContents::default();
        // Bytes of earlier regular members, for hard links to copy from
        let mut seen: HashMap<String, Vec<u8>> = HashMap::new();

        let mut archive = self.open_archive()?;
        let entries = archive
            .entries()
            .map_err(|e| Error::ParseError(format!("Failed to read archive: {}", e)))?;

        for entry in entries {
            let mut entry =
                entry.map_err(|e| Error::ParseError(format!("Failed to read entry: {}", e)))?;

            let entry_path = entry
                .path()
                .map_err(|e| Error::ParseError(format!("Failed to get entry path: {}", e)))?
                .to_string_lossy()
                .trim_start_matches("./")
                .to_string();

            let entry_type = entry.header().entry_type();
            if entry_type.is_dir() {
                continue;
            }

            let requested = missing.remove(entry_path.as_str());

            if entry_type.is_symlink() {
                if requested {
                    let target = link_target(&mut entry)?;
                    contents.symlinks.push(ExtractedSymlink {
                        path: strip_compression_suffix(&entry_path).to_string(),
                        target: strip_compression_suffix(&target).to_string(),
                    });
                }
                continue;
            }

            // Only man tree bytes are kept for hard links to copy
            if !requested && !is_man_path(&entry_path) {
                continue;
            }

            let bytes = if entry_type.is_hard_link() {
                let target = link_target(&mut entry)?;
                let target = target.trim_start_matches("./");
                match seen.get(target) {
                    Some(bytes) => bytes.clone(),
                    None if requested => {
                        return Err(Error::MissingArchiveMember {
                            package: self.display_name(),
                            path: target.to_string(),
                        });
                    }
                    None => continue,
                }
            } else if entry_type.is_file() {
                let mut bytes = Vec::new();
                entry.read_to_end(&mut bytes).map_err(|e| {
                    Error::ParseError(format!("Failed to read {}: {}", entry_path, e))
                })?;
                bytes
            } else {
                continue;
            };

            if requested {
                contents.files.push(self.decode_member(&entry_path, &bytes, decoder)?);
            }
            seen.insert(entry_path, bytes);
        }

        if let Some(path) = missing.into_iter().next() {
            return Err(Error::MissingArchiveMember {
                package: self.display_name(),
                path: path.to_string(),
            });
        }

        debug!(
            "Extracted {} pages and {} symlinks from {}",
            contents.files.len(),
            contents.symlinks.len(),
            self.display_name()
        );
        Ok(contents)
    }

    fn decode_member(
        &self,
        path: &str,
        bytes: &[u8],
        decoder: &TextDecoder,
    ) -> Result<ExtractedPage> {
        let content = match CompressionFormat::from_extension(path) {
            Some(format) => decoder.decode(&format.decompress(bytes)?),
            None => decoder.decode(bytes),
        };

        Ok(ExtractedPage {
            path: strip_compression_suffix(path).to_string(),
            content,
        })
    }
}

fn link_target<R: Read>(entry: &mut tar::Entry<'_, R>) -> Result<String> {
    entry
        .link_name()
        .map_err(|e| Error::ParseError(format!("Failed to read link target: {}", e)))?
        .map(|p| p.to_string_lossy().into_owned())
        .ok_or_else(|| Error::ParseError("Link entry without a target".to_string()))
}
