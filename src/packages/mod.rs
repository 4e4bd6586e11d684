// src/packages/mod.rs

//! Package archive support for mandex
//!
//! This module opens binary package archives and pulls manual page members
//! out of them. Members come back as decoded text pages or as symlinks;
//! hard links are materialized as copies of the file they point at.

pub mod arch;

pub use arch::ArchPackage;

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::io::Read;
use xz2::read::XzDecoder;

/// Hard links are turned into plain copies of their target rather than
/// tracked as links
pub const HARDLINKS_MATERIALIZED: bool = true;

/// Stream compression used for archives and individual members
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Zstd,
    Xz,
    Gzip,
}

impl CompressionFormat {
    /// Detect compression from a file name suffix
    pub fn from_extension(path: &str) -> Option<Self> {
        if path.ends_with(".zst") {
            Some(Self::Zstd)
        } else if path.ends_with(".xz") {
            Some(Self::Xz)
        } else if path.ends_with(".gz") {
            Some(Self::Gzip)
        } else {
            None
        }
    }

    /// Detect compression from the leading bytes of a stream
    pub fn from_magic_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Some(Self::Zstd)
        } else if bytes.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            Some(Self::Xz)
        } else if bytes.starts_with(&[0x1f, 0x8b]) {
            Some(Self::Gzip)
        } else {
            None
        }
    }

    /// File name suffix for this format
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Zstd => ".zst",
            Self::Xz => ".xz",
            Self::Gzip => ".gz",
        }
    }

    /// Wrap a reader in the matching decoder
    pub fn reader<'a, R: Read + 'a>(&self, inner: R) -> Result<Box<dyn Read + 'a>> {
        let reader: Box<dyn Read + 'a> = match self {
            Self::Zstd => {
                let decoder = zstd::Decoder::new(inner)
                    .map_err(|e| Error::ParseError(format!("Failed to create zstd decoder: {}", e)))?;
                Box::new(decoder)
            }
            Self::Xz => Box::new(XzDecoder::new(inner)),
            Self::Gzip => Box::new(GzDecoder::new(inner)),
        };
        Ok(reader)
    }

    /// Decompress an in-memory buffer
    pub fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.reader(bytes)?
            .read_to_end(&mut out)
            .map_err(|e| Error::ParseError(format!("Failed to decompress {} data: {}", self.suffix(), e)))?;
        Ok(out)
    }
}

/// Remove a trailing `.gz`, `.xz` or `.zst` suffix, if any
pub fn strip_compression_suffix(path: &str) -> &str {
    match CompressionFormat::from_extension(path) {
        Some(format) => &path[..path.len() - format.suffix().len()],
        None => path,
    }
}

/// A regular page member, decompressed and decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    /// Archive path with any compression suffix removed
    pub path: String,
    pub content: String,
}

/// A symlink member, both ends with compression suffixes removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSymlink {
    pub path: String,
    pub target: String,
}

/// Everything pulled out of one package for the requested members
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedContents {
    pub files: Vec<ExtractedPage>,
    pub symlinks: Vec<ExtractedSymlink>,
}
