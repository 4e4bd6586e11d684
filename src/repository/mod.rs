// src/repository/mod.rs

//! Repository access and package downloading
//!
//! This module provides functionality for:
//! - Fetching text and files from http(s) and file:// mirrors
//! - Selecting a mirror from configuration or a mirrorlist
//! - Keeping the local copy of the files index fresh
//! - Verifying package checksums

pub mod diff;
pub mod parsers;

use crate::db::models::IndexMeta;
use crate::error::{Error, Result};
use reqwest::blocking::Client;
use reqwest::header::LAST_MODIFIED;
use rusqlite::Connection;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (30 seconds)
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed downloads
pub const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Mirror used when neither a mirror nor a mirrorlist is configured
pub const DEFAULT_MIRROR: &str = "https://mirrors.edge.kernel.org/archlinux/$repo/os/$arch";

/// A downloaded file and the server's modification time for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub path: PathBuf,
    /// Last-Modified as unix seconds, when the source reported one
    pub last_modified: Option<i64>,
}

/// Source of remote text and files
pub trait Fetcher {
    /// Fetch a URL as text
    fn fetch_text(&self, url: &str) -> Result<String>;

    /// Download a URL to `dest`, replacing it atomically
    fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<FetchedFile>;
}

/// HTTP client wrapper with retry support
pub struct RepositoryClient {
    client: Client,
    max_retries: u32,
}

impl RepositoryClient {
    /// Create a new repository client
    pub fn new(user_agent: &str, timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: max_retries.max(1),
        })
    }

    /// Send a GET with retries on transport errors
    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(Error::DownloadError(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }
                    return Ok(response);
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::DownloadError(format!(
                            "Failed to fetch {} after {} attempts: {}",
                            url, attempt, e
                        )));
                    }
                    warn!("Fetch attempt {} for {} failed: {}, retrying...", attempt, url, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

impl Fetcher for RepositoryClient {
    fn fetch_text(&self, url: &str) -> Result<String> {
        if let Some(path) = local_path(url) {
            return Ok(fs::read_to_string(path)?);
        }

        debug!("Fetching {}", url);
        self.get(url)?
            .text()
            .map_err(|e| Error::DownloadError(format!("Failed to read response from {}: {}", url, e)))
    }

    fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<FetchedFile> {
        info!("Downloading {} to {}", url, dest.display());

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = partial_path(dest);

        let last_modified = if let Some(src) = local_path(url) {
            fs::copy(src, &temp_path)?;
            fs::metadata(src)?
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
        } else {
            let mut response = self.get(url)?;
            let last_modified = response
                .headers()
                .get(LAST_MODIFIED)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_http_date);

            // Write to temporary file first
            let mut file = File::create(&temp_path)?;
            io::copy(&mut response, &mut file).map_err(|e| {
                Error::DownloadError(format!("Failed to write downloaded data: {}", e))
            })?;
            last_modified
        };

        // Atomic rename from temp to final destination
        fs::rename(&temp_path, dest)?;

        debug!("Downloaded {} (last modified {:?})", dest.display(), last_modified);
        Ok(FetchedFile {
            path: dest.to_path_buf(),
            last_modified,
        })
    }
}

/// Filesystem path for a file:// URL
fn local_path(url: &str) -> Option<&Path> {
    url.strip_prefix("file://").map(Path::new)
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name: OsString = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Parse an HTTP date (`Tue, 15 Nov 1994 08:12:31 GMT`) to unix seconds
pub fn parse_http_date(value: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.timestamp())
}

/// Substitute `$repo` and `$arch` in a mirror template
pub fn expand_mirror(template: &str, repo: &str, arch: &str) -> String {
    template
        .trim()
        .replace("$repo", repo)
        .replace("$arch", arch)
        .trim_end_matches('/')
        .to_string()
}

/// First `Server = ...` entry of a pacman mirrorlist, commented or not
pub fn parse_mirrorlist(mirrorlist: &str) -> Option<&str> {
    mirrorlist.lines().find_map(|line| {
        let line = line.trim().trim_start_matches('#').trim_start();
        let (key, value) = line.split_once('=')?;
        if key.trim() == "Server" && !value.trim().is_empty() {
            Some(value.trim())
        } else {
            None
        }
    })
}

/// Pick the mirror base URL for a repository
///
/// An explicit mirror wins, then the first server of the mirrorlist, then
/// the built-in default.
pub fn select_mirror<F: Fetcher + ?Sized>(
    fetcher: &F,
    mirror: Option<&str>,
    mirrorlist_url: Option<&str>,
    repo: &str,
    arch: &str,
) -> Result<String> {
    let template = match (mirror, mirrorlist_url) {
        (Some(mirror), _) => mirror.to_string(),
        (None, Some(url)) => {
            info!("Downloading mirrorlist from {}", url);
            let mirrorlist = fetcher
                .fetch_text(url)
                .map_err(|e| Error::IndexFetch(format!("Failed to fetch mirrorlist: {}", e)))?;
            parse_mirrorlist(&mirrorlist)
                .ok_or_else(|| Error::IndexFetch(format!("No Server entry in mirrorlist {}", url)))?
                .to_string()
        }
        (None, None) => DEFAULT_MIRROR.to_string(),
    };

    let selected = expand_mirror(&template, repo, arch);
    info!("Selected mirror: {}", selected);
    Ok(selected)
}

/// Make sure `work_dir/{repo}.files.tar.gz` is the freshest index we know
///
/// With a local copy present, the remote index is downloaded beside it and
/// only replaces it when its Last-Modified is newer than the stored
/// timestamp. A missing Last-Modified counts as newer. Any failure here is
/// an `IndexFetch` error.
pub fn fetch_index<F: Fetcher + ?Sized>(
    fetcher: &F,
    conn: &Connection,
    mirror: &str,
    repo: &str,
    work_dir: &Path,
) -> Result<PathBuf> {
    let file_name = format!("{}.files.tar.gz", repo);
    let url = format!("{}/{}", mirror.trim_end_matches('/'), file_name);
    let local = work_dir.join(&file_name);
    let index_error = |e: Error| Error::IndexFetch(format!("{}: {}", url, e));

    if local.exists() {
        info!("{} already exists, checking for a newer copy", file_name);
        let staged = work_dir.join(format!("{}.new", file_name));
        let fetched = fetcher.fetch_to_file(&url, &staged).map_err(index_error)?;
        let stored = IndexMeta::get(conn)?.timestamp;

        let newer = match fetched.last_modified {
            Some(remote) => remote > stored,
            None => true,
        };

        if newer {
            info!("Replacing {} with the newer download", file_name);
            fs::rename(&staged, &local).map_err(|e| index_error(e.into()))?;
            if let Some(remote) = fetched.last_modified {
                IndexMeta::set_timestamp(conn, remote)?;
            }
        } else {
            info!("{} up to date", file_name);
            fs::remove_file(&staged).map_err(|e| index_error(e.into()))?;
        }
    } else {
        let fetched = fetcher.fetch_to_file(&url, &local).map_err(index_error)?;
        if let Some(remote) = fetched.last_modified {
            IndexMeta::set_timestamp(conn, remote)?;
        }
    }

    Ok(local)
}

/// Verify file checksum matches expected value
pub fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    use sha2::{Digest, Sha256};

    debug!("Verifying checksum for {}", path.display());

    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;

    let actual = format!("{:x}", hasher.finalize());

    if !actual.eq_ignore_ascii_case(expected) {
        return Err(Error::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        });
    }

    debug!("Checksum verified: {}", expected);
    Ok(())
}
