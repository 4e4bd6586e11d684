// src/config.rs

//! Indexer run configuration

use crate::decode::DEFAULT_CHARSETS;
use crate::repository::{HTTP_TIMEOUT, MAX_RETRIES};
use std::path::PathBuf;
use std::time::Duration;

/// Settings for one indexer run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerConfig {
    /// Repository name, substituted for `$repo` in mirror URLs
    pub repo: String,
    /// Architecture, substituted for `$arch`
    pub arch: String,
    /// Explicit mirror template; wins over the mirrorlist
    pub mirror: Option<String>,
    /// pacman mirrorlist to take the first server from
    pub mirrorlist_url: Option<String>,
    /// Holds the files index and downloaded packages
    pub work_dir: PathBuf,
    pub user_agent: String,
    pub http_timeout: Duration,
    pub max_retries: u32,
    pub mandoc: PathBuf,
    /// Charsets tried in order before detection
    pub charsets: Vec<String>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            repo: default_repo(),
            arch: default_arch(),
            mirror: None,
            mirrorlist_url: None,
            work_dir: PathBuf::from("/var/cache/mandex"),
            user_agent: default_user_agent(),
            http_timeout: HTTP_TIMEOUT,
            max_retries: MAX_RETRIES,
            mandoc: PathBuf::from("mandoc"),
            charsets: DEFAULT_CHARSETS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn default_repo() -> String {
    "core".to_string()
}

fn default_arch() -> String {
    "x86_64".to_string()
}

fn default_user_agent() -> String {
    format!("mandex/{}", env!("CARGO_PKG_VERSION"))
}

impl IndexerConfig {
    pub fn repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = repo.into();
        self
    }

    pub fn arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    pub fn mirror(mut self, mirror: impl Into<String>) -> Self {
        self.mirror = Some(mirror.into());
        self
    }

    pub fn mirrorlist_url(mut self, url: impl Into<String>) -> Self {
        self.mirrorlist_url = Some(url.into());
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn mandoc(mut self, binary: impl Into<PathBuf>) -> Self {
        self.mandoc = binary.into();
        self
    }

    /// Directory package archives are downloaded into
    pub fn package_dir(&self) -> PathBuf {
        self.work_dir.join("pkgs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IndexerConfig::default();
        assert_eq!(config.repo, "core");
        assert_eq!(config.arch, "x86_64");
        assert!(config.mirror.is_none());
        assert_eq!(config.charsets.len(), DEFAULT_CHARSETS.len());
        assert!(config.user_agent.starts_with("mandex/"));
    }

    #[test]
    fn test_overrides() {
        let config = IndexerConfig::default()
            .repo("extra")
            .mirror("file:///srv/mirror/$repo/os/$arch")
            .work_dir("/tmp/mandex");
        assert_eq!(config.repo, "extra");
        assert_eq!(config.mirror.as_deref(), Some("file:///srv/mirror/$repo/os/$arch"));
        assert_eq!(config.package_dir(), PathBuf::from("/tmp/mandex/pkgs"));
    }
}
