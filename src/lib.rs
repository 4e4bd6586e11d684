// src/lib.rs

//! mandex: incremental man page indexer
//!
//! Walks an Arch Linux repository's files index, pulls manual pages out of
//! new and updated packages, renders them, and keeps a SQLite corpus of
//! pages and the redirects between them.
//!
//! # Architecture
//!
//! - Database-first: packages, pages, redirects and run history live in SQLite
//! - Incremental: only packages with a strictly newer version are reprocessed
//! - Collaborators behind traits: `Fetcher` for mirrors, `Renderer` for troff
//! - Alias resolution: symlinks become redirects, `.so` stubs are backfilled

pub mod config;
pub mod db;
pub mod decode;
mod error;
pub mod indexer;
pub mod manpath;
pub mod packages;
pub mod render;
pub mod repository;
pub mod resolver;
pub mod version;

pub use config::IndexerConfig;
pub use error::{Error, Result};
pub use indexer::{Indexer, RunSummary};
