// src/error.rs

use thiserror::Error;

/// Core error types for mandex
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization of stored columns
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),

    /// Network or mirror failure while downloading
    #[error("Download error: {0}")]
    DownloadError(String),

    /// Malformed archive or metadata
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Downloaded package does not match the checksum from the index
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// The repository files index could not be fetched or unpacked.
    /// Fatal for the whole run.
    #[error("Index fetch failed: {0}")]
    IndexFetch(String),

    /// A man page path listed in the index is absent from the package archive.
    /// Fatal for that package only.
    #[error("Package {package} has no member {path}")]
    MissingArchiveMember { package: String, path: String },

    /// The render collaborator rejected a page
    #[error("Render error: {0}")]
    Render(String),
}

/// Result type alias using mandex's Error type
pub type Result<T> = std::result::Result<T, Error>;
