//! Error Types
//!
//! The error enum covers the resource-library and serialization seams only.
//! Frame-loop operations never return `Err`: lookup failures yield
//! `Option`/`bool` sentinels, stale handles degrade to no-ops, and budget
//! overflows are recovered by remapping, so that one bad animation cannot
//! halt updating a whole scene.

use thiserror::Error;

/// The main error type for the marrow crate.
#[derive(Error, Debug)]
pub enum MarrowError {
    /// The requested clip is not registered in the library.
    #[error("Animation clip not found: {0}")]
    ClipNotFound(String),

    /// The requested skeleton is not registered in the library.
    #[error("Skeleton not found: {0}")]
    SkeletonNotFound(String),

    /// A persisted shape failed to parse.
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Alias for `Result<T, MarrowError>`.
pub type Result<T> = std::result::Result<T, MarrowError>;
