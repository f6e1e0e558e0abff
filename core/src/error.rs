//! Typed errors for failures callers need to tell apart.

use thiserror::Error;

/// Failure to turn a cached render back into pixels.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to decompress cached render")]
    Decompress {
        #[source]
        source: std::io::Error,
    },
    #[error("decompressed render holds {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Malformed human-readable byte size such as `"12q"`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizeParseError {
    #[error("empty size string")]
    Empty,
    #[error("invalid size {input:?}: expected a number with an optional k, M or G suffix")]
    Invalid { input: String },
    #[error("size {input:?} does not fit in memory addresses")]
    Overflow { input: String },
}

/// Invalid render system configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid cache capacity")]
    Capacity(#[from] SizeParseError),
    #[error("unknown prefetch strategy {name:?} (expected one of: {known})")]
    UnknownStrategy { name: String, known: String },
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("malformed configuration document")]
    Json(#[from] serde_json::Error),
}
