//! Error types surfaced across the cache engine's public boundary.
//!
//! Internal plumbing (tier I/O, codec operations) stays on `anyhow::Result`
//! and is handled locally per the failure taxonomy — those errors never
//! reach here. `CacheError` is reserved for the subset of failures the
//! taxonomy marks as "surfaced": expression evaluation on the key/condition
//! path, loader failures, and descriptor misconfiguration.

use thiserror::Error;

/// Failures that propagate out of a cached call to the caller.
#[derive(Debug, Error)]
pub enum CacheError {
    /// `condition_expr` or `key_expr` failed to evaluate against the call arguments.
    #[error("expression evaluation failed for '{expr}': {source}")]
    ExpressionFailed {
        expr: String,
        #[source]
        source: anyhow::Error,
    },

    /// A descriptor is missing a field required for the operation being performed,
    /// or names a bulk loader / pivot argument that cannot be resolved.
    #[error("cache descriptor misconfigured: {0}")]
    Misconfigured(String),

    /// The user-supplied loader (or bulk loader) returned an error.
    #[error("loader failed: {0}")]
    LoaderFailed(#[source] anyhow::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;
