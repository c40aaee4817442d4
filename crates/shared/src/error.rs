//! Error types for Parley

use thiserror::Error;

/// Errors surfaced by storage implementations.
///
/// The relay treats these per the drop policy: log, skip the emit, keep the
/// connection alive. Nothing here is fatal to the process.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
