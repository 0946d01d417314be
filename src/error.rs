//! Error types for the analytics layer
//!
//! Errors are split in two: [`Error`] covers everything callers of the
//! library can hit (bad metric definitions, unparseable timestamps,
//! misuse of an operation), while [`StoreError`] covers failures raised
//! by the store collaborator. Store failures always surface through
//! [`Error::Store`] so call sites only ever match one type.

use thiserror::Error;

/// Errors returned by metric operations and configuration loading.
#[derive(Error, Debug)]
pub enum Error {
    /// A metric or client definition is unusable (empty name, reserved
    /// characters, unknown variant or resolution names).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A timestamp argument could not be parsed as a calendar date.
    #[error("invalid timestamp: {0:?} (expected YYYY-MM-DD)")]
    InvalidTimestamp(String),

    /// A ranged aggregation was requested but neither the query nor the
    /// metric definition carries an interval to walk the range with.
    #[error("metric {0:?} has no resolution and the query names no interval")]
    MissingResolution(String),

    /// A unique-variant update was submitted without the member whose
    /// presence is being tracked.
    #[error("unique-variant updates require a member id")]
    MissingMember,

    /// The store collaborator failed; the underlying error is preserved.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors surfaced by a [`ScriptStore`](crate::store::ScriptStore) backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend could not be reached, or the transport gave up.
    #[error("store connection error: {0}")]
    Connection(String),

    /// A server-side script or command failed to execute.
    #[error("store script error: {0}")]
    Script(String),

    /// The reply arrived but did not match the shape the operation
    /// contract promises.
    #[error("store response error: {0}")]
    Response(String),
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_convert_into_crate_errors() {
        let err: Error = StoreError::Connection("refused".into()).into();
        assert!(matches!(err, Error::Store(StoreError::Connection(_))));
    }

    #[test]
    fn messages_name_the_offending_input() {
        let err = Error::InvalidTimestamp("2026-13-99".into());
        assert!(err.to_string().contains("2026-13-99"));

        let err = Error::MissingResolution("visits".into());
        assert!(err.to_string().contains("visits"));
    }
}
