//! Domain-level error type shared by the db and api crates.

/// Domain errors raised below the HTTP layer.
///
/// The api crate wraps this in its `AppError` and maps each variant to
/// an HTTP status and machine-readable code.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// An entity lookup came back empty.
    #[error("{entity} '{id}' not found")]
    NotFound {
        entity: &'static str,
        id: String,
    },

    /// Input failed a domain validation rule.
    #[error("{0}")]
    Validation(String),

    /// The operation conflicts with existing state.
    #[error("{0}")]
    Conflict(String),

    /// The caller is not authenticated.
    #[error("{0}")]
    Unauthorized(String),

    /// The caller is authenticated but not allowed to do this.
    #[error("{0}")]
    Forbidden(String),

    /// An unexpected internal failure (storage, invariant breach).
    #[error("{0}")]
    Internal(String),
}
