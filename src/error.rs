//! Crate-wide error taxonomy.
//!
//! Components raise their own narrow `thiserror` enums (see
//! [`crate::hasher::HashError`], [`crate::token::VerifyFailure`], …) and
//! convert into [`Error`] at the orchestrator boundary, the single place
//! category collapsing happens. Authentication failures on login/register/
//! reset paths are collapsed to [`Error::Authentication`] with a single
//! generic reason to defeat user-enumeration oracles — components must not
//! leak "no such user" vs. "bad password" above this layer.

use thiserror::Error;

/// A category-tagged failure, not a stack trace. See spec §7 "Propagation
/// policy": recoverable cases (legacy-hash upgrade, rotation-after-verify)
/// are handled locally and never surface here.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller-supplied data is malformed. Surface: 400 + field-level message.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Credential absent, malformed, expired, or wrong. Surface: 401 +
    /// generic reason. MUST NOT distinguish "no such user" from "bad password".
    #[error("authentication failed")]
    Authentication,

    /// Credential valid but not entitled. Surface: 403 + policy/role code.
    #[error("authorization denied: {0}")]
    Authorization(String),

    /// Unique-constraint violation at the boundary. Surface: 409.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Target entity absent where required by path. Surface: 404 on
    /// administrative paths.
    #[error("not found: {0}")]
    NotFound(String),

    /// Surface: 429 + retry hint.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Dependency failure (store unreachable). Surface: 503.
    #[error("upstream dependency failure: {0}")]
    Upstream(String),

    /// Invariant violated. Surface: 500, details logged, never leaked to
    /// the caller.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
