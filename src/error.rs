/// The main error type for breakwater operations.
///
/// Invalid or expired codes are *not* errors — verification paths return
/// `Ok(false)` or `None` for those so callers can record the attempt and
/// move on. Errors are reserved for rejections that happen before any
/// verification work (not enrolled, locked) and for infrastructure
/// failures that must never silently default to "allow".
#[derive(Debug, thiserror::Error)]
pub enum BreakwaterError {
    /// The account has no two-factor secret or backup codes on file.
    ///
    /// Surfaced distinctly from a wrong code so clients can prompt
    /// enrollment instead of retry.
    #[error("Two-factor authentication is not enabled for this account")]
    NotEnrolled,

    /// An unexpired lock covers the requested verification type.
    #[error("Account is locked, retry in {remaining_minutes} minute(s)")]
    Locked {
        /// Minutes until the lock expires, rounded up.
        remaining_minutes: u64,
    },

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The backing store failed. Always fatal for the current request.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl BreakwaterError {
    pub fn locked(remaining_minutes: u64) -> Self {
        Self::Locked { remaining_minutes }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BreakwaterError>;
