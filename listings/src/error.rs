//! Error types for listing mutations and reads.

use crate::state::ListingStatus;
use thiserror::Error;

/// Result type alias for listing operations.
pub type Result<T> = std::result::Result<T, ListingError>;

/// Error taxonomy for the listing pipeline.
///
/// Variants are grouped by how an outer layer should react to them:
/// user errors are surfaced verbatim, duplicate submissions are retryable,
/// and infrastructure errors are fatal for the request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ListingError {
    // ═══════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════

    /// A payload field is malformed or missing.
    #[error("Invalid {field}: {message}")]
    Validation {
        /// Offending field path (e.g. `rooms[1].price`)
        field: String,
        /// Human-readable explanation
        message: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Authorization Errors
    // ═══════════════════════════════════════════════════════════

    /// Listing does not exist, or is not visible to the acting principal.
    ///
    /// Ownership failures are reported as this variant so that non-owners
    /// cannot probe for existence.
    #[error("Listing not found")]
    NotFound,

    /// Principal lacks the role the operation requires.
    #[error("Insufficient permissions: {required}")]
    InsufficientPermissions {
        /// Role that was required
        required: String,
    },

    // ═══════════════════════════════════════════════════════════
    // State Conflicts
    // ═══════════════════════════════════════════════════════════

    /// Moderation transition attempted from an illegal source status.
    #[error("Listing is {current}, operation requires {required}")]
    StateConflict {
        /// Status the listing is currently in
        current: ListingStatus,
        /// Human-readable precondition
        required: String,
    },

    /// Stock edits are only allowed on published listings.
    #[error("Only published listings may have stock edited directly (listing is {current})")]
    StockEditNotAllowed {
        /// Status the listing is currently in
        current: ListingStatus,
    },

    // ═══════════════════════════════════════════════════════════
    // Duplicate Submission
    // ═══════════════════════════════════════════════════════════

    /// An identical request is already being processed.
    #[error("Duplicate submission: request is already being processed")]
    DuplicateSubmission,

    // ═══════════════════════════════════════════════════════════
    // Infrastructure Errors
    // ═══════════════════════════════════════════════════════════

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Key-value store (cache or claim store) operation failed.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Value could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ListingError {
    /// Shorthand for a validation error.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error is caused by the caller's input or state.
    ///
    /// # Examples
    ///
    /// ```
    /// # use hotel_listings::ListingError;
    /// assert!(ListingError::NotFound.is_user_error());
    /// assert!(!ListingError::Database("down".into()).is_user_error());
    /// ```
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::NotFound
                | Self::InsufficientPermissions { .. }
                | Self::StateConflict { .. }
                | Self::StockEditNotAllowed { .. }
        )
    }

    /// Returns `true` if the caller may retry the same request later.
    ///
    /// # Examples
    ///
    /// ```
    /// # use hotel_listings::ListingError;
    /// assert!(ListingError::DuplicateSubmission.is_retryable());
    /// assert!(!ListingError::NotFound.is_retryable());
    /// ```
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::DuplicateSubmission)
    }

    /// Returns `true` if the error comes from a backing store rather than
    /// from business rules.
    pub const fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Cache(_) | Self::Serialization(_)
        )
    }

    /// HTTP status code an outer layer should respond with.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 422,
            Self::NotFound => 404,
            Self::InsufficientPermissions { .. } => 403,
            Self::StateConflict { .. }
            | Self::StockEditNotAllowed { .. }
            | Self::DuplicateSubmission => 409,
            Self::Database(_) | Self::Serialization(_) => 500,
            Self::Cache(_) => 503,
        }
    }
}

impl From<sqlx::Error> for ListingError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<redis::RedisError> for ListingError {
    fn from(e: redis::RedisError) -> Self {
        Self::Cache(e.to_string())
    }
}

impl From<serde_json::Error> for ListingError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
