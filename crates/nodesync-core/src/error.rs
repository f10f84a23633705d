//! Error types for the node DNS synchronizer
//!
//! This module defines all error types used throughout the crate.

use crate::model::RecordType;
use thiserror::Error;

/// Result type alias for synchronizer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the node DNS synchronizer
#[derive(Error, Debug)]
pub enum Error {
    /// No known zone owns the primary record name
    #[error("No zone found for record name: {name}")]
    ZoneNotFound {
        /// The record name zone discovery was attempted for
        name: String,
    },

    /// A record with this name exists but is not an address record
    #[error("Record {name} exists with type {found}, refusing to overwrite with an address record")]
    TypeConflict {
        /// The conflicting record name
        name: String,
        /// The type found at that name
        found: RecordType,
    },

    /// Failure while applying a record, with zone and name context
    #[error("Failed to sync record {name} in zone {zone_id}: {source}")]
    Record {
        /// Zone the record belongs to
        zone_id: String,
        /// Record name being synced
        name: String,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// Member inventory errors
    #[error("Inventory error: {0}")]
    Inventory(String),

    /// External name resolution errors
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client errors (from provider APIs)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Resource not found on the provider side
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// The engine is shutting down and refuses new passes
    #[error("Engine is shutting down")]
    ShuttingDown,
}

impl Error {
    /// Create a zone-not-found error
    pub fn zone_not_found(name: impl Into<String>) -> Self {
        Self::ZoneNotFound { name: name.into() }
    }

    /// Create a type conflict error
    pub fn type_conflict(name: impl Into<String>, found: RecordType) -> Self {
        Self::TypeConflict {
            name: name.into(),
            found,
        }
    }

    /// Wrap an error with the zone and record it occurred for
    pub fn record(zone_id: impl Into<String>, name: impl Into<String>, source: Error) -> Self {
        Self::Record {
            zone_id: zone_id.into(),
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// Create an inventory error
    pub fn inventory(msg: impl Into<String>) -> Self {
        Self::Inventory(msg.into())
    }

    /// Create a resolution error
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether the failure is likely to clear up on its own
    ///
    /// Throttling, transport failures and provider-side 5xx responses are
    /// transient. Conflicts, missing zones and credential problems are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::RateLimited(_) | Error::Http(_) => true,
            Error::Provider { message, .. } => message.contains("transient"),
            Error::Record { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_context_wraps_source() {
        let err = Error::record("Z1", "www.example.com.", Error::rate_limited("slow down"));
        let text = err.to_string();
        assert!(text.contains("Z1"));
        assert!(text.contains("www.example.com."));
        assert!(text.contains("slow down"));
        assert!(err.is_transient());
    }

    #[test]
    fn conflicts_are_not_transient() {
        let err = Error::type_conflict("a.example.com.", RecordType::Other("NS".into()));
        assert!(!err.is_transient());
        assert!(err.to_string().contains("NS"));
        assert!(!Error::zone_not_found("a.example.com.").is_transient());
    }
}
