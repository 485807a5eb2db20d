//! Error types for the turtle router
//!
//! Inbound protocol handling never fails loudly: bad, late or duplicated
//! items are logged and dropped. The errors below only surface from the
//! client-facing API and from configuration handling.

use crate::identity::LocationId;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for turtle router operations
#[derive(Error, Debug)]
pub enum TurtleError {
    /// Routing errors
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Identifier parsing errors
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),
}

/// Errors parsing peer and content identifiers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The hex string has the wrong length for the identifier
    #[error("Invalid hex length for {kind}: expected {expected} characters, got {actual}")]
    InvalidLength {
        /// Identifier type name
        kind: &'static str,
        /// Expected number of hex characters
        expected: usize,
        /// Actual number of characters
        actual: usize,
    },

    /// The string contains a non-hex character
    #[error("Invalid hex character in {kind}")]
    InvalidCharacter {
        /// Identifier type name
        kind: &'static str,
    },
}

/// Errors raised by the router's client-facing operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// No tunnel is addressed by this virtual location
    #[error("Unknown virtual peer: {location}")]
    UnknownVirtualPeer {
        /// The location that was used as a tunnel address
        location: LocationId,
    },

    /// The search query carried no keywords
    #[error("Empty search query")]
    EmptySearch,

    /// The search request cache cannot take another request
    #[error("Search request cache is full ({capacity} entries)")]
    SearchCacheFull {
        /// Configured ceiling
        capacity: usize,
    },
}

/// Configuration validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A required builder field was not set
    #[error("Missing required field: {field}")]
    MissingRequiredField {
        /// Name of the missing field
        field: String,
    },

    /// A numeric setting must be strictly positive
    #[error("{field} must be greater than zero")]
    MustBePositive {
        /// Name of the offending field
        field: String,
    },

    /// A setting is outside its allowed range
    #[error("{field} is out of range: {reason}")]
    OutOfRange {
        /// Name of the offending field
        field: String,
        /// What the range is
        reason: String,
    },
}

/// Configuration persistence errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// The file does not exist
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path that was looked up
        path: PathBuf,
    },

    /// JSON encoding or decoding failed
    #[error("Serialization failed: {reason}")]
    SerializationFailed {
        /// Underlying serde_json message
        reason: String,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, TurtleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_error_converts() {
        let err: TurtleError = RoutingError::EmptySearch.into();
        assert!(matches!(err, TurtleError::Routing(RoutingError::EmptySearch)));
        assert_eq!(err.to_string(), "Routing error: Empty search query");
    }

    #[test]
    fn test_config_error_message() {
        let err = ConfigError::MustBePositive {
            field: "max_tunnel_depth".to_string(),
        };
        assert_eq!(err.to_string(), "max_tunnel_depth must be greater than zero");
    }
}
