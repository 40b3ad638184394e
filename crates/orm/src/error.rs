//! Error types for the relationship-graph ORM
//!
//! Every variant here is a programmer or configuration error. None of them
//! are retried and none are swallowed inside the crate.

use thiserror::Error;

/// Result type alias for ORM operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for ORM operations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrmError {
    /// An unknown relationship name was requested on a model type
    #[error("Relationship '{relationship}' is not defined on model type '{model_type}'")]
    RelationshipNotDefined {
        model_type: String,
        relationship: String,
    },

    /// An operation was applied to the wrong kind of relationship
    #[error("Relationship '{relationship}' is a {found} relationship, expected {expected}")]
    InvalidRelationshipType {
        relationship: String,
        expected: String,
        found: String,
    },

    /// A model of the wrong type was put into a typed collection
    #[error("Invalid model type: expected '{expected}', found '{found}'")]
    InvalidType { expected: String, found: String },

    /// A condition value does not fit the arity of its operator
    #[error("Invalid operator '{operator}' for field '{field}': {message}")]
    InvalidOperator {
        field: String,
        operator: String,
        message: String,
    },

    /// Malformed or empty condition logic
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// An operation that has no meaning on a polymorphic collection
    #[error("Polymorphic collection error: {0}")]
    Polymorphic(String),

    /// A relationship was saved or referenced through a model that has no stored id yet
    #[error("Model '{key}' must be saved before its '{relationship}' relationship")]
    UnsavedModel { key: String, relationship: String },

    /// A record could not be found in the store
    #[error("Record '{id}' not found for entity type '{entity_type}'")]
    NotFound { entity_type: String, id: String },

    /// Invalid configuration or model registry setup
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The record store failed
    #[error("Record store error: {0}")]
    Store(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl OrmError {
    pub(crate) fn relationship_not_defined(model_type: &str, relationship: &str) -> Self {
        OrmError::RelationshipNotDefined {
            model_type: model_type.to_string(),
            relationship: relationship.to_string(),
        }
    }

    pub(crate) fn invalid_type(expected: impl Into<String>, found: impl Into<String>) -> Self {
        OrmError::InvalidType {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

// Store backends report failures through anyhow
impl From<anyhow::Error> for OrmError {
    fn from(err: anyhow::Error) -> Self {
        OrmError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        OrmError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = OrmError::relationship_not_defined("Order", "lines");
        assert_eq!(
            err.to_string(),
            "Relationship 'lines' is not defined on model type 'Order'"
        );

        let err = OrmError::invalid_type("Order", "Customer");
        assert_eq!(
            err.to_string(),
            "Invalid model type: expected 'Order', found 'Customer'"
        );
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: OrmError = anyhow::anyhow!("disk full").into();
        assert_eq!(err, OrmError::Store("disk full".to_string()));
    }
}
