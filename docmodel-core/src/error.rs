//! Error types and result types for model and document store operations.
//!
//! Every fallible operation returns [`DocumentStoreResult<T>`]. A successful
//! result is a committed operation; an error is either a *rejection* (the
//! operation was refused before anything was written) or a *failure* (the
//! storage layer could not complete it). Use [`DocumentStoreError::outcome`]
//! to tell the two apart.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use std::fmt;
use thiserror::Error;

use crate::hooks::Operation;

/// The rule a field violated during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldErrorKind {
    /// A required field was absent or null and had no default.
    Required,
    /// The value has the wrong BSON type for the field.
    Type,
    /// A number (or date) is below the declared minimum.
    Min,
    /// A number (or date) is above the declared maximum.
    Max,
    /// A string is shorter than the declared minimum length.
    MinLength,
    /// A string is longer than the declared maximum length.
    MaxLength,
    /// A string does not match the declared pattern.
    Pattern,
    /// The value is not one of the allowed values.
    Enum,
    /// The field cannot be changed once the document exists.
    Immutable,
}

/// A single validation failure for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    /// Name of the offending field.
    pub field: String,
    /// Which rule was violated.
    pub kind: FieldErrorKind,
    /// Human readable message, either the rule's custom message or a default one.
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, kind: FieldErrorKind, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every violation found while validating a document.
///
/// Validation never stops at the first problem, so this list holds all of
/// them in schema order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    /// Returns the violations reported for `field`.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldError> + 'a {
        self.0
            .iter()
            .filter(move |error| error.field == field)
    }

    pub fn into_inner(self) -> Vec<FieldError> {
        self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages = self.0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();

        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

impl IntoIterator for ValidationErrors {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<Vec<FieldError>> for ValidationErrors {
    fn from(errors: Vec<FieldError>) -> Self {
        Self(errors)
    }
}

/// Terminal state of an operation that did not commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Refused locally before reaching storage. Nothing was written.
    Rejected,
    /// Storage could not complete the operation.
    Failed,
}

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// The document violates one or more field rules of its schema.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
    /// A pre-hook vetoed the operation.
    #[error("{operation} aborted by hook: {reason}")]
    HookAbort {
        operation: Operation,
        reason: String,
    },
    /// Storage rejected a write because a unique field value is already taken.
    #[error("Duplicate value {value} for unique field {field} in collection {collection}")]
    UniquenessConflict {
        collection: String,
        field: String,
        value: String,
    },
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The requested document was not found in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document not found {0} in collection {1}")]
    DocumentNotFound(String, String),
    /// The requested collection does not exist in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// The query could not be built or translated.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// The schema definition is malformed.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
    /// The document has an invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// The storage backend is unreachable or timed out.
    #[error("Connection error: {0}")]
    Connection(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DocumentStoreError {
    /// Classifies this error into the terminal state of the operation that produced it.
    ///
    /// Validation errors, hook vetoes and malformed input are recovered locally
    /// and never reach storage, so they are [`Outcome::Rejected`]. Everything
    /// the storage layer reports is [`Outcome::Failed`].
    pub fn outcome(&self) -> Outcome {
        match self {
            DocumentStoreError::Validation(_)
            | DocumentStoreError::HookAbort { .. }
            | DocumentStoreError::InvalidQuery(_)
            | DocumentStoreError::InvalidSchema(_)
            | DocumentStoreError::InvalidDocument(_)
            | DocumentStoreError::Serialization(_) => Outcome::Rejected,
            _ => Outcome::Failed,
        }
    }

    /// Returns the field violations if this is a validation error.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            DocumentStoreError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<ValidationErrors> for DocumentStoreError {
    fn from(errors: ValidationErrors) -> Self {
        DocumentStoreError::Validation(errors)
    }
}

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_display_every_message() {
        let errors = ValidationErrors::from(vec![
            FieldError::new("name", FieldErrorKind::MinLength, "too short"),
            FieldError::new("age", FieldErrorKind::Min, "too young"),
        ]);

        assert_eq!(errors.to_string(), "name: too short; age: too young");
        assert_eq!(errors.for_field("age").count(), 1);
    }

    #[test]
    fn outcome_separates_rejections_from_failures() {
        let rejected = DocumentStoreError::HookAbort {
            operation: Operation::Save,
            reason: "nope".into(),
        };
        let failed = DocumentStoreError::UniquenessConflict {
            collection: "users".into(),
            field: "email".into(),
            value: "a@b.c".into(),
        };

        assert_eq!(rejected.outcome(), Outcome::Rejected);
        assert_eq!(failed.outcome(), Outcome::Failed);
        assert_eq!(DocumentStoreError::Connection("timeout".into()).outcome(), Outcome::Failed);
    }
}
