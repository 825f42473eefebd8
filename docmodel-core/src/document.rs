//! Document representation and conversion helpers.
//!
//! Documents are plain [`bson::Document`] maps. Every persisted document carries
//! its identity key in the reserved [`ID_FIELD`] as the textual form of a UUID.
//! The [`DocumentExt`] extension trait converts documents to and from typed
//! serde structs and JSON.

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, to_value};
use uuid::Uuid;

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Name of the field holding a document's identity key.
pub const ID_FIELD: &str = "_id";

/// Extension trait with identity and conversion utilities for documents.
///
/// # Example
///
/// ```ignore
/// use docmodel::document::DocumentExt;
///
/// #[derive(serde::Deserialize)]
/// struct User { name: String, age: i32 }
///
/// let user: User = document.into_typed()?;
/// ```
pub trait DocumentExt: Sized {
    /// Returns the identity key of this document, if it has a valid one.
    fn document_id(&self) -> Option<Uuid>;

    /// Builds a document from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the value is not a map.
    fn from_typed<T: Serialize>(value: &T) -> DocumentStoreResult<Self>;

    /// Deserializes this document into a typed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not match the target type.
    fn into_typed<T: DeserializeOwned>(self) -> DocumentStoreResult<T>;

    /// Converts this document to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn to_json(&self) -> DocumentStoreResult<Value>;
}

impl DocumentExt for Document {
    fn document_id(&self) -> Option<Uuid> {
        match self.get(ID_FIELD) {
            Some(Bson::String(id)) => Uuid::parse_str(id).ok(),
            _ => None,
        }
    }

    fn from_typed<T: Serialize>(value: &T) -> DocumentStoreResult<Self> {
        match serialize_to_bson(value)? {
            Bson::Document(document) => Ok(document),
            other => Err(DocumentStoreError::InvalidDocument(format!(
                "expected a map, got {:?}",
                other.element_type()
            ))),
        }
    }

    fn into_typed<T: DeserializeOwned>(self) -> DocumentStoreResult<T> {
        Ok(deserialize_from_bson(Bson::Document(self))?)
    }

    fn to_json(&self) -> DocumentStoreResult<Value> {
        Ok(to_value(self)?)
    }
}

/// Converts an identity key to the value stored in [`ID_FIELD`].
pub fn id_value(id: &Uuid) -> Bson {
    Bson::String(id.to_string())
}

/// Returns `document` with `id` stored in [`ID_FIELD`] as its first entry.
pub fn with_id(id: &Uuid, document: Document) -> Document {
    let mut identified = Document::new();
    identified.insert(ID_FIELD, id_value(id));

    for (key, value) in document {
        if key != ID_FIELD {
            identified.insert(key, value);
        }
    }

    identified
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Product {
        name: String,
        price: f64,
    }

    #[test]
    fn with_id_puts_identity_first() {
        let id = Uuid::new_v4();
        let document = with_id(&id, doc! { "name": "Pane Cake", "_id": "stale" });

        assert_eq!(document.keys().next().map(String::as_str), Some(ID_FIELD));
        assert_eq!(document.document_id(), Some(id));
        assert_eq!(document.len(), 2);
    }

    #[test]
    fn typed_conversion_round_trips_fields() {
        let product = Product { name: "Pizza".into(), price: 8.5 };
        let document = Document::from_typed(&product).unwrap();

        assert_eq!(document, doc! { "name": "Pizza", "price": 8.5 });
        assert_eq!(document.into_typed::<Product>().unwrap(), product);
    }

    #[test]
    fn non_map_values_are_not_documents() {
        assert!(matches!(
            Document::from_typed(&42),
            Err(DocumentStoreError::InvalidDocument(_))
        ));
    }
}
