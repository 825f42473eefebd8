//! Single-hop reference resolution ("populate").
//!
//! A field declared with [`FieldRule::reference`](crate::schema::FieldRule::reference)
//! holds the identity key of a document in another collection. Populating the
//! field replaces the key with the referenced document. A key that matches no
//! document is replaced by `null`, so the field is never silently removed.
//! Resolved documents are inserted as stored; their own references are left
//! untouched.

use bson::{Bson, Document};
use log::debug;
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    backend::StoreBackend,
    document::DocumentExt,
    error::{DocumentStoreError, DocumentStoreResult},
    schema::Schema,
};

/// Outcome of resolving one reference field.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The referenced document.
    Found(Document),
    /// The field holds a key that matches no document.
    NotFound(String),
    /// The field is absent or null.
    Unset,
}

impl Resolution {
    /// Value to store in the populated field, or `None` to leave it as is.
    fn into_value(self) -> Option<Bson> {
        match self {
            Resolution::Found(document) => Some(Bson::Document(document)),
            Resolution::NotFound(_) => Some(Bson::Null),
            Resolution::Unset => None,
        }
    }
}

/// Resolves the reference fields of one schema against a backend.
#[derive(Debug)]
pub struct ReferenceResolver<'a, B: StoreBackend> {
    backend: &'a B,
    schema: &'a Schema,
}

impl<'a, B: StoreBackend> ReferenceResolver<'a, B> {
    pub fn new(backend: &'a B, schema: &'a Schema) -> Self {
        Self { backend, schema }
    }

    /// Target collection of `field`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidQuery`] if the schema does not
    /// declare `field` as a reference.
    pub fn target(&self, field: &str) -> DocumentStoreResult<&'a str> {
        self.schema
            .field(field)
            .and_then(|rule| rule.reference_target())
            .ok_or_else(|| DocumentStoreError::InvalidQuery(format!("`{field}` is not a reference field")))
    }

    /// Looks up the document referenced by `field` of `document`.
    ///
    /// A field that already holds an embedded document resolves to that
    /// document without touching storage.
    pub async fn resolve(&self, document: &Document, field: &str) -> DocumentStoreResult<Resolution> {
        let collection = self.target(field)?;

        let key = match document.get(field) {
            None | Some(Bson::Null) => return Ok(Resolution::Unset),
            Some(Bson::Document(embedded)) => return Ok(Resolution::Found(embedded.clone())),
            Some(Bson::String(key)) => key,
            Some(other) => return Ok(Resolution::NotFound(other.to_string())),
        };

        let Ok(id) = Uuid::parse_str(key) else {
            return Ok(Resolution::NotFound(key.clone()));
        };

        Ok(self
            .backend
            .get_documents(vec![id], collection)
            .await?
            .into_iter()
            .next()
            .map_or_else(|| Resolution::NotFound(key.clone()), Resolution::Found))
    }

    /// Replaces the key in `field` with the referenced document.
    ///
    /// A key that matches no document becomes `null`, which looks the same
    /// as a field that was already stored as `null`. Use
    /// [`resolve`](Self::resolve) to tell a dangling key
    /// ([`Resolution::NotFound`]) from an unset field ([`Resolution::Unset`]).
    pub async fn populate(&self, mut document: Document, field: &str) -> DocumentStoreResult<Document> {
        if let Some(value) = self.resolve(&document, field).await?.into_value() {
            document.insert(field, value);
        }

        Ok(document)
    }

    /// Populates `field` on every document with a single batched lookup.
    ///
    /// Dangling keys become `null`, as with [`populate`](Self::populate).
    pub async fn populate_many(&self, mut documents: Vec<Document>, field: &str) -> DocumentStoreResult<Vec<Document>> {
        let collection = self.target(field)?;

        let mut ids = documents
            .iter()
            .filter_map(|document| match document.get(field) {
                Some(Bson::String(key)) => Uuid::parse_str(key).ok(),
                _ => None,
            })
            .collect::<Vec<_>>();
        ids.sort_unstable();
        ids.dedup();

        let found = if ids.is_empty() {
            HashMap::new()
        } else {
            debug!("populating `{field}` from {collection}: {} distinct keys", ids.len());

            self.backend
                .get_documents(ids, collection)
                .await?
                .into_iter()
                .filter_map(|referenced| referenced.document_id().map(|id| (id, referenced)))
                .collect::<HashMap<_, _>>()
        };

        for document in &mut documents {
            let resolution = match document.get(field) {
                None | Some(Bson::Null) | Some(Bson::Document(_)) => Resolution::Unset,
                Some(Bson::String(key)) => Uuid::parse_str(key)
                    .ok()
                    .and_then(|id| found.get(&id).cloned())
                    .map_or_else(|| Resolution::NotFound(key.clone()), Resolution::Found),
                Some(other) => Resolution::NotFound(other.to_string()),
            };

            if let Some(value) = resolution.into_value() {
                document.insert(field, value);
            }
        }

        Ok(documents)
    }
}
