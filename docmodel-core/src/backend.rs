//! Storage backend abstraction for the document store.
//!
//! The [`StoreBackend`] trait is the narrow async interface every model
//! operation is expressed in: whole-document inserts and replacements,
//! deletes by identity key, lookups, queries and counts, plus collection and
//! index management. Implementations must be thread-safe (`Send + Sync`) and
//! support concurrent access.
//!
//! # Examples
//!
//! ```ignore
//! use docmodel::backend::StoreBackend;
//! use docmodel::document::with_id;
//! use bson::doc;
//! use uuid::Uuid;
//!
//! let id = Uuid::new_v4();
//! let document = with_id(&id, doc! { "name": "Alice", "age": 30 });
//! backend.insert_documents(vec![(id, document)], "users").await?;
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use std::fmt::Debug;
use uuid::Uuid;

use crate::{
    document::{ID_FIELD, id_value},
    error::DocumentStoreResult,
    query::{Expr, Filter, Query},
};

/// Abstract interface for document storage backends.
///
/// Every document handed to or returned from a backend carries its identity
/// key in [`ID_FIELD`](crate::document::ID_FIELD), matching the `Uuid` it is
/// paired with.
///
/// # Errors
///
/// Backends report unreachable storage as
/// [`DocumentStoreError::Connection`](crate::error::DocumentStoreError::Connection),
/// unique index violations as
/// [`DocumentStoreError::UniquenessConflict`](crate::error::DocumentStoreError::UniquenessConflict)
/// and anything else they cannot classify as
/// [`DocumentStoreError::Backend`](crate::error::DocumentStoreError::Backend).
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts new documents into a collection.
    ///
    /// The collection is created if it doesn't exist. The batch is checked
    /// before anything is written: a duplicate identity key fails with
    /// `DocumentAlreadyExists` and a unique index violation with
    /// `UniquenessConflict`.
    async fn insert_documents(
        &self,
        documents: Vec<(Uuid, Document)>,
        collection: &str,
    ) -> DocumentStoreResult<()>;

    /// Replaces existing documents entirely.
    ///
    /// Fails with `DocumentNotFound` if any identity key is unknown.
    async fn update_documents(
        &self,
        documents: Vec<(Uuid, Document)>,
        collection: &str,
    ) -> DocumentStoreResult<()>;

    /// Deletes documents by identity key and returns how many were removed.
    ///
    /// Unknown keys are skipped.
    async fn delete_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<u64>;

    /// Fetches documents by identity key, in request order.
    ///
    /// Unknown keys are omitted from the result.
    async fn get_documents(
        &self,
        ids: Vec<Uuid>,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Runs a structured query against a collection.
    ///
    /// Clauses apply as filter, sort, skip, limit, projection. A collection
    /// that doesn't exist holds no documents.
    async fn query_documents(
        &self,
        query: Query,
        collection: &str,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Counts the documents matching `filter` (all documents for `None`).
    async fn count_documents(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<u64>;

    /// Whether no document other than `exclude` holds `value` in `field`.
    async fn check_unique(
        &self,
        collection: &str,
        field: &str,
        value: &Bson,
        exclude: Option<Uuid>,
    ) -> DocumentStoreResult<bool> {
        let mut filter = Filter::eq(field, value.clone());

        if let Some(id) = exclude {
            filter = filter.and(Filter::ne(ID_FIELD, id_value(&id)));
        }

        Ok(self
            .count_documents(Some(filter), collection)
            .await?
            == 0)
    }

    /// Creates an empty collection. Creating an existing collection is a no-op.
    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Drops a collection and all its documents.
    ///
    /// Fails with `CollectionNotFound` if it doesn't exist.
    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()>;

    /// Lists the names of all collections in the store.
    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>>;

    /// Creates an index on a field, optionally enforcing uniqueness.
    ///
    /// Adding a unique index over existing duplicates fails with
    /// `UniquenessConflict`.
    async fn add_index(
        &self,
        collection: &str,
        field: &str,
        unique: bool,
    ) -> DocumentStoreResult<()>;

    /// Removes the index on a field.
    async fn drop_index(&self, collection: &str, field: &str) -> DocumentStoreResult<()>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op; backends holding connections
    /// should override it.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Asynchronous factory for a configured backend.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
