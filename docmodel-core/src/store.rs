//! Main document store interface.
//!
//! A [`DocumentStore`] owns the shared backend handle and hands out
//! [`Model`]s bound to it. Every model created from the same store talks to
//! the same backend; the store itself holds no other state.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::{DocumentStore, memory::InMemoryStore};
//!
//! let store = DocumentStore::new(InMemoryStore::new());
//! let products = store.model("products", product_schema).await?;
//! ```

use log::debug;
use std::sync::Arc;

use crate::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    model::Model,
    schema::Schema,
};

/// A document store bound to a specific backend implementation.
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: Arc<B>,
}

impl<B: StoreBackend> DocumentStore<B> {
    /// Creates a new document store with the given backend.
    pub fn new(backend: B) -> Self {
        Self { backend: Arc::new(backend) }
    }

    /// Creates a store over a backend handle shared with other code.
    pub fn from_shared(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Builds the backend with `builder` and wraps it in a store.
    pub async fn connect<T>(builder: T) -> DocumentStoreResult<Self>
    where
        T: StoreBackendBuilder<Backend = B>,
    {
        Ok(Self::new(builder.build().await?))
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Creates a model for collection `name`.
    ///
    /// The collection is created if needed, along with a unique index for
    /// every field the schema marks `unique`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot create the collection or an
    /// index, e.g. [`DocumentStoreError::UniquenessConflict`] when existing
    /// documents already share a value of a unique field.
    pub async fn model(&self, name: &str, schema: impl Into<Arc<Schema>>) -> DocumentStoreResult<Model<B>> {
        let schema = schema.into();

        self.backend
            .create_collection(name)
            .await?;

        for field in schema.unique_fields() {
            debug!("{name}: ensuring unique index on `{field}`");

            self.backend
                .add_index(name, field, true)
                .await?;
        }

        Ok(Model::new(name, schema, Arc::clone(&self.backend)))
    }

    /// Creates a new, empty collection. Existing collections are left as is.
    pub async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend
            .create_collection(name)
            .await
    }

    /// Drops a collection and every document in it.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection does not exist or deletion fails.
    pub async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.backend.drop_collection(name).await
    }

    pub async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.backend.list_collections().await
    }

    /// Adds an index to a field in a collection.
    pub async fn add_index(
        &self,
        collection: &str,
        field: &str,
        unique: bool,
    ) -> DocumentStoreResult<()> {
        self.backend
            .add_index(collection, field, unique)
            .await
    }

    /// Removes an index from a field in a collection.
    pub async fn drop_index(&self, collection: &str, field: &str) -> DocumentStoreResult<()> {
        self.backend
            .drop_index(collection, field)
            .await
    }

    /// Shuts down the backend, releasing all resources.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Backend`] while models created from this
    /// store are still alive, since they share the backend handle.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        match Arc::try_unwrap(self.backend) {
            Ok(backend) => backend.shutdown().await,
            Err(backend) => Err(DocumentStoreError::Backend(format!(
                "backend still in use by {} handles",
                Arc::strong_count(&backend) - 1
            ))),
        }
    }
}
