//! In-memory storage implementation for document stores.
//!
//! Documents are kept per collection in insertion order, indexed by identity
//! key, behind a single async-aware read-write lock. Every write takes the
//! write lock for its whole duration, so uniqueness checks and the write
//! itself are atomic.

use async_trait::async_trait;
use bson::{Bson, Document};
use log::debug;
use mea::rwlock::RwLock;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use uuid::Uuid;

use docmodel_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query},
};

use crate::evaluator::{DocumentEvaluator, compare_documents, same_value};

/// Documents and indexes of one collection.
#[derive(Debug, Default)]
struct CollectionData {
    /// Insertion sequence number -> document.
    documents: BTreeMap<u64, Document>,
    /// Identity key -> insertion sequence number.
    ids: HashMap<Uuid, u64>,
    /// Indexed field -> whether the index is unique.
    indexes: BTreeMap<String, bool>,
    next_seq: u64,
}

impl CollectionData {
    fn unique_fields(&self) -> impl Iterator<Item = &str> {
        self.indexes
            .iter()
            .filter(|(_, unique)| **unique)
            .map(|(field, _)| field.as_str())
    }

    /// Fails if `document` repeats the value of a unique field held by any
    /// of `others`.
    ///
    /// Absent and null values are not indexed.
    fn check_unique(&self, collection: &str, document: &Document, others: &[&Document]) -> DocumentStoreResult<()> {
        for field in self.unique_fields() {
            let Some(value) = document.get(field).filter(|value| !matches!(value, Bson::Null)) else {
                continue;
            };

            if others
                .iter()
                .any(|other| other.get(field).is_some_and(|taken| same_value(taken, value)))
            {
                return Err(DocumentStoreError::UniquenessConflict {
                    collection: collection.to_string(),
                    field: field.to_string(),
                    value: value.to_string(),
                });
            }
        }

        Ok(())
    }

    fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    fn matching<'a>(&'a self, filter: Option<&Expr>) -> DocumentStoreResult<Vec<&'a Document>> {
        match filter {
            Some(filter) => DocumentEvaluator::filter_documents(self.iter(), filter),
            None => Ok(self.iter().collect()),
        }
    }
}

type StoreMap = HashMap<String, CollectionData>;

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state;
/// clones share the same underlying data.
///
/// Queries scan every document of a collection. Unique indexes are enforced
/// on insert and update.
///
/// # Example
///
/// ```ignore
/// use docmodel_memory::InMemoryStore;
/// use docmodel::backend::StoreBackend;
/// use docmodel::document::with_id;
/// use bson::doc;
/// use uuid::Uuid;
///
/// let store = InMemoryStore::new();
///
/// let id = Uuid::new_v4();
/// store.insert_documents(vec![(id, with_id(&id, doc! { "name": "Alice" }))], "users").await?;
///
/// let docs = store.get_documents(vec![id], "users").await?;
/// assert_eq!(docs.len(), 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> collection data
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_documents(&self, documents: Vec<(Uuid, Document)>, collection: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let data = store
            .entry(collection.to_string())
            .or_default();

        for (index, (id, document)) in documents.iter().enumerate() {
            let earlier = &documents[..index];

            if data.ids.contains_key(id) || earlier.iter().any(|(other, _)| other == id) {
                return Err(DocumentStoreError::DocumentAlreadyExists(id.to_string(), collection.to_string()));
            }

            let others = data
                .iter()
                .chain(earlier.iter().map(|(_, other)| other))
                .collect::<Vec<_>>();
            data.check_unique(collection, document, &others)?;
        }

        for (id, document) in documents {
            let seq = data.next_seq;
            data.next_seq += 1;
            data.ids.insert(id, seq);
            data.documents.insert(seq, document);
        }

        Ok(())
    }

    async fn update_documents(&self, documents: Vec<(Uuid, Document)>, collection: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let data = match store.get_mut(collection) {
            Some(data) => data,
            None => return Err(DocumentStoreError::CollectionNotFound(collection.to_string())),
        };

        if let Some((id, _)) = documents.iter().find(|(id, _)| !data.ids.contains_key(id)) {
            return Err(DocumentStoreError::DocumentNotFound(id.to_string(), collection.to_string()));
        }

        // The collection as it will look once the batch is applied.
        let replacements = documents
            .iter()
            .map(|(id, document)| (*id, document))
            .collect::<HashMap<_, _>>();
        let after = data
            .ids
            .iter()
            .filter_map(|(id, seq)| {
                let document = replacements.get(id).copied().or_else(|| data.documents.get(seq))?;
                Some((*id, document))
            })
            .collect::<Vec<_>>();

        for (id, document) in &documents {
            let others = after
                .iter()
                .filter(|(other, _)| other != id)
                .map(|(_, other)| *other)
                .collect::<Vec<_>>();
            data.check_unique(collection, document, &others)?;
        }

        for (id, document) in documents {
            if let Some(seq) = data.ids.get(&id) {
                data.documents.insert(*seq, document);
            }
        }

        Ok(())
    }

    async fn delete_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<u64> {
        let mut store = self.store.write().await;
        let Some(data) = store.get_mut(collection) else {
            return Ok(0);
        };

        let mut deleted = 0;

        for id in ids {
            if let Some(seq) = data.ids.remove(&id) {
                data.documents.remove(&seq);
                deleted += 1;
            }
        }

        Ok(deleted)
    }

    async fn get_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let Some(data) = store.get(collection) else {
            return Ok(vec![]);
        };

        Ok(ids
            .iter()
            .filter_map(|id| data.ids.get(id))
            .filter_map(|seq| data.documents.get(seq))
            .cloned()
            .collect())
    }

    async fn query_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let Some(data) = store.get(collection) else {
            return Ok(vec![]);
        };

        let mut documents = data.matching(query.filter.as_ref())?;

        // `sort_by` is stable, so ties keep insertion order.
        if !query.sort.is_empty() {
            documents.sort_by(|a, b| compare_documents(a, b, &query.sort));
        }

        Ok(documents
            .into_iter()
            .skip(query.skip.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|document| match &query.projection {
                Some(projection) => projection.apply(document.clone()),
                None => document.clone(),
            })
            .collect())
    }

    async fn count_documents(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<u64> {
        let store = self.store.read().await;
        let Some(data) = store.get(collection) else {
            return Ok(0);
        };

        Ok(data.matching(filter.as_ref())?.len() as u64)
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;

        if !store.contains_key(name) {
            debug!("creating collection {name}");
            store.insert(name.to_string(), CollectionData::default());
        }

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;

        if store.remove(name).is_none() {
            return Err(DocumentStoreError::CollectionNotFound(name.to_string()));
        }

        Ok(())
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let mut names = self
            .store
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();

        Ok(names)
    }

    async fn add_index(&self, collection: &str, field: &str, unique: bool) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let data = store
            .entry(collection.to_string())
            .or_default();

        if unique {
            let mut seen: Vec<&Bson> = Vec::new();

            for value in data.iter().filter_map(|document| document.get(field)) {
                if matches!(value, Bson::Null) {
                    continue;
                }
                if seen.iter().any(|taken| same_value(taken, value)) {
                    return Err(DocumentStoreError::UniquenessConflict {
                        collection: collection.to_string(),
                        field: field.to_string(),
                        value: value.to_string(),
                    });
                }
                seen.push(value);
            }
        }

        debug!("{collection}: index on `{field}` (unique: {unique})");
        data.indexes.insert(field.to_string(), unique);

        Ok(())
    }

    async fn drop_index(&self, collection: &str, field: &str) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;
        let Some(data) = store.get_mut(collection) else {
            return Err(DocumentStoreError::CollectionNotFound(collection.to_string()));
        };

        match data.indexes.remove(field) {
            Some(_) => Ok(()),
            None => Err(DocumentStoreError::Backend(format!("{collection} has no index on `{field}`"))),
        }
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}
