use async_trait::async_trait;
use bson::{Document, doc};
use futures::TryStreamExt;
use log::debug;
use mongodb::{
    Client, Collection as MongoCollection, IndexModel,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, FindOptions, IndexOptions},
};
use std::{collections::HashMap, time::Duration};
use uuid::Uuid;

use docmodel_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    document::{DocumentExt, ID_FIELD, id_value},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query},
};

use crate::query::MongoQueryTranslator;

/// Server error code for duplicate keys in a unique index.
const DUPLICATE_KEY: i32 = 11000;

#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }

    async fn collection_exists(&self, name: &str) -> DocumentStoreResult<bool> {
        Ok(self
            .list_collections()
            .await?
            .iter()
            .any(|existing| existing == name))
    }
}

/// Maps a driver error to the store's error taxonomy.
///
/// Duplicate keys become [`DocumentStoreError::UniquenessConflict`] (or
/// [`DocumentStoreError::DocumentAlreadyExists`] for the identity key),
/// unreachable servers become [`DocumentStoreError::Connection`].
fn map_error(collection: &str, error: MongoError) -> DocumentStoreError {
    let duplicate = match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY => Some(write.message.as_str()),
        ErrorKind::Command(command) if command.code == DUPLICATE_KEY => Some(command.message.as_str()),
        _ => None,
    };

    if let Some(message) = duplicate {
        let (field, value) = parse_duplicate_key(message);

        return if field == ID_FIELD {
            DocumentStoreError::DocumentAlreadyExists(value, collection.to_string())
        } else {
            DocumentStoreError::UniquenessConflict {
                collection: collection.to_string(),
                field,
                value,
            }
        };
    }

    match error.kind.as_ref() {
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } | ErrorKind::ConnectionPoolCleared { .. } => {
            DocumentStoreError::Connection(error.to_string())
        }
        _ => DocumentStoreError::Backend(error.to_string()),
    }
}

/// Extracts the field and value from a duplicate key message such as
/// `E11000 duplicate key error collection: shop.users index: email_1 dup key: { email: "a@x.io" }`.
fn parse_duplicate_key(message: &str) -> (String, String) {
    let field = message
        .split("index: ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .map(|index| index.strip_suffix("_1").or_else(|| index.strip_suffix('_')).unwrap_or(index))
        .unwrap_or("unknown")
        .to_string();

    let value = message
        .split("dup key: ")
        .nth(1)
        .map(|key| {
            key.trim_matches(|c: char| c == '{' || c == '}' || c.is_whitespace())
                .split_once(": ")
                .map_or(key, |(_, value)| value)
                .trim_matches('"')
                .to_string()
        })
        .unwrap_or_default();

    (field, value)
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_documents(&self, documents: Vec<(Uuid, Document)>, collection: &str) -> DocumentStoreResult<()> {
        let target = self.get_collection(collection);

        for (id, document) in documents {
            target
                .insert_one(document)
                .await
                .map_err(|e| match map_error(collection, e) {
                    DocumentStoreError::DocumentAlreadyExists(..) => {
                        DocumentStoreError::DocumentAlreadyExists(id.to_string(), collection.to_string())
                    }
                    other => other,
                })?;
        }

        Ok(())
    }

    async fn update_documents(&self, documents: Vec<(Uuid, Document)>, collection: &str) -> DocumentStoreResult<()> {
        let target = self.get_collection(collection);

        for (id, document) in documents {
            let result = target
                .replace_one(doc! { ID_FIELD: id_value(&id) }, document)
                .await
                .map_err(|e| map_error(collection, e))?;

            if result.matched_count == 0 {
                return Err(DocumentStoreError::DocumentNotFound(id.to_string(), collection.to_string()));
            }
        }

        Ok(())
    }

    async fn delete_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<u64> {
        let keys = ids.iter().map(id_value).collect::<Vec<_>>();

        Ok(self
            .get_collection(collection)
            .delete_many(doc! { ID_FIELD: { "$in": keys } })
            .await
            .map_err(|e| map_error(collection, e))?
            .deleted_count)
    }

    async fn get_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        let keys = ids.iter().map(id_value).collect::<Vec<_>>();

        let mut found = self
            .get_collection(collection)
            .find(doc! { ID_FIELD: { "$in": keys } })
            .await
            .map_err(|e| map_error(collection, e))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| map_error(collection, e))?
            .into_iter()
            .filter_map(|document| document.document_id().map(|id| (id, document)))
            .collect::<HashMap<_, _>>();

        Ok(ids
            .iter()
            .filter_map(|id| found.remove(id))
            .collect())
    }

    async fn query_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        let mut options = FindOptions::default();

        if let Some(limit) = query.limit {
            // Negative limits mean something else to the server.
            options.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(skip) = query.skip {
            options.skip = Some(skip as u64);
        }
        options.sort = MongoQueryTranslator::sort(&query.sort);
        options.projection = query
            .projection
            .as_ref()
            .map(MongoQueryTranslator::projection);

        // A limit of zero means "no limit" to the server.
        if query.limit == Some(0) {
            return Ok(vec![]);
        }

        let documents = self
            .get_collection(collection)
            .find(MongoQueryTranslator::filter(query.filter.as_ref())?)
            .with_options(options)
            .await
            .map_err(|e| map_error(collection, e))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| map_error(collection, e))?;

        Ok(match &query.projection {
            Some(projection) => documents
                .into_iter()
                .map(|document| projection.apply(document))
                .collect(),
            None => documents,
        })
    }

    async fn count_documents(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<u64> {
        self.get_collection(collection)
            .count_documents(MongoQueryTranslator::filter(filter.as_ref())?)
            .await
            .map_err(|e| map_error(collection, e))
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        if self.collection_exists(name).await? {
            return Ok(());
        }

        debug!("creating collection {name} in {}", self.database);

        self.client
            .database(&self.database)
            .create_collection(name)
            .await
            .map_err(|e| map_error(name, e))
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        if !self.collection_exists(name).await? {
            return Err(DocumentStoreError::CollectionNotFound(name.to_string()));
        }

        self.get_collection(name)
            .drop()
            .await
            .map_err(|e| map_error(name, e))
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        let mut names = self
            .client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(|e| map_error(&self.database, e))?;
        names.sort();

        Ok(names)
    }

    async fn add_index(&self, collection: &str, field: &str, unique: bool) -> DocumentStoreResult<()> {
        debug!("{collection}: index on `{field}` (unique: {unique})");

        self.get_collection(collection)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { field: 1 })
                    .options(
                        IndexOptions::builder()
                            .unique(unique)
                            .sparse(unique)
                            .build(),
                    )
                    .build(),
            )
            .await
            .map_err(|e| map_error(collection, e))?;

        Ok(())
    }

    async fn drop_index(&self, collection: &str, field: &str) -> DocumentStoreResult<()> {
        self.get_collection(collection)
            .drop_index(format!("{field}_1"))
            .await
            .map_err(|e| map_error(collection, e))
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

/// Connection settings for a [`MongoDbStore`].
///
/// Timeouts left unset use the driver's defaults or whatever the DSN
/// specifies.
pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
    connect_timeout: Option<Duration>,
    server_selection_timeout: Option<Duration>,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
            connect_timeout: None,
            server_selection_timeout: None,
        }
    }

    /// Time allowed for opening a connection to a server.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Time allowed for finding a suitable server before an operation fails
    /// with a connection error.
    pub fn server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.server_selection_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let mut options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        if let Some(timeout) = self.connect_timeout {
            options.connect_timeout = Some(timeout);
        }
        if let Some(timeout) = self.server_selection_timeout {
            options.server_selection_timeout = Some(timeout);
        }

        Ok(MongoDbStore::new(
            Client::with_options(options).map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_messages_name_field_and_value() {
        let message = r#"E11000 duplicate key error collection: shop.users index: email_1 dup key: { email: "a@x.io" }"#;

        assert_eq!(parse_duplicate_key(message), ("email".to_string(), "a@x.io".to_string()));
    }

    #[test]
    fn duplicate_identity_keys_are_recognised() {
        let message = r#"E11000 duplicate key error collection: shop.users index: _id_ dup key: { _id: "6a1f" }"#;

        assert_eq!(parse_duplicate_key(message), ("_id".to_string(), "6a1f".to_string()));
    }

    #[test]
    fn unparseable_messages_fall_back() {
        assert_eq!(parse_duplicate_key("E11000"), ("unknown".to_string(), String::new()));
    }
}
