//! Models: schema-checked CRUD access to one collection.
//!
//! A [`Model`] ties a collection name to a [`Schema`], a [`HookPipeline`]
//! and a shared storage backend. Every write goes through the same pipeline:
//!
//! ```text
//! create:  pre(validate) -> validate -> post(validate) -> pre(save) -> write -> post(save)
//! update:  validate changes -> pre(update) -> validate changed fields -> write -> post(update)
//! delete:  pre(delete) -> delete -> post(delete)
//! ```
//!
//! A validation error or a pre-hook veto rejects the operation before
//! storage is touched. Storage errors fail it. Post-hook failures are only
//! reported.
//!
//! # Example
//!
//! ```ignore
//! let users = store.model("users", schema).await?;
//!
//! let alice = users.create(doc! { "name": "Alice", "age": 30 }).await?;
//! let adults = users
//!     .find(doc! { "age": { "$gte": 18 } })
//!     .sort("age", SortDirection::Desc)
//!     .limit(10)
//!     .exec()
//!     .await?;
//! ```

use bson::{Bson, Document};
use futures::{
    future::BoxFuture,
    stream::{self, BoxStream, StreamExt, TryStreamExt},
};
use log::debug;
use std::{future::IntoFuture, sync::Arc};
use uuid::Uuid;

use crate::{
    backend::StoreBackend,
    document::{DocumentExt, ID_FIELD, id_value, with_id},
    error::{DocumentStoreError, DocumentStoreResult},
    hooks::{HookError, HookFailure, HookPipeline, Operation},
    page::{Page, PaginationParams},
    populate::ReferenceResolver,
    query::{Criteria, Expr, Filter, Projection, Query, QueryBuilder, SortDirection},
    schema::Schema,
    validate::ValidationEngine,
};

/// Result of an update over matching documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    /// Documents matched by the criteria.
    pub matched: u64,
    /// Documents whose content actually changed.
    pub modified: u64,
}

/// Result of a delete over matching documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted: u64,
}

/// Which version of the document `find_by_id_and_update` returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnDocument {
    /// The document as it was before the update.
    #[default]
    Before,
    /// The document as persisted by the update.
    After,
}

/// Schema-checked access to one collection.
///
/// Cloning a model is cheap; clones share the schema, the hooks and the
/// backend handle. Register hooks before cloning: registering on a clone
/// copies the pipeline for that clone only.
#[derive(Debug)]
pub struct Model<B: StoreBackend> {
    name: String,
    schema: Arc<Schema>,
    hooks: Arc<HookPipeline>,
    backend: Arc<B>,
}

impl<B: StoreBackend> Clone for Model<B> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            schema: Arc::clone(&self.schema),
            hooks: Arc::clone(&self.hooks),
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: StoreBackend> Model<B> {
    /// Creates a model over an already open backend.
    ///
    /// Unlike [`DocumentStore::model`](crate::store::DocumentStore::model)
    /// this does not create the collection or its unique indexes.
    pub fn new(name: impl Into<String>, schema: impl Into<Arc<Schema>>, backend: Arc<B>) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            hooks: Arc::new(HookPipeline::new()),
            backend,
        }
    }

    /// Name of the underlying collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn hooks(&self) -> &HookPipeline {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut HookPipeline {
        Arc::make_mut(&mut self.hooks)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Registers a pre-hook for `operation`.
    pub fn pre<F>(&mut self, operation: Operation, hook: F) -> &mut Self
    where
        F: Fn(&mut Document) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.hooks_mut().pre(operation, hook);
        self
    }

    /// Registers a post-hook for `operation`.
    pub fn post<F>(&mut self, operation: Operation, hook: F) -> &mut Self
    where
        F: Fn(&Document) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.hooks_mut().post(operation, hook);
        self
    }

    /// Sets the callback that receives post-hook failures.
    pub fn on_post_failure<F>(&mut self, reporter: F) -> &mut Self
    where
        F: Fn(&HookFailure) + Send + Sync + 'static,
    {
        self.hooks_mut().on_post_failure(reporter);
        self
    }

    /// Validates and persists a new document.
    ///
    /// The identity key is generated unless `input` carries a valid UUID
    /// string in `_id`, which makes retries idempotent: a second create with
    /// the same key fails with [`DocumentStoreError::DocumentAlreadyExists`].
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::Validation`] with every field violation
    /// - [`DocumentStoreError::HookAbort`] if a pre-hook vetoes
    /// - [`DocumentStoreError::UniquenessConflict`] or
    ///   [`DocumentStoreError::Connection`] from storage
    pub async fn create(&self, input: Document) -> DocumentStoreResult<Document> {
        let document = self.hooks.run_pre(Operation::Validate, input)?;
        let id = Self::identity(&document)?;

        debug!("{}: validating {id}", self.name);

        let document = with_id(&id, ValidationEngine::validate(document, &self.schema)?);
        self.hooks.run_post(Operation::Validate, &document);

        let document = self.hooks.run_pre(Operation::Save, document)?;
        Self::ensure_same_id(&document, &id)?;

        // Save hooks may have rewritten fields.
        let document = ValidationEngine::validate(document, &self.schema)?;

        debug!("{}: writing {id}", self.name);
        self.backend
            .insert_documents(vec![(id, document.clone())], &self.name)
            .await?;

        self.hooks.run_post(Operation::Save, &document);
        debug!("{}: committed {id}", self.name);

        Ok(document)
    }

    /// Runs [`create`](Self::create) for each input in order.
    ///
    /// Stops at the first failure; documents created before it stay
    /// committed.
    pub async fn create_many(&self, inputs: impl IntoIterator<Item = Document>) -> DocumentStoreResult<Vec<Document>> {
        let mut created = Vec::new();

        for input in inputs {
            created.push(self.create(input).await?);
        }

        Ok(created)
    }

    /// Starts a query over documents matching `criteria`.
    ///
    /// `criteria` can be an [`Expr`], a criteria document such as
    /// `doc! { "price": { "$gt": 5 } }`, or `()` for every document.
    pub fn find(&self, criteria: impl Into<Criteria>) -> Find<'_, B> {
        Find::new(self, criteria.into())
    }

    /// Starts a query for the first document matching `criteria`.
    pub fn find_one(&self, criteria: impl Into<Criteria>) -> FindOne<'_, B> {
        FindOne::new(self, criteria.into())
    }

    /// Starts a lookup of the document with identity key `id`.
    pub fn find_by_id(&self, id: impl Into<Uuid>) -> FindOne<'_, B> {
        self.find_one(Self::id_filter(&id.into()))
    }

    /// Counts the documents matching `criteria`.
    pub async fn count_documents(&self, criteria: impl Into<Criteria>) -> DocumentStoreResult<u64> {
        let filter = criteria.into().into_expr()?;

        self.backend
            .count_documents(filter, &self.name)
            .await
    }

    /// Applies `changes` to the first document matching `criteria`.
    pub async fn update_one(&self, criteria: impl Into<Criteria>, changes: Document) -> DocumentStoreResult<UpdateResult> {
        self.update_matching(criteria.into(), changes, Some(1))
            .await
    }

    /// Applies `changes` to every document matching `criteria`.
    ///
    /// All documents are prepared before anything is written, so a veto or a
    /// violation on any of them leaves the collection unchanged. The write
    /// itself is not transactional across documents.
    pub async fn update_many(&self, criteria: impl Into<Criteria>, changes: Document) -> DocumentStoreResult<UpdateResult> {
        self.update_matching(criteria.into(), changes, None)
            .await
    }

    /// Applies `changes` to the document with identity key `id`.
    ///
    /// Returns `None` if no such document exists.
    pub async fn find_by_id_and_update(
        &self,
        id: impl Into<Uuid>,
        changes: Document,
        returning: ReturnDocument,
    ) -> DocumentStoreResult<Option<Document>> {
        let id = id.into();
        let changes = ValidationEngine::validate_changes(changes, &self.schema)?;

        let Some(current) = self.get(id).await? else {
            return Ok(None);
        };

        let updated = match self.prepare_update(&current, &changes)? {
            Some((id, updated)) => {
                self.write_updates(vec![(id, updated.clone())])
                    .await?;
                updated
            }
            None => current.clone(),
        };

        Ok(Some(match returning {
            ReturnDocument::Before => current,
            ReturnDocument::After => updated,
        }))
    }

    /// Deletes the first document matching `criteria`.
    pub async fn delete_one(&self, criteria: impl Into<Criteria>) -> DocumentStoreResult<DeleteResult> {
        self.delete_matching(criteria.into(), Some(1))
            .await
    }

    /// Deletes every document matching `criteria`.
    pub async fn delete_many(&self, criteria: impl Into<Criteria>) -> DocumentStoreResult<DeleteResult> {
        self.delete_matching(criteria.into(), None)
            .await
    }

    /// Deletes the document with identity key `id` and returns it.
    pub async fn find_by_id_and_delete(&self, id: impl Into<Uuid>) -> DocumentStoreResult<Option<Document>> {
        let id = id.into();

        let Some(document) = self.get(id).await? else {
            return Ok(None);
        };

        self.hooks
            .run_pre(Operation::Delete, document.clone())?;
        self.backend
            .delete_documents(vec![id], &self.name)
            .await?;
        self.hooks
            .run_post(Operation::Delete, &document);

        debug!("{}: deleted {id}", self.name);

        Ok(Some(document))
    }

    /// Replaces the key in reference `field` with the referenced document.
    ///
    /// Dangling keys become `null`; see [`ReferenceResolver::populate`] for
    /// how to distinguish them from fields stored as `null`.
    pub async fn populate(&self, document: Document, field: &str) -> DocumentStoreResult<Document> {
        self.resolver()
            .populate(document, field)
            .await
    }

    /// Populates reference `field` on every document.
    pub async fn populate_many(&self, documents: Vec<Document>, field: &str) -> DocumentStoreResult<Vec<Document>> {
        self.resolver()
            .populate_many(documents, field)
            .await
    }

    fn resolver(&self) -> ReferenceResolver<'_, B> {
        ReferenceResolver::new(&*self.backend, &self.schema)
    }

    async fn populate_fields(&self, mut documents: Vec<Document>, fields: &[String]) -> DocumentStoreResult<Vec<Document>> {
        for field in fields {
            documents = self.populate_many(documents, field).await?;
        }

        Ok(documents)
    }

    async fn get(&self, id: Uuid) -> DocumentStoreResult<Option<Document>> {
        Ok(self
            .backend
            .get_documents(vec![id], &self.name)
            .await?
            .into_iter()
            .next())
    }

    fn id_filter(id: &Uuid) -> Expr {
        Filter::eq(ID_FIELD, id_value(id))
    }

    fn identity(document: &Document) -> DocumentStoreResult<Uuid> {
        match document.get(ID_FIELD) {
            None => Ok(Uuid::new_v4()),
            Some(Bson::String(key)) => Uuid::parse_str(key)
                .map_err(|_| DocumentStoreError::InvalidDocument(format!("`{ID_FIELD}` must be a UUID, got {key}"))),
            Some(other) => Err(DocumentStoreError::InvalidDocument(format!(
                "`{ID_FIELD}` must be a UUID string, got {other}"
            ))),
        }
    }

    fn ensure_same_id(document: &Document, id: &Uuid) -> DocumentStoreResult<()> {
        if document.get(ID_FIELD) == Some(&id_value(id)) {
            Ok(())
        } else {
            Err(DocumentStoreError::InvalidDocument(format!("hooks cannot change the identity key of {id}")))
        }
    }

    /// Merges validated `changes` into `current`, runs the update pre-hooks
    /// and re-validates every field that ends up different.
    ///
    /// Returns `None` when the document would not change.
    fn prepare_update(&self, current: &Document, changes: &Document) -> DocumentStoreResult<Option<(Uuid, Document)>> {
        let id = current
            .document_id()
            .ok_or_else(|| DocumentStoreError::InvalidDocument(format!("stored document in {} has no identity key", self.name)))?;

        let mut merged = current.clone();
        for (field, value) in changes {
            merged.insert(field.clone(), value.clone());
        }

        let merged = self.hooks.run_pre(Operation::Update, merged)?;
        Self::ensure_same_id(&merged, &id)?;

        let mut changed = merged
            .iter()
            .filter(|(field, value)| current.get(field.as_str()) != Some(*value))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect::<Document>();

        // A field dropped by a hook counts as set to null.
        for field in current.keys() {
            if !merged.contains_key(field) {
                changed.insert(field.clone(), Bson::Null);
            }
        }

        let changed = ValidationEngine::validate_changes(changed, &self.schema)?;

        if changed.is_empty() {
            return Ok(None);
        }

        let mut updated = current.clone();
        for (field, value) in changed {
            updated.insert(field, value);
        }

        Ok(Some((id, updated)))
    }

    async fn write_updates(&self, updates: Vec<(Uuid, Document)>) -> DocumentStoreResult<()> {
        debug!("{}: writing {} updated documents", self.name, updates.len());

        self.backend
            .update_documents(updates.clone(), &self.name)
            .await?;

        for (_, document) in &updates {
            self.hooks
                .run_post(Operation::Update, document);
        }

        Ok(())
    }

    async fn update_matching(&self, criteria: Criteria, changes: Document, limit: Option<usize>) -> DocumentStoreResult<UpdateResult> {
        let filter = criteria.into_expr()?;
        let changes = ValidationEngine::validate_changes(changes, &self.schema)?;

        let query = Query { filter, limit, ..Query::default() };
        let documents = self
            .backend
            .query_documents(query, &self.name)
            .await?;

        let mut updates = Vec::new();
        for current in &documents {
            if let Some(update) = self.prepare_update(current, &changes)? {
                updates.push(update);
            }
        }

        let result = UpdateResult {
            matched: documents.len() as u64,
            modified: updates.len() as u64,
        };

        if !updates.is_empty() {
            self.write_updates(updates).await?;
        }

        Ok(result)
    }

    async fn delete_matching(&self, criteria: Criteria, limit: Option<usize>) -> DocumentStoreResult<DeleteResult> {
        let filter = criteria.into_expr()?;

        let query = Query { filter, limit, ..Query::default() };
        let documents = self
            .backend
            .query_documents(query, &self.name)
            .await?;

        let mut ids = Vec::with_capacity(documents.len());
        for document in &documents {
            self.hooks
                .run_pre(Operation::Delete, document.clone())?;
            ids.extend(document.document_id());
        }

        if ids.is_empty() {
            return Ok(DeleteResult::default());
        }

        let deleted = self
            .backend
            .delete_documents(ids, &self.name)
            .await?;

        for document in &documents {
            self.hooks
                .run_post(Operation::Delete, document);
        }

        debug!("{}: deleted {deleted} documents", self.name);

        Ok(DeleteResult { deleted })
    }
}

/// A pending query over many documents.
///
/// Created by [`Model::find`]. Nothing runs until [`exec`](Find::exec),
/// [`stream`](Find::stream) or [`exec_page`](Find::exec_page) is called, or
/// the builder is awaited directly.
#[must_use = "queries do nothing until executed"]
pub struct Find<'a, B: StoreBackend> {
    model: &'a Model<B>,
    criteria: Criteria,
    query: QueryBuilder,
    page: Option<PaginationParams>,
    populate: Vec<String>,
}

impl<'a, B: StoreBackend> Find<'a, B> {
    fn new(model: &'a Model<B>, criteria: Criteria) -> Self {
        Self {
            model,
            criteria,
            query: QueryBuilder::new(),
            page: None,
            populate: Vec::new(),
        }
    }

    /// Appends a sort key; earlier keys take precedence.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query = self.query.sort(field, direction);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.query = self.query.skip(skip);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query = self.query.limit(limit);
        self
    }

    /// Returns only the listed fields (plus `_id`).
    pub fn select<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.query = self.query.select(fields);
        self
    }

    /// Returns every field except the listed ones.
    pub fn exclude<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.query = self.query.exclude(fields);
        self
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.query = self.query.projection(projection);
        self
    }

    /// Restricts results to one page; overrides `skip` and `limit`.
    pub fn page(mut self, params: PaginationParams) -> Self {
        self.query = self.query.paginate(&params);
        self.page = Some(params);
        self
    }

    /// Resolves reference `field` on every result.
    pub fn populate(mut self, field: impl Into<String>) -> Self {
        self.populate.push(field.into());
        self
    }

    fn build(criteria: Criteria, query: QueryBuilder) -> DocumentStoreResult<Query> {
        let mut query = query.build();
        query.filter = criteria.into_expr()?;
        Ok(query)
    }

    pub async fn exec(self) -> DocumentStoreResult<Vec<Document>> {
        let Find { model, criteria, query, populate, .. } = self;
        let query = Self::build(criteria, query)?;

        let documents = model
            .backend
            .query_documents(query, &model.name)
            .await?;

        model
            .populate_fields(documents, &populate)
            .await
    }

    /// Executes the query and yields results one by one.
    ///
    /// References are resolved per document as the stream is polled.
    pub fn stream(self) -> BoxStream<'a, DocumentStoreResult<Document>> {
        let Find { model, criteria, query, populate, .. } = self;
        let populate = Arc::new(populate);

        stream::once(async move {
            let query = Self::build(criteria, query)?;
            model
                .backend
                .query_documents(query, &model.name)
                .await
        })
        .map_ok(|documents| stream::iter(documents.into_iter().map(Ok::<_, DocumentStoreError>)))
        .try_flatten()
        .and_then(move |document| {
            let populate = Arc::clone(&populate);
            async move {
                let mut populated = model
                    .populate_fields(vec![document], &populate)
                    .await?;
                populated
                    .pop()
                    .ok_or_else(|| DocumentStoreError::Backend("populate dropped a document".into()))
            }
        })
        .boxed()
    }

    /// Executes the query as one page, counting every matching document.
    ///
    /// Uses the parameters given to [`page`](Find::page), or the first page
    /// of ten when none were given.
    pub async fn exec_page(self) -> DocumentStoreResult<Page<Document>> {
        let params = self.page.clone().unwrap_or_default();
        let find = self.page(params.clone());

        let filter = find.criteria.clone().into_expr()?;
        let count = find
            .model
            .backend
            .count_documents(filter, &find.model.name)
            .await?;

        let items = find.exec().await?;

        Ok(Page::from_window(items, count as usize, &params))
    }
}

impl<'a, B: StoreBackend> IntoFuture for Find<'a, B> {
    type Output = DocumentStoreResult<Vec<Document>>;
    type IntoFuture = BoxFuture<'a, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.exec())
    }
}

/// A pending query for at most one document.
///
/// Created by [`Model::find_one`] and [`Model::find_by_id`].
#[must_use = "queries do nothing until executed"]
pub struct FindOne<'a, B: StoreBackend> {
    find: Find<'a, B>,
}

impl<'a, B: StoreBackend> FindOne<'a, B> {
    fn new(model: &'a Model<B>, criteria: Criteria) -> Self {
        Self {
            find: Find::new(model, criteria).limit(1),
        }
    }

    /// Appends a sort key deciding which match comes first.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.find = self.find.sort(field, direction);
        self
    }

    pub fn select<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.find = self.find.select(fields);
        self
    }

    pub fn exclude<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.find = self.find.exclude(fields);
        self
    }

    pub fn populate(mut self, field: impl Into<String>) -> Self {
        self.find = self.find.populate(field);
        self
    }

    pub async fn exec(self) -> DocumentStoreResult<Option<Document>> {
        Ok(self.find.exec().await?.into_iter().next())
    }
}

impl<'a, B: StoreBackend> IntoFuture for FindOne<'a, B> {
    type Output = DocumentStoreResult<Option<Document>>;
    type IntoFuture = BoxFuture<'a, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.exec())
    }
}
