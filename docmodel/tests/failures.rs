mod common;

use async_trait::async_trait;
use docmodel::{
    bson::Document,
    memory::InMemoryStore,
    prelude::*,
    uuid::Uuid,
};
use pretty_assertions::assert_eq;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use common::{user, user_schema};

/// Wraps an in-memory store and fails every call while `down` is set.
#[derive(Debug, Default)]
struct FlakyStore {
    inner: InMemoryStore,
    down: AtomicBool,
}

impl FlakyStore {
    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> DocumentStoreResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(DocumentStoreError::Connection("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StoreBackend for FlakyStore {
    async fn insert_documents(&self, documents: Vec<(Uuid, Document)>, collection: &str) -> DocumentStoreResult<()> {
        self.check()?;
        self.inner.insert_documents(documents, collection).await
    }

    async fn update_documents(&self, documents: Vec<(Uuid, Document)>, collection: &str) -> DocumentStoreResult<()> {
        self.check()?;
        self.inner.update_documents(documents, collection).await
    }

    async fn delete_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<u64> {
        self.check()?;
        self.inner.delete_documents(ids, collection).await
    }

    async fn get_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        self.check()?;
        self.inner.get_documents(ids, collection).await
    }

    async fn query_documents(&self, query: Query, collection: &str) -> DocumentStoreResult<Vec<Document>> {
        self.check()?;
        self.inner.query_documents(query, collection).await
    }

    async fn count_documents(&self, filter: Option<Expr>, collection: &str) -> DocumentStoreResult<u64> {
        self.check()?;
        self.inner.count_documents(filter, collection).await
    }

    async fn create_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.check()?;
        self.inner.create_collection(name).await
    }

    async fn drop_collection(&self, name: &str) -> DocumentStoreResult<()> {
        self.check()?;
        self.inner.drop_collection(name).await
    }

    async fn list_collections(&self) -> DocumentStoreResult<Vec<String>> {
        self.check()?;
        self.inner.list_collections().await
    }

    async fn add_index(&self, collection: &str, field: &str, unique: bool) -> DocumentStoreResult<()> {
        self.check()?;
        self.inner.add_index(collection, field, unique).await
    }

    async fn drop_index(&self, collection: &str, field: &str) -> DocumentStoreResult<()> {
        self.check()?;
        self.inner.drop_index(collection, field).await
    }
}

async fn flaky_users() -> (Arc<FlakyStore>, Model<FlakyStore>) {
    let backend = Arc::new(FlakyStore::default());
    let users = DocumentStore::from_shared(Arc::clone(&backend))
        .model("users", user_schema())
        .await
        .unwrap();

    (backend, users)
}

#[tokio::test]
async fn unreachable_storage_fails_writes() {
    let (backend, users) = flaky_users().await;
    backend.set_down(true);

    let error = users
        .create(user("Rahim", 25, "rahim@example.com"))
        .await
        .unwrap_err();

    assert!(matches!(error, DocumentStoreError::Connection(_)));
    assert_eq!(error.outcome(), Outcome::Failed);

    backend.set_down(false);
    assert_eq!(users.count_documents(()).await.unwrap(), 0);
}

#[tokio::test]
async fn rejections_happen_before_storage_is_touched() {
    let (backend, users) = flaky_users().await;
    backend.set_down(true);

    let error = users
        .create(user("Bob", 25, "bob@example.com"))
        .await
        .unwrap_err();

    assert_eq!(error.outcome(), Outcome::Rejected);
    assert!(error.validation_errors().is_some());
}

#[tokio::test]
async fn post_save_hooks_do_not_run_when_the_write_fails() {
    let (backend, mut users) = flaky_users().await;
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    users.post(Operation::Save, move |_| {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    });

    backend.set_down(true);
    assert!(users.create(user("Rahim", 25, "rahim@example.com")).await.is_err());
    assert!(!ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn reads_and_deletes_fail_with_the_backend() {
    let (backend, users) = flaky_users().await;
    let created = users
        .create(user("Rahim", 25, "rahim@example.com"))
        .await
        .unwrap();
    let id = created.document_id().unwrap();

    backend.set_down(true);
    assert!(matches!(users.find_by_id(id).await, Err(DocumentStoreError::Connection(_))));
    assert!(matches!(users.delete_many(()).await, Err(DocumentStoreError::Connection(_))));
    assert!(matches!(
        users.find_by_id_and_update(id, docmodel::bson::doc! { "age": 30 }, ReturnDocument::After).await,
        Err(DocumentStoreError::Connection(_))
    ));

    backend.set_down(false);
    assert_eq!(users.find_by_id(id).await.unwrap(), Some(created));
}
