//! In-memory document storage backend for docmodel.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is ideal for development,
//! testing, and small deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Full query support** - Filtering, stable multi-key sorting, skip/limit and projection
//! - **Unique indexes** - Duplicate values of unique fields are rejected on every write
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{DocumentStore, memory::InMemoryStore};
//! use docmodel::schema::{Schema, FieldRule};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//!
//!     let schema = Schema::builder()
//!         .field("name", FieldRule::string().required())
//!         .build()?;
//!     let users = store.model("users", schema).await?;
//!
//!     users.create(doc! { "name": "Alice" }).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod evaluator;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
