//! MongoDB backend implementation for docmodel.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait,
//! storing each model's documents in a MongoDB collection of the same name and
//! delegating filtering, sorting and pagination to the server.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docmodel = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data is persisted to MongoDB Atlas or self-hosted MongoDB
//! - **Server-side queries** - Filters, sort keys and projections are translated to MongoDB syntax
//! - **Unique indexes** - Duplicate key errors surface as uniqueness conflicts
//! - **Timeouts** - Connection and server selection timeouts surface as connection errors
//!
//! Sorting happens on the server, which does not guarantee a stable order for
//! documents with equal sort keys.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use docmodel::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder("mongodb://localhost:27017", "shop")
//!         .server_selection_timeout(Duration::from_secs(5))
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod query;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
