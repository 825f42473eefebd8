//! Main docmodel crate: a schema-checked access layer over document stores.
//!
//! This crate is the primary entry point for users of docmodel. It re-exports
//! the core types from the sub-crates and provides access to the storage
//! backends.
//!
//! # Features
//!
//! - **Schemas** - Declarative field rules with types, defaults, ranges, lengths, patterns and enums
//! - **Validation** - Every violation is collected and reported at once; invalid documents are never stored
//! - **Hooks** - Ordered pre/post callbacks around validate, save, update and delete
//! - **Queries** - Filters, stable multi-key sorting, skip/limit, pagination and projection
//! - **Population** - Single-hop resolution of references to other collections
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryStore};
//! use docmodel::bson::doc;
//! use regex::Regex;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let schema = Schema::builder()
//!         .field("name", FieldRule::string().required().min_length(5).max_length(20))
//!         .field("age", FieldRule::number().required().constraint(
//!             Constraint::min(18.0).with_message("Age minimum 18 required!"),
//!         ))
//!         .field("email", FieldRule::string().required().unique().constraint(
//!             Constraint::pattern(Regex::new(r"^\S+@\S+\.\S+$")?).with_message("Invalid email format!"),
//!         ))
//!         .field("role", FieldRule::string().default("user").constraint(
//!             Constraint::one_of(["admin", "user", "editor"]).with_message("{VALUE} is not a valid role"),
//!         ))
//!         .build()?;
//!
//!     let store = DocumentStore::new(InMemoryStore::new());
//!     let mut users = store.model("users", schema).await?;
//!
//!     users.pre(Operation::Save, |doc| {
//!         let name = doc.get_str("name").unwrap_or_default().to_string();
//!         doc.insert("name", format!("{name}123"));
//!         Ok(())
//!     });
//!
//!     let user = users
//!         .create(doc! { "name": "Rahim", "age": 25, "email": "rahim@example.com" })
//!         .await?;
//!
//!     let found = users.find_by_id(user.document_id().unwrap()).await?;
//!     assert_eq!(found, Some(user));
//!
//!     let adults = users
//!         .find(doc! { "age": { "$gte": 18 } })
//!         .sort("age", SortDirection::Desc)
//!         .select(["name"])
//!         .exec()
//!         .await?;
//!
//!     println!("{adults:?}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docmodel_core::{
    backend, document, error, hooks, model, page, populate, query, schema, store, validate,
};

// Re-export the document and identity key types for convenience
pub use bson;
pub use uuid;

pub use docmodel_core::{model::Model, store::DocumentStore};

/// In-memory storage backend implementations.
pub mod memory {
    pub use docmodel_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmodel_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
