//! A schema-checked access layer over document stores.
//!
//! This crate is the core of the docmodel project and provides:
//!
//! - **Schemas** ([`schema`]) - Declarative field rules: types, requiredness, defaults and constraints
//! - **Validation** ([`validate`]) - Checks documents against a schema and collects every violation
//! - **Hooks** ([`hooks`]) - Ordered pre/post callbacks around model operations
//! - **Query and filtering API** ([`query`]) - Filter expressions, sorting, skip/limit and projection
//! - **Reference resolution** ([`populate`]) - Replaces reference keys with the referenced documents
//! - **Models** ([`model`]) - Create/find/update/delete access to one collection
//! - **Document store** ([`store`]) - Shares one backend between models
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing storage backends
//! - **Error handling** ([`error`]) - Error types, result types and operation outcomes
//! - **Pagination** ([`page`]) - Page parameters and result pages
//!
//! # Example
//!
//! ```ignore
//! use docmodel::prelude::*;
//! use bson::doc;
//!
//! let schema = Schema::builder()
//!     .field("name", FieldRule::string().required().min_length(5))
//!     .field("age", FieldRule::number().required().min(18.0).max(60.0))
//!     .build()?;
//!
//! let store = DocumentStore::new(InMemoryStore::new());
//! let users = store.model("users", schema).await?;
//!
//! let bobby = users.create(doc! { "name": "Bobby", "age": 25 }).await?;
//! ```

pub mod backend;
pub mod document;
pub mod error;
pub mod hooks;
pub mod model;
pub mod page;
pub mod populate;
pub mod query;
pub mod schema;
pub mod store;
pub mod validate;
