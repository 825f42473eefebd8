//! Convenient re-exports of commonly used types from docmodel.
//!
//! ```ignore
//! use docmodel::prelude::*;
//! ```

pub use docmodel_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    document::{DocumentExt, ID_FIELD},
    error::{DocumentStoreError, DocumentStoreResult, FieldError, FieldErrorKind, Outcome, ValidationErrors},
    hooks::{HookError, HookFailure, HookPipeline, Operation, Phase},
    model::{DeleteResult, Find, FindOne, Model, ReturnDocument, UpdateResult},
    page::{Page, PaginationParams},
    populate::{ReferenceResolver, Resolution},
    query::{Criteria, Expr, FieldOp, Filter, Projection, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    schema::{Constraint, ConstraintKind, DefaultValue, FieldRule, FieldType, Schema},
    store::DocumentStore,
    validate::ValidationEngine,
};
