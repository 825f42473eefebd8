//! Lifecycle hooks run around model operations.
//!
//! A [`HookPipeline`] holds an ordered list of callbacks for every
//! ([`Operation`], [`Phase`]) pair. Pre-hooks run before the storage call,
//! in registration order, and may rewrite the document that flows on to the
//! next hook and finally to storage. The first pre-hook that fails aborts the
//! operation. Post-hooks run after a successful write and only observe the
//! persisted document; their failures are logged and forwarded to an optional
//! reporter but never undo the write.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::hooks::{HookPipeline, HookError, Operation};
//!
//! let mut hooks = HookPipeline::new();
//!
//! hooks.pre(Operation::Save, |doc| {
//!     let name = doc.get_str("name").unwrap_or_default().to_string();
//!     doc.insert("name", format!("{name}123"));
//!     Ok(())
//! });
//!
//! hooks.post(Operation::Save, |doc| {
//!     log::info!("{} was saved", doc.get_str("email").unwrap_or("?"));
//!     Ok(())
//! });
//! ```

use bson::Document;
use log::warn;
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};
use thiserror::Error;

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Model operation a hook is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Schema validation of a new document.
    Validate,
    /// Persisting a new document.
    Save,
    /// Writing changes to an existing document.
    Update,
    /// Removing a document.
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Validate => "validate",
            Operation::Save => "save",
            Operation::Update => "update",
            Operation::Delete => "delete",
        })
    }
}

/// Whether a hook runs before or after its operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Pre,
    Post,
}

/// Failure signalled by a hook callback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HookError(String);

impl HookError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    pub fn reason(&self) -> &str {
        &self.0
    }
}

/// A post-hook failure, as delivered to the failure reporter.
#[derive(Debug, Clone, PartialEq)]
pub struct HookFailure {
    pub operation: Operation,
    /// Position of the failing hook in registration order.
    pub index: usize,
    pub error: HookError,
}

pub type PreHook = Arc<dyn Fn(&mut Document) -> Result<(), HookError> + Send + Sync>;
pub type PostHook = Arc<dyn Fn(&Document) -> Result<(), HookError> + Send + Sync>;
pub type FailureReporter = Arc<dyn Fn(&HookFailure) + Send + Sync>;

/// Ordered pre/post callbacks per operation.
#[derive(Clone, Default)]
pub struct HookPipeline {
    pre: HashMap<Operation, Vec<PreHook>>,
    post: HashMap<Operation, Vec<PostHook>>,
    reporter: Option<FailureReporter>,
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a hook that runs before `operation`.
    pub fn pre<F>(&mut self, operation: Operation, hook: F) -> &mut Self
    where
        F: Fn(&mut Document) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.pre
            .entry(operation)
            .or_default()
            .push(Arc::new(hook));
        self
    }

    /// Registers a hook that runs after `operation` has been committed.
    pub fn post<F>(&mut self, operation: Operation, hook: F) -> &mut Self
    where
        F: Fn(&Document) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.post
            .entry(operation)
            .or_default()
            .push(Arc::new(hook));
        self
    }

    /// Sets the callback that receives every post-hook failure.
    pub fn on_post_failure<F>(&mut self, reporter: F) -> &mut Self
    where
        F: Fn(&HookFailure) + Send + Sync + 'static,
    {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    /// Number of hooks registered for `operation` in `phase`.
    pub fn len(&self, operation: Operation, phase: Phase) -> usize {
        match phase {
            Phase::Pre => self.pre.get(&operation).map_or(0, Vec::len),
            Phase::Post => self.post.get(&operation).map_or(0, Vec::len),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pre.values().all(Vec::is_empty) && self.post.values().all(Vec::is_empty)
    }

    /// Runs the hooks of one phase and returns the resulting document.
    ///
    /// Pre-hooks may rewrite the document and abort with
    /// [`DocumentStoreError::HookAbort`]. Post-hooks cannot fail the call.
    pub fn run(&self, operation: Operation, phase: Phase, document: Document) -> DocumentStoreResult<Document> {
        match phase {
            Phase::Pre => self.run_pre(operation, document),
            Phase::Post => {
                self.run_post(operation, &document);
                Ok(document)
            }
        }
    }

    /// Threads `document` through every pre-hook of `operation`.
    ///
    /// Stops at the first hook that fails; later hooks do not run.
    pub fn run_pre(&self, operation: Operation, mut document: Document) -> DocumentStoreResult<Document> {
        for hook in self.pre.get(&operation).into_iter().flatten() {
            hook(&mut document).map_err(|error| DocumentStoreError::HookAbort {
                operation,
                reason: error.reason().to_string(),
            })?;
        }

        Ok(document)
    }

    /// Runs every post-hook of `operation` and returns the failures.
    ///
    /// All hooks run even if an earlier one fails.
    pub fn run_post(&self, operation: Operation, document: &Document) -> Vec<HookFailure> {
        let mut failures = Vec::new();

        for (index, hook) in self.post.get(&operation).into_iter().flatten().enumerate() {
            if let Err(error) = hook(document) {
                warn!("post-{operation} hook #{index} failed: {error}");

                let failure = HookFailure { operation, index, error };

                if let Some(reporter) = &self.reporter {
                    reporter(&failure);
                }

                failures.push(failure);
            }
        }

        failures
    }
}

impl fmt::Debug for HookPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn counts<H>(hooks: &HashMap<Operation, Vec<H>>) -> BTreeMap<String, usize> {
            hooks
                .iter()
                .map(|(operation, list)| (operation.to_string(), list.len()))
                .collect()
        }

        f.debug_struct("HookPipeline")
            .field("pre", &counts(&self.pre))
            .field("post", &counts(&self.post))
            .field("reporter", &self.reporter.is_some())
            .finish()
    }
}
