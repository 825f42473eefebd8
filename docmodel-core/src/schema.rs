//! Declarative schemas: field types, requiredness, defaults and constraints.
//!
//! A [`Schema`] is an ordered, immutable mapping from field name to
//! [`FieldRule`]. It is built once with [`Schema::builder`] and shared by
//! every model created from it.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::schema::{Schema, FieldRule, Constraint};
//! use regex::Regex;
//!
//! let schema = Schema::builder()
//!     .field("name", FieldRule::string().required().min_length(5).max_length(20))
//!     .field("age", FieldRule::number().required().min(18.0).max(60.0))
//!     .field("email", FieldRule::string().required().unique().pattern(Regex::new(r"^\S+@\S+$")?))
//!     .field(
//!         "role",
//!         FieldRule::string().constraint(
//!             Constraint::one_of(["admin", "user", "editor"])
//!                 .with_message("{VALUE} is not a valid role"),
//!         ),
//!     )
//!     .field("author", FieldRule::reference("users"))
//!     .build()?;
//! ```

use bson::Bson;
use regex::Regex;
use std::{collections::HashSet, fmt, sync::Arc};
use uuid::Uuid;

use crate::{
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Semantic type of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    String,
    /// Any BSON int32, int64 or finite double.
    Number,
    Boolean,
    /// A BSON datetime.
    Date,
    /// The identity key of a document in another collection.
    Reference {
        collection: String,
    },
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Reference { .. } => "reference",
        }
    }

    /// Whether `value` has the BSON shape this type expects.
    pub fn accepts(&self, value: &Bson) -> bool {
        match (self, value) {
            (FieldType::String, Bson::String(_)) => true,
            (FieldType::Number, Bson::Int32(_) | Bson::Int64(_)) => true,
            (FieldType::Number, Bson::Double(n)) => n.is_finite(),
            (FieldType::Boolean, Bson::Boolean(_)) => true,
            (FieldType::Date, Bson::DateTime(_)) => true,
            (FieldType::Reference { .. }, Bson::String(key)) => Uuid::parse_str(key).is_ok(),
            _ => false,
        }
    }
}

/// Value filled in when a field is absent.
#[derive(Clone)]
pub enum DefaultValue {
    Static(Bson),
    /// Computed each time a document is validated.
    Computed(Arc<dyn Fn() -> Bson + Send + Sync>),
}

impl DefaultValue {
    pub fn resolve(&self) -> Bson {
        match self {
            DefaultValue::Static(value) => value.clone(),
            DefaultValue::Computed(thunk) => thunk(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Static(value) => f.debug_tuple("Static").field(value).finish(),
            DefaultValue::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConstraintKind {
    Min(f64),
    Max(f64),
    MinLength(usize),
    MaxLength(usize),
    Pattern(Regex),
    Enum(Vec<Bson>),
}

/// A single check applied to a present field value.
///
/// Custom messages may use `{VALUE}` and `{PATH}`, which are replaced by the
/// offending value and the field name.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub message: Option<String>,
}

impl Constraint {
    pub fn new(kind: ConstraintKind) -> Self {
        Self { kind, message: None }
    }

    pub fn min(value: f64) -> Self {
        Self::new(ConstraintKind::Min(value))
    }

    pub fn max(value: f64) -> Self {
        Self::new(ConstraintKind::Max(value))
    }

    pub fn min_length(length: usize) -> Self {
        Self::new(ConstraintKind::MinLength(length))
    }

    pub fn max_length(length: usize) -> Self {
        Self::new(ConstraintKind::MaxLength(length))
    }

    pub fn pattern(pattern: Regex) -> Self {
        Self::new(ConstraintKind::Pattern(pattern))
    }

    pub fn one_of<V: Into<Bson>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::new(ConstraintKind::Enum(values.into_iter().map(Into::into).collect()))
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Everything the schema says about one field.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub field_type: FieldType,
    pub required: bool,
    pub required_message: Option<String>,
    pub default: Option<DefaultValue>,
    /// Checked in declaration order.
    pub constraints: Vec<Constraint>,
    /// Enforced by the storage backend through a unique index.
    pub unique: bool,
}

impl FieldRule {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            required_message: None,
            default: None,
            constraints: Vec::new(),
            unique: false,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn date() -> Self {
        Self::new(FieldType::Date)
    }

    /// A reference to a document of the `collection` collection.
    pub fn reference(collection: impl Into<String>) -> Self {
        Self::new(FieldType::Reference { collection: collection.into() })
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the field required with a custom message.
    pub fn required_with(mut self, message: impl Into<String>) -> Self {
        self.required = true;
        self.required_message = Some(message.into());
        self
    }

    pub fn default(mut self, value: impl Into<Bson>) -> Self {
        self.default = Some(DefaultValue::Static(value.into()));
        self
    }

    pub fn default_with<F>(mut self, thunk: F) -> Self
    where
        F: Fn() -> Bson + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Computed(Arc::new(thunk)));
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn min(self, value: f64) -> Self {
        self.constraint(Constraint::min(value))
    }

    pub fn max(self, value: f64) -> Self {
        self.constraint(Constraint::max(value))
    }

    pub fn min_length(self, length: usize) -> Self {
        self.constraint(Constraint::min_length(length))
    }

    pub fn max_length(self, length: usize) -> Self {
        self.constraint(Constraint::max_length(length))
    }

    pub fn pattern(self, pattern: Regex) -> Self {
        self.constraint(Constraint::pattern(pattern))
    }

    pub fn one_of<V: Into<Bson>>(self, values: impl IntoIterator<Item = V>) -> Self {
        self.constraint(Constraint::one_of(values))
    }

    /// Target collection if this field is a reference.
    pub fn reference_target(&self) -> Option<&str> {
        match &self.field_type {
            FieldType::Reference { collection } => Some(collection),
            _ => None,
        }
    }
}

/// An ordered, immutable set of field rules.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<(String, FieldRule)>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Iterates over fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldRule)> {
        self.fields
            .iter()
            .map(|(name, rule)| (name.as_str(), rule))
    }

    pub fn field(&self, name: &str) -> Option<&FieldRule> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, rule)| rule)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &str> {
        self.fields()
            .filter(|(_, rule)| rule.unique)
            .map(|(name, _)| name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<(String, FieldRule)>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.fields.push((name.into(), rule));
        self
    }

    /// Builds the schema.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidSchema`] for duplicate fields,
    /// the reserved identity field, or names that are empty, start with `$`
    /// or contain `.`.
    pub fn build(self) -> DocumentStoreResult<Schema> {
        let mut seen = HashSet::new();

        for (name, rule) in &self.fields {
            if name == ID_FIELD {
                return Err(DocumentStoreError::InvalidSchema(format!("`{ID_FIELD}` is reserved for the identity key")));
            }
            if name.is_empty() || name.starts_with('$') || name.contains('.') {
                return Err(DocumentStoreError::InvalidSchema(format!("invalid field name `{name}`")));
            }
            if !seen.insert(name.as_str()) {
                return Err(DocumentStoreError::InvalidSchema(format!("field `{name}` declared twice")));
            }
            if let Some(target) = rule.reference_target() {
                if target.is_empty() {
                    return Err(DocumentStoreError::InvalidSchema(format!("reference `{name}` has no target collection")));
                }
            }
        }

        Ok(Schema { fields: self.fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_keeps_declaration_order() {
        let schema = Schema::builder()
            .field("name", FieldRule::string().required())
            .field("price", FieldRule::number())
            .field("sku", FieldRule::string().unique())
            .build()
            .unwrap();

        let names = schema.fields().map(|(name, _)| name).collect::<Vec<_>>();
        assert_eq!(names, vec!["name", "price", "sku"]);
        assert_eq!(schema.unique_fields().collect::<Vec<_>>(), vec!["sku"]);
        assert!(schema.field("price").is_some_and(|rule| !rule.required));
    }

    #[test]
    fn builder_rejects_bad_names() {
        for name in ["_id", "", "$where", "a.b"] {
            let result = Schema::builder()
                .field(name, FieldRule::string())
                .build();

            assert!(matches!(result, Err(DocumentStoreError::InvalidSchema(_))), "{name} accepted");
        }

        let duplicate = Schema::builder()
            .field("name", FieldRule::string())
            .field("name", FieldRule::number())
            .build();
        assert!(duplicate.is_err());
    }

    #[test]
    fn reference_fields_expose_their_target() {
        let rule = FieldRule::reference("users");

        assert_eq!(rule.reference_target(), Some("users"));
        assert!(rule.field_type.accepts(&Bson::String(Uuid::new_v4().to_string())));
        assert!(!rule.field_type.accepts(&Bson::String("not-a-key".into())));
        assert_eq!(FieldRule::number().reference_target(), None);
    }

    #[test]
    fn computed_defaults_run_on_resolve() {
        let rule = FieldRule::number().default_with(|| Bson::Int32(7));

        assert_eq!(rule.default.unwrap().resolve(), Bson::Int32(7));
    }
}
