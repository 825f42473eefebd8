//! Query construction and filtering API for document stores.
//!
//! This module provides query construction with filtering, multi-key sorting,
//! skip/limit pagination, field projection, and a visitor pattern for query
//! execution across different backends.
//!
//! # Query Building
//!
//! ```ignore
//! use docmodel::query::{Query, Filter, SortDirection};
//!
//! let query = Query::builder()
//!     .filter(Filter::gt("price", 9.99))
//!     .sort("price", SortDirection::Desc)
//!     .skip(2)
//!     .limit(2)
//!     .select(["name", "price"])
//!     .build();
//! ```
//!
//! Whatever order the builder methods are called in, backends always apply
//! the clauses as filter, sort, skip, limit, projection.
//!
//! # Criteria documents
//!
//! [`Expr::from_criteria`] accepts the familiar document form, e.g.
//! `doc! { "price": { "$gt": 9.99 }, "name": { "$in": ["tv", "laptop"] } }`.

use bson::{Bson, Document};

use crate::{
    document::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    page::PaginationParams,
};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl TryFrom<i32> for SortDirection {
    type Error = DocumentStoreError;

    /// `1` is ascending and `-1` is descending.
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SortDirection::Asc),
            -1 => Ok(SortDirection::Desc),
            other => Err(DocumentStoreError::InvalidQuery(format!("sort direction must be 1 or -1, got {other}"))),
        }
    }
}

/// One key of a sort specification.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to (exact match).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Value is a member of the given array.
    In,
    /// Value is not a member of the given array.
    NotIn,
}

/// A filter expression for querying documents.
///
/// Expressions can be combined using logical operators (`And`, `Or`, `Not`)
/// to build complex filter predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field name to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Parses a criteria document into an expression.
    ///
    /// Plain values mean equality, operator documents (`$eq`, `$ne`, `$gt`,
    /// `$gte`, `$lt`, `$lte`, `$in`, `$nin`, `$exists`) compare, and the
    /// top-level `$and`/`$or` take arrays of criteria. All keys are
    /// conjoined. An empty document matches everything and yields `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidQuery`] for unknown operators or
    /// malformed operands.
    pub fn from_criteria(criteria: &Document) -> DocumentStoreResult<Option<Expr>> {
        let mut exprs = Vec::new();

        for (key, value) in criteria {
            match key.as_str() {
                "$and" | "$or" => {
                    let items = value
                        .as_array()
                        .ok_or_else(|| DocumentStoreError::InvalidQuery(format!("{key} expects an array of criteria")))?;
                    let mut parts = Vec::with_capacity(items.len());

                    for item in items {
                        let criteria = item
                            .as_document()
                            .ok_or_else(|| DocumentStoreError::InvalidQuery(format!("{key} expects an array of criteria")))?;
                        parts.push(Expr::from_criteria(criteria)?.unwrap_or(Expr::And(Vec::new())));
                    }

                    exprs.push(if key == "$and" { Expr::And(parts) } else { Expr::Or(parts) });
                }
                operator if operator.starts_with('$') => {
                    return Err(DocumentStoreError::InvalidQuery(format!("unknown top-level operator {operator}")));
                }
                field => match value {
                    Bson::Document(operators) if operators.keys().any(|op| op.starts_with('$')) => {
                        for (op, operand) in operators {
                            exprs.push(parse_operator(field, op, operand)?);
                        }
                    }
                    _ => exprs.push(Filter::eq(field, value.clone())),
                },
            }
        }

        Ok(match exprs.len() {
            0 => None,
            1 => exprs.pop(),
            _ => Some(Expr::And(exprs)),
        })
    }
}

fn parse_operator(field: &str, op: &str, operand: &Bson) -> DocumentStoreResult<Expr> {
    let set = || match operand {
        Bson::Array(values) => Ok(values.clone()),
        _ => Err(DocumentStoreError::InvalidQuery(format!("{op} on `{field}` expects an array"))),
    };

    Ok(match op {
        "$eq" => Filter::eq(field, operand.clone()),
        "$ne" => Filter::ne(field, operand.clone()),
        "$gt" => Filter::gt(field, operand.clone()),
        "$gte" => Filter::gte(field, operand.clone()),
        "$lt" => Filter::lt(field, operand.clone()),
        "$lte" => Filter::lte(field, operand.clone()),
        "$in" => Filter::any_of(field, set()?),
        "$nin" => Filter::none_of(field, set()?),
        "$exists" => match operand {
            Bson::Boolean(should_exist) => Expr::Exists(field.to_string(), *should_exist),
            _ => return Err(DocumentStoreError::InvalidQuery(format!("$exists on `{field}` expects a boolean"))),
        },
        other => return Err(DocumentStoreError::InvalidQuery(format!("unsupported operator {other} on `{field}`"))),
    })
}

/// What a model operation should match: everything, an expression, or a criteria document.
#[derive(Debug, Clone, Default)]
pub enum Criteria {
    #[default]
    All,
    Expr(Expr),
    Document(Document),
}

impl Criteria {
    /// Resolves to a filter expression; `None` matches every document.
    pub fn into_expr(self) -> DocumentStoreResult<Option<Expr>> {
        match self {
            Criteria::All => Ok(None),
            Criteria::Expr(expr) => Ok(Some(expr)),
            Criteria::Document(document) => Expr::from_criteria(&document),
        }
    }
}

impl From<Expr> for Criteria {
    fn from(expr: Expr) -> Self {
        Criteria::Expr(expr)
    }
}

impl From<Document> for Criteria {
    fn from(document: Document) -> Self {
        Criteria::Document(document)
    }
}

impl From<()> for Criteria {
    fn from(_: ()) -> Self {
        Criteria::All
    }
}

/// Which fields appear in returned documents.
///
/// A projection either lists the fields to keep or the fields to drop, never
/// both. The identity key is kept unless [`Projection::without_id`] is used.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Include {
        fields: Vec<String>,
        with_id: bool,
    },
    Exclude {
        fields: Vec<String>,
        with_id: bool,
    },
}

impl Projection {
    pub fn include<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Projection::Include {
            fields: fields.into_iter().map(Into::into).filter(|f: &String| f != ID_FIELD).collect(),
            with_id: true,
        }
    }

    pub fn exclude<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        let mut with_id = true;
        let fields = fields
            .into_iter()
            .map(Into::into)
            .filter(|f: &String| {
                if f == ID_FIELD {
                    with_id = false;
                    false
                } else {
                    true
                }
            })
            .collect();

        Projection::Exclude { fields, with_id }
    }

    /// Drops the identity key from returned documents.
    pub fn without_id(self) -> Self {
        match self {
            Projection::Include { fields, .. } => Projection::Include { fields, with_id: false },
            Projection::Exclude { fields, .. } => Projection::Exclude { fields, with_id: false },
        }
    }

    pub fn includes_id(&self) -> bool {
        match self {
            Projection::Include { with_id, .. } | Projection::Exclude { with_id, .. } => *with_id,
        }
    }

    /// Applies this projection to a document.
    pub fn apply(&self, document: Document) -> Document {
        match self {
            Projection::Include { fields, with_id } => document
                .into_iter()
                .filter(|(key, _)| {
                    if key == ID_FIELD {
                        *with_id
                    } else {
                        fields.iter().any(|field| field == key)
                    }
                })
                .collect(),
            Projection::Exclude { fields, with_id } => document
                .into_iter()
                .filter(|(key, _)| {
                    if key == ID_FIELD {
                        *with_id
                    } else {
                        !fields.iter().any(|field| field == key)
                    }
                })
                .collect(),
        }
    }
}

/// A structured query for retrieving and filtering documents.
///
/// Use [`QueryBuilder`] for ergonomic construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Optional filter expression to match documents.
    pub filter: Option<Expr>,
    /// Sort keys, applied in order as tie-breaks.
    pub sort: Vec<Sort>,
    /// Number of matching documents to skip after sorting.
    pub skip: Option<usize>,
    /// Maximum number of documents to return after skipping.
    pub limit: Option<usize>,
    /// Fields to return.
    pub projection: Option<Projection>,
}

impl Query {
    /// Creates a new empty query that matches every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

/// Helper struct for constructing filter expressions.
///
/// # Example
///
/// ```ignore
/// use docmodel::query::Filter;
///
/// let expr = Filter::eq("name", "Alice")
///     .and(Filter::gt("age", 18));
/// ```
pub struct Filter;

impl Filter {
    /// Matches documents where the field equals the specified value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the specified value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    /// Matches documents where the field is greater than the specified value.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    /// Matches documents where the field is greater than or equal to the specified value.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    /// Matches documents where the field is less than the specified value.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    /// Matches documents where the field is less than or equal to the specified value.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents where the field exists.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches documents where the field does not exist.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// Combines multiple expressions such that all must match.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Combines multiple expressions such that any can match.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Matches documents where the field equals any of the given values.
    pub fn any_of<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::In,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Matches documents where the field equals none of the given values.
    pub fn none_of<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Expr {
        Expr::field(
            field.into(),
            FieldOp::NotIn,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter expression.
    ///
    /// Calling this more than once conjoins the expressions.
    pub fn filter(mut self, filter: Expr) -> Self {
        self.query.filter = Some(match self.query.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    /// Appends a sort key. Earlier keys take precedence.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort.push(Sort { field: field.into(), direction });
        self
    }

    /// Sets the number of documents to skip.
    pub fn skip(mut self, skip: usize) -> Self {
        self.query.skip = Some(skip);
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Sets skip and limit from 1-indexed page parameters.
    pub fn paginate(self, params: &PaginationParams) -> Self {
        self.skip(params.skip())
            .limit(params.per_page)
    }

    /// Replaces the projection.
    pub fn projection(mut self, projection: Projection) -> Self {
        self.query.projection = Some(projection);
        self
    }

    /// Returns only the listed fields (plus the identity key).
    pub fn select<S: Into<String>>(self, fields: impl IntoIterator<Item = S>) -> Self {
        self.projection(Projection::include(fields))
    }

    /// Returns every field except the listed ones.
    pub fn exclude<S: Into<String>>(self, fields: impl IntoIterator<Item = S>) -> Self {
        self.projection(Projection::exclude(fields))
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        self.query
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use pretty_assertions::assert_eq;

    #[test]
    fn criteria_documents_parse_to_conjunctions() {
        let expr = Expr::from_criteria(&doc! {
            "price": { "$gt": 9.99, "$lte": 100 },
            "name": { "$in": ["laptop", "tv"] },
            "city": "khulna",
        })
        .unwrap();

        assert_eq!(
            expr,
            Some(Expr::And(vec![
                Filter::gt("price", 9.99),
                Filter::lte("price", 100),
                Filter::any_of("name", ["laptop", "tv"]),
                Filter::eq("city", "khulna"),
            ]))
        );
    }

    #[test]
    fn membership_operators_take_their_array_elements() {
        let expr = Expr::from_criteria(&doc! {
            "role": { "$in": ["admin", "editor"], "$nin": ["guest"] },
        })
        .unwrap();

        assert_eq!(
            expr,
            Some(Expr::And(vec![
                Expr::field("role".into(), FieldOp::In, Bson::Array(vec!["admin".into(), "editor".into()])),
                Expr::field("role".into(), FieldOp::NotIn, Bson::Array(vec!["guest".into()])),
            ]))
        );
    }

    #[test]
    fn empty_criteria_match_everything() {
        assert_eq!(Expr::from_criteria(&doc! {}).unwrap(), None);
        assert_eq!(Criteria::from(()).into_expr().unwrap(), None);
    }

    #[test]
    fn logical_criteria_and_single_keys() {
        let expr = Expr::from_criteria(&doc! {
            "$or": [{ "age": { "$lt": 18 } }, { "role": "admin" }],
        })
        .unwrap();

        assert_eq!(
            expr,
            Some(Expr::Or(vec![Filter::lt("age", 18), Filter::eq("role", "admin")]))
        );
        assert_eq!(
            Expr::from_criteria(&doc! { "email": { "$exists": false } }).unwrap(),
            Some(Filter::not_exists("email"))
        );
    }

    #[test]
    fn malformed_criteria_are_rejected() {
        for criteria in [
            doc! { "price": { "$regex": "x" } },
            doc! { "name": { "$in": "tv" } },
            doc! { "$where": "1" },
            doc! { "$and": { "a": 1 } },
        ] {
            assert!(matches!(
                Expr::from_criteria(&criteria),
                Err(DocumentStoreError::InvalidQuery(_))
            ));
        }
    }

    #[test]
    fn builder_conjoins_filters_and_accumulates_sort_keys() {
        let query = Query::builder()
            .limit(2)
            .filter(Filter::gt("price", 3))
            .skip(2)
            .sort("price", SortDirection::Desc)
            .filter(Filter::lt("price", 10))
            .sort("name", SortDirection::try_from(1).unwrap())
            .build();

        assert_eq!(
            query.filter,
            Some(Expr::And(vec![Filter::gt("price", 3), Filter::lt("price", 10)]))
        );
        assert_eq!(query.sort.len(), 2);
        assert_eq!(query.sort[1].direction, SortDirection::Asc);
        assert_eq!((query.skip, query.limit), (Some(2), Some(2)));
        assert!(SortDirection::try_from(0).is_err());
    }

    #[test]
    fn projections_keep_id_unless_excluded() {
        let document = doc! { "_id": "k", "name": "tv", "price": 3 };

        assert_eq!(
            Projection::include(["name"]).apply(document.clone()),
            doc! { "_id": "k", "name": "tv" }
        );
        assert_eq!(
            Projection::include(["name"]).without_id().apply(document.clone()),
            doc! { "name": "tv" }
        );
        assert_eq!(
            Projection::exclude(["_id", "price"]).apply(document),
            doc! { "name": "tv" }
        );
    }

    #[test]
    fn pagination_sets_skip_and_limit() {
        let query = Query::builder()
            .paginate(&PaginationParams::new(2, 2))
            .build();

        assert_eq!((query.skip, query.limit), (Some(2), Some(2)));
    }
}
