//! Query expression evaluation for in-memory document filtering and sorting.

use bson::{Bson, DateTime, Document};
use std::{cmp::Ordering, collections::HashMap};

use docmodel_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, QueryVisitor, Sort, SortDirection},
};

/// Comparable representation of BSON values.
///
/// Integers and doubles are normalized to `f64`, so `Int32(5)` equals
/// `Double(5.0)`. BSON types without a variant compare as null.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(array) => Comparable::Array(array.iter().map(Comparable::from).collect()),
            Bson::Document(document) => Comparable::Map(
                document
                    .iter()
                    .map(|(key, value)| (key.as_str(), Comparable::from(value)))
                    .collect(),
            ),
            _ => Comparable::Null,
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of this value's type in the cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Bool(_) => 5,
            Comparable::DateTime(_) => 6,
        }
    }

    /// Total order used for sorting: by type rank first, then by value.
    ///
    /// NaN orders before every other number. Maps tie with each other.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| match (self, other) {
                (Comparable::Number(left), Comparable::Number(right)) => match (left.is_nan(), right.is_nan()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (false, false) => left.partial_cmp(right).unwrap_or(Ordering::Equal),
                },
                (Comparable::Array(left), Comparable::Array(right)) => left
                    .iter()
                    .zip(right)
                    .map(|(l, r)| l.sort_cmp(r))
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or_else(|| left.len().cmp(&right.len())),
                _ => self.partial_cmp(other).unwrap_or(Ordering::Equal),
            })
    }

    /// Equality as used by filters: an array field matches if any element
    /// equals the operand.
    fn matches(&self, operand: &Self) -> bool {
        match self {
            Comparable::Array(items) if !matches!(operand, Comparable::Array(_)) => {
                items.iter().any(|item| item == operand)
            }
            _ => self == operand,
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(l, r)| l == r)
            }
            (Comparable::Map(a), Comparable::Map(b)) => {
                a.len() == b.len() && a.iter().all(|(key, value)| b.get(key).is_some_and(|other| value == other))
            }
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Evaluates filter expressions against a single document.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    /// Keeps the documents matching `expr`, preserving their order.
    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        expr: &Expr,
    ) -> DocumentStoreResult<Vec<&'a Document>> {
        let mut matching = Vec::new();

        for document in documents {
            if DocumentEvaluator::new(document).evaluate(expr)? {
                matching.push(document);
            }
        }

        Ok(matching)
    }

    fn is_member(field_value: Option<&Bson>, values: &Bson) -> DocumentStoreResult<bool> {
        let Bson::Array(values) = values else {
            return Err(DocumentStoreError::InvalidQuery("set membership expects an array of values".into()));
        };

        let field_value = field_value.map_or(Comparable::Null, Comparable::from);

        Ok(values
            .iter()
            .any(|value| field_value.matches(&Comparable::from(value))))
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(self.document.contains_key(field) == should_exist)
    }

    /// A missing field compares as null: it matches equality with null and
    /// every negated operator, and never an ordering comparison.
    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let field_value = self.document.get(field);
        let left = field_value.map_or(Comparable::Null, Comparable::from);
        let right = Comparable::from(value);

        Ok(match op {
            FieldOp::Eq => left.matches(&right),
            FieldOp::Ne => !left.matches(&right),
            FieldOp::In => Self::is_member(field_value, value)?,
            FieldOp::NotIn => !Self::is_member(field_value, value)?,
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                if field_value.is_none() || matches!(left, Comparable::Null) {
                    return Ok(false);
                }

                match left.partial_cmp(&right) {
                    Some(ordering) => match op {
                        FieldOp::Gt => ordering.is_gt(),
                        FieldOp::Gte => ordering.is_ge(),
                        FieldOp::Lt => ordering.is_lt(),
                        _ => ordering.is_le(),
                    },
                    None => false,
                }
            }
        })
    }
}

/// Stable multi-key ordering of two documents.
///
/// Keys are applied in order as tie-breaks. Missing fields sort as null,
/// before every other value in ascending order.
pub(crate) fn compare_documents(left: &Document, right: &Document, sort: &[Sort]) -> Ordering {
    for key in sort {
        let l = left.get(&key.field).map_or(Comparable::Null, Comparable::from);
        let r = right.get(&key.field).map_or(Comparable::Null, Comparable::from);

        let ordering = match key.direction {
            SortDirection::Asc => l.sort_cmp(&r),
            SortDirection::Desc => r.sort_cmp(&l),
        };

        if ordering.is_ne() {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Whether two stored values collide under a unique index.
pub(crate) fn same_value(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}
