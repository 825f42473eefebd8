//! Query translation from the docmodel AST to MongoDB query syntax.

use bson::{Bson, Document, doc};

use docmodel_core::{
    document::ID_FIELD,
    error::DocumentStoreError,
    query::{Expr, FieldOp, Projection, QueryVisitor, Sort, SortDirection},
};

/// Translates query expressions into MongoDB filter documents.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// Filter document for an optional expression; `None` matches everything.
    pub fn filter(expr: Option<&Expr>) -> Result<Document, DocumentStoreError> {
        match expr {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(doc! {}),
        }
    }

    /// Sort document with keys in precedence order.
    pub fn sort(sort: &[Sort]) -> Option<Document> {
        if sort.is_empty() {
            return None;
        }

        Some(
            sort.iter()
                .map(|key| {
                    let direction = match key.direction {
                        SortDirection::Asc => 1,
                        SortDirection::Desc => -1,
                    };
                    (key.field.clone(), Bson::Int32(direction))
                })
                .collect(),
        )
    }

    pub fn projection(projection: &Projection) -> Document {
        let mut translated = Document::new();

        match projection {
            Projection::Include { fields, with_id } => {
                for field in fields {
                    translated.insert(field.clone(), 1);
                }
                // An empty inclusion would return every field.
                if translated.is_empty() || !with_id {
                    translated.insert(ID_FIELD, i32::from(translated.is_empty()));
                }
            }
            Projection::Exclude { fields, with_id } => {
                for field in fields {
                    translated.insert(field.clone(), 0);
                }
                if !with_id {
                    translated.insert(ID_FIELD, 0);
                }
            }
        }

        translated
    }

    fn set(op: &str, value: &Bson) -> Result<Document, DocumentStoreError> {
        match value {
            Bson::Array(values) => Ok(doc! { op: values.clone() }),
            _ => Err(DocumentStoreError::InvalidQuery(format!("{op} requires an array of values"))),
        }
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(doc! {});
        }

        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            // Every stored document has an identity key.
            return Ok(doc! { ID_FIELD: { "$exists": false } });
        }

        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::In => Self::set("$in", value)?,
                FieldOp::NotIn => Self::set("$nin", value)?,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmodel_core::query::Filter;
    use pretty_assertions::assert_eq;

    #[test]
    fn filters_translate_to_operator_documents() {
        let expr = Filter::gt("price", 5)
            .and(Filter::any_of("name", ["tv", "radio"]))
            .and(Filter::not_exists("deleted"));

        assert_eq!(
            MongoQueryTranslator::filter(Some(&expr)).unwrap(),
            doc! {
                "$and": [
                    { "price": { "$gt": 5 } },
                    { "name": { "$in": ["tv", "radio"] } },
                    { "deleted": { "$exists": false } },
                ]
            }
        );
        assert_eq!(MongoQueryTranslator::filter(None).unwrap(), doc! {});
    }

    #[test]
    fn negation_and_empty_logical_lists() {
        assert_eq!(
            MongoQueryTranslator::filter(Some(&Filter::eq("role", "admin").not())).unwrap(),
            doc! { "$nor": [{ "role": { "$eq": "admin" } }] }
        );
        assert_eq!(MongoQueryTranslator::filter(Some(&Filter::and([]))).unwrap(), doc! {});
        assert_eq!(
            MongoQueryTranslator::filter(Some(&Filter::or([]))).unwrap(),
            doc! { "_id": { "$exists": false } }
        );
    }

    #[test]
    fn membership_requires_arrays() {
        let expr = Expr::field("name".into(), FieldOp::NotIn, Bson::String("tv".into()));

        assert!(matches!(
            MongoQueryTranslator::filter(Some(&expr)),
            Err(DocumentStoreError::InvalidQuery(_))
        ));
    }

    #[test]
    fn sort_keys_keep_their_order() {
        let sort = vec![
            Sort { field: "rating".into(), direction: SortDirection::Desc },
            Sort { field: "price".into(), direction: SortDirection::Asc },
        ];

        assert_eq!(
            MongoQueryTranslator::sort(&sort),
            Some(doc! { "rating": -1, "price": 1 })
        );
        assert_eq!(MongoQueryTranslator::sort(&[]), None);
    }

    #[test]
    fn projections() {
        assert_eq!(
            MongoQueryTranslator::projection(&Projection::include(["name"]).without_id()),
            doc! { "name": 1, "_id": 0 }
        );
        assert_eq!(
            MongoQueryTranslator::projection(&Projection::include(Vec::<String>::new())),
            doc! { "_id": 1 }
        );
        assert_eq!(
            MongoQueryTranslator::projection(&Projection::exclude(["price", "_id"])),
            doc! { "price": 0, "_id": 0 }
        );
    }
}
