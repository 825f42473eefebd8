//! Validation of documents against a [`Schema`].
//!
//! Every declared field is checked and every violation is collected, so a
//! caller gets the complete list of problems in one pass. Fields that the
//! schema does not declare are dropped from the result.

use bson::{Bson, Document};
use log::debug;

use crate::{
    document::ID_FIELD,
    error::{FieldError, FieldErrorKind, ValidationErrors},
    schema::{ConstraintKind, FieldRule, Schema},
};

pub struct ValidationEngine;

impl ValidationEngine {
    /// Validates a complete candidate document.
    ///
    /// Absent (or null) fields take their default when one is declared and
    /// skip every other check. Absent required fields without a default are
    /// reported as [`FieldErrorKind::Required`]. Present fields are type
    /// checked and then run through every constraint in declaration order.
    ///
    /// On success the returned document holds the identity key (if the input
    /// had one) followed by the declared fields in schema order.
    pub fn validate(document: Document, schema: &Schema) -> Result<Document, ValidationErrors> {
        let mut input = document;
        let mut output = Document::new();
        let mut errors = ValidationErrors::new();

        if let Some(id) = input.remove(ID_FIELD) {
            output.insert(ID_FIELD, id);
        }

        for (field, rule) in schema.fields() {
            match input.remove(field).filter(|value| !matches!(value, Bson::Null)) {
                Some(value) => {
                    Self::check_field(field, rule, &value, &mut errors);
                    output.insert(field, value);
                }
                None => match &rule.default {
                    Some(default) => {
                        output.insert(field, default.resolve());
                    }
                    None if rule.required => errors.push(Self::required_error(field, rule)),
                    None => {}
                },
            }
        }

        Self::drop_undeclared(input);

        if errors.is_empty() {
            Ok(output)
        } else {
            Err(errors)
        }
    }

    /// Validates only the fields present in `changes`.
    ///
    /// Used for updates: a required field may be left out, but setting it to
    /// null is a violation. Defaults are not applied and the identity key can
    /// never change.
    pub fn validate_changes(changes: Document, schema: &Schema) -> Result<Document, ValidationErrors> {
        let mut output = Document::new();
        let mut errors = ValidationErrors::new();
        let mut undeclared = Document::new();

        for (field, value) in changes {
            if field == ID_FIELD {
                errors.push(FieldError::new(
                    ID_FIELD,
                    FieldErrorKind::Immutable,
                    "Path `_id` cannot be changed.",
                ));
                continue;
            }

            let Some(rule) = schema.field(&field) else {
                undeclared.insert(field, value);
                continue;
            };

            match value {
                Bson::Null if rule.required => errors.push(Self::required_error(&field, rule)),
                Bson::Null => {
                    output.insert(field, Bson::Null);
                }
                value => {
                    Self::check_field(&field, rule, &value, &mut errors);
                    output.insert(field, value);
                }
            }
        }

        Self::drop_undeclared(undeclared);

        if errors.is_empty() {
            Ok(output)
        } else {
            Err(errors)
        }
    }

    /// Checks a present value against the type and constraints of `rule`.
    ///
    /// A type mismatch is reported alone; constraints are only meaningful for
    /// values of the declared type.
    pub fn check_field(field: &str, rule: &FieldRule, value: &Bson, errors: &mut ValidationErrors) {
        if !rule.field_type.accepts(value) {
            errors.push(FieldError::new(
                field,
                FieldErrorKind::Type,
                format!(
                    "Cast to {} failed for value {} at path `{field}`.",
                    rule.field_type.name(),
                    display_value(value),
                ),
            ));
            return;
        }

        for constraint in &rule.constraints {
            let violation = match &constraint.kind {
                ConstraintKind::Min(min) => numeric(value)
                    .filter(|n| n < min)
                    .map(|_| (
                        FieldErrorKind::Min,
                        format!("Path `{field}` ({}) is less than minimum allowed value ({min}).", display_value(value)),
                    )),
                ConstraintKind::Max(max) => numeric(value)
                    .filter(|n| n > max)
                    .map(|_| (
                        FieldErrorKind::Max,
                        format!("Path `{field}` ({}) is more than maximum allowed value ({max}).", display_value(value)),
                    )),
                ConstraintKind::MinLength(min) => text_length(value)
                    .filter(|length| length < min)
                    .map(|_| (
                        FieldErrorKind::MinLength,
                        format!("Path `{field}` (`{}`) is shorter than the minimum allowed length ({min}).", display_value(value)),
                    )),
                ConstraintKind::MaxLength(max) => text_length(value)
                    .filter(|length| length > max)
                    .map(|_| (
                        FieldErrorKind::MaxLength,
                        format!("Path `{field}` (`{}`) is longer than the maximum allowed length ({max}).", display_value(value)),
                    )),
                ConstraintKind::Pattern(pattern) => value
                    .as_str()
                    .filter(|text| !pattern.is_match(text))
                    .map(|_| (
                        FieldErrorKind::Pattern,
                        format!("Path `{field}` is invalid ({}).", display_value(value)),
                    )),
                ConstraintKind::Enum(allowed) => (!allowed.iter().any(|candidate| values_equal(candidate, value)))
                    .then(|| (
                        FieldErrorKind::Enum,
                        format!("`{}` is not a valid enum value for path `{field}`.", display_value(value)),
                    )),
            };

            if let Some((kind, default_message)) = violation {
                let message = match &constraint.message {
                    Some(template) => interpolate(template, field, value),
                    None => default_message,
                };

                errors.push(FieldError::new(field, kind, message));
            }
        }
    }

    fn required_error(field: &str, rule: &FieldRule) -> FieldError {
        let message = match &rule.required_message {
            Some(template) => interpolate(template, field, &Bson::Null),
            None => format!("Path `{field}` is required."),
        };

        FieldError::new(field, FieldErrorKind::Required, message)
    }

    fn drop_undeclared(undeclared: Document) {
        if !undeclared.is_empty() {
            debug!(
                "dropping fields not declared in schema: {}",
                undeclared.keys().cloned().collect::<Vec<_>>().join(", ")
            );
        }
    }
}

/// Numeric view of a value; dates compare by their millisecond timestamp.
pub(crate) fn numeric(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        Bson::DateTime(date) => Some(date.timestamp_millis() as f64),
        _ => None,
    }
}

fn text_length(value: &Bson) -> Option<usize> {
    value.as_str().map(|text| text.chars().count())
}

/// Equality that treats every numeric BSON type alike.
fn values_equal(left: &Bson, right: &Bson) -> bool {
    match (numeric(left), numeric(right)) {
        (Some(a), Some(b)) if !matches!(left, Bson::DateTime(_)) && !matches!(right, Bson::DateTime(_)) => a == b,
        _ => left == right,
    }
}

fn display_value(value: &Bson) -> String {
    match value {
        Bson::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn interpolate(template: &str, field: &str, value: &Bson) -> String {
    template
        .replace("{VALUE}", &display_value(value))
        .replace("{PATH}", field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Constraint, FieldRule};
    use bson::doc;
    use pretty_assertions::assert_eq;
    use regex::Regex;

    fn user_schema() -> Schema {
        Schema::builder()
            .field("name", FieldRule::string().required().min_length(5).max_length(20))
            .field("age", FieldRule::number().required().min(18.0).max(60.0))
            .build()
            .unwrap()
    }

    fn kinds(errors: &ValidationErrors) -> Vec<(&str, FieldErrorKind)> {
        errors
            .errors()
            .iter()
            .map(|error| (error.field.as_str(), error.kind))
            .collect()
    }

    #[test]
    fn short_name_is_the_only_violation() {
        let errors = ValidationEngine::validate(doc! { "name": "Bob", "age": 25 }, &user_schema()).unwrap_err();

        assert_eq!(kinds(&errors), vec![("name", FieldErrorKind::MinLength)]);
    }

    #[test]
    fn young_age_is_the_only_violation() {
        let errors = ValidationEngine::validate(doc! { "name": "Bobby", "age": 15 }, &user_schema()).unwrap_err();

        assert_eq!(kinds(&errors), vec![("age", FieldErrorKind::Min)]);
    }

    #[test]
    fn all_violations_are_collected() {
        let errors = ValidationEngine::validate(doc! { "name": "x".repeat(30) }, &user_schema()).unwrap_err();

        assert_eq!(
            kinds(&errors),
            vec![("name", FieldErrorKind::MaxLength), ("age", FieldErrorKind::Required)]
        );
        assert_eq!(errors.errors()[1].message, "Path `age` is required.");
    }

    #[test]
    fn valid_documents_come_back_in_schema_order_without_unknown_fields() {
        let document = ValidationEngine::validate(
            doc! { "age": 30, "nickname": "bo", "name": "Bobby" },
            &user_schema(),
        )
        .unwrap();

        assert_eq!(document, doc! { "name": "Bobby", "age": 30 });
    }

    #[test]
    fn defaults_fill_absent_fields_and_satisfy_required() {
        let schema = Schema::builder()
            .field("rating", FieldRule::number().required().default(3.0).min(10.0))
            .field("stock", FieldRule::number().default_with(|| Bson::Int32(1)))
            .build()
            .unwrap();

        let document = ValidationEngine::validate(doc! { "stock": Bson::Null }, &schema).unwrap();

        assert_eq!(document, doc! { "rating": 3.0, "stock": 1 });
    }

    #[test]
    fn wrong_type_skips_remaining_constraints() {
        let errors = ValidationEngine::validate(doc! { "name": "Bobby", "age": "18" }, &user_schema()).unwrap_err();

        assert_eq!(kinds(&errors), vec![("age", FieldErrorKind::Type)]);
    }

    #[test]
    fn non_finite_numbers_fail_the_type_check() {
        for age in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let errors = ValidationEngine::validate(doc! { "name": "Bobby", "age": age }, &user_schema()).unwrap_err();

            assert_eq!(kinds(&errors), vec![("age", FieldErrorKind::Type)]);
        }

        let changes = ValidationEngine::validate_changes(doc! { "age": f64::NAN }, &user_schema()).unwrap_err();
        assert_eq!(kinds(&changes), vec![("age", FieldErrorKind::Type)]);

        assert!(ValidationEngine::validate(doc! { "name": "Bobby", "age": 30.5 }, &user_schema()).is_ok());
    }

    #[test]
    fn enum_message_interpolates_value() {
        let schema = Schema::builder()
            .field(
                "role",
                FieldRule::string().required().constraint(
                    Constraint::one_of(["admin", "user", "editor"])
                        .with_message("{VALUE} is not valid role."),
                ),
            )
            .build()
            .unwrap();

        let errors = ValidationEngine::validate(doc! { "role": "root" }, &schema).unwrap_err();

        assert_eq!(errors.errors()[0].kind, FieldErrorKind::Enum);
        assert_eq!(errors.errors()[0].message, "root is not valid role.");
        assert!(ValidationEngine::validate(doc! { "role": "editor" }, &schema).is_ok());
    }

    #[test]
    fn pattern_and_custom_messages() {
        let schema = Schema::builder()
            .field(
                "email",
                FieldRule::string()
                    .required_with("Email is required.")
                    .constraint(
                        Constraint::pattern(Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,4}$").unwrap())
                            .with_message("Invalid email format!"),
                    ),
            )
            .build()
            .unwrap();

        let bad = ValidationEngine::validate(doc! { "email": "oggy" }, &schema).unwrap_err();
        let missing = ValidationEngine::validate(doc! {}, &schema).unwrap_err();

        assert_eq!(bad.errors()[0].message, "Invalid email format!");
        assert_eq!(missing.errors()[0].message, "Email is required.");
        assert!(ValidationEngine::validate(doc! { "email": "oggy2021@gamil.com" }, &schema).is_ok());
    }

    #[test]
    fn enum_matches_numbers_across_bson_types() {
        let schema = Schema::builder()
            .field("stars", FieldRule::number().one_of([1, 2, 3]))
            .build()
            .unwrap();

        assert!(ValidationEngine::validate(doc! { "stars": 2.0 }, &schema).is_ok());
        assert!(ValidationEngine::validate(doc! { "stars": 4_i64 }, &schema).is_err());
    }

    #[test]
    fn changes_are_validated_alone() {
        let schema = user_schema();

        assert_eq!(
            ValidationEngine::validate_changes(doc! { "age": 44, "city": "Khulna" }, &schema).unwrap(),
            doc! { "age": 44 }
        );

        let errors = ValidationEngine::validate_changes(
            doc! { "_id": "other", "name": Bson::Null, "age": 70 },
            &schema,
        )
        .unwrap_err();

        assert_eq!(
            kinds(&errors),
            vec![
                ("_id", FieldErrorKind::Immutable),
                ("name", FieldErrorKind::Required),
                ("age", FieldErrorKind::Max),
            ]
        );
    }
}
