//! Book payload validation against the declared JSON Schemas.

use anyhow::Context;
use jsonschema::error::ValidationErrorKind;
use jsonschema::Validator;
use serde::Serialize;
use serde_json::{Map, Value};

const BOOK_SCHEMA: &str = include_str!("schemas/book.schema.json");
const BOOK_UPDATE_SCHEMA: &str = include_str!("schemas/book-update.schema.json");

/// Field name reported when the payload itself is not an object.
const ROOT_FIELD: &str = "body";

/// Fields stored as signed 64-bit integers.
const INTEGER_FIELDS: &[&str] = &["pages", "year"];

/// Which schema a payload is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Every field is required.
    Create,
    /// Present fields are type-checked; none is required.
    Update,
}

/// One field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: String,
    pub error: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            error: error.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("book payload failed validation ({} violation(s))", violations.len())]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

/// Compiled book schemas. Build once and share.
pub struct BookValidator {
    create: Validator,
    update: Validator,
}

impl BookValidator {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            create: compile(BOOK_SCHEMA).context("invalid book schema")?,
            update: compile(BOOK_UPDATE_SCHEMA).context("invalid book update schema")?,
        })
    }

    /// Check `payload` in the given mode, collecting every violation.
    ///
    /// `amazonUrl` is rewritten to `amazon_url` in place first so that both
    /// spellings go through the same type check. Sending both spellings is a
    /// violation on `amazonUrl`.
    pub fn validate(&self, payload: &mut Value, mode: ValidationMode) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        if let Some(object) = payload.as_object_mut() {
            violations.extend(normalize_keys(object));
        }

        let validator = match mode {
            ValidationMode::Create => &self.create,
            ValidationMode::Update => &self.update,
        };

        violations.extend(validator.iter_errors(payload).map(|e| {
            let field = match &e.kind {
                ValidationErrorKind::Required { property } => property
                    .as_str()
                    .map(str::to_owned)
                    .unwrap_or_else(|| property.to_string()),
                _ => field_from_path(&e.instance_path.to_string()),
            };
            Violation::new(field, e.to_string())
        }));

        // JSON Schema `integer` admits `5.0` and values past i64.
        if let Some(object) = payload.as_object() {
            for &field in INTEGER_FIELDS {
                let out_of_range =
                    matches!(object.get(field), Some(Value::Number(n)) if n.as_i64().is_none());
                if out_of_range && !violations.iter().any(|v| v.field == field) {
                    violations.push(Violation::new(
                        field,
                        format!("{} is not a whole number in the signed 64-bit range", object[field]),
                    ));
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { violations })
        }
    }
}

fn compile(source: &str) -> anyhow::Result<Validator> {
    let schema: Value = serde_json::from_str(source).context("schema is not valid JSON")?;
    jsonschema::validator_for(&schema).map_err(|e| anyhow::anyhow!("{e}"))
}

fn normalize_keys(object: &mut Map<String, Value>) -> Option<Violation> {
    let url = object.remove("amazonUrl")?;
    if object.contains_key("amazon_url") {
        return Some(Violation::new(
            "amazonUrl",
            "amazonUrl and amazon_url are the same field; send only one",
        ));
    }
    object.insert("amazon_url".to_string(), url);
    None
}

/// `/pages` -> `pages`; the empty pointer is the payload root.
fn field_from_path(pointer: &str) -> String {
    match pointer.trim_start_matches('/') {
        "" => ROOT_FIELD.to_string(),
        field => field.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_book() -> Value {
        json!({
            "isbn": "1234567",
            "amazon_url": "http://testaddress.com",
            "author": "Test Author",
            "language": "test",
            "pages": 123,
            "publisher": "Test Publisher",
            "title": "Test Title",
            "year": 0
        })
    }

    fn fields(result: Result<(), ValidationError>) -> Vec<String> {
        let mut fields: Vec<String> = result
            .unwrap_err()
            .violations
            .into_iter()
            .map(|v| v.field)
            .collect();
        fields.sort();
        fields
    }

    #[test]
    fn accepts_complete_book() {
        let validator = BookValidator::new().unwrap();
        assert!(validator
            .validate(&mut valid_book(), ValidationMode::Create)
            .is_ok());
    }

    #[test]
    fn create_requires_title() {
        let validator = BookValidator::new().unwrap();
        let mut payload = valid_book();
        payload.as_object_mut().unwrap().remove("title");

        let result = validator.validate(&mut payload, ValidationMode::Create);
        assert_eq!(fields(result), vec!["title"]);
    }

    #[test]
    fn create_reports_every_missing_field() {
        let validator = BookValidator::new().unwrap();
        let result = validator.validate(&mut json!({ "year": 2000 }), ValidationMode::Create);
        assert_eq!(
            fields(result),
            vec!["amazon_url", "author", "isbn", "language", "pages", "publisher", "title"]
        );
    }

    #[test]
    fn rejects_number_where_string_expected() {
        let validator = BookValidator::new().unwrap();
        let mut payload = valid_book();
        payload["amazon_url"] = json!(2324);

        let result = validator.validate(&mut payload, ValidationMode::Update);
        assert_eq!(fields(result), vec!["amazon_url"]);
    }

    #[test]
    fn camel_case_url_is_type_checked_and_normalized() {
        let validator = BookValidator::new().unwrap();
        let mut payload = json!({ "amazonUrl": 2324 });
        assert_eq!(
            fields(validator.validate(&mut payload, ValidationMode::Update)),
            vec!["amazon_url"]
        );

        let mut payload = json!({ "amazonUrl": "http://a" });
        assert!(validator
            .validate(&mut payload, ValidationMode::Update)
            .is_ok());
        assert_eq!(payload, json!({ "amazon_url": "http://a" }));
    }

    #[test]
    fn both_url_spellings_are_rejected() {
        let validator = BookValidator::new().unwrap();
        let mut payload = valid_book();
        payload["amazonUrl"] = json!(2324);
        assert_eq!(
            fields(validator.validate(&mut payload, ValidationMode::Update)),
            vec!["amazonUrl"]
        );

        let mut payload = valid_book();
        payload["amazonUrl"] = json!("http://other");
        assert_eq!(
            fields(validator.validate(&mut payload, ValidationMode::Create)),
            vec!["amazonUrl"]
        );
    }

    #[test]
    fn integers_must_fit_i64_without_fraction() {
        let validator = BookValidator::new().unwrap();

        let mut payload = valid_book();
        payload["pages"] = json!(5.0);
        assert_eq!(
            fields(validator.validate(&mut payload, ValidationMode::Create)),
            vec!["pages"]
        );

        let mut payload = json!({ "pages": 18446744073709551615u64, "year": 2.5 });
        assert_eq!(
            fields(validator.validate(&mut payload, ValidationMode::Update)),
            vec!["pages", "year"]
        );

        let mut payload = json!({ "year": i64::MIN });
        assert!(validator
            .validate(&mut payload, ValidationMode::Update)
            .is_ok());
    }

    #[test]
    fn update_accepts_partial_and_empty_payloads() {
        let validator = BookValidator::new().unwrap();
        assert!(validator
            .validate(&mut json!({}), ValidationMode::Update)
            .is_ok());
        assert!(validator
            .validate(&mut json!({ "author": "Someone" }), ValidationMode::Update)
            .is_ok());
    }

    #[test]
    fn integer_rules() {
        let validator = BookValidator::new().unwrap();

        let mut payload = valid_book();
        payload["pages"] = json!(-1);
        payload["year"] = json!("1999");
        assert_eq!(
            fields(validator.validate(&mut payload, ValidationMode::Create)),
            vec!["pages", "year"]
        );

        let mut payload = valid_book();
        payload["year"] = json!(-350);
        assert!(validator
            .validate(&mut payload, ValidationMode::Create)
            .is_ok());
    }

    #[test]
    fn empty_author_and_title_are_rejected() {
        let validator = BookValidator::new().unwrap();
        let mut payload = valid_book();
        payload["author"] = json!("");
        payload["title"] = json!("");
        assert_eq!(
            fields(validator.validate(&mut payload, ValidationMode::Create)),
            vec!["author", "title"]
        );
    }

    #[test]
    fn non_object_payload_is_a_root_violation() {
        let validator = BookValidator::new().unwrap();
        let result = validator.validate(&mut json!([1, 2, 3]), ValidationMode::Update);
        assert_eq!(fields(result), vec![ROOT_FIELD]);
    }
}
