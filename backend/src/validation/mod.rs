//! Row validation.
//!
//! Validation never fails a batch: every problem becomes a message in the
//! row's `validation_errors` and the row is marked invalid.
//!
//! # Modes
//!
//! ## Permissive
//! A row is valid when it holds at least one non-missing value.
//!
//! ## Strict
//! - every required field of the registry must be non-missing
//! - the `date` field, when present, must be a real calendar date
//! - the registry's record schema (JSON Schema Draft 7), if any, must pass
//!
//! A value is *missing* when it is `null`, an empty string, or zero. Zero
//! counts as missing because empty monetary cells coerce to zero.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use sheetload::validation::validate;
//!
//! let schema = json!({ "type": "object", "required": ["amount"] });
//! assert!(validate(&schema, &json!({ "amount": 10 })).is_ok());
//! assert!(validate(&schema, &json!({})).is_err());
//! ```

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::models::{FieldRegistry, ValidationMode};

/// Key checked for calendar validity in strict mode.
const DATE_FIELD: &str = "date";

/// Validate a JSON value against a JSON schema.
///
/// # Returns
/// * `Ok(())` when valid
/// * `Err(Vec<String>)` with every schema error otherwise
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema)
        .map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Just true/false.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// `null`, `""`, `0` and absent values are missing.
pub fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(_) => false,
    }
}

/// True when any value of the row is not missing.
pub fn has_content(data: &Map<String, Value>) -> bool {
    data.values().any(|v| !is_missing(Some(v)))
}

/// True for a `YYYY-MM-DD` string naming a real day.
pub fn is_calendar_date(value: &Value) -> bool {
    value
        .as_str()
        .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok())
}

/// Validate one normalized row against its registry.
pub fn validate_row(data: &Map<String, Value>, registry: &FieldRegistry) -> Vec<ValidationError> {
    match registry.mode {
        ValidationMode::Permissive => {
            if has_content(data) {
                Vec::new()
            } else {
                vec![ValidationError::EmptyRow]
            }
        }
        ValidationMode::Strict => validate_strict(data, registry),
    }
}

fn validate_strict(data: &Map<String, Value>, registry: &FieldRegistry) -> Vec<ValidationError> {
    let mut errors: Vec<ValidationError> = registry
        .required_fields()
        .filter(|field| is_missing(data.get(&field.key)))
        .map(|field| ValidationError::MissingField(field.label.clone()))
        .collect();

    if let Some(date) = data.get(DATE_FIELD) {
        if !is_missing(Some(date)) && !is_calendar_date(date) {
            let label = registry
                .field(DATE_FIELD)
                .map_or(DATE_FIELD, |f| f.label.as_str());
            errors.push(ValidationError::InvalidValue {
                field: label.to_string(),
                message: format!("'{}' is not a calendar date", display_value(date)),
            });
        }
    }

    if let Some(schema) = &registry.record_schema {
        if let Err(schema_errors) = validate(schema, &Value::Object(data.clone())) {
            errors.push(ValidationError::SchemaError {
                errors: schema_errors,
            });
        }
    }

    errors
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SystemField;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn strict_registry() -> FieldRegistry {
        FieldRegistry::new("purchase", "purchases", ValidationMode::Strict)
            .with_field(SystemField::new("date", "Fecha").required())
            .with_field(SystemField::new("amount", "Monto").required())
            .with_field(SystemField::new("supplier", "Proveedor"))
    }

    #[test]
    fn test_schema_validate() {
        let schema = json!({
            "type": "object",
            "required": ["name"],
            "properties": { "name": { "type": "string" } }
        });
        assert!(validate(&schema, &json!({ "name": "test" })).is_ok());
        assert!(validate(&schema, &json!({ "age": 42 })).is_err());
        assert!(!is_valid(&schema, &json!({ "name": 1 })));
    }

    #[test]
    fn test_missing_values() {
        assert!(is_missing(None));
        assert!(is_missing(Some(&json!(null))));
        assert!(is_missing(Some(&json!(""))));
        assert!(is_missing(Some(&json!(0))));
        assert!(!is_missing(Some(&json!(false))));
        assert!(!is_missing(Some(&json!("x"))));
        assert!(!is_missing(Some(&json!(-3))));
    }

    #[test]
    fn test_permissive_single_value_is_enough() {
        let registry = FieldRegistry::new("generic", "records", ValidationMode::Permissive);
        let row = object(json!({ "A": "", "B": 0, "C": "hola" }));
        assert!(validate_row(&row, &registry).is_empty());

        let empty = object(json!({ "A": "", "B": 0 }));
        let errors = validate_row(&empty, &registry);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "Row has no data");
    }

    #[test]
    fn test_strict_reports_missing_labels() {
        let row = object(json!({ "date": "2024-01-05", "amount": 0 }));
        let errors: Vec<String> = validate_row(&row, &strict_registry())
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(errors, vec!["Missing required field: Monto"]);
    }

    #[test]
    fn test_strict_rejects_unparsed_date() {
        let row = object(json!({ "date": "pendiente", "amount": 100 }));
        let errors = validate_row(&row, &strict_registry());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("Fecha"));

        let ok = object(json!({ "date": "2024-02-29", "amount": 100 }));
        assert!(validate_row(&ok, &strict_registry()).is_empty());
    }

    #[test]
    fn test_strict_record_schema() {
        let registry = strict_registry().with_schema(json!({
            "type": "object",
            "properties": { "amount": { "type": "integer", "minimum": 1 } }
        }));
        let row = object(json!({ "date": "2024-01-05", "amount": -5 }));
        let errors = validate_row(&row, &registry);
        assert!(matches!(errors.as_slice(), [ValidationError::SchemaError { .. }]));
    }
}
