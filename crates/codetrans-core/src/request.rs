//! Translation requests and their validation.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::language::Language;
use crate::prompt::build_prompt;

const REQUIRED: &str = "This field is required.";
const NOT_NULL: &str = "This field may not be null.";
const NOT_STRING: &str = "Not a valid string.";

/// A validated translation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationRequest {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_language: Option<Language>,
    pub target_language: Language,
}

/// Field name → list of problems, reported for every violated field at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{field}: {}", messages.join(" ")))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

impl TranslationRequest {
    pub fn new(code: impl Into<String>, target_language: Language) -> Self {
        Self {
            code: code.into(),
            input_language: None,
            target_language,
        }
    }

    pub fn with_input_language(mut self, language: Language) -> Self {
        self.input_language = Some(language);
        self
    }

    /// Prompt for this request, before tokenization.
    pub fn prompt(&self) -> String {
        build_prompt(&self.code, self.target_language, self.input_language)
    }

    /// Parse and validate a raw JSON body.
    ///
    /// Bodies that are not valid JSON objects are validated as if empty, so
    /// the response still names the required fields.
    pub fn from_json_slice(body: &[u8]) -> Result<Self, ValidationErrors> {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => Self::from_value(&value),
            Err(err) => {
                let mut errors = missing_body_errors();
                errors.add("non_field_errors", format!("JSON parse error - {err}"));
                Err(errors)
            }
        }
    }

    pub fn from_value(value: &Value) -> Result<Self, ValidationErrors> {
        match value {
            Value::Object(fields) => validate_fields(fields),
            other => {
                let mut errors = missing_body_errors();
                errors.add(
                    "non_field_errors",
                    format!(
                        "Invalid data. Expected a dictionary, but got {}.",
                        json_type_name(other)
                    ),
                );
                Err(errors)
            }
        }
    }
}

fn validate_fields(fields: &Map<String, Value>) -> Result<TranslationRequest, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let code = match fields.get("code") {
        None => {
            errors.add("code", REQUIRED);
            None
        }
        Some(Value::Null) => {
            errors.add("code", NOT_NULL);
            None
        }
        Some(Value::String(code)) => Some(code.clone()),
        Some(_) => {
            errors.add("code", NOT_STRING);
            None
        }
    };

    let target_language = match fields.get("target_language") {
        None => {
            errors.add("target_language", REQUIRED);
            None
        }
        Some(Value::Null) => {
            errors.add("target_language", NOT_NULL);
            None
        }
        Some(raw) => parse_choice(raw, "target_language", &mut errors),
    };

    let input_language = match fields.get("input_language") {
        None | Some(Value::Null) => None,
        Some(raw) => parse_choice(raw, "input_language", &mut errors),
    };

    match (code, target_language) {
        (Some(code), Some(target_language)) if errors.is_empty() => Ok(TranslationRequest {
            code,
            input_language,
            target_language,
        }),
        _ => Err(errors),
    }
}

fn missing_body_errors() -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    errors.add("code", REQUIRED);
    errors.add("target_language", REQUIRED);
    errors
}

fn parse_choice(raw: &Value, field: &str, errors: &mut ValidationErrors) -> Option<Language> {
    let parsed = raw.as_str().and_then(Language::from_wire);
    if parsed.is_none() {
        let shown = match raw {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        errors.add(field, format!("\"{shown}\" is not a valid choice."));
    }
    parsed
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_full_request() {
        let req = TranslationRequest::from_value(&json!({
            "code": "print('hi')",
            "input_language": "python",
            "target_language": "java",
        }))
        .unwrap();

        assert_eq!(req.input_language, Some(Language::Python));
        assert_eq!(req.target_language, Language::Java);
        assert_eq!(req.prompt(), "translate python to java: print('hi')");
    }

    #[test]
    fn input_language_is_optional() {
        let req = TranslationRequest::from_value(&json!({
            "code": "x = 1",
            "target_language": "c++",
            "input_language": null,
        }))
        .unwrap();
        assert_eq!(req.input_language, None);
        assert_eq!(req.prompt(), "translate to c++: x = 1");
    }

    #[test]
    fn empty_code_is_accepted() {
        let req = TranslationRequest::from_value(&json!({
            "code": "",
            "target_language": "python",
        }))
        .unwrap();
        assert!(req.code.is_empty());
    }

    #[test]
    fn reports_every_invalid_field() {
        let errors = TranslationRequest::from_value(&json!({
            "code": 42,
            "target_language": "rust",
            "input_language": "cobol",
        }))
        .unwrap_err();

        assert_eq!(errors.messages("code"), ["Not a valid string."]);
        assert_eq!(
            errors.messages("target_language"),
            ["\"rust\" is not a valid choice."]
        );
        assert_eq!(
            errors.messages("input_language"),
            ["\"cobol\" is not a valid choice."]
        );
    }

    #[test]
    fn language_choices_match_exactly() {
        for raw in ["Java", "cpp", " python "] {
            let errors = TranslationRequest::from_value(&json!({
                "code": "x",
                "target_language": raw,
                "input_language": raw,
            }))
            .unwrap_err();
            let expected = format!("\"{raw}\" is not a valid choice.");
            assert_eq!(errors.messages("target_language"), [expected.as_str()]);
            assert_eq!(errors.messages("input_language"), [expected.as_str()]);
        }
    }

    #[test]
    fn missing_fields_are_required() {
        let errors = TranslationRequest::from_value(&json!({})).unwrap_err();
        assert_eq!(errors.messages("code"), ["This field is required."]);
        assert_eq!(errors.messages("target_language"), ["This field is required."]);
        assert!(!errors.contains("input_language"));
    }

    #[test]
    fn malformed_json_names_required_fields() {
        let errors = TranslationRequest::from_json_slice(b"{\"code\": ").unwrap_err();
        assert!(errors.contains("code"));
        assert!(errors.contains("target_language"));
        assert!(errors.messages("non_field_errors")[0].starts_with("JSON parse error"));
    }

    #[test]
    fn non_object_body_is_rejected() {
        let errors = TranslationRequest::from_value(&json!(["python"])).unwrap_err();
        assert_eq!(
            errors.messages("non_field_errors"),
            ["Invalid data. Expected a dictionary, but got list."]
        );
    }

    #[test]
    fn errors_serialize_as_field_map() {
        let errors = TranslationRequest::from_value(&json!({ "code": "x" })).unwrap_err();
        let value = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            value,
            json!({ "target_language": ["This field is required."] })
        );
    }
}
