use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::filter::Document;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static email pattern"));

/// Field -> message for every constraint a document violates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationError {
    errors: BTreeMap<String, String>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::new();
        err.add(field, message);
        err
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn field_errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.errors.values().map(String::as_str).collect();
        write!(f, "Invalid input data. {}", messages.join(". "))
    }
}

impl std::error::Error for ValidationError {}

/// Whether a write creates a document or patches some of its fields
#[derive(Debug, Clone, Copy)]
pub enum WriteMode<'a> {
    Create,
    Update { fields: &'a [String] },
}

impl WriteMode<'_> {
    pub fn touches(&self, field: &str) -> bool {
        match self {
            WriteMode::Create => true,
            WriteMode::Update { fields } => fields.iter().any(|f| f == field),
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, WriteMode::Create)
    }
}

/// Collects constraint violations for the fields a write touches
pub struct Validator<'a> {
    doc: &'a Document,
    mode: WriteMode<'a>,
    errors: ValidationError,
}

impl<'a> Validator<'a> {
    pub fn new(doc: &'a Document, mode: WriteMode<'a>) -> Self {
        Self { doc, mode, errors: ValidationError::new() }
    }

    fn present(&self, field: &str) -> Option<&'a Value> {
        match self.doc.get(field) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(v) => Some(v),
        }
    }

    pub fn required(&mut self, field: &str, message: &str) -> &mut Self {
        if self.mode.touches(field) && self.present(field).is_none() {
            self.errors.add(field, message);
        }
        self
    }

    pub fn string(&mut self, field: &str) -> &mut Self {
        if let (true, Some(v)) = (self.mode.touches(field), self.present(field)) {
            if !v.is_string() {
                self.errors.add(field, format!("{} must be a string", field));
            }
        }
        self
    }

    pub fn length(&mut self, field: &str, min: usize, max: usize, message: &str) -> &mut Self {
        if let (true, Some(Value::String(s))) = (self.mode.touches(field), self.present(field)) {
            let len = s.trim().chars().count();
            if len < min || len > max {
                self.errors.add(field, message);
            }
        }
        self
    }

    pub fn number(&mut self, field: &str) -> &mut Self {
        if let (true, Some(v)) = (self.mode.touches(field), self.present(field)) {
            if !v.is_number() {
                self.errors.add(field, format!("{} must be a number", field));
            }
        }
        self
    }

    pub fn range(&mut self, field: &str, min: f64, max: f64, message: &str) -> &mut Self {
        if let (true, Some(n)) = (self.mode.touches(field), self.present(field).and_then(Value::as_f64)) {
            if n < min || n > max {
                self.errors.add(field, message);
            }
        }
        self
    }

    pub fn one_of(&mut self, field: &str, allowed: &[&str], message: &str) -> &mut Self {
        if let (true, Some(v)) = (self.mode.touches(field), self.present(field)) {
            if !v.as_str().is_some_and(|s| allowed.contains(&s)) {
                self.errors.add(field, message);
            }
        }
        self
    }

    pub fn email(&mut self, field: &str, message: &str) -> &mut Self {
        if let (true, Some(v)) = (self.mode.touches(field), self.present(field)) {
            if !v.as_str().is_some_and(|s| EMAIL_RE.is_match(s.trim())) {
                self.errors.add(field, message);
            }
        }
        self
    }

    /// Arbitrary rule over the whole document, checked when `field` is touched
    pub fn check(&mut self, field: &str, ok: impl FnOnce(&Document) -> bool, message: &str) -> &mut Self {
        if self.mode.touches(field) && self.present(field).is_some() && !ok(self.doc) {
            self.errors.add(field, message);
        }
        self
    }

    /// `field` must equal `other` whenever either of them is written
    pub fn same_as(&mut self, field: &str, other: &str, message: &str) -> &mut Self {
        if (self.mode.touches(field) || self.mode.touches(other)) && self.doc.get(field) != self.doc.get(other) {
            self.errors.add(field, message);
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), ValidationError> {
        std::mem::take(&mut self.errors).into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_only_checks_touched_fields() {
        let doc = json!({"price": 10}).as_object().unwrap().clone();
        let touched = vec!["price".to_string()];

        let mut v = Validator::new(&doc, WriteMode::Update { fields: &touched });
        v.required("name", "A tour must have a name").number("price");
        assert!(v.finish().is_ok());

        let mut v = Validator::new(&doc, WriteMode::Create);
        v.required("name", "A tour must have a name");
        let err = v.finish().unwrap_err();
        assert_eq!(err.field_errors().get("name").map(String::as_str), Some("A tour must have a name"));
        assert_eq!(err.to_string(), "Invalid input data. A tour must have a name");
    }

    #[test]
    fn blank_strings_count_as_missing() {
        let doc = json!({"name": "   "}).as_object().unwrap().clone();
        let mut v = Validator::new(&doc, WriteMode::Create);
        v.required("name", "missing");
        assert!(v.finish().is_err());
    }

    #[test]
    fn email_shape() {
        let good = json!({"email": "jonas@example.io"}).as_object().unwrap().clone();
        let bad = json!({"email": "jonas@"}).as_object().unwrap().clone();
        assert!(Validator::new(&good, WriteMode::Create).email("email", "bad").finish().is_ok());
        assert!(Validator::new(&bad, WriteMode::Create).email("email", "bad").finish().is_err());
    }
}
