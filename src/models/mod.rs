pub mod review;
pub mod tour;
pub mod user;
pub mod validation;

pub use review::Review;
pub use tour::Tour;
pub use user::{Role, User};
pub use validation::{ValidationError, Validator, WriteMode};

use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use crate::filter::{Document, FilterExpression, ID_FIELD, VERSION_FIELD};

/// Schema of one record type: defaults, constraints and derived fields.
/// Record stores run every write through `prepare_create` / `prepare_update`.
pub trait Model: Send + Sync + 'static {
    const COLLECTION: &'static str;

    /// Never rendered in API responses
    const HIDDEN: &'static [&'static str] = &[];

    /// Top-level fields whose values must be unique across the collection
    const UNIQUE: &'static [&'static str] = &[];

    /// Applied to every find, so some records are invisible to queries
    fn default_filter() -> FilterExpression {
        FilterExpression::new()
    }

    fn apply_defaults(_doc: &mut Document) {}

    fn validate(doc: &Document, mode: WriteMode<'_>) -> Result<(), ValidationError>;

    /// Normalisation after validation passed (trimming, hashing, slugs)
    fn prepare(_doc: &mut Document, _mode: WriteMode<'_>) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Derived fields added when a document is read
    fn decorate(_doc: &mut Document) {}
}

pub fn prepare_create<M: Model>(input: Document) -> Result<Document, ValidationError> {
    let mut doc = strip_system_fields(input);
    M::apply_defaults(&mut doc);
    M::validate(&doc, WriteMode::Create)?;
    M::prepare(&mut doc, WriteMode::Create)?;
    Ok(doc)
}

pub fn prepare_update<M: Model>(
    existing: &Document,
    patch: Document,
    run_validators: bool,
) -> Result<Document, ValidationError> {
    let patch = strip_system_fields(patch);
    let fields: Vec<String> = patch.keys().cloned().collect();
    let mode = WriteMode::Update { fields: &fields };

    let mut merged = strip_system_fields(existing.clone());
    merged.extend(patch);

    if run_validators {
        M::validate(&merged, mode)?;
    }
    M::prepare(&mut merged, mode)?;
    Ok(merged)
}

/// Assemble the outward document from its stored parts
pub fn with_identity<M: Model>(id: &str, version: i64, mut body: Document) -> Document {
    body.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    body.insert(VERSION_FIELD.to_string(), Value::from(version));
    M::decorate(&mut body);
    body
}

fn strip_system_fields(mut doc: Document) -> Document {
    doc.remove(ID_FIELD);
    doc.remove(VERSION_FIELD);
    doc.remove("_id");
    doc
}

/// Millisecond RFC 3339 timestamp, sortable as text
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn trim_field(doc: &mut Document, field: &str) {
    if let Some(Value::String(s)) = doc.get_mut(field) {
        let trimmed = s.trim().to_string();
        if trimmed.len() != s.len() {
            *s = trimmed;
        }
    }
}
