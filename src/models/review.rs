use serde_json::Value;

use super::validation::{ValidationError, Validator, WriteMode};
use super::{timestamp_now, trim_field, Model};
use crate::filter::Document;

pub struct Review;

impl Model for Review {
    const COLLECTION: &'static str = "reviews";

    fn apply_defaults(doc: &mut Document) {
        doc.entry("createdAt").or_insert_with(|| Value::String(timestamp_now()));
    }

    fn validate(doc: &Document, mode: WriteMode<'_>) -> Result<(), ValidationError> {
        Validator::new(doc, mode)
            .required("review", "Review can not be empty!")
            .string("review")
            .number("rating")
            .range("rating", 1.0, 5.0, "Rating must be between 1 and 5")
            .required("tour", "Review must belong to a tour.")
            .string("tour")
            .required("user", "Review must belong to a user.")
            .string("user")
            .finish()
    }

    fn prepare(doc: &mut Document, _mode: WriteMode<'_>) -> Result<(), ValidationError> {
        trim_field(doc, "review");
        Ok(())
    }
}
