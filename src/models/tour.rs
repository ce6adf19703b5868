use serde_json::Value;

use super::validation::{ValidationError, Validator, WriteMode};
use super::{timestamp_now, trim_field, Model};
use crate::filter::{Document, FilterExpression};

pub const DIFFICULTIES: [&str; 3] = ["easy", "medium", "difficult"];

pub struct Tour;

impl Model for Tour {
    const COLLECTION: &'static str = "tours";
    const UNIQUE: &'static [&'static str] = &["name"];

    fn default_filter() -> FilterExpression {
        FilterExpression::new().ne("secretTour", true)
    }

    fn apply_defaults(doc: &mut Document) {
        doc.entry("ratingsAverage").or_insert(Value::from(4.5));
        doc.entry("ratingsQuantity").or_insert(Value::from(0));
        doc.entry("secretTour").or_insert(Value::Bool(false));
        doc.entry("images").or_insert(Value::Array(vec![]));
        doc.entry("startDates").or_insert(Value::Array(vec![]));
        doc.entry("guides").or_insert(Value::Array(vec![]));
        doc.entry("createdAt").or_insert_with(|| Value::String(timestamp_now()));
    }

    fn validate(doc: &Document, mode: WriteMode<'_>) -> Result<(), ValidationError> {
        Validator::new(doc, mode)
            .required("name", "A tour must have a name")
            .string("name")
            .length("name", 5, 40, "A tour name must have between 5 and 40 characters")
            .required("duration", "A tour must have a duration")
            .number("duration")
            .required("maxGroupSize", "A tour must have a group size")
            .number("maxGroupSize")
            .required("difficulty", "A tour must have a difficulty")
            .one_of("difficulty", &DIFFICULTIES, "Difficulty is either: easy, medium, difficult")
            .number("ratingsAverage")
            .range("ratingsAverage", 1.0, 5.0, "Rating must be between 1.0 and 5.0")
            .number("ratingsQuantity")
            .required("price", "A tour must have a price")
            .number("price")
            .number("priceDiscount")
            .check(
                "priceDiscount",
                |d| match (d.get("priceDiscount").and_then(Value::as_f64), d.get("price").and_then(Value::as_f64)) {
                    (Some(discount), Some(price)) => discount < price,
                    _ => true,
                },
                "Discount price should be below the regular price",
            )
            .required("summary", "A tour must have a summary")
            .string("summary")
            .required("imageCover", "A tour must have a cover image")
            .string("imageCover")
            .finish()
    }

    fn prepare(doc: &mut Document, mode: WriteMode<'_>) -> Result<(), ValidationError> {
        for field in ["name", "summary", "description"] {
            trim_field(doc, field);
        }
        if mode.touches("name") {
            if let Some(name) = doc.get("name").and_then(Value::as_str) {
                let slug = slugify(name);
                doc.insert("slug".to_string(), Value::String(slug));
            }
        }
        if let Some(avg) = doc.get("ratingsAverage").and_then(Value::as_f64) {
            doc.insert("ratingsAverage".to_string(), Value::from((avg * 10.0).round() / 10.0));
        }
        Ok(())
    }

    fn decorate(doc: &mut Document) {
        if let Some(duration) = doc.get("duration").and_then(Value::as_f64) {
            doc.insert("durationWeeks".to_string(), Value::from(duration / 7.0));
        }
    }
}

/// "The Sea Explorer!" -> "the-sea-explorer"
pub fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    let mut pending_dash = false;
    for c in s.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
