use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::types::{Condition, Document, FilterExpression, FilterOp, CONTROL_PARAMS};

pub struct FilterWhere;

impl FilterWhere {
    /// Build the filter expression from raw parameters. Control keys are dropped,
    /// nested `gt|gte|lt|lte` keys become comparisons, anything else is equality.
    pub fn parse(params: &Map<String, Value>) -> FilterExpression {
        let mut filter = FilterExpression::new();

        for (key, value) in params {
            if CONTROL_PARAMS.contains(&key.as_str()) {
                continue;
            }

            match value {
                Value::Object(nested) => {
                    for (sub, sub_value) in nested {
                        if let Some(op) = FilterOp::from_param_key(sub) {
                            filter.push(key.as_str(), op, Self::coerce(sub_value));
                        } else if sub == FilterOp::Eq.as_key() {
                            filter.push(key.as_str(), FilterOp::Eq, Self::coerce(sub_value));
                        } else {
                            filter.push(format!("{}.{}", key, sub), FilterOp::Eq, Self::coerce(sub_value));
                        }
                    }
                }
                other => {
                    filter.push(key.as_str(), FilterOp::Eq, Self::coerce(other));
                }
            }
        }

        filter
    }

    /// Query strings only carry text; numbers and booleans are recovered here
    pub fn coerce(value: &Value) -> Value {
        let Value::String(s) = value else {
            return value.clone();
        };
        let trimmed = s.trim();
        match trimmed {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::from(i);
        }
        let numeric_chars = !trimmed.is_empty()
            && trimmed.chars().any(|c| c.is_ascii_digit())
            && trimmed.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'));
        if numeric_chars {
            if let Some(n) = trimmed.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                return Value::Number(n);
            }
        }
        value.clone()
    }

    /// Resolve a dotted field path inside a document
    pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
        let mut parts = path.split('.');
        let mut current = doc.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    pub fn matches(filter: &FilterExpression, doc: &Document) -> bool {
        filter.iter().all(|(field, conditions)| {
            let value = Self::lookup(doc, field);
            conditions.iter().all(|c| Self::test(value, c))
        })
    }

    fn test(value: Option<&Value>, condition: &Condition) -> bool {
        match condition.op {
            FilterOp::Eq => Self::equals(value, &condition.value),
            FilterOp::Ne => !Self::equals(value, &condition.value),
            op => match value {
                None | Some(Value::Null) => false,
                Some(Value::Array(items)) => items.iter().any(|v| Self::compare_op(v, op, &condition.value)),
                Some(v) => Self::compare_op(v, op, &condition.value),
            },
        }
    }

    fn equals(value: Option<&Value>, target: &Value) -> bool {
        match value {
            None | Some(Value::Null) => target.is_null(),
            Some(Value::Array(items)) if !target.is_array() => {
                items.iter().any(|v| Self::compare(v, target) == Ordering::Equal && same_kind(v, target))
            }
            Some(v) => same_kind(v, target) && Self::compare(v, target) == Ordering::Equal,
        }
    }

    /// Values of different JSON types never satisfy a range comparison
    fn compare_op(value: &Value, op: FilterOp, target: &Value) -> bool {
        if !same_kind(value, target) {
            return false;
        }
        let ord = Self::compare(value, target);
        match op {
            FilterOp::Gt => ord == Ordering::Greater,
            FilterOp::Gte => ord != Ordering::Less,
            FilterOp::Lt => ord == Ordering::Less,
            FilterOp::Lte => ord != Ordering::Greater,
            FilterOp::Eq => ord == Ordering::Equal,
            FilterOp::Ne => ord != Ordering::Equal,
        }
    }

    /// Total order over JSON values, following jsonb:
    /// null < strings < numbers < booleans < arrays < objects,
    /// with longer arrays and objects after shorter ones
    pub fn compare(a: &Value, b: &Value) -> Ordering {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::Array(x), Value::Array(y)) => x.len().cmp(&y.len()).then_with(|| {
                x.iter()
                    .zip(y.iter())
                    .map(|(l, r)| Self::compare(l, r))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            }),
            (Value::Object(x), Value::Object(y)) => {
                if x == y { Ordering::Equal } else { x.len().cmp(&y.len()).then_with(|| a.to_string().cmp(&b.to_string())) }
            }
            _ => type_rank(a).cmp(&type_rank(b)),
        }
    }

    /// Compare two optional values the way a sort does: missing behaves like null
    pub fn compare_optional(a: Option<&Value>, b: Option<&Value>) -> Ordering {
        let null = Value::Null;
        Self::compare(a.unwrap_or(&null), b.unwrap_or(&null))
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn same_kind(a: &Value, b: &Value) -> bool {
    type_rank(a) == type_rank(b)
}
