use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identity field of every document
pub const ID_FIELD: &str = "id";

/// Internal revision counter, hidden from list results by default
pub const VERSION_FIELD: &str = "__v";

/// Query-string keys that shape the query instead of filtering it
pub const CONTROL_PARAMS: [&str; 4] = ["page", "sort", "limit", "fields"];

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 100;
pub const DEFAULT_SORT_FIELD: &str = "createdAt";

/// A JSON document as persisted by a record store
pub type Document = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "$eq")] Eq,
    #[serde(rename = "$ne")] Ne,
    #[serde(rename = "$gt")] Gt,
    #[serde(rename = "$gte")] Gte,
    #[serde(rename = "$lt")] Lt,
    #[serde(rename = "$lte")] Lte,
}

impl FilterOp {
    /// Comparison operators accepted from a query string, with or without the `$` marker.
    /// Equality is implicit and `$ne` is reserved for model default filters.
    pub fn from_param_key(key: &str) -> Option<FilterOp> {
        match key.strip_prefix('$').unwrap_or(key) {
            "gt" => Some(FilterOp::Gt),
            "gte" => Some(FilterOp::Gte),
            "lt" => Some(FilterOp::Lt),
            "lte" => Some(FilterOp::Lte),
            _ => None,
        }
    }

    pub fn as_key(&self) -> &'static str {
        match self {
            FilterOp::Eq => "$eq",
            FilterOp::Ne => "$ne",
            FilterOp::Gt => "$gt",
            FilterOp::Gte => "$gte",
            FilterOp::Lt => "$lt",
            FilterOp::Lte => "$lte",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub op: FilterOp,
    pub value: Value,
}

/// Field path -> conditions, all of which must hold
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterExpression {
    fields: BTreeMap<String, Vec<Condition>>,
}

impl FilterExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, op: FilterOp, value: Value) -> &mut Self {
        self.fields
            .entry(field.into())
            .or_default()
            .push(Condition { op, value });
        self
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(field, FilterOp::Eq, value.into());
        self
    }

    pub fn ne(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(field, FilterOp::Ne, value.into());
        self
    }

    /// Conjunction of both expressions
    pub fn merge(mut self, other: FilterExpression) -> Self {
        for (field, conditions) in other.fields {
            self.fields.entry(field).or_default().extend(conditions);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn conditions(&self, field: &str) -> &[Condition] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Condition>)> {
        self.fields.iter()
    }

    /// Canonical operator-qualified form, e.g. `{"price": {"$gte": 100, "$lte": 500}}`
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        for (field, conditions) in &self.fields {
            match conditions.as_slice() {
                [Condition { op: FilterOp::Eq, value }] => {
                    out.insert(field.clone(), value.clone());
                }
                _ => {
                    let mut ops = Map::new();
                    for c in conditions {
                        ops.insert(c.op.as_key().to_string(), c.value.clone());
                    }
                    out.insert(field.clone(), Value::Object(ops));
                }
            }
        }
        Value::Object(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Desc }
    }
}

/// Field selection applied to every returned document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Only these fields; always contains the identity field
    Include(Vec<String>),
    /// Everything except these fields
    Exclude(Vec<String>),
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Exclude(vec![VERSION_FIELD.to_string()])
    }
}

impl Projection {
    /// Fields may be dotted paths into embedded objects (`startLocation.address`)
    pub fn apply(&self, mut doc: Document) -> Document {
        match self {
            Projection::Include(fields) => {
                let mut kept = Document::new();
                for f in fields {
                    copy_path(&doc, &mut kept, f);
                }
                kept
            }
            Projection::Exclude(fields) => {
                for f in fields {
                    remove_path(&mut doc, f);
                }
                doc
            }
        }
    }
}

fn copy_path(from: &Document, to: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            if let Some(v) = from.get(path) {
                to.insert(path.to_string(), v.clone());
            }
        }
        Some((head, rest)) => {
            let Some(Value::Object(inner)) = from.get(head) else { return };
            let slot = to.entry(head.to_string()).or_insert_with(|| Value::Object(Map::new()));
            // a whole-object include already covers the nested path
            if let Value::Object(target) = slot {
                if target == inner {
                    return;
                }
                copy_path(inner, target, rest);
            }
        }
    }
}

fn remove_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(inner)) = doc.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}

/// Parsed filter/sort/projection/pagination intent of one request
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub filter: FilterExpression,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub page: u64,
    pub limit: u64,
}

impl Default for QueryDescriptor {
    fn default() -> Self {
        Self {
            filter: FilterExpression::default(),
            sort: vec![SortKey::desc(DEFAULT_SORT_FIELD)],
            projection: Projection::default(),
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl QueryDescriptor {
    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// AND an additional filter into this descriptor (e.g. a parent id on nested routes)
    pub fn with_filter(mut self, extra: FilterExpression) -> Self {
        self.filter = self.filter.merge(extra);
        self
    }

    /// Clamp the page size to `max`, when a maximum is configured
    pub fn bounded(mut self, max: Option<u64>) -> Self {
        if let Some(max) = max {
            if self.limit > max {
                tracing::warn!("Limit {} exceeds max {}, capping to max", self.limit, max);
                self.limit = max;
            }
        }
        self
    }
}

/// Query-string parameters with one level of bracket nesting expanded,
/// so `price[gte]=100` becomes `{"price": {"gte": "100"}}`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawParams(Map<String, Value>);

impl RawParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = Self::new();
        for (key, value) in pairs {
            params.insert(key.as_ref(), value.into());
        }
        params
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        let value = Value::String(value.into());
        match split_bracket_key(key) {
            Some((outer, inner)) => {
                let slot = self
                    .0
                    .entry(outer.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(nested) = slot {
                    nested.insert(inner.to_string(), value);
                }
            }
            None => {
                self.0.insert(key.to_string(), value);
            }
        }
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for RawParams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn split_bracket_key(key: &str) -> Option<(&str, &str)> {
    let open = key.find('[')?;
    let inner = key[open + 1..].strip_suffix(']')?;
    if open == 0 || inner.is_empty() || inner.contains(['[', ']']) {
        return None;
    }
    Some((&key[..open], inner))
}
