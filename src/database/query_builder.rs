use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::filter::{Condition, FilterError, FilterExpression, FilterOp, SortDirection, SortKey, ID_FIELD, VERSION_FIELD};

static SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static segment pattern"));

/// Parameter bound to a `$n` placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    Json(Value),
    Int(i64),
    Uuid(Uuid),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<Bind>,
}

/// Row layout shared by every collection table
#[derive(Debug, FromRow)]
pub struct DocumentRow {
    pub id: Uuid,
    pub version: i32,
    pub doc: Json<serde_json::Map<String, Value>>,
}

/// Builds SELECT / DELETE statements over a `(seq, id, version, doc JSONB)` table
pub struct QueryBuilder {
    table: String,
    clauses: Vec<String>,
    order: Vec<String>,
    limit: Option<u64>,
    offset: u64,
    params: Vec<Bind>,
}

impl QueryBuilder {
    pub fn new(table: &str) -> Result<Self, FilterError> {
        if !SEGMENT_RE.is_match(table) {
            return Err(FilterError::InvalidCollection(table.to_string()));
        }
        Ok(Self {
            table: quote_identifier(table),
            clauses: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: 0,
            params: Vec::new(),
        })
    }

    fn bind(&mut self, value: Bind) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }

    pub fn where_id(mut self, id: Uuid) -> Self {
        let p = self.bind(Bind::Uuid(id));
        self.clauses.push(format!("id = {}", p));
        self
    }

    pub fn filter(mut self, filter: &FilterExpression) -> Result<Self, FilterError> {
        for (field, conditions) in filter.iter() {
            let expr = field_expr(field)?;
            for condition in conditions {
                let clause = self.condition_sql(&expr, condition);
                self.clauses.push(clause);
            }
        }
        Ok(self)
    }

    fn condition_sql(&mut self, expr: &str, condition: &Condition) -> String {
        if condition.value.is_null() {
            return match condition.op {
                FilterOp::Eq => format!("({expr} IS NULL OR {expr} = 'null'::jsonb)"),
                FilterOp::Ne => format!("({expr} IS NOT NULL AND {expr} <> 'null'::jsonb)"),
                // nothing orders against null
                _ => "FALSE".to_string(),
            };
        }

        let p = self.bind(Bind::Json(condition.value.clone()));
        match condition.op {
            FilterOp::Eq => format!("{expr} @> {p}::jsonb"),
            FilterOp::Ne => format!("({expr} IS NULL OR NOT ({expr} @> {p}::jsonb))"),
            op => {
                let cmp = match op {
                    FilterOp::Gt => ">",
                    FilterOp::Gte => ">=",
                    FilterOp::Lt => "<",
                    _ => "<=",
                };
                format!("(jsonb_typeof({expr}) = jsonb_typeof({p}::jsonb) AND {expr} {cmp} {p}::jsonb)")
            }
        }
    }

    pub fn order_by(mut self, keys: &[SortKey]) -> Result<Self, FilterError> {
        for key in keys {
            let expr = field_expr(&key.field)?;
            // jsonb ordering; missing values sort first ascending, like null in FilterWhere::compare
            let nulls = match key.direction {
                SortDirection::Asc => "NULLS FIRST",
                SortDirection::Desc => "NULLS LAST",
            };
            self.order.push(format!("{} {} {}", expr, key.direction.to_sql(), nulls));
        }
        Ok(self)
    }

    pub fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn to_select_sql(mut self, for_update: bool) -> SqlResult {
        let mut query = format!("SELECT id, version, doc FROM {}{}", self.table, self.where_sql());

        let mut order = std::mem::take(&mut self.order);
        order.push("seq ASC".to_string());
        query.push_str(&format!(" ORDER BY {}", order.join(", ")));

        if let Some(limit) = self.limit {
            let p = self.bind(Bind::Int(limit.min(i64::MAX as u64) as i64));
            query.push_str(&format!(" LIMIT {}", p));
        }
        if self.offset > 0 {
            let p = self.bind(Bind::Int(self.offset.min(i64::MAX as u64) as i64));
            query.push_str(&format!(" OFFSET {}", p));
        }
        if for_update {
            query.push_str(" FOR UPDATE");
        }

        SqlResult { query, params: self.params }
    }

    pub fn to_delete_sql(self) -> SqlResult {
        let query = format!("DELETE FROM {}{} RETURNING id, version, doc", self.table, self.where_sql());
        SqlResult { query, params: self.params }
    }
}

/// JSONB expression for a dotted field path
fn field_expr(path: &str) -> Result<String, FilterError> {
    match path {
        ID_FIELD => return Ok("to_jsonb(id::text)".to_string()),
        VERSION_FIELD => return Ok("to_jsonb(version)".to_string()),
        _ => {}
    }

    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| !SEGMENT_RE.is_match(s)) {
        return Err(FilterError::InvalidField(path.to_string()));
    }
    Ok(format!("(doc #> '{{{}}}')", segments.join(",")))
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn bind_params<'q>(
    mut q: sqlx::query::QueryAs<'q, sqlx::Postgres, DocumentRow, PgArguments>,
    params: Vec<Bind>,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, DocumentRow, PgArguments> {
    for p in params {
        q = match p {
            Bind::Json(v) => q.bind(Json(v)),
            Bind::Int(i) => q.bind(i),
            Bind::Uuid(u) => q.bind(u),
        };
    }
    q
}
