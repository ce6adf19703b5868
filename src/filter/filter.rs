use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{
    Projection, QueryDescriptor, RawParams, DEFAULT_LIMIT, DEFAULT_PAGE, ID_FIELD, VERSION_FIELD,
};

pub struct Filter;

impl Filter {
    /// Turn raw query parameters into a descriptor. Never fails: anything
    /// malformed falls back to its default.
    pub fn parse(params: &RawParams) -> QueryDescriptor {
        let descriptor = QueryDescriptor {
            filter: FilterWhere::parse(params.as_map()),
            sort: FilterOrder::parse(params.get_str("sort")),
            projection: Self::projection(params.get_str("fields")),
            page: Self::positive(params.get_str("page")).unwrap_or(DEFAULT_PAGE),
            limit: Self::positive(params.get_str("limit")).unwrap_or(DEFAULT_LIMIT),
        };
        tracing::debug!(
            filter = %descriptor.filter.to_json(),
            sort = ?descriptor.sort,
            projection = ?descriptor.projection,
            page = descriptor.page,
            limit = descriptor.limit,
            "parsed query descriptor"
        );
        descriptor
    }

    fn projection(fields: Option<&str>) -> Projection {
        let names: Vec<&str> = fields
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != "-")
            .collect();

        if names.is_empty() {
            return Projection::default();
        }

        if names.iter().all(|n| n.starts_with('-')) {
            let mut excluded: Vec<String> = names.iter().map(|n| n[1..].to_string()).collect();
            if !excluded.iter().any(|f| f == VERSION_FIELD) {
                excluded.push(VERSION_FIELD.to_string());
            }
            return Projection::Exclude(excluded);
        }

        let mut included = vec![ID_FIELD.to_string()];
        for name in names.into_iter().filter(|n| !n.starts_with('-')) {
            if !included.iter().any(|f| f == name) {
                included.push(name.to_string());
            }
        }
        Projection::Include(included)
    }

    /// Any numeric spelling of a whole number >= 1: "10", "1e3", "2.0"
    fn positive(value: Option<&str>) -> Option<u64> {
        let n = value?.trim().parse::<f64>().ok()?;
        if n.is_finite() && n >= 1.0 && n.fract() == 0.0 && n <= u64::MAX as f64 {
            Some(n as u64)
        } else {
            None
        }
    }
}
