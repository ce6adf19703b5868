use std::cmp::Ordering;

use super::filter_where::FilterWhere;
use super::types::{Document, SortDirection, SortKey, DEFAULT_SORT_FIELD};

pub struct FilterOrder;

impl FilterOrder {
    /// `"a,-b,c"` -> a asc, b desc, c asc. Absent or empty -> newest first.
    pub fn parse(sort: Option<&str>) -> Vec<SortKey> {
        let keys: Vec<SortKey> = sort
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != "-")
            .map(|s| match s.strip_prefix('-') {
                Some(field) => SortKey::desc(field),
                None => SortKey::asc(s),
            })
            .collect();

        if keys.is_empty() {
            vec![SortKey::desc(DEFAULT_SORT_FIELD)]
        } else {
            keys
        }
    }

    /// Stable in-place sort; ties keep their incoming order
    pub fn sort(docs: &mut [Document], keys: &[SortKey]) {
        docs.sort_by(|a, b| Self::compare(a, b, keys));
    }

    fn compare(a: &Document, b: &Document, keys: &[SortKey]) -> Ordering {
        for key in keys {
            let ord = FilterWhere::compare_optional(
                FilterWhere::lookup(a, &key.field),
                FilterWhere::lookup(b, &key.field),
            );
            let ord = match key.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}
