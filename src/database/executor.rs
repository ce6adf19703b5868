use crate::database::store::{DocumentQuery, RecordStore};
use crate::filter::QueryDescriptor;

/// Bind a parsed descriptor to a store: find, sort, select, skip, limit.
/// Nothing runs until the caller awaits `fetch()`.
pub fn execute(store: &dyn RecordStore, descriptor: &QueryDescriptor) -> Box<dyn DocumentQuery> {
    store
        .find(descriptor.filter.clone())
        .sort(&descriptor.sort)
        .select(&descriptor.projection)
        .skip(descriptor.skip())
        .limit(descriptor.limit)
}
