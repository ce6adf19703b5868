pub mod types;
pub mod filter;
pub mod filter_where;
pub mod filter_order;
pub mod error;

pub use types::*;
pub use filter::Filter;
pub use error::FilterError;

/// Parse raw query parameters into a query descriptor
pub fn parse(params: &RawParams) -> QueryDescriptor {
    Filter::parse(params)
}
