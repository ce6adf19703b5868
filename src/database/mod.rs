pub mod executor;
pub mod manager;
pub mod memory;
pub mod query_builder;
pub mod repository;
pub mod store;

pub use executor::execute;
pub use manager::{DatabaseError, DatabaseManager};
pub use memory::MemoryRepository;
pub use repository::PgRepository;
pub use store::{DocumentQuery, RecordStore, StoreError, UpdateOptions};
