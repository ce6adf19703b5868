use async_trait::async_trait;
use thiserror::Error;

use crate::filter::{Document, FilterError, FilterExpression, Projection, SortKey};
use crate::models::ValidationError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Duplicate field value: {field} = {value}. Please use another value!")]
    Duplicate { field: String, value: String },

    #[error("Invalid id: {0}")]
    InvalidId(String),

    #[error(transparent)]
    Query(#[from] FilterError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Options for `find_by_id_and_update`
#[derive(Debug, Clone, Copy)]
pub struct UpdateOptions {
    /// Return the document after the update instead of before
    pub return_updated: bool,
    /// Run model validation over the merged document
    pub run_validators: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self { return_updated: true, run_validators: true }
    }
}

/// Accumulated intent of a lazy `DocumentQuery`
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    pub filter: FilterExpression,
    pub sort: Vec<SortKey>,
    pub projection: Option<Projection>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl QueryState {
    pub fn new(filter: FilterExpression) -> Self {
        Self { filter, ..Default::default() }
    }

    pub fn project(&self, docs: Vec<Document>) -> Vec<Document> {
        match &self.projection {
            Some(projection) => docs.into_iter().map(|d| projection.apply(d)).collect(),
            None => docs,
        }
    }
}

/// A query that has not run yet; every step returns a new handle
#[async_trait]
pub trait DocumentQuery: Send {
    fn sort(self: Box<Self>, keys: &[SortKey]) -> Box<dyn DocumentQuery>;
    fn select(self: Box<Self>, projection: &Projection) -> Box<dyn DocumentQuery>;
    fn skip(self: Box<Self>, n: u64) -> Box<dyn DocumentQuery>;
    fn limit(self: Box<Self>, n: u64) -> Box<dyn DocumentQuery>;
    async fn fetch(self: Box<Self>) -> Result<Vec<Document>, StoreError>;
}

/// Storage capability for one collection of documents
#[async_trait]
pub trait RecordStore: Send + Sync {
    fn collection(&self) -> &'static str;

    /// Fields never rendered in API responses
    fn hidden_fields(&self) -> &'static [&'static str];

    fn find(&self, filter: FilterExpression) -> Box<dyn DocumentQuery>;

    async fn create(&self, doc: Document) -> Result<Document, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Document>, StoreError>;

    async fn find_all(&self, filter: &FilterExpression) -> Result<Vec<Document>, StoreError> {
        self.find(filter.clone()).fetch().await
    }

    async fn find_by_id_and_update(
        &self,
        id: &str,
        patch: Document,
        options: UpdateOptions,
    ) -> Result<Option<Document>, StoreError>;

    async fn find_by_id_and_delete(&self, id: &str) -> Result<Option<Document>, StoreError>;

    /// Remove every document, including ones hidden by the default filter
    async fn delete_many(&self) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
