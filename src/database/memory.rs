use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::store::{DocumentQuery, QueryState, RecordStore, StoreError, UpdateOptions};
use crate::filter::filter_where::FilterWhere;
use crate::filter::filter_order::FilterOrder;
use crate::filter::{Document, FilterExpression, Projection, SortKey};
use crate::models::{prepare_create, prepare_update, with_identity, Model};

#[derive(Debug, Clone)]
struct StoredDocument {
    id: Uuid,
    version: i64,
    body: Document,
}

impl StoredDocument {
    fn render<M: Model>(&self) -> Document {
        with_identity::<M>(&self.id.to_string(), self.version, self.body.clone())
    }
}

/// Process-local record store, used by tests and `DATABASE_BACKEND=memory`
pub struct MemoryRepository<M: Model> {
    records: Arc<RwLock<Vec<StoredDocument>>>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Clone for MemoryRepository<M> {
    fn clone(&self) -> Self {
        Self { records: self.records.clone(), _model: PhantomData }
    }
}

impl<M: Model> Default for MemoryRepository<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> MemoryRepository<M> {
    pub fn new() -> Self {
        Self { records: Arc::new(RwLock::new(Vec::new())), _model: PhantomData }
    }

    fn parse_id(id: &str) -> Result<Uuid, StoreError> {
        Uuid::parse_str(id).map_err(|_| StoreError::InvalidId(id.to_string()))
    }

    /// Index of a record visible through the default filter
    fn position(records: &[StoredDocument], id: Uuid) -> Option<usize> {
        let visible = M::default_filter();
        records
            .iter()
            .position(|r| r.id == id && FilterWhere::matches(&visible, &r.render::<M>()))
    }

    fn check_unique(records: &[StoredDocument], body: &Document, own_id: Option<Uuid>) -> Result<(), StoreError> {
        for field in M::UNIQUE {
            let Some(value) = body.get(*field).filter(|v| !v.is_null()) else {
                continue;
            };
            let taken = records
                .iter()
                .filter(|r| Some(r.id) != own_id)
                .any(|r| r.body.get(*field) == Some(value));
            if taken {
                return Err(StoreError::Duplicate {
                    field: field.to_string(),
                    value: display_value(value),
                });
            }
        }
        Ok(())
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl<M: Model> RecordStore for MemoryRepository<M> {
    fn collection(&self) -> &'static str {
        M::COLLECTION
    }

    fn hidden_fields(&self) -> &'static [&'static str] {
        M::HIDDEN
    }

    fn find(&self, filter: FilterExpression) -> Box<dyn DocumentQuery> {
        Box::new(MemoryQuery::<M> {
            records: self.records.clone(),
            state: QueryState::new(M::default_filter().merge(filter)),
            _model: PhantomData,
        })
    }

    async fn create(&self, doc: Document) -> Result<Document, StoreError> {
        let body = prepare_create::<M>(doc)?;

        let mut records = self.records.write().await;
        Self::check_unique(&records, &body, None)?;

        let stored = StoredDocument { id: Uuid::new_v4(), version: 0, body };
        let rendered = stored.render::<M>();
        records.push(stored);
        Ok(rendered)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let id = Self::parse_id(id)?;
        let records = self.records.read().await;
        Ok(Self::position(&records, id).map(|i| records[i].render::<M>()))
    }

    async fn find_by_id_and_update(
        &self,
        id: &str,
        patch: Document,
        options: UpdateOptions,
    ) -> Result<Option<Document>, StoreError> {
        let id = Self::parse_id(id)?;
        let mut records = self.records.write().await;
        let Some(index) = Self::position(&records, id) else {
            return Ok(None);
        };

        let before = records[index].render::<M>();
        let body = prepare_update::<M>(&records[index].body, patch, options.run_validators)?;
        Self::check_unique(&records, &body, Some(id))?;

        let record = &mut records[index];
        record.body = body;
        record.version += 1;

        Ok(Some(if options.return_updated { record.render::<M>() } else { before }))
    }

    async fn find_by_id_and_delete(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let id = Self::parse_id(id)?;
        let mut records = self.records.write().await;
        Ok(Self::position(&records, id).map(|i| records.remove(i).render::<M>()))
    }

    async fn delete_many(&self) -> Result<u64, StoreError> {
        let mut records = self.records.write().await;
        let removed = records.len() as u64;
        records.clear();
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

struct MemoryQuery<M: Model> {
    records: Arc<RwLock<Vec<StoredDocument>>>,
    state: QueryState,
    _model: PhantomData<fn() -> M>,
}

#[async_trait]
impl<M: Model> DocumentQuery for MemoryQuery<M> {
    fn sort(mut self: Box<Self>, keys: &[SortKey]) -> Box<dyn DocumentQuery> {
        self.state.sort = keys.to_vec();
        self
    }

    fn select(mut self: Box<Self>, projection: &Projection) -> Box<dyn DocumentQuery> {
        self.state.projection = Some(projection.clone());
        self
    }

    fn skip(mut self: Box<Self>, n: u64) -> Box<dyn DocumentQuery> {
        self.state.skip = n;
        self
    }

    fn limit(mut self: Box<Self>, n: u64) -> Box<dyn DocumentQuery> {
        self.state.limit = Some(n);
        self
    }

    async fn fetch(self: Box<Self>) -> Result<Vec<Document>, StoreError> {
        let mut docs: Vec<Document> = {
            let records = self.records.read().await;
            records
                .iter()
                .map(StoredDocument::render::<M>)
                .filter(|d| FilterWhere::matches(&self.state.filter, d))
                .collect()
        };

        FilterOrder::sort(&mut docs, &self.state.sort);

        let skip = usize::try_from(self.state.skip).unwrap_or(usize::MAX);
        let limit = self
            .state
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        let page: Vec<Document> = docs.into_iter().skip(skip).take(limit).collect();

        Ok(self.state.project(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Review, Tour};
    use serde_json::json;

    fn tour(name: &str, price: i64) -> Document {
        json!({
            "name": name,
            "duration": 7,
            "maxGroupSize": 10,
            "difficulty": "medium",
            "price": price,
            "summary": "A tour",
            "imageCover": "cover.jpg"
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[tokio::test]
    async fn create_assigns_identity() {
        let store = MemoryRepository::<Tour>::new();
        let created = store.create(tour("The Sea Explorer", 497)).await.unwrap();
        let id = created["id"].as_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(created["__v"], json!(0));
        assert_eq!(created["durationWeeks"], json!(1.0));

        let found = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(found, created);
    }

    #[tokio::test]
    async fn invalid_create_persists_nothing() {
        let store = MemoryRepository::<Tour>::new();
        let mut doc = tour("The Sea Explorer", 497);
        doc.remove("name");
        assert!(matches!(store.create(doc).await, Err(StoreError::Validation(_))));
        assert!(store.find_all(&FilterExpression::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unique_fields_are_enforced() {
        let store = MemoryRepository::<Tour>::new();
        store.create(tour("The Sea Explorer", 497)).await.unwrap();
        let err = store.create(tour("The Sea Explorer", 10)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { ref field, .. } if field == "name"));
    }

    #[tokio::test]
    async fn default_filter_hides_secret_records() {
        let store = MemoryRepository::<Tour>::new();
        let mut secret = tour("The Secret Hideaway", 900);
        secret.insert("secretTour".into(), json!(true));
        let hidden = store.create(secret).await.unwrap();
        store.create(tour("The Forest Hiker", 397)).await.unwrap();

        let all = store.find_all(&FilterExpression::new()).await.unwrap();
        assert_eq!(all.len(), 1);
        let id = hidden["id"].as_str().unwrap();
        assert!(store.find_by_id(id).await.unwrap().is_none());
        assert_eq!(store.delete_many().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn update_bumps_version_and_validates() {
        let store = MemoryRepository::<Review>::new();
        let created = store
            .create(json!({"review": "Nice", "rating": 4, "tour": "t", "user": "u"}).as_object().unwrap().clone())
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap();

        let patch = json!({"rating": 5}).as_object().unwrap().clone();
        let updated = store.find_by_id_and_update(id, patch, UpdateOptions::default()).await.unwrap().unwrap();
        assert_eq!(updated["rating"], json!(5));
        assert_eq!(updated["__v"], json!(1));

        let patch = json!({"rating": 0}).as_object().unwrap().clone();
        assert!(store.find_by_id_and_update(id, patch, UpdateOptions::default()).await.is_err());
        assert_eq!(store.find_by_id(id).await.unwrap().unwrap()["rating"], json!(5));
    }

    #[tokio::test]
    async fn delete_then_read_is_missing() {
        let store = MemoryRepository::<Review>::new();
        let created = store
            .create(json!({"review": "Ok", "rating": 3, "tour": "t", "user": "u"}).as_object().unwrap().clone())
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap();
        assert!(store.find_by_id_and_delete(id).await.unwrap().is_some());
        assert!(store.find_by_id(id).await.unwrap().is_none());
        assert!(store.find_by_id_and_delete(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_id_is_rejected() {
        let store = MemoryRepository::<Review>::new();
        assert!(matches!(store.find_by_id("wwwww").await, Err(StoreError::InvalidId(_))));
    }
}
