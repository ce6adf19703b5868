use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, RawQuery, State},
    Json,
};
use serde_json::Value;

use crate::database::{execute, RecordStore, UpdateOptions};
use crate::error::ApiError;
use crate::filter::{self, Document, FilterExpression, Projection, RawParams, ID_FIELD};
use crate::middleware::{ApiResponse, ApiResult, RequestContext};

/// Related records inlined into a read
#[derive(Clone)]
pub enum Populate {
    /// All records of `store` whose `foreign_field` equals this record's id
    Virtual {
        path: &'static str,
        store: Arc<dyn RecordStore>,
        foreign_field: &'static str,
    },
    /// Replace the id (or array of ids) at `path` with the referenced records
    Reference {
        path: &'static str,
        store: Arc<dyn RecordStore>,
        projection: Projection,
    },
}

/// The five standard handlers over one record store
pub struct CrudHandlers {
    store: Arc<dyn RecordStore>,
    singular: &'static str,
    plural: &'static str,
    populate: Vec<Populate>,
    list_populate: Vec<Populate>,
    max_limit: Option<u64>,
}

impl CrudHandlers {
    pub fn new(store: Arc<dyn RecordStore>, singular: &'static str, plural: &'static str) -> Self {
        Self {
            store,
            singular,
            plural,
            populate: Vec::new(),
            list_populate: Vec::new(),
            max_limit: None,
        }
    }

    pub fn with_populate(mut self, populate: Populate) -> Self {
        self.populate.push(populate);
        self
    }

    /// Hints applied to every listed document as well as to reads
    pub fn with_list_populate(mut self, populate: Populate) -> Self {
        self.list_populate.push(populate);
        self
    }

    pub fn with_max_limit(mut self, max_limit: Option<u64>) -> Self {
        self.max_limit = max_limit;
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn singular(&self) -> &'static str {
        self.singular
    }

    fn not_found(&self) -> ApiError {
        ApiError::not_found(format!("No {} found with that ID", self.singular))
    }

    /// Remove the store's hidden fields from an outgoing document
    pub fn render(&self, mut doc: Document) -> Document {
        strip_hidden(&mut doc, self.store.hidden_fields());
        doc
    }

    pub async fn list(&self, ctx: &RequestContext, params: &RawParams, pre_filter: FilterExpression) -> ApiResult {
        let descriptor = filter::parse(params).with_filter(pre_filter).bounded(self.max_limit);
        tracing::debug!(
            request_id = %ctx.request_id,
            collection = self.store.collection(),
            filter = %descriptor.filter.to_json(),
            page = descriptor.page,
            limit = descriptor.limit,
            "Listing documents"
        );

        let docs = execute(self.store.as_ref(), &descriptor).fetch().await?;
        let mut rendered = Vec::with_capacity(docs.len());
        for doc in docs {
            let doc = populate(ctx, &self.list_populate, doc).await?;
            rendered.push(self.render(doc));
        }
        Ok(ApiResponse::list(self.plural, rendered))
    }

    pub async fn create(&self, ctx: &RequestContext, body: Value) -> ApiResult {
        let doc = require_object(body)?;
        let created = self.store.create(doc).await?;
        tracing::info!(
            request_id = %ctx.request_id,
            collection = self.store.collection(),
            id = created.get(ID_FIELD).and_then(serde_json::Value::as_str).unwrap_or_default(),
            "Created document"
        );
        Ok(ApiResponse::created(self.singular, self.render(created)))
    }

    pub async fn read(&self, ctx: &RequestContext, id: &str) -> ApiResult {
        let doc = self.store.find_by_id(id).await?.ok_or_else(|| self.not_found())?;
        let doc = populate(ctx, &self.list_populate, doc).await?;
        let doc = populate(ctx, &self.populate, doc).await?;
        Ok(ApiResponse::success(self.singular, self.render(doc)))
    }

    pub async fn update(&self, ctx: &RequestContext, id: &str, body: Value) -> ApiResult {
        let patch = require_object(body)?;
        let updated = self
            .store
            .find_by_id_and_update(id, patch, UpdateOptions { return_updated: true, run_validators: true })
            .await?
            .ok_or_else(|| self.not_found())?;
        tracing::info!(request_id = %ctx.request_id, collection = self.store.collection(), id, "Updated document");
        Ok(ApiResponse::success(self.singular, self.render(updated)))
    }

    pub async fn delete(&self, ctx: &RequestContext, id: &str) -> ApiResult {
        self.store.find_by_id_and_delete(id).await?.ok_or_else(|| self.not_found())?;
        tracing::info!(request_id = %ctx.request_id, collection = self.store.collection(), id, "Deleted document");
        Ok(ApiResponse::no_content())
    }
}

/// Inline related records named by `hints`
async fn populate(ctx: &RequestContext, hints: &[Populate], mut doc: Document) -> Result<Document, ApiError> {
    for hint in hints {
        match hint {
            Populate::Virtual { path, store, foreign_field } => {
                let Some(id) = doc.get(ID_FIELD).and_then(Value::as_str) else {
                    continue;
                };
                let related = store
                    .find_all(&FilterExpression::new().eq(*foreign_field, id))
                    .await?
                    .into_iter()
                    .map(|mut d| {
                        strip_hidden(&mut d, store.hidden_fields());
                        Projection::default().apply(d)
                    })
                    .map(Value::Object)
                    .collect();
                doc.insert(path.to_string(), Value::Array(related));
            }
            Populate::Reference { path, store, projection } => {
                let Some(value) = doc.remove(*path) else {
                    continue;
                };
                let resolved = resolve_reference(store.as_ref(), projection, value).await?;
                doc.insert(path.to_string(), resolved);
            }
        }
    }
    if !hints.is_empty() {
        tracing::debug!(request_id = %ctx.request_id, hints = hints.len(), "Populated document");
    }
    Ok(doc)
}

/// Ids that no longer resolve are dropped from arrays and become null in single references
async fn resolve_reference(store: &dyn RecordStore, projection: &Projection, value: Value) -> Result<Value, ApiError> {
    let load = |id: &str| {
        let id = id.to_string();
        async move {
            let found = match store.find_by_id(&id).await {
                Ok(found) => found,
                Err(crate::database::StoreError::InvalidId(_)) => None,
                Err(e) => return Err(ApiError::from(e)),
            };
            Ok(found.map(|mut d| {
                strip_hidden(&mut d, store.hidden_fields());
                Value::Object(projection.apply(d))
            }))
        }
    };

    match value {
        Value::String(id) => Ok(load(&id).await?.unwrap_or(Value::Null)),
        Value::Array(ids) => {
            let mut resolved = Vec::with_capacity(ids.len());
            for id in ids {
                match id {
                    Value::String(id) => {
                        if let Some(doc) = load(&id).await? {
                            resolved.push(doc);
                        }
                    }
                    // already embedded
                    other => resolved.push(other),
                }
            }
            Ok(Value::Array(resolved))
        }
        other => Ok(other),
    }
}

fn strip_hidden(doc: &mut Document, hidden: &[&str]) {
    for field in hidden {
        doc.remove(*field);
    }
}

pub(crate) fn require_object(body: Value) -> Result<Document, ApiError> {
    match body {
        Value::Object(doc) => Ok(doc),
        _ => Err(ApiError::bad_request("Request body must be a JSON object")),
    }
}

pub(crate) fn json_body(payload: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::invalid_json(rejection.body_text()))
}

/// Query string pairs with bracket keys expanded
pub(crate) fn raw_params(query: Option<String>) -> RawParams {
    let query = query.unwrap_or_default();
    RawParams::from_pairs(url::form_urlencoded::parse(query.as_bytes()).into_owned())
}

// Axum adapters

pub async fn list(State(h): State<Arc<CrudHandlers>>, ctx: RequestContext, RawQuery(query): RawQuery) -> ApiResult {
    h.list(&ctx, &raw_params(query), FilterExpression::new()).await
}

pub async fn create(
    State(h): State<Arc<CrudHandlers>>,
    ctx: RequestContext,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    h.create(&ctx, json_body(payload)?).await
}

pub async fn read(State(h): State<Arc<CrudHandlers>>, ctx: RequestContext, Path(id): Path<String>) -> ApiResult {
    h.read(&ctx, &id).await
}

pub async fn update(
    State(h): State<Arc<CrudHandlers>>,
    ctx: RequestContext,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    h.update(&ctx, &id, json_body(payload)?).await
}

pub async fn delete(State(h): State<Arc<CrudHandlers>>, ctx: RequestContext, Path(id): Path<String>) -> ApiResult {
    h.delete(&ctx, &id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryRepository;
    use crate::models::{Review, Tour, User};
    use axum::http::StatusCode;
    use serde_json::json;

    fn handlers() -> CrudHandlers {
        CrudHandlers::new(Arc::new(MemoryRepository::<Review>::new()), "review", "reviews")
    }

    fn review(text: &str, rating: i64) -> Value {
        json!({"review": text, "rating": rating, "tour": "t1", "user": "u1"})
    }

    #[tokio::test]
    async fn list_on_empty_collection() {
        let h = handlers();
        let body = h.list(&RequestContext::new(), &RawParams::new(), FilterExpression::new()).await.unwrap().to_json();
        assert_eq!(body, json!({"status": "success", "results": 0, "data": {"reviews": []}}));
    }

    #[tokio::test]
    async fn create_read_delete_cycle() {
        let h = handlers();
        let ctx = RequestContext::new();

        let created = h.create(&ctx, review("Loved it", 5)).await.unwrap();
        assert_eq!(created.status_code, StatusCode::CREATED);
        let id = created.to_json()["data"]["review"]["id"].as_str().unwrap().to_string();

        let read = h.read(&ctx, &id).await.unwrap().to_json();
        assert_eq!(read["data"]["review"]["review"], "Loved it");

        let deleted = h.delete(&ctx, &id).await.unwrap();
        assert_eq!(deleted.status_code, StatusCode::NO_CONTENT);

        let err = h.read(&ctx, &id).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.message(), "No review found with that ID");
    }

    #[tokio::test]
    async fn invalid_create_is_rejected_and_not_stored() {
        let h = handlers();
        let ctx = RequestContext::new();
        let err = h.create(&ctx, json!({"rating": 3, "tour": "t1", "user": "u1"})).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(h.store().find_all(&FilterExpression::new()).await.unwrap().is_empty());

        let err = h.create(&ctx, json!(["not", "an", "object"])).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let h = handlers();
        let id = uuid::Uuid::new_v4().to_string();
        let err = h.update(&RequestContext::new(), &id, json!({"rating": 4})).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn list_applies_pre_filter_and_limit_bound() {
        let h = handlers().with_max_limit(Some(2));
        let ctx = RequestContext::new();
        for (i, tour) in ["t1", "t1", "t1", "t2"].iter().enumerate() {
            let body = json!({"review": format!("r{i}"), "rating": 4, "tour": tour, "user": "u1"});
            h.create(&ctx, body).await.unwrap();
        }

        let params = RawParams::from_pairs([("limit", "50")]);
        let body = h.list(&ctx, &params, FilterExpression::new().eq("tour", "t1")).await.unwrap().to_json();
        assert_eq!(body["results"], 2);
        assert!(body["data"]["reviews"].as_array().unwrap().iter().all(|r| r["tour"] == "t1"));
    }

    #[tokio::test]
    async fn hidden_fields_never_leave() {
        let users = CrudHandlers::new(Arc::new(MemoryRepository::<User>::new()), "user", "users");
        let ctx = RequestContext::new();
        let body = json!({
            "name": "Leo Gillespie",
            "email": "leo@example.com",
            "password": "test1234",
            "passwordConfirm": "test1234"
        });
        let created = users.create(&ctx, body).await.unwrap().to_json();
        let user = &created["data"]["user"];
        assert!(user.get("password").is_none());
        assert!(user.get("active").is_none());
        assert_eq!(user["role"], "user");
    }

    #[tokio::test]
    async fn read_populates_virtual_and_reference() {
        let ctx = RequestContext::new();
        let users = Arc::new(MemoryRepository::<User>::new());
        let reviews = Arc::new(MemoryRepository::<Review>::new());

        let guide = users
            .create(
                json!({
                    "name": "Steve Taylor", "email": "steve@example.com", "role": "guide",
                    "password": "test1234", "passwordConfirm": "test1234"
                })
                .as_object()
                .unwrap()
                .clone(),
            )
            .await
            .unwrap();
        let guide_id = guide["id"].as_str().unwrap().to_string();

        let tours = CrudHandlers::new(Arc::new(MemoryRepository::<Tour>::new()), "tour", "tours")
            .with_populate(Populate::Virtual { path: "reviews", store: reviews.clone(), foreign_field: "tour" })
            .with_populate(Populate::Reference {
                path: "guides",
                store: users.clone(),
                projection: Projection::Exclude(vec!["__v".into(), "passwordChangedAt".into()]),
            });

        let tour = tours
            .create(
                &ctx,
                json!({
                    "name": "The Park Camper", "duration": 10, "maxGroupSize": 15, "difficulty": "medium",
                    "price": 1497, "summary": "Breathing in Nature", "imageCover": "tour-5-cover.jpg",
                    "guides": [guide_id]
                }),
            )
            .await
            .unwrap()
            .to_json();
        let tour_id = tour["data"]["tour"]["id"].as_str().unwrap().to_string();

        reviews
            .create(json!({"review": "Wow", "rating": 5, "tour": tour_id, "user": "u1"}).as_object().unwrap().clone())
            .await
            .unwrap();

        let read = tours.read(&ctx, &tour_id).await.unwrap().to_json();
        let tour = &read["data"]["tour"];
        assert_eq!(tour["reviews"].as_array().unwrap().len(), 1);
        assert_eq!(tour["guides"][0]["name"], "Steve Taylor");
        assert!(tour["guides"][0].get("password").is_none());
        assert!(tour["guides"][0].get("__v").is_none());
    }

    #[tokio::test]
    async fn list_applies_only_list_hints() {
        let ctx = RequestContext::new();
        let users = Arc::new(MemoryRepository::<User>::new());
        let reviews = Arc::new(MemoryRepository::<Review>::new());

        let guide = users
            .create(
                json!({
                    "name": "Lisa Brown", "email": "lisa@example.com", "role": "lead-guide",
                    "password": "test1234", "passwordConfirm": "test1234"
                })
                .as_object()
                .unwrap()
                .clone(),
            )
            .await
            .unwrap();

        let tours = CrudHandlers::new(Arc::new(MemoryRepository::<Tour>::new()), "tour", "tours")
            .with_populate(Populate::Virtual { path: "reviews", store: reviews, foreign_field: "tour" })
            .with_list_populate(Populate::Reference {
                path: "guides",
                store: users,
                projection: Projection::Exclude(vec!["__v".into(), "passwordChangedAt".into()]),
            });
        tours
            .create(
                &ctx,
                json!({
                    "name": "The Sea Explorer", "duration": 7, "maxGroupSize": 15, "difficulty": "medium",
                    "price": 497, "summary": "Exploring the jaw-dropping US east coast", "imageCover": "tour-2-cover.jpg",
                    "guides": [guide["id"]]
                }),
            )
            .await
            .unwrap();

        let listed = tours.list(&ctx, &RawParams::new(), FilterExpression::new()).await.unwrap().to_json();
        let tour = &listed["data"]["tours"][0];
        assert_eq!(tour["guides"][0]["name"], "Lisa Brown");
        assert!(tour["guides"][0].get("password").is_none());
        assert!(tour.get("reviews").is_none());
    }

    #[test]
    fn raw_params_decode_brackets() {
        let params = raw_params(Some("price%5Bgte%5D=100&difficulty=easy".to_string()));
        assert_eq!(params.as_map()["price"], json!({"gte": "100"}));
        assert_eq!(params.get_str("difficulty"), Some("easy"));
        assert!(raw_params(None).as_map().is_empty());
    }
}
