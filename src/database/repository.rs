use std::marker::PhantomData;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::query_builder::{bind_params, quote_identifier, DocumentRow, QueryBuilder};
use crate::database::store::{DocumentQuery, QueryState, RecordStore, StoreError, UpdateOptions};
use crate::filter::{Document, FilterExpression, Projection, SortKey};
use crate::models::{prepare_create, prepare_update, with_identity, Model};

const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL record store: one table per collection, documents as JSONB
pub struct PgRepository<M: Model> {
    pool: PgPool,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Clone for PgRepository<M> {
    fn clone(&self) -> Self {
        Self { pool: self.pool.clone(), _model: PhantomData }
    }
}

impl<M: Model> PgRepository<M> {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, _model: PhantomData }
    }

    fn parse_id(id: &str) -> Result<Uuid, StoreError> {
        Uuid::parse_str(id).map_err(|_| StoreError::InvalidId(id.to_string()))
    }

    fn render(row: DocumentRow) -> Document {
        with_identity::<M>(&row.id.to_string(), i64::from(row.version), row.doc.0)
    }

    /// Unique index violations carry the field in the constraint name `{collection}_{field}_key`
    fn map_write_error(err: sqlx::Error, doc: &Document) -> StoreError {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
                let field = db
                    .constraint()
                    .and_then(|c| c.strip_prefix(M::COLLECTION))
                    .and_then(|c| c.strip_prefix('_'))
                    .and_then(|c| c.strip_suffix("_key"))
                    .unwrap_or("unknown")
                    .to_string();
                let value = match doc.get(&field) {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                return StoreError::Duplicate { field, value };
            }
        }
        StoreError::Database(err)
    }

    async fn fetch_one_for_update(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: Uuid,
    ) -> Result<Option<DocumentRow>, StoreError> {
        let sql = QueryBuilder::new(M::COLLECTION)?
            .where_id(id)
            .filter(&M::default_filter())?
            .to_select_sql(true);
        let row = bind_params(sqlx::query_as::<_, DocumentRow>(&sql.query), sql.params)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row)
    }
}

#[async_trait]
impl<M: Model> RecordStore for PgRepository<M> {
    fn collection(&self) -> &'static str {
        M::COLLECTION
    }

    fn hidden_fields(&self) -> &'static [&'static str] {
        M::HIDDEN
    }

    fn find(&self, filter: FilterExpression) -> Box<dyn DocumentQuery> {
        Box::new(PgQuery::<M> {
            pool: self.pool.clone(),
            state: QueryState::new(M::default_filter().merge(filter)),
            _model: PhantomData,
        })
    }

    async fn create(&self, doc: Document) -> Result<Document, StoreError> {
        let body = prepare_create::<M>(doc)?;
        let query = format!(
            "INSERT INTO {} (id, doc) VALUES ($1, $2) RETURNING id, version, doc",
            quote_identifier(M::COLLECTION)
        );

        let row = sqlx::query_as::<_, DocumentRow>(&query)
            .bind(Uuid::new_v4())
            .bind(Json(&body))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Self::map_write_error(e, &body))?;

        Ok(Self::render(row))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let id = Self::parse_id(id)?;
        let sql = QueryBuilder::new(M::COLLECTION)?
            .where_id(id)
            .filter(&M::default_filter())?
            .to_select_sql(false);

        let row = bind_params(sqlx::query_as::<_, DocumentRow>(&sql.query), sql.params)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Self::render))
    }

    async fn find_by_id_and_update(
        &self,
        id: &str,
        patch: Document,
        options: UpdateOptions,
    ) -> Result<Option<Document>, StoreError> {
        let id = Self::parse_id(id)?;
        let mut tx = self.pool.begin().await?;

        let Some(existing) = Self::fetch_one_for_update(&mut tx, id).await? else {
            return Ok(None);
        };

        let body = prepare_update::<M>(&existing.doc.0, patch, options.run_validators)?;
        let query = format!(
            "UPDATE {} SET doc = $2, version = version + 1 WHERE id = $1 RETURNING id, version, doc",
            quote_identifier(M::COLLECTION)
        );
        let updated = sqlx::query_as::<_, DocumentRow>(&query)
            .bind(id)
            .bind(Json(&body))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| Self::map_write_error(e, &body))?;
        tx.commit().await?;

        let row = if options.return_updated { updated } else { existing };
        Ok(Some(Self::render(row)))
    }

    async fn find_by_id_and_delete(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let id = Self::parse_id(id)?;
        let sql = QueryBuilder::new(M::COLLECTION)?
            .where_id(id)
            .filter(&M::default_filter())?
            .to_delete_sql();

        let row = bind_params(sqlx::query_as::<_, DocumentRow>(&sql.query), sql.params)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Self::render))
    }

    async fn delete_many(&self) -> Result<u64, StoreError> {
        let query = format!("DELETE FROM {}", quote_identifier(M::COLLECTION));
        let result = sqlx::query(&query).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

struct PgQuery<M: Model> {
    pool: PgPool,
    state: QueryState,
    _model: PhantomData<fn() -> M>,
}

#[async_trait]
impl<M: Model> DocumentQuery for PgQuery<M> {
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
        let sql = QueryBuilder::new(M::COLLECTION)?
            .filter(&self.state.filter)?
            .order_by(&self.state.sort)?
            .limit(self.state.limit)
            .offset(self.state.skip)
            .to_select_sql(false);
        tracing::debug!(collection = M::COLLECTION, sql = %sql.query, "Executing document query");

        let rows = bind_params(sqlx::query_as::<_, DocumentRow>(&sql.query), sql.params)
            .fetch_all(&self.pool)
            .await?;

        let docs = rows.into_iter().map(PgRepository::<M>::render).collect();
        Ok(self.state.project(docs))
    }
}
