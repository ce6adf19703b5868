use std::sync::Arc;

use crate::config::{AppConfig, StorageBackend};
use crate::database::{DatabaseError, DatabaseManager, MemoryRepository, PgRepository, RecordStore};
use crate::filter::Projection;
use crate::handlers::factory::{CrudHandlers, Populate};
use crate::middleware::AuthState;
use crate::models::{Model, Review, Tour, User};

/// One record store per collection
#[derive(Clone)]
pub struct Stores {
    pub tours: Arc<dyn RecordStore>,
    pub users: Arc<dyn RecordStore>,
    pub reviews: Arc<dyn RecordStore>,
}

impl Stores {
    pub fn memory() -> Self {
        Self {
            tours: Arc::new(MemoryRepository::<Tour>::new()),
            users: Arc::new(MemoryRepository::<User>::new()),
            reviews: Arc::new(MemoryRepository::<Review>::new()),
        }
    }

    /// PostgreSQL stores; creates missing tables and unique indexes first
    pub async fn postgres(db: &DatabaseManager) -> Result<Self, DatabaseError> {
        db.ensure_collection(Tour::COLLECTION, Tour::UNIQUE).await?;
        db.ensure_collection(User::COLLECTION, User::UNIQUE).await?;
        db.ensure_collection(Review::COLLECTION, Review::UNIQUE).await?;

        let pool = db.pool().clone();
        Ok(Self {
            tours: Arc::new(PgRepository::<Tour>::new(pool.clone())),
            users: Arc::new(PgRepository::<User>::new(pool.clone())),
            reviews: Arc::new(PgRepository::<Review>::new(pool)),
        })
    }

    /// Stores for the configured backend
    pub async fn from_config(config: &AppConfig) -> Result<Self, DatabaseError> {
        match config.database.backend {
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on shutdown");
                Ok(Self::memory())
            }
            StorageBackend::Postgres => {
                let db = DatabaseManager::connect(&config.database).await?;
                Self::postgres(&db).await
            }
        }
    }
}

/// Everything the router hands to handlers
#[derive(Clone)]
pub struct AppState {
    pub tours: Arc<CrudHandlers>,
    pub users: Arc<CrudHandlers>,
    pub reviews: Arc<CrudHandlers>,
    pub auth: AuthState,
}

impl AppState {
    pub fn new(stores: Stores, config: &AppConfig) -> Self {
        let max_limit = config.query.max_limit;

        let tours = CrudHandlers::new(stores.tours.clone(), "tour", "tours")
            .with_max_limit(max_limit)
            .with_populate(Populate::Virtual {
                path: "reviews",
                store: stores.reviews.clone(),
                foreign_field: "tour",
            })
            .with_list_populate(Populate::Reference {
                path: "guides",
                store: stores.users.clone(),
                projection: Projection::Exclude(vec!["__v".to_string(), "passwordChangedAt".to_string()]),
            });

        let reviews = CrudHandlers::new(stores.reviews.clone(), "review", "reviews")
            .with_max_limit(max_limit)
            .with_list_populate(Populate::Reference {
                path: "user",
                store: stores.users.clone(),
                projection: Projection::Include(vec!["id".to_string(), "name".to_string(), "photo".to_string()]),
            });

        let users = CrudHandlers::new(stores.users.clone(), "user", "users").with_max_limit(max_limit);

        Self {
            tours: Arc::new(tours),
            users: Arc::new(users),
            reviews: Arc::new(reviews),
            auth: AuthState {
                users: stores.users,
                jwt_secret: Arc::from(config.security.jwt_secret.as_str()),
                jwt_expiry_hours: config.security.jwt_expiry_hours,
            },
        }
    }
}
