use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use tourbook_api::config::config;
use tourbook_api::database::{DatabaseManager, RecordStore};
use tourbook_api::routes::Stores;

#[derive(Parser)]
#[command(name = "import-dev-data")]
#[command(about = "Load or wipe development data in the configured PostgreSQL database")]
#[command(version)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "JSON array of documents to insert", conflicts_with = "delete")]
    import: Option<PathBuf>,

    #[arg(long, help = "Delete every document in the collection")]
    delete: bool,

    #[arg(long, value_enum, default_value = "tours", help = "Target collection")]
    collection: Collection,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Collection {
    Tours,
    Users,
    Reviews,
}

impl Collection {
    fn store<'a>(&self, stores: &'a Stores) -> &'a dyn RecordStore {
        match self {
            Collection::Tours => stores.tours.as_ref(),
            Collection::Users => stores.users.as_ref(),
            Collection::Reviews => stores.reviews.as_ref(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if cli.import.is_none() && !cli.delete {
        anyhow::bail!("nothing to do: pass --import <FILE> or --delete");
    }

    let db = DatabaseManager::connect(&config().database)
        .await
        .context("failed to connect to database")?;
    let stores = Stores::postgres(&db).await?;
    let store = cli.collection.store(&stores);

    if cli.delete {
        let removed = store.delete_many().await?;
        tracing::info!(collection = store.collection(), removed, "Data successfully deleted");
    }

    if let Some(path) = cli.import {
        let raw = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let documents: Vec<Value> =
            serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON array", path.display()))?;

        let mut inserted = 0usize;
        for (index, value) in documents.into_iter().enumerate() {
            let Value::Object(doc) = value else {
                anyhow::bail!("entry {} in {} is not an object", index, path.display());
            };
            store
                .create(doc)
                .await
                .with_context(|| format!("failed to insert entry {}", index))?;
            inserted += 1;
        }
        tracing::info!(collection = store.collection(), inserted, "Data successfully loaded");
    }

    db.close().await;
    Ok(())
}
