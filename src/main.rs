mod auth;
mod backup;
mod config;
mod db;
mod error;
mod lock;
mod notify;
mod routes;
mod scoring;
mod settings;
mod state;
mod storage;
mod submission;
mod templates;

use std::sync::Arc;

use crate::config::{Config, StoreKind};
use crate::db::AwardsStore;
use crate::error::AwardsError;
use crate::lock::{Clock, SystemClock};

enum Command {
    Serve,
    StorageSetup,
    StorageCheck,
}

impl Command {
    fn parse(arg: Option<&str>) -> Result<Self, AwardsError> {
        match arg {
            None | Some("serve") => Ok(Command::Serve),
            Some("storage-setup") => Ok(Command::StorageSetup),
            Some("storage-check") => Ok(Command::StorageCheck),
            Some(other) => Err(AwardsError::Config(format!(
                "unknown command '{}'; expected serve, storage-setup or storage-check",
                other
            ))),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "md_awards=info,tower_http=info".into()),
        )
        .init();

    let command = Command::parse(std::env::args().nth(1).as_deref())?;
    let config = Arc::new(Config::from_env()?);

    match command {
        Command::Serve => serve(config).await,
        Command::StorageSetup => {
            let bucket = bucket_client(&config)?.ok_or_else(missing_storage)?;
            let status = bucket.ensure_bucket().await?;
            tracing::info!("Bucket {} ready ({:?})", bucket.bucket(), status);
            let objects = bucket.self_check().await?;
            tracing::info!("Storage self-check passed ({} objects under test/)", objects);
            Ok(())
        }
        Command::StorageCheck => {
            let bucket = bucket_client(&config)?.ok_or_else(missing_storage)?;
            let objects = bucket.self_check().await?;
            tracing::info!("Storage self-check passed ({} objects under test/)", objects);
            Ok(())
        }
    }
}

fn missing_storage() -> AwardsError {
    AwardsError::Config("SUPABASE_URL and SUPABASE_KEY must be set".into())
}

fn bucket_client(config: &Config) -> Result<Option<storage::BucketClient>, AwardsError> {
    match (&config.supabase_url, &config.supabase_key) {
        (Some(url), Some(key)) => Ok(Some(storage::BucketClient::new(
            url,
            key,
            &config.storage_bucket,
        )?)),
        _ => Ok(None),
    }
}

async fn open_store(config: &Config) -> Result<Arc<dyn AwardsStore>, AwardsError> {
    match config.store {
        StoreKind::Memory => {
            tracing::warn!("Using in-memory store; submissions are lost on restart");
            Ok(Arc::new(db::MemoryStore::new()))
        }
        StoreKind::Postgres => {
            let pool = db::create_pool(&config.database_url)?;
            if let Err(e) = db::run_migrations(&pool).await {
                tracing::warn!("Migrations not applied ({}); writes will fall back to CSV until the database is reachable", e);
            }
            Ok(Arc::new(db::PgStore::new(pool)))
        }
    }
}

async fn serve(config: Arc<Config>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let store = open_store(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let bucket = bucket_client(&config)?;
    if bucket.is_none() {
        tracing::warn!("Object storage not configured; evidence files will not be stored");
    }

    let notifier = match &config.postmark_token {
        Some(token) => Some(notify::PostmarkNotifier::new(
            token.clone(),
            config.notify_email.clone(),
        )?),
        None => {
            tracing::warn!("POSTMARK_API_TOKEN not set; submission emails disabled");
            None
        }
    };

    let backup = Arc::new(backup::CsvBackup::new(config.backup_csv_path.clone()));
    let state = Arc::new(state::AppState {
        clock: clock.clone(),
        submissions: backup::SubmissionLog::new(store.clone(), backup),
        locks: lock::LockManager::new(store.clone(), clock.clone(), config.lock_timeout_secs),
        settings: settings::SettingsService::new(store, clock),
        authorizer: auth::Authorizer::new(&config.evaluator_password),
        bucket,
        notifier,
    });

    let app = routes::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("MD Awards listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
