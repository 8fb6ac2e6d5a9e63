//! Plot Title - registry server
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────────┐    ┌──────────┐
//! │  Config  │───▶│  Store   │───▶│ TransferCase │───▶│ Gateway  │
//! │  (YAML)  │    │(mem / pg)│    │   Service    │    │  (HTTP)  │
//! └──────────┘    └──────────┘    └──────────────┘    └──────────┘
//! ```
//!
//! Usage: `plot-title [--env dev|test|prod] [--port N]`

use std::sync::Arc;

use anyhow::Context;

use plot_title::adapters::{
    ContractDirectory, DirectoryFixture, DocumentStorage, FsDocuments, InMemoryDocuments,
    PersonDirectory,
};
use plot_title::config::{AppConfig, StorageBackend};
use plot_title::db::Database;
use plot_title::gateway::{run_server, state::AppState};
use plot_title::store::schema;
use plot_title::{CaseStore, MemoryStore, PgStore, SystemClock, TransferCaseService};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

type Directories = (Arc<dyn ContractDirectory>, Arc<dyn PersonDirectory>);

fn load_directories(config: &AppConfig) -> anyhow::Result<Directories> {
    let fixture = match &config.directory_file {
        Some(path) => DirectoryFixture::load(path)?,
        None => {
            tracing::warn!("No directory_file configured, contract and person lookups will fail");
            DirectoryFixture::default()
        }
    };
    tracing::info!(
        contracts = fixture.contracts.len(),
        persons = fixture.persons.len(),
        "Directories loaded"
    );
    let (contracts, persons) = fixture.into_directories();
    Ok((Arc::new(contracts), Arc::new(persons)))
}

fn document_storage(config: &AppConfig) -> Arc<dyn DocumentStorage> {
    match &config.documents_dir {
        Some(dir) => {
            tracing::info!(dir = %dir, "Resolution files stored on disk");
            Arc::new(FsDocuments::new(dir))
        }
        None => {
            tracing::warn!("No documents_dir configured, resolution files are kept in memory");
            Arc::new(InMemoryDocuments::new())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut app_config = AppConfig::load(&env)?;
    if let Some(port) = get_port_override() {
        app_config.gateway.port = port;
    }
    let _log_guard = plot_title::logging::init_logging(&app_config);

    tracing::info!("Starting Plot Title registry in {} mode", env);

    let (store, pg_db): (Arc<dyn CaseStore>, Option<Arc<Database>>) =
        match app_config.storage.backend {
            StorageBackend::Memory => {
                tracing::warn!("In-memory store: cases are lost on restart");
                (Arc::new(MemoryStore::new()), None)
            }
            StorageBackend::Postgres => {
                let url = app_config
                    .postgres_url
                    .as_deref()
                    .context("postgres backend without postgres_url")?;
                let db = Database::connect(url)
                    .await
                    .context("Failed to connect to PostgreSQL")?;
                schema::init_schema(db.pool()).await?;
                let store = PgStore::new(&db);
                (Arc::new(store), Some(Arc::new(db)))
            }
        };

    let (contracts, persons) = load_directories(&app_config)?;
    let service = TransferCaseService::new(
        store,
        contracts,
        persons,
        document_storage(&app_config),
        Arc::new(SystemClock),
        app_config.workflow.settings(),
    );

    let state = Arc::new(AppState::new(Arc::new(service), pg_db));
    run_server(&app_config.gateway, state).await
}
