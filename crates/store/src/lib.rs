//! Persistence backends for orgchat.
//!
//! - [`InMemoryStore`]: conversations, documents, and files in process memory
//! - [`PostgresStore`]: PostgreSQL with pgvector (feature `postgres`)
//! - [`HttpFileStore`]: uploaded files read from public object storage

pub mod http_file;
pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod vector;

pub use http_file::HttpFileStore;
pub use in_memory::InMemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use orgchat_config::{StoreBackend, StoreConfig};
use orgchat_core::error::StoreError;
use orgchat_core::{ConversationStore, DocumentStore, FileStore};
use std::sync::Arc;

/// The store handles the services are built from.
#[derive(Clone)]
pub struct Stores {
    pub conversations: Arc<dyn ConversationStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub files: Arc<dyn FileStore>,
}

impl Stores {
    /// All three handles backed by one in-memory store.
    pub fn in_memory(store: InMemoryStore) -> Self {
        Self {
            conversations: Arc::new(store.clone()),
            documents: Arc::new(store.clone()),
            files: Arc::new(store),
        }
    }
}

/// Open the stores named in `config`.
///
/// With `storage_url` set, files come from [`HttpFileStore`] regardless of
/// the backend.
pub async fn open(config: &StoreConfig) -> Result<Stores, StoreError> {
    let mut stores = match config.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory store; data is lost on exit");
            Stores::in_memory(InMemoryStore::new())
        }
        StoreBackend::Postgres => open_postgres(config).await?,
    };

    if let Some(url) = &config.storage_url {
        stores.files = Arc::new(HttpFileStore::new(url, &config.bucket));
    }

    Ok(stores)
}

#[cfg(feature = "postgres")]
async fn open_postgres(config: &StoreConfig) -> Result<Stores, StoreError> {
    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| StoreError::Storage("store.database_url is not set".into()))?;
    let store = Arc::new(PostgresStore::connect(url, config.max_connections).await?);
    if config.run_migrations {
        store.migrate().await?;
    }

    Ok(Stores {
        conversations: store.clone(),
        documents: store,
        // Without storage_url there is nowhere to download uploads from.
        files: Arc::new(InMemoryStore::new()),
    })
}

#[cfg(not(feature = "postgres"))]
async fn open_postgres(_config: &StoreConfig) -> Result<Stores, StoreError> {
    Err(StoreError::Storage(
        "orgchat-store was built without the `postgres` feature".into(),
    ))
}
