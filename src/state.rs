use crate::config::AppConfig;
use crate::storage::{S3Storage, StorageClient};
use crate::store::{PgStore, Store};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StorageClient>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let store = PgStore::connect(&config).await?;
        store.migrate().await?;

        let storage = Arc::new(S3Storage::new(&config.s3).await?) as Arc<dyn StorageClient>;

        Ok(Self::from_parts(Arc::new(store), config, storage))
    }

    pub fn from_parts(
        store: Arc<dyn Store>,
        config: Arc<AppConfig>,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        Self {
            store,
            config,
            storage,
        }
    }
}
