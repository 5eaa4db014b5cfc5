//! Service wiring: one store shared by the facade, catalog and reports.

use std::sync::Arc;

use stockledger_infra::store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, StoreError};
use stockledger_infra::{
    AdjustmentExecutor, CatalogService, LedgerConfig, ProductLocks, ReportService,
};

use crate::facade::{OperationFacade, RetryPolicy};

pub type SharedStore = Arc<dyn LedgerStore>;

/// Everything the HTTP handlers need.
///
/// All services are synchronous (the Postgres store blocks on its runtime), so
/// handlers call them through [`tokio::task::spawn_blocking`].
pub struct AppServices {
    pub operations: OperationFacade<SharedStore>,
    pub catalog: CatalogService<SharedStore>,
    pub reports: ReportService<SharedStore>,
}

impl AppServices {
    pub fn new(store: SharedStore, config: &LedgerConfig) -> Self {
        // Catalog edits and adjustments share one lock table.
        let locks = Arc::new(ProductLocks::new());
        let executor = AdjustmentExecutor::new(store.clone(), locks.clone())
            .with_lock_timeout(config.lock_timeout);

        Self {
            operations: OperationFacade::new(
                executor,
                RetryPolicy::attempts(config.retry_attempts),
            ),
            catalog: CatalogService::new(store.clone(), locks)
                .with_lock_timeout(config.lock_timeout),
            reports: ReportService::new(store),
        }
    }

    pub fn in_memory(config: &LedgerConfig) -> Self {
        Self::new(Arc::new(InMemoryLedgerStore::new()), config)
    }

    /// Connect to Postgres (creating the schema if needed). Must run inside the
    /// tokio runtime that later serves requests.
    pub async fn postgres(database_url: &str, config: &LedgerConfig) -> Result<Self, StoreError> {
        let store = PostgresLedgerStore::connect(database_url).await?;
        Ok(Self::new(Arc::new(store), config))
    }

    /// Pick the backend from `config`: Postgres when a database URL is set.
    pub async fn from_config(config: &LedgerConfig) -> Result<Self, StoreError> {
        match &config.database_url {
            Some(url) => {
                tracing::info!("using postgres ledger store");
                Self::postgres(url, config).await
            }
            None => {
                tracing::warn!("DATABASE_URL not set; using in-memory ledger store");
                Ok(Self::in_memory(config))
            }
        }
    }
}
