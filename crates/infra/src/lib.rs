//! Infrastructure layer: ledger storage, locking, atomic adjustments, catalog
//! maintenance, reports and configuration.

pub mod catalog;
pub mod config;
pub mod executor;
pub mod lock;
pub mod reports;
pub mod store;

pub use catalog::{CatalogError, CatalogService, CustomerQuery, ProductQuery};
pub use config::{ConfigError, LedgerConfig};
pub use executor::{AdjustmentError, AdjustmentExecutor, AdjustmentOutcome, OperationState};
pub use lock::{LockError, ProductLocks};
pub use reports::ReportService;
