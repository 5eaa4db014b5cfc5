//! Ledger store boundary.
//!
//! Keyed storage for products, ledger entries and customers with an atomic
//! multi-key commit. The in-memory backend serves tests/dev; Postgres is the
//! durable backend.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use r#trait::{LedgerStore, StoreError, Write, WriteSet};
