//! Inventory domain module.
//!
//! This crate contains the store's business rules (products, ledger entries,
//! customers and stock adjustment planning), implemented purely as deterministic
//! domain logic (no IO, no HTTP, no storage).

pub mod adjustment;
pub mod customer;
pub mod ledger;
pub mod product;

pub use adjustment::{
    AdjustmentKind, AdjustmentPlan, AdjustmentRequest, LedgerMutation, plan_restock, plan_return,
    plan_sale,
};
pub use customer::{Customer, NewCustomer};
pub use ledger::{LedgerEntry, LedgerEntryKind};
pub use product::{MAX_STOCK, NewProduct, Product};
