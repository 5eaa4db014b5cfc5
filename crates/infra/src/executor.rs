//! Atomic adjustment execution.
//!
//! The `AdjustmentExecutor` runs one stock adjustment (sale, restock, return) as a
//! single unit of work:
//!
//! ```text
//! Request                                   (Pending)
//!   ↓
//! 1. Resolve the product (returns: via the sale entry)
//!   ↓
//! 2. Acquire the product's exclusive lock    (Applying)
//!   ↓
//! 3. Load current state under the lock
//!   ↓
//! 4. Plan (pure domain decision: next product + ledger mutation)
//!   ↓
//! 5. Commit product + ledger write as one WriteSet, version-guarded
//!   ↓
//! Committed | RolledBack                    (lock released either way)
//! ```
//!
//! Every failure after `Pending` ends in `RolledBack`: the store commit is
//! all-or-nothing, so the store is exactly as it was before the operation.
//! Operations are never resumed; callers re-issue them.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use stockledger_core::{DomainError, ProductId};
use stockledger_inventory::{
    AdjustmentKind, AdjustmentRequest, LedgerEntry, LedgerMutation, Product, plan_restock,
    plan_return, plan_sale,
};

use crate::lock::{LockError, ProductLocks};
use crate::store::{LedgerStore, StoreError, WriteSet};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle of one adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Pending,
    Applying,
    Committed,
    RolledBack,
}

/// Result of a committed adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentOutcome {
    pub kind: AdjustmentKind,
    pub state: OperationState,
    /// Product as committed.
    pub product: Product,
    /// Entry appended by a sale/restock, or the reversal record of a return.
    pub entry: LedgerEntry,
    /// Sale entry deleted by a return.
    pub removed_entry: Option<LedgerEntry>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdjustmentError {
    #[error(
        "insufficient stock for product {product_id}: \
         requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u64,
        available: u64,
    },

    #[error("not found: {0}")]
    NotFound(String),

    /// Conflict, timeout or unexpected failure; nothing was applied and the
    /// caller may retry.
    #[error("aborted: {0}")]
    Aborted(String),

    #[error("invalid request: {0}")]
    Invalid(String),
}

impl AdjustmentError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdjustmentError::Aborted(_))
    }

    fn from_domain(product_id: ProductId, err: DomainError) -> Self {
        match err {
            DomainError::InsufficientStock {
                requested,
                available,
            } => AdjustmentError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            DomainError::NotFound(what) => AdjustmentError::NotFound(what),
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                AdjustmentError::Invalid(msg)
            }
            DomainError::Conflict(msg) | DomainError::InvariantViolation(msg) => {
                AdjustmentError::Aborted(msg)
            }
        }
    }
}

impl From<StoreError> for AdjustmentError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(what) => AdjustmentError::NotFound(what),
            other => AdjustmentError::Aborted(other.to_string()),
        }
    }
}

impl From<LockError> for AdjustmentError {
    fn from(value: LockError) -> Self {
        AdjustmentError::Aborted(value.to_string())
    }
}

/// Executes stock adjustments atomically against a [`LedgerStore`].
///
/// Holds no per-operation state: the store is the only state, and the lock table
/// only lives for in-flight operations.
#[derive(Debug)]
pub struct AdjustmentExecutor<S> {
    store: S,
    locks: Arc<ProductLocks>,
    lock_timeout: Duration,
}

impl<S> AdjustmentExecutor<S> {
    pub fn new(store: S, locks: Arc<ProductLocks>) -> Self {
        Self {
            store,
            locks,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn locks(&self) -> &Arc<ProductLocks> {
        &self.locks
    }
}

impl<S> AdjustmentExecutor<S>
where
    S: LedgerStore,
{
    /// Run one adjustment to `Committed` or `RolledBack` before returning.
    pub fn execute(
        &self,
        request: AdjustmentRequest,
    ) -> Result<AdjustmentOutcome, AdjustmentError> {
        let kind = request.kind();
        let span = info_span!("adjustment", kind = kind.as_str());
        let _enter = span.enter();
        debug!(state = ?OperationState::Pending, ?request, "adjustment received");

        let product_id = match &request {
            AdjustmentRequest::Return { sale_entry_id } => {
                self.store.get_entry(*sale_entry_id)?.product_id()
            }
            AdjustmentRequest::Sale { product_id, .. }
            | AdjustmentRequest::Restock { product_id, .. } => *product_id,
        };

        let _guard = self.locks.acquire(product_id, self.lock_timeout)?;
        debug!(state = ?OperationState::Applying, %product_id, "lock acquired");

        let result = catch_unwind(AssertUnwindSafe(|| self.apply(&request, product_id)))
            .unwrap_or_else(|_| {
                Err(AdjustmentError::Aborted(
                    "unexpected failure while applying".to_string(),
                ))
            });

        match &result {
            Ok(outcome) => info!(
                state = ?OperationState::Committed,
                %product_id,
                entry_id = %outcome.entry.id_typed(),
                stock = outcome.product.stock(),
                "adjustment committed"
            ),
            Err(err) => warn!(
                state = ?OperationState::RolledBack,
                %product_id,
                error = %err,
                retryable = err.is_retryable(),
                "adjustment rolled back"
            ),
        }

        result
    }

    fn apply(
        &self,
        request: &AdjustmentRequest,
        product_id: ProductId,
    ) -> Result<AdjustmentOutcome, AdjustmentError> {
        let product = self.store.get_product(product_id)?;
        let now = Utc::now();

        let plan = match request {
            AdjustmentRequest::Sale {
                quantity,
                total,
                customer_id,
                ..
            } => {
                if let Some(customer_id) = customer_id {
                    self.store.get_customer(*customer_id)?;
                }
                plan_sale(&product, *quantity, *total, *customer_id, now)
            }
            AdjustmentRequest::Restock {
                quantity,
                batch_ref,
                ..
            } => plan_restock(&product, *quantity, batch_ref.clone(), now),
            AdjustmentRequest::Return { sale_entry_id } => {
                // Re-read under the lock: a concurrent return may have removed it.
                let sale = self.store.get_entry(*sale_entry_id)?;
                plan_return(&product, &sale)
            }
        }
        .map_err(|e| AdjustmentError::from_domain(product_id, e))?;

        self.store.commit(WriteSet::from(&plan))?;

        let (entry, removed_entry) = match plan.mutation {
            LedgerMutation::Append(entry) => (entry, None),
            LedgerMutation::Remove(sale) => (LedgerEntry::reversal_of(&sale, now), Some(sale)),
        };

        Ok(AdjustmentOutcome {
            kind: plan.kind,
            state: OperationState::Committed,
            product: plan.product,
            entry,
            removed_entry,
        })
    }
}
