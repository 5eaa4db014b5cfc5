//! Typed operation entry points.
//!
//! The facade is stateless: it validates a request, hands it to the
//! [`AdjustmentExecutor`] and retries aborted attempts with a short exponential
//! backoff. It blocks the calling thread, so async callers run it on a blocking
//! thread.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use stockledger_core::{CustomerId, LedgerEntryId, Money, ProductId, Quantity};
use stockledger_infra::store::LedgerStore;
use stockledger_infra::{AdjustmentError, AdjustmentExecutor, AdjustmentOutcome, OperationState};
use stockledger_inventory::{AdjustmentKind, AdjustmentRequest, LedgerEntry};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SellRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Defaults to unit price times quantity.
    #[serde(default)]
    pub total: Option<Money>,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RestockRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default)]
    pub batch_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ReturnRequest {
    pub sale_entry_id: LedgerEntryId,
}

/// What a committed operation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationReport {
    pub operation: AdjustmentKind,
    pub state: OperationState,
    pub product_id: ProductId,
    pub stock: u64,
    pub entry: LedgerEntry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_entry_id: Option<LedgerEntryId>,
    pub attempts: u32,
}

impl OperationReport {
    fn from_outcome(outcome: AdjustmentOutcome, attempts: u32) -> Self {
        Self {
            operation: outcome.kind,
            state: outcome.state,
            product_id: outcome.product.id_typed(),
            stock: outcome.product.stock(),
            entry: outcome.entry,
            removed_entry_id: outcome.removed_entry.map(|e| e.id_typed()),
            attempts,
        }
    }
}

/// Retry schedule for aborted attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-indexed): base * 2^(retry-1), capped.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(retry - 1).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Debug)]
pub struct OperationFacade<S> {
    executor: AdjustmentExecutor<S>,
    retry: RetryPolicy,
}

impl<S> OperationFacade<S>
where
    S: LedgerStore,
{
    pub fn new(executor: AdjustmentExecutor<S>, retry: RetryPolicy) -> Self {
        Self { executor, retry }
    }

    pub fn executor(&self) -> &AdjustmentExecutor<S> {
        &self.executor
    }

    pub fn sell(&self, request: SellRequest) -> Result<OperationReport, AdjustmentError> {
        let quantity = quantity(request.quantity)?;
        self.run(AdjustmentRequest::Sale {
            product_id: request.product_id,
            quantity,
            total: request.total,
            customer_id: request.customer_id,
        })
    }

    pub fn restock(&self, request: RestockRequest) -> Result<OperationReport, AdjustmentError> {
        let quantity = quantity(request.quantity)?;
        self.run(AdjustmentRequest::Restock {
            product_id: request.product_id,
            quantity,
            batch_ref: request.batch_ref,
        })
    }

    pub fn return_sale(&self, request: ReturnRequest) -> Result<OperationReport, AdjustmentError> {
        self.run(AdjustmentRequest::Return {
            sale_entry_id: request.sale_entry_id,
        })
    }

    fn run(&self, request: AdjustmentRequest) -> Result<OperationReport, AdjustmentError> {
        let kind = request.kind();
        let mut attempt = 1;
        loop {
            match self.executor.execute(request.clone()) {
                Ok(outcome) => {
                    if attempt > 1 {
                        info!(kind = kind.as_str(), attempt, "operation committed after retry");
                    }
                    return Ok(OperationReport::from_outcome(outcome, attempt));
                }
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for_retry(attempt);
                    warn!(
                        kind = kind.as_str(),
                        attempt,
                        ?delay,
                        error = %err,
                        "retrying aborted operation"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn quantity(units: u32) -> Result<Quantity, AdjustmentError> {
    Quantity::new(units).map_err(|e| AdjustmentError::Invalid(e.to_string()))
}
