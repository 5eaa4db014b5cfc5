//! Stock adjustment planning.
//!
//! Planning is pure: given the current product (and, for returns, the sale entry)
//! it decides the next product revision and the ledger mutation that must be
//! committed together with it. Nothing here touches storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{
    AggregateRoot, CustomerId, DomainError, DomainResult, LedgerEntryId, Money, ProductId, Quantity,
};

use crate::ledger::LedgerEntry;
use crate::product::{MAX_STOCK, Product};

/// The three kinds of atomic adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentKind {
    Sale,
    Restock,
    Return,
}

impl AdjustmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AdjustmentKind::Sale => "sale",
            AdjustmentKind::Restock => "restock",
            AdjustmentKind::Return => "return",
        }
    }
}

/// A request to adjust stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AdjustmentRequest {
    Sale {
        product_id: ProductId,
        quantity: Quantity,
        /// Defaults to `unit_price * quantity` when absent.
        total: Option<Money>,
        customer_id: Option<CustomerId>,
    },
    Restock {
        product_id: ProductId,
        quantity: Quantity,
        batch_ref: Option<String>,
    },
    Return {
        sale_entry_id: LedgerEntryId,
    },
}

impl AdjustmentRequest {
    pub fn kind(&self) -> AdjustmentKind {
        match self {
            AdjustmentRequest::Sale { .. } => AdjustmentKind::Sale,
            AdjustmentRequest::Restock { .. } => AdjustmentKind::Restock,
            AdjustmentRequest::Return { .. } => AdjustmentKind::Return,
        }
    }
}

/// Ledger side of an adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerMutation {
    Append(LedgerEntry),
    /// Remove the given (sale) entry.
    Remove(LedgerEntry),
}

impl LedgerMutation {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            LedgerMutation::Append(e) | LedgerMutation::Remove(e) => e,
        }
    }
}

/// Everything that must be committed atomically for one adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentPlan {
    pub kind: AdjustmentKind,
    /// Version the stored product must still have at commit time.
    pub expected_version: u64,
    pub product: Product,
    pub mutation: LedgerMutation,
}

pub fn plan_sale(
    product: &Product,
    quantity: Quantity,
    total: Option<Money>,
    customer_id: Option<CustomerId>,
    occurred_at: DateTime<Utc>,
) -> DomainResult<AdjustmentPlan> {
    let requested = quantity.as_u64();
    if requested > product.stock() {
        return Err(DomainError::insufficient_stock(requested, product.stock()));
    }

    let total = match total {
        Some(t) => Some(t),
        None => product.unit_price().checked_mul(requested),
    }
    .filter(|t| *t <= Money::MAX)
    .ok_or_else(|| DomainError::validation(format!("sale total cannot exceed {}", Money::MAX)))?;

    let entry = LedgerEntry::sale(product.id_typed(), quantity, total, customer_id, occurred_at);
    Ok(AdjustmentPlan {
        kind: AdjustmentKind::Sale,
        expected_version: product.version(),
        product: product.with_stock(product.stock() - requested),
        mutation: LedgerMutation::Append(entry),
    })
}

pub fn plan_restock(
    product: &Product,
    quantity: Quantity,
    batch_ref: Option<String>,
    occurred_at: DateTime<Utc>,
) -> DomainResult<AdjustmentPlan> {
    let stock = raised_stock(product, quantity)?;

    let batch_ref = batch_ref.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
    let entry = LedgerEntry::restock(product.id_typed(), quantity, batch_ref, occurred_at);
    Ok(AdjustmentPlan {
        kind: AdjustmentKind::Restock,
        expected_version: product.version(),
        product: product.with_stock(stock),
        mutation: LedgerMutation::Append(entry),
    })
}

/// Plan the reversal of `sale`, which must be a sale entry for `product`.
pub fn plan_return(product: &Product, sale: &LedgerEntry) -> DomainResult<AdjustmentPlan> {
    if !sale.is_sale() {
        return Err(DomainError::not_found(format!("sale entry {}", sale.id_typed())));
    }
    if sale.product_id() != product.id_typed() {
        return Err(DomainError::invariant("sale entry belongs to another product"));
    }

    let stock = raised_stock(product, sale.quantity())?;

    Ok(AdjustmentPlan {
        kind: AdjustmentKind::Return,
        expected_version: product.version(),
        product: product.with_stock(stock),
        mutation: LedgerMutation::Remove(sale.clone()),
    })
}

fn raised_stock(product: &Product, quantity: Quantity) -> DomainResult<u64> {
    product
        .stock()
        .checked_add(quantity.as_u64())
        .filter(|s| *s <= MAX_STOCK)
        .ok_or_else(|| DomainError::validation(format!("stock cannot exceed {MAX_STOCK}")))
}
