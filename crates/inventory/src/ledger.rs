use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{CustomerId, LedgerEntryId, Money, ProductId, Quantity};

/// Kind of stock-affecting event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerEntryKind {
    Sale,
    Restock,
    /// Reversal of a sale. Never stored: returning a sale deletes the sale entry,
    /// and the reversal record only describes what was undone.
    Return,
}

impl LedgerEntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LedgerEntryKind::Sale => "sale",
            LedgerEntryKind::Restock => "restock",
            LedgerEntryKind::Return => "return",
        }
    }
}

impl core::str::FromStr for LedgerEntryKind {
    type Err = stockledger_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sale" => Ok(LedgerEntryKind::Sale),
            "restock" => Ok(LedgerEntryKind::Restock),
            "return" => Ok(LedgerEntryKind::Return),
            other => Err(stockledger_core::DomainError::validation(format!(
                "unknown ledger entry kind '{other}'"
            ))),
        }
    }
}

/// Immutable record of a stock movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    id: LedgerEntryId,
    kind: LedgerEntryKind,
    product_id: ProductId,
    quantity: Quantity,
    occurred_at: DateTime<Utc>,
    total: Option<Money>,
    customer_id: Option<CustomerId>,
    /// Free-text reference (restock batch, supplier delivery note...).
    reference: Option<String>,
}

impl LedgerEntry {
    pub fn sale(
        product_id: ProductId,
        quantity: Quantity,
        total: Money,
        customer_id: Option<CustomerId>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LedgerEntryId::new(),
            kind: LedgerEntryKind::Sale,
            product_id,
            quantity,
            occurred_at,
            total: Some(total),
            customer_id,
            reference: None,
        }
    }

    pub fn restock(
        product_id: ProductId,
        quantity: Quantity,
        batch_ref: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LedgerEntryId::new(),
            kind: LedgerEntryKind::Restock,
            product_id,
            quantity,
            occurred_at,
            total: None,
            customer_id: None,
            reference: batch_ref,
        }
    }

    /// Describe the undoing of `sale`; it references the sale id.
    pub fn reversal_of(sale: &LedgerEntry, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: LedgerEntryId::new(),
            kind: LedgerEntryKind::Return,
            product_id: sale.product_id,
            quantity: sale.quantity,
            occurred_at,
            total: sale.total,
            customer_id: sale.customer_id,
            reference: Some(sale.id.to_string()),
        }
    }

    /// Rebuild an entry from persisted columns (storage adapters only).
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: LedgerEntryId,
        kind: LedgerEntryKind,
        product_id: ProductId,
        quantity: Quantity,
        occurred_at: DateTime<Utc>,
        total: Option<Money>,
        customer_id: Option<CustomerId>,
        reference: Option<String>,
    ) -> Self {
        Self {
            id,
            kind,
            product_id,
            quantity,
            occurred_at,
            total,
            customer_id,
            reference,
        }
    }

    pub fn id_typed(&self) -> LedgerEntryId {
        self.id
    }

    pub fn kind(&self) -> LedgerEntryKind {
        self.kind
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn total(&self) -> Option<Money> {
        self.total
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn is_sale(&self) -> bool {
        self.kind == LedgerEntryKind::Sale
    }

    /// Effect of this entry on the product's stock.
    pub fn signed_delta(&self) -> i64 {
        let units = i64::from(self.quantity.get());
        match self.kind {
            LedgerEntryKind::Sale => -units,
            LedgerEntryKind::Restock | LedgerEntryKind::Return => units,
        }
    }
}
