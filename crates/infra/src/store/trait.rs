use std::sync::Arc;

use thiserror::Error;

use stockledger_core::{CustomerId, ExpectedVersion, LedgerEntryId, ProductId};
use stockledger_inventory::{AdjustmentPlan, Customer, LedgerEntry, LedgerMutation, Product};

/// A single write inside a [`WriteSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    /// Insert or replace a product, guarded by the version currently stored
    /// (`Exact(0)` = the product must not exist yet).
    PutProduct {
        product: Product,
        expected: ExpectedVersion,
    },
    DeleteProduct {
        id: ProductId,
        expected: ExpectedVersion,
    },
    /// Insert a new ledger entry (its id must be unused).
    AppendEntry(LedgerEntry),
    /// Delete an existing ledger entry.
    RemoveEntry(LedgerEntryId),
}

/// Small set of writes committed all-or-nothing.
///
/// Writes are validated in order, so a later write observes the effect of an
/// earlier one in the same set (e.g. insert a product, then update it).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSet {
    writes: Vec<Write>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_product(mut self, product: Product, expected: ExpectedVersion) -> Self {
        self.writes.push(Write::PutProduct { product, expected });
        self
    }

    pub fn delete_product(mut self, id: ProductId, expected: ExpectedVersion) -> Self {
        self.writes.push(Write::DeleteProduct { id, expected });
        self
    }

    pub fn append_entry(mut self, entry: LedgerEntry) -> Self {
        self.writes.push(Write::AppendEntry(entry));
        self
    }

    pub fn remove_entry(mut self, id: LedgerEntryId) -> Self {
        self.writes.push(Write::RemoveEntry(id));
        self
    }

    /// Append every write of `other`, keeping order.
    pub fn merge(mut self, other: WriteSet) -> Self {
        self.writes.extend(other.writes);
        self
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}

impl From<&AdjustmentPlan> for WriteSet {
    fn from(plan: &AdjustmentPlan) -> Self {
        let set = WriteSet::new().put_product(
            plan.product.clone(),
            ExpectedVersion::Exact(plan.expected_version),
        );
        match &plan.mutation {
            LedgerMutation::Append(entry) => set.append_entry(entry.clone()),
            LedgerMutation::Remove(entry) => set.remove_entry(entry.id_typed()),
        }
    }
}

/// Ledger store operation error.
///
/// These are storage-level failures, as opposed to domain errors (validation,
/// insufficient stock).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A versioned write lost a race (stale `ExpectedVersion`, serialization failure).
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("store timed out: {0}")]
    Timeout(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Durable keyed storage for products, ledger entries and customers.
///
/// ## Contract
///
/// - Point reads and writes are keyed by identifier.
/// - [`LedgerStore::commit`] applies a [`WriteSet`] atomically: every write is
///   applied, or none is and the store is exactly as it was before the call.
/// - Versioned product writes fail the whole commit with [`StoreError::Conflict`]
///   when the stored version differs from the expectation.
///
/// The single-write helpers are expressed through `commit`, so backends only need
/// to get one write path right.
pub trait LedgerStore: Send + Sync {
    fn get_product(&self, id: ProductId) -> Result<Product, StoreError>;

    fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    fn get_entry(&self, id: LedgerEntryId) -> Result<LedgerEntry, StoreError>;

    fn list_entries(&self) -> Result<Vec<LedgerEntry>, StoreError>;

    fn get_customer(&self, id: CustomerId) -> Result<Customer, StoreError>;

    fn list_customers(&self) -> Result<Vec<Customer>, StoreError>;

    /// Insert or replace a customer. Emails are unique across customers.
    fn put_customer(&self, customer: Customer) -> Result<(), StoreError>;

    fn remove_customer(&self, id: CustomerId) -> Result<(), StoreError>;

    /// Apply `writes` as one atomic unit.
    fn commit(&self, writes: WriteSet) -> Result<(), StoreError>;

    /// Unconditional product upsert.
    fn put_product(&self, product: Product) -> Result<(), StoreError> {
        self.commit(WriteSet::new().put_product(product, ExpectedVersion::Any))
    }

    fn append_entry(&self, entry: LedgerEntry) -> Result<(), StoreError> {
        self.commit(WriteSet::new().append_entry(entry))
    }

    fn remove_entry(&self, id: LedgerEntryId) -> Result<(), StoreError> {
        self.commit(WriteSet::new().remove_entry(id))
    }
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn get_product(&self, id: ProductId) -> Result<Product, StoreError> {
        (**self).get_product(id)
    }

    fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        (**self).list_products()
    }

    fn get_entry(&self, id: LedgerEntryId) -> Result<LedgerEntry, StoreError> {
        (**self).get_entry(id)
    }

    fn list_entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        (**self).list_entries()
    }

    fn get_customer(&self, id: CustomerId) -> Result<Customer, StoreError> {
        (**self).get_customer(id)
    }

    fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
        (**self).list_customers()
    }

    fn put_customer(&self, customer: Customer) -> Result<(), StoreError> {
        (**self).put_customer(customer)
    }

    fn remove_customer(&self, id: CustomerId) -> Result<(), StoreError> {
        (**self).remove_customer(id)
    }

    fn commit(&self, writes: WriteSet) -> Result<(), StoreError> {
        (**self).commit(writes)
    }

    fn put_product(&self, product: Product) -> Result<(), StoreError> {
        (**self).put_product(product)
    }

    fn append_entry(&self, entry: LedgerEntry) -> Result<(), StoreError> {
        (**self).append_entry(entry)
    }

    fn remove_entry(&self, id: LedgerEntryId) -> Result<(), StoreError> {
        (**self).remove_entry(id)
    }
}
