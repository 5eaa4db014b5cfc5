use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use stockledger_core::{AggregateRoot, CustomerId, ExpectedVersion, LedgerEntryId, ProductId};
use stockledger_inventory::{Customer, LedgerEntry, Product};

use super::r#trait::{LedgerStore, StoreError, Write, WriteSet};

#[derive(Debug, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    /// Ordered by id, i.e. by creation time (UUIDv7).
    entries: BTreeMap<LedgerEntryId, LedgerEntry>,
    customers: HashMap<CustomerId, Customer>,
}

impl State {
    fn product_version(&self, id: ProductId) -> u64 {
        self.products.get(&id).map(|p| p.version()).unwrap_or(0)
    }
}

/// In-memory ledger store.
///
/// Intended for tests/dev. A commit holds the write lock while it validates the
/// whole write set and only then applies it, so readers never observe a
/// half-applied commit and a rejected commit changes nothing.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<State>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

/// Check every write against the current state plus the effect of the writes
/// before it. Returns the first violation.
fn validate(state: &State, writes: &[Write]) -> Result<(), StoreError> {
    let mut versions: HashMap<ProductId, u64> = HashMap::new();
    let mut present: HashMap<LedgerEntryId, bool> = HashMap::new();

    for (idx, write) in writes.iter().enumerate() {
        match write {
            Write::PutProduct { product, expected } => {
                let id = product.id_typed();
                let current = versions
                    .get(&id)
                    .copied()
                    .unwrap_or_else(|| state.product_version(id));
                check_version(id, *expected, current, idx)?;
                versions.insert(id, product.version());
            }
            Write::DeleteProduct { id, expected } => {
                let current = versions
                    .get(id)
                    .copied()
                    .unwrap_or_else(|| state.product_version(*id));
                if current == 0 {
                    return Err(StoreError::NotFound(format!("product {id}")));
                }
                check_version(*id, *expected, current, idx)?;
                versions.insert(*id, 0);
            }
            Write::AppendEntry(entry) => {
                let id = entry.id_typed();
                let exists = present
                    .get(&id)
                    .copied()
                    .unwrap_or_else(|| state.entries.contains_key(&id));
                if exists {
                    return Err(StoreError::AlreadyExists(format!("ledger entry {id}")));
                }
                present.insert(id, true);
            }
            Write::RemoveEntry(id) => {
                let exists = present
                    .get(id)
                    .copied()
                    .unwrap_or_else(|| state.entries.contains_key(id));
                if !exists {
                    return Err(StoreError::NotFound(format!("ledger entry {id}")));
                }
                present.insert(*id, false);
            }
        }
    }

    Ok(())
}

fn check_version(
    id: ProductId,
    expected: ExpectedVersion,
    current: u64,
    idx: usize,
) -> Result<(), StoreError> {
    expected
        .check(current)
        .map_err(|e| StoreError::Conflict(format!("product {id} (write {idx}): {e}")))
}

impl LedgerStore for InMemoryLedgerStore {
    fn get_product(&self, id: ProductId) -> Result<Product, StoreError> {
        self.read()?
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("product {id}")))
    }

    fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let mut products: Vec<Product> = self.read()?.products.values().cloned().collect();
        products.sort_by_key(|p| p.id_typed());
        Ok(products)
    }

    fn get_entry(&self, id: LedgerEntryId) -> Result<LedgerEntry, StoreError> {
        self.read()?
            .entries
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("ledger entry {id}")))
    }

    fn list_entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self.read()?.entries.values().cloned().collect())
    }

    fn get_customer(&self, id: CustomerId) -> Result<Customer, StoreError> {
        self.read()?
            .customers
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("customer {id}")))
    }

    fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
        let mut customers: Vec<Customer> = self.read()?.customers.values().cloned().collect();
        customers.sort_by_key(|c| c.id_typed());
        Ok(customers)
    }

    fn put_customer(&self, customer: Customer) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let id = customer.id_typed();
        let taken = state
            .customers
            .values()
            .any(|c| c.id_typed() != id && c.email() == customer.email());
        if taken {
            return Err(StoreError::AlreadyExists(format!(
                "customer email {}",
                customer.email()
            )));
        }
        state.customers.insert(id, customer);
        Ok(())
    }

    fn remove_customer(&self, id: CustomerId) -> Result<(), StoreError> {
        self.write()?
            .customers
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("customer {id}")))
    }

    fn commit(&self, writes: WriteSet) -> Result<(), StoreError> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut state = self.write()?;
        validate(&state, writes.writes())?;

        // Validation passed; nothing below can fail.
        for write in writes.into_writes() {
            match write {
                Write::PutProduct { product, .. } => {
                    state.products.insert(product.id_typed(), product);
                }
                Write::DeleteProduct { id, .. } => {
                    state.products.remove(&id);
                }
                Write::AppendEntry(entry) => {
                    state.entries.insert(entry.id_typed(), entry);
                }
                Write::RemoveEntry(id) => {
                    state.entries.remove(&id);
                }
            }
        }

        Ok(())
    }
}
