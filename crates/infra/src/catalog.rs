//! Catalog maintenance and queries over products and customers.
//!
//! Anything here that rewrites a product takes the same per-product lock as the
//! adjustment executor and commits with the version it read, so catalog edits
//! never interleave with a stock adjustment on the same product.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use stockledger_core::{
    AggregateRoot, CustomerId, DomainError, ExpectedVersion, ProductId, Quantity,
};
use stockledger_inventory::{Customer, NewCustomer, NewProduct, Product, plan_restock};

use crate::executor::DEFAULT_LOCK_TIMEOUT;
use crate::lock::{LockError, ProductLocks};
use crate::store::{LedgerStore, StoreError, WriteSet};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("aborted: {0}")]
    Aborted(String),
}

impl From<StoreError> for CatalogError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(what) => CatalogError::NotFound(what),
            StoreError::AlreadyExists(what) => CatalogError::AlreadyExists(what),
            other => CatalogError::Aborted(other.to_string()),
        }
    }
}

impl From<DomainError> for CatalogError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::NotFound(what) => CatalogError::NotFound(what),
            DomainError::Conflict(msg) | DomainError::InvariantViolation(msg) => {
                CatalogError::Aborted(msg)
            }
            other => CatalogError::Invalid(other.to_string()),
        }
    }
}

impl From<LockError> for CatalogError {
    fn from(value: LockError) -> Self {
        CatalogError::Aborted(value.to_string())
    }
}

impl From<regex::Error> for CatalogError {
    fn from(value: regex::Error) -> Self {
        CatalogError::Invalid(format!("invalid name pattern: {value}"))
    }
}

/// Product filter. Every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProductQuery {
    pub stock_above: Option<u64>,
    pub stock_below: Option<u64>,
    pub category: Option<String>,
    pub name_pattern: Option<String>,
    pub case_insensitive: bool,
    pub any_tags: Vec<String>,
    pub all_tags: Vec<String>,
    pub more_tags_than: Option<usize>,
}

impl ProductQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stock_above(mut self, n: u64) -> Self {
        self.stock_above = Some(n);
        self
    }

    pub fn stock_below(mut self, n: u64) -> Self {
        self.stock_below = Some(n);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn name_matching(mut self, pattern: impl Into<String>, case_insensitive: bool) -> Self {
        self.name_pattern = Some(pattern.into());
        self.case_insensitive = case_insensitive;
        self
    }

    pub fn any_tag(mut self, tag: impl Into<String>) -> Self {
        self.any_tags.push(tag.into());
        self
    }

    pub fn all_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.all_tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn more_tags_than(mut self, n: usize) -> Self {
        self.more_tags_than = Some(n);
        self
    }

    fn compile(&self) -> Result<CompiledProductQuery<'_>, CatalogError> {
        let name = self
            .name_pattern
            .as_deref()
            .map(|p| RegexBuilder::new(p).case_insensitive(self.case_insensitive).build())
            .transpose()?;
        Ok(CompiledProductQuery { query: self, name })
    }
}

struct CompiledProductQuery<'a> {
    query: &'a ProductQuery,
    name: Option<Regex>,
}

impl CompiledProductQuery<'_> {
    fn matches(&self, product: &Product) -> bool {
        let q = self.query;
        q.stock_above.is_none_or(|n| product.stock() > n)
            && q.stock_below.is_none_or(|n| product.stock() < n)
            && q.category.as_deref().is_none_or(|c| product.category() == c)
            && self.name.as_ref().is_none_or(|re| re.is_match(product.name()))
            && (q.any_tags.is_empty() || product.has_any_tag(q.any_tags.iter().map(String::as_str)))
            && product.has_all_tags(q.all_tags.iter().map(String::as_str))
            && q.more_tags_than.is_none_or(|n| product.tag_count() > n)
    }
}

/// Customer filter. Name patterns are always case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CustomerQuery {
    pub name_pattern: Option<String>,
    pub preference: Option<String>,
    pub without_purchases: bool,
}

impl CustomerQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name_matching(mut self, pattern: impl Into<String>) -> Self {
        self.name_pattern = Some(pattern.into());
        self
    }

    pub fn preference(mut self, preference: impl Into<String>) -> Self {
        self.preference = Some(preference.into());
        self
    }

    pub fn without_purchases(mut self) -> Self {
        self.without_purchases = true;
        self
    }
}

#[derive(Debug)]
pub struct CatalogService<S> {
    store: S,
    locks: Arc<ProductLocks>,
    lock_timeout: Duration,
}

impl<S> CatalogService<S> {
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
}

impl<S> CatalogService<S>
where
    S: LedgerStore,
{
    /// Register a product. A non-zero `opening_stock` is recorded as a restock
    /// entry in the same commit as the insert.
    #[instrument(skip(self, new), fields(name = %new.name))]
    pub fn register_product(
        &self,
        new: NewProduct,
        opening_stock: u32,
    ) -> Result<Product, CatalogError> {
        let product = Product::create(ProductId::new(), new)?;
        let insert = WriteSet::new().put_product(product.clone(), ExpectedVersion::Exact(0));

        let (product, writes) = match Quantity::new(opening_stock) {
            Ok(quantity) => {
                let plan = plan_restock(
                    &product,
                    quantity,
                    Some("opening stock".to_string()),
                    Utc::now(),
                )?;
                let writes = insert.merge(WriteSet::from(&plan));
                (plan.product, writes)
            }
            Err(_) => (product, insert),
        };

        self.store.commit(writes)?;
        info!(product_id = %product.id_typed(), stock = product.stock(), "product registered");
        Ok(product)
    }

    pub fn get_product(&self, id: ProductId) -> Result<Product, CatalogError> {
        Ok(self.store.get_product(id)?)
    }

    pub fn find_products(&self, query: &ProductQuery) -> Result<Vec<Product>, CatalogError> {
        let filter = query.compile()?;
        Ok(self
            .store
            .list_products()?
            .into_iter()
            .filter(|p| filter.matches(p))
            .collect())
    }

    /// Add `tag` to every product in `category`. Returns how many products changed;
    /// products already carrying the tag are left alone.
    #[instrument(skip(self))]
    pub fn tag_category(&self, category: &str, tag: &str) -> Result<usize, CatalogError> {
        if tag.trim().is_empty() {
            return Err(CatalogError::Invalid("tag cannot be empty".to_string()));
        }

        let mut touched = 0;
        for candidate in self.store.list_products()? {
            if candidate.category() != category {
                continue;
            }
            let id = candidate.id_typed();
            let _guard = self.locks.acquire(id, self.lock_timeout)?;
            let current = match self.store.get_product(id) {
                Ok(p) => p,
                // Purged since the scan.
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            if let Some(tagged) = current.with_tag(tag)? {
                self.store.commit(
                    WriteSet::new().put_product(tagged, ExpectedVersion::Exact(current.version())),
                )?;
                touched += 1;
            }
        }

        info!(touched, "category tagged");
        Ok(touched)
    }

    /// Delete every product whose stock is below `threshold`. Ledger history is
    /// kept. Returns the deleted ids.
    #[instrument(skip(self))]
    pub fn purge_low_stock(&self, threshold: u64) -> Result<Vec<ProductId>, CatalogError> {
        let mut purged = Vec::new();
        for candidate in self.store.list_products()? {
            if !candidate.is_low_stock(threshold) {
                continue;
            }
            let id = candidate.id_typed();
            let _guard = self.locks.acquire(id, self.lock_timeout)?;
            let current = match self.store.get_product(id) {
                Ok(p) => p,
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            // A restock may have landed between the scan and the lock.
            if !current.is_low_stock(threshold) {
                debug!(product_id = %id, "restocked since scan, kept");
                continue;
            }
            self.store.commit(
                WriteSet::new().delete_product(id, ExpectedVersion::Exact(current.version())),
            )?;
            purged.push(id);
        }

        info!(purged = purged.len(), "low-stock products purged");
        Ok(purged)
    }

    #[instrument(skip(self, new), fields(email = %new.email))]
    pub fn register_customer(&self, new: NewCustomer) -> Result<Customer, CatalogError> {
        let customer = Customer::register(CustomerId::new(), new)?;
        self.store.put_customer(customer.clone())?;
        info!(customer_id = %customer.id_typed(), "customer registered");
        Ok(customer)
    }

    pub fn find_customers(&self, query: &CustomerQuery) -> Result<Vec<Customer>, CatalogError> {
        let name = query
            .name_pattern
            .as_deref()
            .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
            .transpose()?;

        let buyers: HashSet<CustomerId> = if query.without_purchases {
            self.store
                .list_entries()?
                .iter()
                .filter(|e| e.is_sale())
                .filter_map(|e| e.customer_id())
                .collect()
        } else {
            HashSet::new()
        };

        Ok(self
            .store
            .list_customers()?
            .into_iter()
            .filter(|c| name.as_ref().is_none_or(|re| re.is_match(c.name())))
            .filter(|c| query.preference.as_deref().is_none_or(|p| c.prefers(p)))
            .filter(|c| !query.without_purchases || !buyers.contains(&c.id_typed()))
            .collect())
    }

    /// Delete the customer registered under `email` (compared case-insensitively).
    #[instrument(skip(self))]
    pub fn remove_customer_by_email(&self, email: &str) -> Result<Customer, CatalogError> {
        let email = email.trim().to_lowercase();
        let customer = self
            .store
            .list_customers()?
            .into_iter()
            .find(|c| c.email() == email)
            .ok_or_else(|| CatalogError::NotFound(format!("customer with email {email}")))?;
        self.store.remove_customer(customer.id_typed())?;
        info!(customer_id = %customer.id_typed(), "customer removed");
        Ok(customer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use stockledger_core::Money;
    use stockledger_inventory::{AdjustmentRequest, LedgerEntryKind};

    use crate::executor::AdjustmentExecutor;
    use crate::store::InMemoryLedgerStore;

    struct Fixture {
        catalog: CatalogService<Arc<InMemoryLedgerStore>>,
        executor: AdjustmentExecutor<Arc<InMemoryLedgerStore>>,
        store: Arc<InMemoryLedgerStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryLedgerStore::new());
        let locks = Arc::new(ProductLocks::new());
        Fixture {
            catalog: CatalogService::new(store.clone(), locks.clone()),
            executor: AdjustmentExecutor::new(store.clone(), locks),
            store,
        }
    }

    fn product(name: &str, category: &str, price: u64, tags: &[&str]) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            category: category.to_string(),
            unit_price: Money::new(price),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn customer(name: &str, email: &str, preferences: &[&str]) -> NewCustomer {
        NewCustomer {
            name: name.to_string(),
            email: email.to_string(),
            preferences: preferences.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// The store's sample catalog.
    fn seed(f: &Fixture) -> Vec<Product> {
        [
            (product("Chocolatina de borojó", "Snack", 4000, &["dulce", "energía"]), 35),
            (product("Chocolatina de cereza", "Snack", 5000, &["dulce", "endulzado"]), 20),
            (product("Mani salado", "Snack", 1000, &["salado", "mani"]), 4),
            (product("Jugo de naranja", "Bebida", 3000, &["natural", "fruta", "sin azúcar"]), 12),
            (product("Agua mineral", "Bebida", 2000, &[]), 0),
        ]
        .into_iter()
        .map(|(new, stock)| f.catalog.register_product(new, stock).unwrap())
        .collect()
    }

    fn names(products: &[Product]) -> Vec<&str> {
        let mut names: Vec<&str> = products.iter().map(Product::name).collect();
        names.sort();
        names
    }

    #[test]
    fn opening_stock_is_written_with_a_restock_entry() {
        let f = fixture();
        let p = f
            .catalog
            .register_product(product("Chocolatina de borojó", "Snack", 4000, &[]), 35)
            .unwrap();

        assert_eq!(p.stock(), 35);
        assert_eq!(p.version(), 2);
        assert_eq!(f.store.get_product(p.id_typed()).unwrap(), p);
        let entries = f.store.list_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind(), LedgerEntryKind::Restock);
        assert_eq!(entries[0].quantity().as_u64(), 35);
    }

    #[test]
    fn zero_opening_stock_writes_no_entry() {
        let f = fixture();
        let p = f
            .catalog
            .register_product(product("Agua mineral", "Bebida", 2000, &[]), 0)
            .unwrap();
        assert_eq!(p.stock(), 0);
        assert_eq!(p.version(), 1);
        assert!(f.store.list_entries().unwrap().is_empty());
    }

    #[test]
    fn invalid_product_is_rejected() {
        let f = fixture();
        let err = f
            .catalog
            .register_product(product("  ", "Snack", 1000, &[]), 1)
            .unwrap_err();
        assert!(matches!(err, CatalogError::Invalid(_)));
        assert!(f.store.list_products().unwrap().is_empty());
    }

    #[test]
    fn stock_and_category_filters_combine() {
        let f = fixture();
        seed(&f);

        let above = f.catalog.find_products(&ProductQuery::new().stock_above(10)).unwrap();
        assert_eq!(
            names(&above),
            ["Chocolatina de borojó", "Chocolatina de cereza", "Jugo de naranja"]
        );

        let snacks_low = f
            .catalog
            .find_products(&ProductQuery::new().category("Snack").stock_below(25))
            .unwrap();
        assert_eq!(names(&snacks_low), ["Chocolatina de cereza", "Mani salado"]);
    }

    #[test]
    fn name_pattern_respects_case_flag() {
        let f = fixture();
        seed(&f);

        let sensitive = f
            .catalog
            .find_products(&ProductQuery::new().name_matching("^chocolatina", false))
            .unwrap();
        assert!(sensitive.is_empty());

        let insensitive = f
            .catalog
            .find_products(&ProductQuery::new().name_matching("^chocolatina", true))
            .unwrap();
        assert_eq!(insensitive.len(), 2);
    }

    #[test]
    fn bad_pattern_is_invalid() {
        let f = fixture();
        let err = f
            .catalog
            .find_products(&ProductQuery::new().name_matching("(unclosed", false))
            .unwrap_err();
        assert!(matches!(err, CatalogError::Invalid(_)));
    }

    #[test]
    fn tag_filters() {
        let f = fixture();
        seed(&f);

        let any = f
            .catalog
            .find_products(&ProductQuery::new().any_tag("salado").any_tag("natural"))
            .unwrap();
        assert_eq!(names(&any), ["Jugo de naranja", "Mani salado"]);

        let all = f
            .catalog
            .find_products(&ProductQuery::new().all_tags(["dulce", "energía"]))
            .unwrap();
        assert_eq!(names(&all), ["Chocolatina de borojó"]);

        let many = f.catalog.find_products(&ProductQuery::new().more_tags_than(2)).unwrap();
        assert_eq!(names(&many), ["Jugo de naranja"]);
    }

    #[test]
    fn tag_category_is_idempotent() {
        let f = fixture();
        seed(&f);

        assert_eq!(f.catalog.tag_category("Snack", "oferta").unwrap(), 3);
        assert_eq!(f.catalog.tag_category("Snack", "oferta").unwrap(), 0);

        let tagged = f.catalog.find_products(&ProductQuery::new().any_tag("oferta")).unwrap();
        assert_eq!(tagged.len(), 3);
        assert!(tagged.iter().all(|p| p.category() == "Snack"));
    }

    #[test]
    fn tagging_keeps_stock_intact_for_later_sales() {
        let f = fixture();
        let p = f
            .catalog
            .register_product(product("Mani salado", "Snack", 1000, &[]), 4)
            .unwrap();
        f.catalog.tag_category("Snack", "oferta").unwrap();

        let outcome = f
            .executor
            .execute(AdjustmentRequest::Sale {
                product_id: p.id_typed(),
                quantity: Quantity::new(4).unwrap(),
                total: None,
                customer_id: None,
            })
            .unwrap();
        assert_eq!(outcome.product.stock(), 0);
        assert!(outcome.product.has_tag("oferta"));
    }

    #[test]
    fn purge_removes_only_low_stock_and_keeps_history() {
        let f = fixture();
        seed(&f);
        let entries_before = f.store.list_entries().unwrap().len();

        let purged = f.catalog.purge_low_stock(5).unwrap();
        assert_eq!(purged.len(), 2);

        let left = f.store.list_products().unwrap();
        assert_eq!(
            names(&left),
            ["Chocolatina de borojó", "Chocolatina de cereza", "Jugo de naranja"]
        );
        assert_eq!(f.store.list_entries().unwrap().len(), entries_before);
    }

    #[test]
    fn customers_register_and_filter() {
        let f = fixture();
        let mario = f
            .catalog
            .register_customer(customer("Mario Mendoza", "Mario@Email.com", &["dulce"]))
            .unwrap();
        f.catalog
            .register_customer(customer("María Sánchez", "maria@email.com", &["natural"]))
            .unwrap();
        let julian = customer("Julián Pérez", "julian@email.com", &["dulce", "natural"]);
        f.catalog.register_customer(julian).unwrap();

        let mar = f.catalog.find_customers(&CustomerQuery::new().name_matching("^mar")).unwrap();
        assert_eq!(mar.len(), 2);

        let sweet = f.catalog.find_customers(&CustomerQuery::new().preference("dulce")).unwrap();
        assert_eq!(sweet.len(), 2);

        let snack = f
            .catalog
            .register_product(product("Chocolatina de borojó", "Snack", 4000, &[]), 5)
            .unwrap();
        f.executor
            .execute(AdjustmentRequest::Sale {
                product_id: snack.id_typed(),
                quantity: Quantity::new(1).unwrap(),
                total: None,
                customer_id: Some(mario.id_typed()),
            })
            .unwrap();

        let idle = f.catalog.find_customers(&CustomerQuery::new().without_purchases()).unwrap();
        assert_eq!(idle.len(), 2);
        assert!(idle.iter().all(|c| c.id_typed() != mario.id_typed()));
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let f = fixture();
        f.catalog
            .register_customer(customer("Mario Mendoza", "mario@email.com", &[]))
            .unwrap();
        let err = f
            .catalog
            .register_customer(customer("Otro Mario", "MARIO@email.com", &[]))
            .unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyExists(_)));
    }

    #[test]
    fn remove_customer_by_email() {
        let f = fixture();
        let mario = f
            .catalog
            .register_customer(customer("Mario Mendoza", "mario@email.com", &[]))
            .unwrap();

        let removed = f.catalog.remove_customer_by_email(" MARIO@email.com ").unwrap();
        assert_eq!(removed.id_typed(), mario.id_typed());
        assert!(f.store.list_customers().unwrap().is_empty());

        let again = f.catalog.remove_customer_by_email("mario@email.com").unwrap_err();
        assert!(matches!(again, CatalogError::NotFound(_)));
    }
}
