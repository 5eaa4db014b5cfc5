//! Read-only aggregations over the ledger and catalog.
//!
//! Reports read a snapshot through the store's list scans; they take no product
//! locks and never write.

use std::collections::{BTreeMap, HashMap};

use chrono::Datelike;
use serde::Serialize;
use tracing::instrument;

use stockledger_core::{CustomerId, Money, ProductId};
use stockledger_inventory::{Customer, Product};

use crate::store::{LedgerStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSales {
    pub product_id: ProductId,
    /// `None` once the product has been purged from the catalog.
    pub name: Option<String>,
    pub units_sold: u64,
    pub revenue: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerSummary {
    pub id: CustomerId,
    pub name: String,
    pub email: String,
}

impl From<&Customer> for CustomerSummary {
    fn from(c: &Customer) -> Self {
        Self {
            id: c.id_typed(),
            name: c.name().to_string(),
            email: c.email().to_string(),
        }
    }
}

/// Customers sharing the same number of purchases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseGroup {
    pub purchases: u64,
    pub customers: Vec<CustomerSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlySales {
    pub year: i32,
    pub month: u32,
    pub sales: u64,
    pub units: u64,
    pub revenue: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryAverage {
    pub category: String,
    /// Mean unit price in minor units.
    pub average_price: f64,
    pub products: usize,
}

#[derive(Debug, Clone)]
pub struct ReportService<S> {
    store: S,
}

impl<S> ReportService<S>
where
    S: LedgerStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Units sold per product, best first. Ties go to the lower product id.
    #[instrument(skip(self))]
    pub fn best_sellers(&self, limit: usize) -> Result<Vec<ProductSales>, StoreError> {
        let mut totals: HashMap<ProductId, (u64, u64)> = HashMap::new();
        for entry in self.store.list_entries()?.iter().filter(|e| e.is_sale()) {
            let slot = totals.entry(entry.product_id()).or_default();
            slot.0 += entry.quantity().as_u64();
            slot.1 = slot
                .1
                .saturating_add(entry.total().map(Money::minor_units).unwrap_or(0));
        }

        let names: HashMap<ProductId, String> = self
            .store
            .list_products()?
            .into_iter()
            .map(|p| (p.id_typed(), p.name().to_string()))
            .collect();

        let mut rows: Vec<ProductSales> = totals
            .into_iter()
            .map(|(product_id, (units_sold, revenue))| ProductSales {
                product_id,
                name: names.get(&product_id).cloned(),
                units_sold,
                revenue: Money::new(revenue),
            })
            .collect();
        rows.sort_by(|a, b| {
            b.units_sold
                .cmp(&a.units_sold)
                .then(a.product_id.cmp(&b.product_id))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    /// Customers grouped by how many sales reference them, fewest first.
    /// Customers without purchases form the `0` group.
    #[instrument(skip(self))]
    pub fn customers_by_purchase_count(&self) -> Result<Vec<PurchaseGroup>, StoreError> {
        let mut counts: HashMap<CustomerId, u64> = HashMap::new();
        for entry in self.store.list_entries()? {
            if let (true, Some(customer)) = (entry.is_sale(), entry.customer_id()) {
                *counts.entry(customer).or_default() += 1;
            }
        }

        let mut groups: BTreeMap<u64, Vec<CustomerSummary>> = BTreeMap::new();
        for customer in self.store.list_customers()? {
            let purchases = counts.get(&customer.id_typed()).copied().unwrap_or(0);
            groups
                .entry(purchases)
                .or_default()
                .push(CustomerSummary::from(&customer));
        }

        Ok(groups
            .into_iter()
            .map(|(purchases, customers)| PurchaseGroup {
                purchases,
                customers,
            })
            .collect())
    }

    /// Sales per calendar month (UTC), oldest first.
    #[instrument(skip(self))]
    pub fn monthly_sales(&self) -> Result<Vec<MonthlySales>, StoreError> {
        let mut months: BTreeMap<(i32, u32), (u64, u64, u64)> = BTreeMap::new();
        for entry in self.store.list_entries()?.iter().filter(|e| e.is_sale()) {
            let at = entry.occurred_at();
            let slot = months.entry((at.year(), at.month())).or_default();
            slot.0 += 1;
            slot.1 += entry.quantity().as_u64();
            slot.2 = slot
                .2
                .saturating_add(entry.total().map(Money::minor_units).unwrap_or(0));
        }

        Ok(months
            .into_iter()
            .map(|((year, month), (sales, units, revenue))| MonthlySales {
                year,
                month,
                sales,
                units,
                revenue: Money::new(revenue),
            })
            .collect())
    }

    /// Mean unit price per category, alphabetical by category.
    #[instrument(skip(self))]
    pub fn average_price_by_category(&self) -> Result<Vec<CategoryAverage>, StoreError> {
        let mut sums: BTreeMap<String, (u128, usize)> = BTreeMap::new();
        for product in self.store.list_products()? {
            let slot = sums.entry(product.category().to_string()).or_default();
            slot.0 += u128::from(product.unit_price().minor_units());
            slot.1 += 1;
        }

        Ok(sums
            .into_iter()
            .map(|(category, (sum, products))| CategoryAverage {
                category,
                average_price: sum as f64 / products as f64,
                products,
            })
            .collect())
    }

    /// The `limit` products with the most stock.
    #[instrument(skip(self))]
    pub fn top_stocked(&self, limit: usize) -> Result<Vec<Product>, StoreError> {
        let mut products = self.store.list_products()?;
        products.sort_by(|a, b| {
            b.stock()
                .cmp(&a.stock())
                .then(a.id_typed().cmp(&b.id_typed()))
        });
        products.truncate(limit);
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use stockledger_core::{ExpectedVersion, LedgerEntryId, Quantity};
    use stockledger_inventory::{LedgerEntry, NewCustomer, NewProduct};

    use crate::store::{InMemoryLedgerStore, WriteSet};

    fn add_product(
        store: &InMemoryLedgerStore,
        name: &str,
        category: &str,
        price: u64,
        stock: u64,
    ) -> Product {
        let created = Product::create(
            ProductId::new(),
            NewProduct {
                name: name.to_string(),
                category: category.to_string(),
                unit_price: Money::new(price),
                tags: vec![],
            },
        )
        .unwrap();
        let stocked = Product::restore(
            created.id_typed(),
            created.name().to_string(),
            created.category().to_string(),
            created.unit_price(),
            stock,
            Vec::<String>::new(),
            1,
        );
        store
            .commit(WriteSet::new().put_product(stocked.clone(), ExpectedVersion::Exact(0)))
            .unwrap();
        stocked
    }

    fn add_customer(store: &InMemoryLedgerStore, name: &str, email: &str) -> Customer {
        let customer = Customer::register(
            CustomerId::new(),
            NewCustomer {
                name: name.to_string(),
                email: email.to_string(),
                preferences: vec![],
            },
        )
        .unwrap();
        store.put_customer(customer.clone()).unwrap();
        customer
    }

    fn record_sale(
        store: &InMemoryLedgerStore,
        product: &Product,
        units: u32,
        customer: Option<&Customer>,
        (year, month, day): (i32, u32, u32),
    ) {
        let entry = LedgerEntry::restore(
            LedgerEntryId::new(),
            stockledger_inventory::LedgerEntryKind::Sale,
            product.id_typed(),
            Quantity::new(units).unwrap(),
            Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap(),
            product.unit_price().checked_mul(u64::from(units)),
            customer.map(Customer::id_typed),
            None,
        );
        store.append_entry(entry).unwrap();
    }

    struct Sample {
        store: Arc<InMemoryLedgerStore>,
        borojo: Product,
        cereza: Product,
        jugo: Product,
        mario: Customer,
        maria: Customer,
        julian: Customer,
    }

    fn sample() -> Sample {
        let store = Arc::new(InMemoryLedgerStore::new());
        let borojo = add_product(&store, "Chocolatina de borojó", "Snack", 4000, 35);
        let cereza = add_product(&store, "Chocolatina de cereza", "Snack", 5000, 20);
        let jugo = add_product(&store, "Jugo de naranja", "Bebida", 3000, 12);
        let mario = add_customer(&store, "Mario Mendoza", "mario@email.com");
        let maria = add_customer(&store, "María Sánchez", "maria@email.com");
        let julian = add_customer(&store, "Julián Pérez", "julian@email.com");

        record_sale(&store, &borojo, 2, Some(&mario), (2024, 3, 5));
        record_sale(&store, &borojo, 3, Some(&maria), (2024, 3, 20));
        record_sale(&store, &cereza, 1, Some(&mario), (2024, 4, 2));
        record_sale(&store, &jugo, 4, None, (2024, 4, 9));

        Sample {
            store,
            borojo,
            cereza,
            jugo,
            mario,
            maria,
            julian,
        }
    }

    #[test]
    fn best_sellers_rank_by_units() {
        let s = sample();
        let reports = ReportService::new(s.store.clone());

        let rows = reports.best_sellers(2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].product_id, s.borojo.id_typed());
        assert_eq!(rows[0].units_sold, 5);
        assert_eq!(rows[0].revenue, Money::new(20_000));
        assert_eq!(rows[1].product_id, s.jugo.id_typed());
        assert_eq!(rows[1].name.as_deref(), Some("Jugo de naranja"));
    }

    #[test]
    fn best_sellers_survive_purged_products() {
        let s = sample();
        s.store
            .commit(WriteSet::new().delete_product(s.jugo.id_typed(), ExpectedVersion::Any))
            .unwrap();

        let rows = ReportService::new(s.store.clone()).best_sellers(10).unwrap();
        let jugo = rows.iter().find(|r| r.product_id == s.jugo.id_typed()).unwrap();
        assert_eq!(jugo.name, None);
        assert_eq!(jugo.units_sold, 4);
    }

    #[test]
    fn customers_grouped_by_purchases() {
        let s = sample();
        let groups = ReportService::new(s.store.clone())
            .customers_by_purchase_count()
            .unwrap();

        let ids = |g: &PurchaseGroup| g.customers.iter().map(|c| c.id).collect::<Vec<_>>();
        assert_eq!(groups.len(), 3);
        assert_eq!((groups[0].purchases, ids(&groups[0])), (0, vec![s.julian.id_typed()]));
        assert_eq!((groups[1].purchases, ids(&groups[1])), (1, vec![s.maria.id_typed()]));
        assert_eq!((groups[2].purchases, ids(&groups[2])), (2, vec![s.mario.id_typed()]));
    }

    #[test]
    fn sales_totals_per_month() {
        let s = sample();
        let months = ReportService::new(s.store.clone()).monthly_sales().unwrap();

        assert_eq!(
            months,
            vec![
                MonthlySales {
                    year: 2024,
                    month: 3,
                    sales: 2,
                    units: 5,
                    revenue: Money::new(20_000),
                },
                MonthlySales {
                    year: 2024,
                    month: 4,
                    sales: 2,
                    units: 5,
                    revenue: Money::new(17_000),
                },
            ]
        );
    }

    #[test]
    fn average_price_per_category() {
        let s = sample();
        let averages = ReportService::new(s.store.clone())
            .average_price_by_category()
            .unwrap();

        assert_eq!(averages.len(), 2);
        assert_eq!(averages[0].category, "Bebida");
        assert_eq!(averages[0].average_price, 3000.0);
        assert_eq!(averages[1].category, "Snack");
        assert_eq!(averages[1].average_price, 4500.0);
        assert_eq!(averages[1].products, 2);
    }

    #[test]
    fn top_stocked_descending() {
        let s = sample();
        let top = ReportService::new(s.store.clone()).top_stocked(2).unwrap();
        let ids: Vec<_> = top.iter().map(Product::id_typed).collect();
        assert_eq!(ids, vec![s.borojo.id_typed(), s.cereza.id_typed()]);
    }

    #[test]
    fn rows_serialize_with_plain_field_names() {
        let s = sample();
        let months = ReportService::new(s.store.clone()).monthly_sales().unwrap();
        let json = serde_json::to_value(&months[0]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "year": 2024,
                "month": 3,
                "sales": 2,
                "units": 5,
                "revenue": 20000
            })
        );
    }

    #[test]
    fn empty_store_reports_nothing() {
        let reports = ReportService::new(InMemoryLedgerStore::new());
        assert!(reports.best_sellers(3).unwrap().is_empty());
        assert!(reports.customers_by_purchase_count().unwrap().is_empty());
        assert!(reports.monthly_sales().unwrap().is_empty());
        assert!(reports.average_price_by_category().unwrap().is_empty());
        assert!(reports.top_stocked(3).unwrap().is_empty());
    }
}
