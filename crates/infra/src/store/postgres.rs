//! Postgres-backed ledger store.
//!
//! Every [`WriteSet`] is applied inside one SQL transaction. Versioned product
//! writes use `UPDATE ... WHERE version = $n`, so a concurrent writer makes the
//! update touch zero rows and the whole transaction is rolled back.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` (products), `AlreadyExists` (others) |
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Conflict` |
//! | Database (check constraint violation) | `23514` | `Backend` |
//! | PoolTimedOut | N/A | `Timeout` |
//! | Other | N/A | `Backend` |

use std::future::Future;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tokio::runtime::Handle;
use tracing::instrument;
use uuid::Uuid;

use stockledger_core::{
    AggregateRoot, CustomerId, ExpectedVersion, LedgerEntryId, Money, ProductId, Quantity,
};
use stockledger_inventory::{Customer, LedgerEntry, LedgerEntryKind, NewCustomer, Product};

use super::r#trait::{LedgerStore, StoreError, Write, WriteSet};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id          UUID PRIMARY KEY,
        name        TEXT NOT NULL,
        category    TEXT NOT NULL,
        unit_price  BIGINT NOT NULL CHECK (unit_price >= 0),
        stock       BIGINT NOT NULL CHECK (stock >= 0),
        tags        TEXT[] NOT NULL DEFAULT '{}',
        version     BIGINT NOT NULL CHECK (version > 0)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ledger_entries (
        id          UUID PRIMARY KEY,
        kind        TEXT NOT NULL CHECK (kind IN ('sale', 'restock')),
        product_id  UUID NOT NULL,
        quantity    BIGINT NOT NULL CHECK (quantity > 0),
        occurred_at TIMESTAMPTZ NOT NULL,
        total       BIGINT,
        customer_id UUID,
        reference   TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS ledger_entries_product_idx ON ledger_entries (product_id)",
    "CREATE INDEX IF NOT EXISTS ledger_entries_customer_idx ON ledger_entries (customer_id)",
    "CREATE INDEX IF NOT EXISTS products_category_idx ON products (category)",
    r#"
    CREATE TABLE IF NOT EXISTS customers (
        id          UUID PRIMARY KEY,
        name        TEXT NOT NULL,
        email       TEXT NOT NULL UNIQUE,
        preferences TEXT[] NOT NULL DEFAULT '{}'
    )
    "#,
];

/// Durable ledger store on PostgreSQL.
///
/// The [`LedgerStore`] trait is synchronous; calls are driven on the tokio
/// runtime captured at construction. Call it from blocking threads (e.g.
/// `spawn_blocking`), never from inside an async task.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
    runtime: Handle,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool, runtime: Handle) -> Self {
        Self { pool, runtime }
    }

    /// Connect, create the schema if needed, and bind to the current runtime.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool, Handle::current());
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create tables and indexes (idempotent).
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    fn block_on<F, T>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        self.runtime.block_on(fut)
    }

    #[instrument(skip(self, writes), fields(writes = writes.len()), err)]
    pub async fn commit_async(&self, writes: WriteSet) -> Result<(), StoreError> {
        if writes.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for write in writes.into_writes() {
            // An early return drops `tx`, which rolls the transaction back.
            apply_write(&mut tx, write).await?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    async fn fetch_product(&self, id: ProductId) -> Result<Product, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, category, unit_price, stock, tags, version \
             FROM products WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_product", e))?;

        match row {
            Some(row) => product_from_row(&row),
            None => Err(StoreError::NotFound(format!("product {id}"))),
        }
    }

    async fn fetch_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, category, unit_price, stock, tags, version FROM products ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_products", e))?;

        rows.iter().map(product_from_row).collect()
    }

    async fn fetch_entry(&self, id: LedgerEntryId) -> Result<LedgerEntry, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, kind, product_id, quantity, occurred_at, total, customer_id, reference
            FROM ledger_entries
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_entry", e))?;

        match row {
            Some(row) => entry_from_row(&row),
            None => Err(StoreError::NotFound(format!("ledger entry {id}"))),
        }
    }

    async fn fetch_entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, product_id, quantity, occurred_at, total, customer_id, reference
            FROM ledger_entries
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_entries", e))?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn fetch_customer(&self, id: CustomerId) -> Result<Customer, StoreError> {
        let row = sqlx::query("SELECT id, name, email, preferences FROM customers WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_customer", e))?;

        match row {
            Some(row) => customer_from_row(&row),
            None => Err(StoreError::NotFound(format!("customer {id}"))),
        }
    }

    async fn fetch_customers(&self) -> Result<Vec<Customer>, StoreError> {
        let rows = sqlx::query("SELECT id, name, email, preferences FROM customers ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_customers", e))?;

        rows.iter().map(customer_from_row).collect()
    }

    async fn upsert_customer(&self, customer: Customer) -> Result<(), StoreError> {
        let preferences: Vec<String> = customer.preferences().iter().cloned().collect();
        sqlx::query(
            r#"
            INSERT INTO customers (id, name, email, preferences)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, email = EXCLUDED.email, preferences = EXCLUDED.preferences
            "#,
        )
        .bind(customer.id_typed().as_uuid())
        .bind(customer.name())
        .bind(customer.email())
        .bind(&preferences)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::AlreadyExists(format!("customer email {}", customer.email()))
            } else {
                map_sqlx_error("put_customer", e)
            }
        })?;
        Ok(())
    }

    async fn delete_customer(&self, id: CustomerId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM customers WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("remove_customer", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("customer {id}")));
        }
        Ok(())
    }
}

async fn apply_write(tx: &mut Transaction<'_, Postgres>, write: Write) -> Result<(), StoreError> {
    match write {
        Write::PutProduct { product, expected } => put_product(tx, &product, expected).await,
        Write::DeleteProduct { id, expected } => delete_product(tx, id, expected).await,
        Write::AppendEntry(entry) => insert_entry(tx, &entry).await,
        Write::RemoveEntry(id) => {
            let result = sqlx::query("DELETE FROM ledger_entries WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("remove_entry", e))?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("ledger entry {id}")));
            }
            Ok(())
        }
    }
}

async fn put_product(
    tx: &mut Transaction<'_, Postgres>,
    product: &Product,
    expected: ExpectedVersion,
) -> Result<(), StoreError> {
    let id = product.id_typed();
    let tags: Vec<String> = product.tags().iter().cloned().collect();
    let unit_price = to_i64("unit_price", product.unit_price().minor_units())?;
    let stock = to_i64("stock", product.stock())?;
    let version = to_i64("version", product.version())?;

    let result = match expected {
        ExpectedVersion::Exact(0) => sqlx::query(
            r#"
            INSERT INTO products (id, name, category, unit_price, stock, tags, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id.as_uuid())
        .bind(product.name())
        .bind(product.category())
        .bind(unit_price)
        .bind(stock)
        .bind(&tags)
        .bind(version)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("product {id}: expected Exact(0), already stored"))
            } else {
                map_sqlx_error("insert_product", e)
            }
        })?,
        ExpectedVersion::Exact(current) => sqlx::query(
            r#"
            UPDATE products
            SET name = $2, category = $3, unit_price = $4, stock = $5, tags = $6, version = $7
            WHERE id = $1 AND version = $8
            "#,
        )
        .bind(id.as_uuid())
        .bind(product.name())
        .bind(product.category())
        .bind(unit_price)
        .bind(stock)
        .bind(&tags)
        .bind(version)
        .bind(to_i64("expected_version", current)?)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?,
        ExpectedVersion::Any => sqlx::query(
            r#"
            INSERT INTO products (id, name, category, unit_price, stock, tags, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, category = EXCLUDED.category,
                unit_price = EXCLUDED.unit_price, stock = EXCLUDED.stock,
                tags = EXCLUDED.tags, version = EXCLUDED.version
            "#,
        )
        .bind(id.as_uuid())
        .bind(product.name())
        .bind(product.category())
        .bind(unit_price)
        .bind(stock)
        .bind(&tags)
        .bind(version)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_product", e))?,
    };

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict(format!(
            "product {id}: expected {expected:?}, stored version differs"
        )));
    }
    Ok(())
}

async fn delete_product(
    tx: &mut Transaction<'_, Postgres>,
    id: ProductId,
    expected: ExpectedVersion,
) -> Result<(), StoreError> {
    let result = match expected {
        ExpectedVersion::Any => sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut **tx)
            .await,
        ExpectedVersion::Exact(v) => {
            sqlx::query("DELETE FROM products WHERE id = $1 AND version = $2")
                .bind(id.as_uuid())
                .bind(to_i64("expected_version", v)?)
                .execute(&mut **tx)
                .await
        }
    }
    .map_err(|e| map_sqlx_error("delete_product", e))?;

    if result.rows_affected() > 0 {
        return Ok(());
    }

    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
        .bind(id.as_uuid())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("delete_product", e))?;
    if exists {
        Err(StoreError::Conflict(format!(
            "product {id}: expected {expected:?}, stored version differs"
        )))
    } else {
        Err(StoreError::NotFound(format!("product {id}")))
    }
}

async fn insert_entry(
    tx: &mut Transaction<'_, Postgres>,
    entry: &LedgerEntry,
) -> Result<(), StoreError> {
    let id = entry.id_typed();
    let total = entry
        .total()
        .map(|t| to_i64("total", t.minor_units()))
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO ledger_entries
            (id, kind, product_id, quantity, occurred_at, total, customer_id, reference)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(id.as_uuid())
    .bind(entry.kind().as_str())
    .bind(entry.product_id().as_uuid())
    .bind(i64::from(entry.quantity().get()))
    .bind(entry.occurred_at())
    .bind(total)
    .bind(entry.customer_id().map(Uuid::from))
    .bind(entry.reference())
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            StoreError::AlreadyExists(format!("ledger entry {id}"))
        } else {
            map_sqlx_error("append_entry", e)
        }
    })?;
    Ok(())
}

impl LedgerStore for PostgresLedgerStore {
    fn get_product(&self, id: ProductId) -> Result<Product, StoreError> {
        self.block_on(self.fetch_product(id))
    }

    fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        self.block_on(self.fetch_products())
    }

    fn get_entry(&self, id: LedgerEntryId) -> Result<LedgerEntry, StoreError> {
        self.block_on(self.fetch_entry(id))
    }

    fn list_entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        self.block_on(self.fetch_entries())
    }

    fn get_customer(&self, id: CustomerId) -> Result<Customer, StoreError> {
        self.block_on(self.fetch_customer(id))
    }

    fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
        self.block_on(self.fetch_customers())
    }

    fn put_customer(&self, customer: Customer) -> Result<(), StoreError> {
        self.block_on(self.upsert_customer(customer))
    }

    fn remove_customer(&self, id: CustomerId) -> Result<(), StoreError> {
        self.block_on(self.delete_customer(id))
    }

    fn commit(&self, writes: WriteSet) -> Result<(), StoreError> {
        self.block_on(self.commit_async(writes))
    }
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    let id: Uuid = get(row, "id")?;
    let unit_price: i64 = get(row, "unit_price")?;
    let stock: i64 = get(row, "stock")?;
    let version: i64 = get(row, "version")?;
    let tags: Vec<String> = get(row, "tags")?;

    Ok(Product::restore(
        ProductId::from_uuid(id),
        get(row, "name")?,
        get(row, "category")?,
        Money::new(to_u64("unit_price", unit_price)?),
        to_u64("stock", stock)?,
        tags,
        to_u64("version", version)?,
    ))
}

fn entry_from_row(row: &PgRow) -> Result<LedgerEntry, StoreError> {
    let id: Uuid = get(row, "id")?;
    let kind: String = get(row, "kind")?;
    let product_id: Uuid = get(row, "product_id")?;
    let quantity: i64 = get(row, "quantity")?;
    let occurred_at: DateTime<Utc> = get(row, "occurred_at")?;
    let total: Option<i64> = get(row, "total")?;
    let customer_id: Option<Uuid> = get(row, "customer_id")?;
    let reference: Option<String> = get(row, "reference")?;

    let kind: LedgerEntryKind = kind
        .parse()
        .map_err(|e| StoreError::Backend(format!("ledger entry {id}: {e}")))?;
    let quantity = u32::try_from(quantity)
        .ok()
        .and_then(|q| Quantity::new(q).ok())
        .ok_or_else(|| StoreError::Backend(format!("ledger entry {id}: bad quantity {quantity}")))?;
    let total = total
        .map(|t| to_u64("total", t).map(Money::new))
        .transpose()?;

    Ok(LedgerEntry::restore(
        LedgerEntryId::from_uuid(id),
        kind,
        ProductId::from_uuid(product_id),
        quantity,
        occurred_at,
        total,
        customer_id.map(CustomerId::from_uuid),
        reference,
    ))
}

fn customer_from_row(row: &PgRow) -> Result<Customer, StoreError> {
    let id: Uuid = get(row, "id")?;
    Customer::register(
        CustomerId::from_uuid(id),
        NewCustomer {
            name: get(row, "name")?,
            email: get(row, "email")?,
            preferences: get(row, "preferences")?,
        },
    )
    .map_err(|e| StoreError::Backend(format!("customer {id}: {e}")))
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("failed to read {column}: {e}")))
}

fn to_i64(column: &str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Backend(format!("{column} out of range: {value}")))
}

fn to_u64(column: &str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Backend(format!("{column} is negative: {value}")))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Timeout(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_reported_as_timeout() {
        let err = map_sqlx_error("commit", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Timeout(msg) if msg.contains("commit")));
    }

    #[test]
    fn out_of_range_values_are_backend_errors() {
        assert!(matches!(to_i64("stock", u64::MAX), Err(StoreError::Backend(_))));
        assert!(matches!(to_u64("stock", -1), Err(StoreError::Backend(_))));
        assert_eq!(to_u64("stock", 35).unwrap(), 35);
    }

    #[test]
    fn returns_are_never_persisted() {
        // The table only admits kinds that are actually stored.
        assert!(SCHEMA[1].contains("kind IN ('sale', 'restock')"));
    }
}
