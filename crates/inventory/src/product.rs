use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use stockledger_core::{AggregateRoot, DomainError, DomainResult, Money, ProductId};

/// Largest stock level a product can reach. Stock is persisted as a signed
/// 64-bit integer.
pub const MAX_STOCK: u64 = i64::MAX as u64;

/// Input for registering a product in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub category: String,
    pub unit_price: Money,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Aggregate root: Product.
///
/// `stock` can only change through adjustment planning (see [`crate::adjustment`]),
/// which always pairs the change with a ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    name: String,
    category: String,
    unit_price: Money,
    stock: u64,
    tags: BTreeSet<String>,
    version: u64,
}

impl Product {
    /// Build a new product with zero stock.
    ///
    /// The returned value is at version 1, i.e. the version it will have once
    /// inserted (stores insert with `ExpectedVersion::Exact(0)`).
    pub fn create(id: ProductId, new: NewProduct) -> DomainResult<Self> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        let category = new.category.trim();
        if category.is_empty() {
            return Err(DomainError::validation("category cannot be empty"));
        }
        if new.unit_price > Money::MAX {
            return Err(DomainError::validation(format!(
                "unit price cannot exceed {}",
                Money::MAX
            )));
        }

        Ok(Self {
            id,
            name: name.to_string(),
            category: category.to_string(),
            unit_price: new.unit_price,
            stock: 0,
            tags: normalize_tags(new.tags),
            version: 1,
        })
    }

    /// Rebuild a product from persisted columns.
    ///
    /// Only storage adapters should call this.
    pub fn restore(
        id: ProductId,
        name: String,
        category: String,
        unit_price: Money,
        stock: u64,
        tags: impl IntoIterator<Item = String>,
        version: u64,
    ) -> Self {
        Self {
            id,
            name,
            category,
            unit_price,
            stock,
            tags: normalize_tags(tags),
            version,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn stock(&self) -> u64 {
        self.stock
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn has_all_tags<'a>(&self, tags: impl IntoIterator<Item = &'a str>) -> bool {
        tags.into_iter().all(|t| self.tags.contains(t))
    }

    pub fn has_any_tag<'a>(&self, tags: impl IntoIterator<Item = &'a str>) -> bool {
        tags.into_iter().any(|t| self.tags.contains(t))
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Value of the units on hand at the current unit price.
    pub fn stock_value(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.stock)
    }

    pub fn is_low_stock(&self, threshold: u64) -> bool {
        self.stock < threshold
    }

    /// Next revision carrying `tag`, or `None` when the tag is already present.
    pub fn with_tag(&self, tag: &str) -> DomainResult<Option<Product>> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(DomainError::validation("tag cannot be empty"));
        }
        if self.tags.contains(tag) {
            return Ok(None);
        }
        let mut next = self.next_revision();
        next.tags.insert(tag.to_string());
        Ok(Some(next))
    }

    pub(crate) fn with_stock(&self, stock: u64) -> Product {
        let mut next = self.next_revision();
        next.stock = stock;
        next
    }

    fn next_revision(&self) -> Product {
        let mut next = self.clone();
        next.version += 1;
        next
    }
}

impl AggregateRoot for Product {
    fn version(&self) -> u64 {
        self.version
    }
}

fn normalize_tags(tags: impl IntoIterator<Item = String>) -> BTreeSet<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
