use serde::{Deserialize, Deserializer};

use stockledger_core::{CustomerId, Money};
use stockledger_infra::{CustomerQuery, ProductQuery};
use stockledger_inventory::NewProduct;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    #[serde(flatten)]
    pub product: NewProduct,
    #[serde(default)]
    pub opening_stock: u32,
}

#[derive(Debug, Deserialize)]
pub struct SellBody {
    pub quantity: u32,
    #[serde(default)]
    pub total: Option<Money>,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
}

#[derive(Debug, Deserialize)]
pub struct RestockBody {
    pub quantity: u32,
    #[serde(default)]
    pub batch_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TagCategoryRequest {
    pub category: String,
    pub tag: String,
}

// -------------------------
// Query strings
// -------------------------

/// `GET /products` filters. Tag lists are comma separated
/// (`?any_tags=dulce,salado`).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProductFilterParams {
    pub stock_above: Option<u64>,
    pub stock_below: Option<u64>,
    pub category: Option<String>,
    pub name: Option<String>,
    pub case_insensitive: bool,
    #[serde(deserialize_with = "comma_separated")]
    pub any_tags: Vec<String>,
    #[serde(deserialize_with = "comma_separated")]
    pub all_tags: Vec<String>,
    pub more_tags_than: Option<usize>,
}

impl From<ProductFilterParams> for ProductQuery {
    fn from(p: ProductFilterParams) -> Self {
        ProductQuery {
            stock_above: p.stock_above,
            stock_below: p.stock_below,
            category: p.category,
            name_pattern: p.name,
            case_insensitive: p.case_insensitive,
            any_tags: p.any_tags,
            all_tags: p.all_tags,
            more_tags_than: p.more_tags_than,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CustomerFilterParams {
    pub name: Option<String>,
    pub preference: Option<String>,
    pub without_purchases: bool,
}

impl From<CustomerFilterParams> for CustomerQuery {
    fn from(p: CustomerFilterParams) -> Self {
        CustomerQuery {
            name_pattern: p.name,
            preference: p.preference,
            without_purchases: p.without_purchases,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EmailParam {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ThresholdParam {
    pub below: u64,
}

#[derive(Debug, Deserialize)]
pub struct LimitParam {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    3
}

fn comma_separated<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_lists_split_on_commas() {
        let params: ProductFilterParams = serde_json::from_value(serde_json::json!({
            "any_tags": "dulce, salado,,",
            "stock_above": 10,
        }))
        .unwrap();
        assert_eq!(params.any_tags, vec!["dulce", "salado"]);
        assert!(params.all_tags.is_empty());

        let query = ProductQuery::from(params);
        assert_eq!(query.stock_above, Some(10));
    }

    #[test]
    fn create_product_flattens_fields() {
        let body: CreateProductRequest = serde_json::from_value(serde_json::json!({
            "name": "Mani salado",
            "category": "Snack",
            "unit_price": 1000,
            "tags": ["salado"],
            "opening_stock": 4
        }))
        .unwrap();
        assert_eq!(body.product.name, "Mani salado");
        assert_eq!(body.opening_stock, 4);
    }
}
