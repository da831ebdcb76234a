// src/models/product.rs

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// A row of the normalized layer exactly as the store hands it over.
/// Every column is optional here; `ProductRecord::from_row` decides which
/// ones are required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub measure: Option<String>,
    #[serde(default)]
    pub store_id: Option<i64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub old_price: Option<f64>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub cart_link: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub ref_id: Option<String>,
}

/// One retailer's listing of one sellable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: String,
    pub brand: String,
    pub weight: f64,
    pub measure: String,
    pub store_id: i64,
    pub price: Option<f64>,
    pub old_price: Option<f64>,
    pub link: Option<String>,
    pub cart_link: Option<String>,
    pub image_url: Option<String>,
    pub ref_id: Option<String>,
}

impl ProductRecord {
    /// Validates a store row. `row` is the row's position in the dataset and
    /// is only used for error reporting.
    pub fn from_row(row: usize, data: NormalizedRow) -> PipelineResult<Self> {
        let missing = |field: &'static str| PipelineError::MissingField { row, field };

        Ok(Self {
            name: data.name.ok_or_else(|| missing("name"))?,
            brand: data.brand.ok_or_else(|| missing("brand"))?,
            weight: data.weight.ok_or_else(|| missing("weight"))?,
            measure: data.measure.ok_or_else(|| missing("measure"))?,
            store_id: data.store_id.ok_or_else(|| missing("store_id"))?,
            price: data.price,
            old_price: data.old_price,
            link: data.link,
            cart_link: data.cart_link,
            image_url: data.image_url,
            ref_id: data.ref_id,
        })
    }

    /// Listings with both prices at zero are not on sale and never reach the
    /// embedding stage. A single zero price does not exclude a record.
    pub fn is_unlisted(&self) -> bool {
        self.price == Some(0.0) && self.old_price == Some(0.0)
    }

    pub fn to_offer(&self) -> SellerOffer {
        SellerOffer {
            store_id: self.store_id,
            price: self.price,
            old_price: self.old_price,
            link: self.link.clone(),
            cart_link: self.cart_link.clone(),
            ref_id: self.ref_id.clone(),
        }
    }
}

/// One retailer's terms for a given variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerOffer {
    pub store_id: i64,
    pub price: Option<f64>,
    pub old_price: Option<f64>,
    pub link: Option<String>,
    pub cart_link: Option<String>,
    pub ref_id: Option<String>,
}

/// A package size of a consolidated product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub weight: f64,
    pub measure: String,
    pub name: String,
    pub image_url: Option<String>,
    pub sellers: Vec<SellerOffer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedProduct {
    pub brand: String,
    /// Run-local label from the clustering step. Only meaningful together with
    /// `brand` and only within the run that produced it.
    pub cluster_id: i64,
    /// Membership digest that stays the same across runs.
    pub product_key: String,
    pub name: String,
    pub embedded_name: Vec<f32>,
    pub variations: Vec<Variant>,
}

impl ConsolidatedProduct {
    pub fn offer_count(&self) -> usize {
        self.variations.iter().map(|v| v.sellers.len()).sum()
    }
}

// Retailer ids arrive as strings from some extractors and as numbers from others.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_row() -> NormalizedRow {
        serde_json::from_value(json!({
            "name": "Leite Integral A",
            "brand": "X",
            "weight": 1.0,
            "measure": "L",
            "store_id": 1,
            "price": 5.0,
            "old_price": 5.5,
            "link": "https://loja.example/leite",
            "cart_link": "https://loja.example/cart?sku=10",
            "image_url": "https://loja.example/leite.png",
            "ref_id": 10
        }))
        .unwrap()
    }

    #[test]
    fn test_numeric_ref_id_becomes_string() {
        let row = full_row();
        assert_eq!(row.ref_id.as_deref(), Some("10"));
    }

    #[test]
    fn test_from_row_keeps_every_field() {
        let record = ProductRecord::from_row(0, full_row()).unwrap();
        assert_eq!(record.name, "Leite Integral A");
        assert_eq!(record.store_id, 1);
        assert_eq!(record.price, Some(5.0));
        assert_eq!(record.old_price, Some(5.5));
        assert_eq!(record.cart_link.as_deref(), Some("https://loja.example/cart?sku=10"));
    }

    #[test]
    fn test_missing_required_field_is_reported() {
        let mut row = full_row();
        row.measure = None;
        match ProductRecord::from_row(7, row) {
            Err(PipelineError::MissingField { row, field }) => {
                assert_eq!(row, 7);
                assert_eq!(field, "measure");
            }
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_optional_columns_may_be_absent() {
        let row: NormalizedRow = serde_json::from_value(json!({
            "name": "Arroz", "brand": "Y", "weight": 5, "measure": "kg", "store_id": 2
        }))
        .unwrap();
        let record = ProductRecord::from_row(0, row).unwrap();
        assert_eq!(record.price, None);
        assert_eq!(record.ref_id, None);
        assert!(!record.is_unlisted());
    }

    #[test]
    fn test_unlisted_requires_both_prices_zero() {
        let mut record = ProductRecord::from_row(0, full_row()).unwrap();
        record.price = Some(0.0);
        record.old_price = Some(0.0);
        assert!(record.is_unlisted());

        record.old_price = Some(3.0);
        assert!(!record.is_unlisted());

        record.price = Some(2.0);
        record.old_price = Some(0.0);
        assert!(!record.is_unlisted());
    }

    #[test]
    fn test_offer_copies_record_terms() {
        let record = ProductRecord::from_row(0, full_row()).unwrap();
        let offer = record.to_offer();
        assert_eq!(offer.store_id, record.store_id);
        assert_eq!(offer.price, record.price);
        assert_eq!(offer.old_price, record.old_price);
        assert_eq!(offer.link, record.link);
        assert_eq!(offer.cart_link, record.cart_link);
        assert_eq!(offer.ref_id, record.ref_id);
    }
}
