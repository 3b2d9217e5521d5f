use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;

use crate::products::repo_types::{Category, NewProduct, Product, DEFAULT_STOCK};

#[derive(Debug, Error, PartialEq)]
pub enum FormError {
    #[error("Please fill all required fields: missing {0}")]
    Missing(&'static str),
    #[error("{0}")]
    Category(String),
    #[error("stock must not be negative")]
    NegativeStock,
}

/// round(100 * (original - price) / original); zero when there is no list price.
pub fn discount_percentage(price: f64, original_price: f64) -> f64 {
    if original_price == 0.0 {
        return 0.0;
    }
    (100.0 * (original_price - price) / original_price).round()
}

/// `{CAT3}-{last six digits of unix millis}`.
pub fn generate_sku(category: Option<&str>, now: OffsetDateTime) -> String {
    let prefix = match category {
        Some(c) if !c.is_empty() => c.chars().take(3).collect::<String>().to_uppercase(),
        _ => "PRD".to_string(),
    };
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    let digits = millis.to_string();
    let tail = &digits[digits.len().saturating_sub(6)..];
    format!("{prefix}-{tail}")
}

/// Editor payload for creating or editing a product.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    pub title: Option<String>,
    pub price: Option<f64>,
    pub original_price: Option<f64>,
    pub discount_percentage: Option<f64>,
    pub image: Option<String>,
    pub rating: Option<f64>,
    pub rating_count: Option<i32>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub stock: Option<i32>,
    pub sku: Option<String>,
}

struct Checked {
    title: String,
    price: f64,
    original_price: f64,
    discount_percentage: f64,
    image: String,
    category: Category,
}

impl ProductDraft {
    fn check(&self) -> Result<Checked, FormError> {
        let title = non_empty(&self.title).ok_or(FormError::Missing("title"))?;
        let price = non_zero(self.price).ok_or(FormError::Missing("price"))?;
        let original_price =
            non_zero(self.original_price).ok_or(FormError::Missing("originalPrice"))?;
        let image = non_empty(&self.image).ok_or(FormError::Missing("image"))?;
        let category = non_empty(&self.category)
            .ok_or(FormError::Missing("category"))?
            .parse::<Category>()
            .map_err(FormError::Category)?;
        if matches!(self.stock, Some(s) if s < 0) {
            return Err(FormError::NegativeStock);
        }
        Ok(Checked {
            title,
            price,
            original_price,
            discount_percentage: discount_percentage(price, original_price),
            image,
            category,
        })
    }

    pub fn into_new_product(self, now: OffsetDateTime) -> Result<NewProduct, FormError> {
        let c = self.check()?;
        let sku = non_empty(&self.sku)
            .unwrap_or_else(|| generate_sku(Some(c.category.as_str()), now));
        Ok(NewProduct {
            title: c.title,
            price: c.price,
            original_price: c.original_price,
            discount_percentage: c.discount_percentage,
            image: c.image,
            rating: self.rating.unwrap_or(4.0),
            rating_count: self.rating_count.unwrap_or(0),
            category: c.category.to_string(),
            description: self.description,
            stock: Some(self.stock.unwrap_or(DEFAULT_STOCK)),
            sku: Some(sku),
        })
    }

    /// Edit of an existing record: unset fields keep their current value.
    /// No SKU is generated for records that never had one.
    pub fn apply_to(self, existing: &Product) -> Result<Product, FormError> {
        let merged = ProductDraft {
            title: self.title.or_else(|| Some(existing.title.clone())),
            price: self.price.or(Some(existing.price)),
            original_price: self.original_price.or(Some(existing.original_price)),
            discount_percentage: self.discount_percentage,
            image: self.image.or_else(|| Some(existing.image.clone())),
            rating: self.rating,
            rating_count: self.rating_count,
            category: self.category.or_else(|| Some(existing.category.clone())),
            description: self.description,
            stock: self.stock,
            sku: self.sku,
        };
        let c = merged.check()?;
        Ok(Product {
            id: existing.id,
            title: c.title,
            price: c.price,
            original_price: c.original_price,
            discount_percentage: c.discount_percentage,
            image: c.image,
            rating: merged.rating.unwrap_or(existing.rating),
            rating_count: merged.rating_count.unwrap_or(existing.rating_count),
            category: c.category.to_string(),
            description: merged.description.or_else(|| existing.description.clone()),
            stock: Some(merged.stock.unwrap_or_else(|| existing.stock_or_default())),
            sku: merged.sku.or_else(|| existing.sku.clone()),
            created_at: existing.created_at,
        })
    }
}

fn non_empty(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn non_zero(v: Option<f64>) -> Option<f64> {
    v.filter(|n| *n != 0.0)
}
