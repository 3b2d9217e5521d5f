use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

pub const DEFAULT_STOCK: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Tshirts,
    Hoodies,
    Jeans,
    Dresses,
    Shirts,
    Kids,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Tshirts,
        Category::Hoodies,
        Category::Jeans,
        Category::Dresses,
        Category::Shirts,
        Category::Kids,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Tshirts => "tshirts",
            Category::Hoodies => "hoodies",
            Category::Jeans => "jeans",
            Category::Dresses => "dresses",
            Category::Shirts => "shirts",
            Category::Kids => "kids",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category {s:?}"))
    }
}

/// A row of the `products` table.
///
/// `category` stays a plain string: the table accepts any value, only the
/// editing form restricts it to [`Category`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub title: String,
    pub price: f64,
    #[sqlx(rename = "originalPrice")]
    pub original_price: f64,
    #[sqlx(rename = "discountPercentage")]
    pub discount_percentage: f64,
    pub image: String,
    pub rating: f64,
    #[sqlx(rename = "ratingCount")]
    pub rating_count: i32,
    pub category: String,
    pub description: Option<String>,
    pub stock: Option<i32>,
    pub sku: Option<String>,
    #[serde(rename = "created_at", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Product {
    pub fn stock_or_default(&self) -> i32 {
        self.stock.unwrap_or(DEFAULT_STOCK)
    }
}

/// Insert payload: a product before the server assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub title: String,
    pub price: f64,
    pub original_price: f64,
    pub discount_percentage: f64,
    pub image: String,
    pub rating: f64,
    pub rating_count: i32,
    pub category: String,
    pub description: Option<String>,
    pub stock: Option<i32>,
    pub sku: Option<String>,
}

impl NewProduct {
    pub fn into_product(self, id: i64, created_at: OffsetDateTime) -> Product {
        Product {
            id,
            title: self.title,
            price: self.price,
            original_price: self.original_price,
            discount_percentage: self.discount_percentage,
            image: self.image,
            rating: self.rating,
            rating_count: self.rating_count,
            category: self.category,
            description: self.description,
            stock: Some(self.stock.unwrap_or(DEFAULT_STOCK)),
            sku: self.sku,
            created_at,
        }
    }
}

/// Seed rows carry their own ids.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedProduct {
    pub id: i64,
    pub product: NewProduct,
}
