use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct CategoryQuery {
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StockUpdate {
    pub stock: i32,
}
