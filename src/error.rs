use thiserror::Error;

/// Failure reported by a catalog adapter.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("product {0} not found")]
    NotFound(i64),

    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;
