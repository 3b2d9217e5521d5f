use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use crate::error::{CatalogError, CatalogResult};
use crate::products::repo_types::{NewProduct, Product, SeedProduct, DEFAULT_STOCK};

/// Row-level access to the remote `products` table.
#[async_trait]
pub trait CatalogAdapter: Send + Sync {
    /// True when the table holds at least one row.
    async fn has_any(&self) -> CatalogResult<bool>;
    /// Insert rows that already carry their ids.
    async fn insert_batch(&self, rows: &[SeedProduct]) -> CatalogResult<()>;
    async fn list_all(&self) -> CatalogResult<Vec<Product>>;
    async fn list_by_category(&self, category: &str) -> CatalogResult<Vec<Product>>;
    async fn get(&self, id: i64) -> CatalogResult<Option<Product>>;
    /// Insert and return the persisted row with its server-assigned id.
    async fn insert(&self, product: NewProduct) -> CatalogResult<Product>;
    async fn update(&self, product: &Product) -> CatalogResult<Product>;
    async fn delete(&self, id: i64) -> CatalogResult<()>;
    async fn update_stock(&self, id: i64, stock: i32) -> CatalogResult<()>;
}

const COLUMNS: &str = r#"id, title, price, "originalPrice", "discountPercentage", image, rating,
       "ratingCount", category, description, stock, sku, created_at"#;

#[derive(Clone)]
pub struct PgCatalog {
    db: PgPool,
}

impl PgCatalog {
    /// Pool that opens connections on first use; an unreachable database
    /// surfaces as a query error, not here.
    pub fn connect_lazy(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_lazy(url)
            .context("parse catalog database url")?;
        Ok(Self { db })
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }
}

#[async_trait]
impl CatalogAdapter for PgCatalog {
    async fn has_any(&self) -> CatalogResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM products LIMIT 1")
            .fetch_optional(&self.db)
            .await?;
        Ok(row.is_some())
    }

    async fn insert_batch(&self, rows: &[SeedProduct]) -> CatalogResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"INSERT INTO products (id, title, price, "originalPrice", "discountPercentage",
               image, rating, "ratingCount", category, description, stock, sku) "#,
        );
        qb.push_values(rows, |mut b, row| {
            let p = &row.product;
            b.push_bind(row.id)
                .push_bind(&p.title)
                .push_bind(p.price)
                .push_bind(p.original_price)
                .push_bind(p.discount_percentage)
                .push_bind(&p.image)
                .push_bind(p.rating)
                .push_bind(p.rating_count)
                .push_bind(&p.category)
                .push_bind(&p.description)
                .push_bind(p.stock.unwrap_or(DEFAULT_STOCK))
                .push_bind(&p.sku);
        });

        let mut tx = self.db.begin().await?;
        qb.build().execute(&mut *tx).await?;
        // explicit ids bypass the identity sequence; move it past them
        sqlx::query(
            r#"SELECT setval(pg_get_serial_sequence('products', 'id'),
                             (SELECT COALESCE(MAX(id), 1) FROM products))"#,
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(rows = rows.len(), "seed batch inserted");
        Ok(())
    }

    async fn list_all(&self) -> CatalogResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, Product>(&format!(
            "SELECT {COLUMNS} FROM products ORDER BY id ASC"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn list_by_category(&self, category: &str) -> CatalogResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, Product>(&format!(
            "SELECT {COLUMNS} FROM products WHERE category = $1 ORDER BY id ASC"
        ))
        .bind(category)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn get(&self, id: i64) -> CatalogResult<Option<Product>> {
        let row = sqlx::query_as::<_, Product>(&format!(
            "SELECT {COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn insert(&self, p: NewProduct) -> CatalogResult<Product> {
        let row = sqlx::query_as::<_, Product>(&format!(
            r#"
            INSERT INTO products (title, price, "originalPrice", "discountPercentage", image,
                                  rating, "ratingCount", category, description, stock, sku)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&p.title)
        .bind(p.price)
        .bind(p.original_price)
        .bind(p.discount_percentage)
        .bind(&p.image)
        .bind(p.rating)
        .bind(p.rating_count)
        .bind(&p.category)
        .bind(&p.description)
        .bind(p.stock.unwrap_or(DEFAULT_STOCK))
        .bind(&p.sku)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn update(&self, p: &Product) -> CatalogResult<Product> {
        let row = sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products
               SET title = $2, price = $3, "originalPrice" = $4, "discountPercentage" = $5,
                   image = $6, rating = $7, "ratingCount" = $8, category = $9,
                   description = $10, stock = $11, sku = $12
             WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(p.id)
        .bind(&p.title)
        .bind(p.price)
        .bind(p.original_price)
        .bind(p.discount_percentage)
        .bind(&p.image)
        .bind(p.rating)
        .bind(p.rating_count)
        .bind(&p.category)
        .bind(&p.description)
        .bind(p.stock)
        .bind(&p.sku)
        .fetch_optional(&self.db)
        .await?;
        row.ok_or(CatalogError::NotFound(p.id))
    }

    async fn delete(&self, id: i64) -> CatalogResult<()> {
        let res = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(CatalogError::NotFound(id));
        }
        Ok(())
    }

    async fn update_stock(&self, id: i64, stock: i32) -> CatalogResult<()> {
        let res = sqlx::query("UPDATE products SET stock = $2 WHERE id = $1")
            .bind(id)
            .bind(stock)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(CatalogError::NotFound(id));
        }
        Ok(())
    }
}
