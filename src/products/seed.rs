use rand::Rng;
use tracing::{error, info};

use crate::error::CatalogResult;
use crate::products::repo::CatalogAdapter;
use crate::products::repo_types::{NewProduct, SeedProduct};

pub const SEED_BATCH_SIZE: usize = 5;

struct SeedEntry {
    id: i64,
    title: &'static str,
    price: f64,
    original_price: f64,
    discount_percentage: f64,
    image: &'static str,
    rating: f64,
    rating_count: i32,
    category: &'static str,
}

const SEED: [SeedEntry; 12] = [
    SeedEntry { id: 1, title: "Classic Crew Neck T-Shirt", price: 399.0, original_price: 799.0, discount_percentage: 50.0, image: "https://images.unsplash.com/photo-1521572163474-6864f9cf17ab", rating: 4.3, rating_count: 1250, category: "tshirts" },
    SeedEntry { id: 2, title: "Graphic Print Oversized Tee", price: 499.0, original_price: 999.0, discount_percentage: 50.0, image: "https://images.unsplash.com/photo-1583743814966-8936f5b7be1a", rating: 4.1, rating_count: 860, category: "tshirts" },
    SeedEntry { id: 3, title: "Fleece Pullover Hoodie", price: 1199.0, original_price: 1999.0, discount_percentage: 40.0, image: "https://images.unsplash.com/photo-1556821840-3a63f95609a7", rating: 4.5, rating_count: 2140, category: "hoodies" },
    SeedEntry { id: 4, title: "Zip-Up Training Hoodie", price: 1299.0, original_price: 2499.0, discount_percentage: 48.0, image: "https://images.unsplash.com/photo-1620799140408-edc6dcb6d633", rating: 4.2, rating_count: 640, category: "hoodies" },
    SeedEntry { id: 5, title: "Slim Fit Stretch Jeans", price: 1499.0, original_price: 2999.0, discount_percentage: 50.0, image: "https://images.unsplash.com/photo-1542272604-787c3835535d", rating: 4.4, rating_count: 3010, category: "jeans" },
    SeedEntry { id: 6, title: "Relaxed Straight Jeans", price: 1399.0, original_price: 2299.0, discount_percentage: 39.0, image: "https://images.unsplash.com/photo-1541099649105-f69ad21f3246", rating: 4.0, rating_count: 720, category: "jeans" },
    SeedEntry { id: 7, title: "Floral Wrap Midi Dress", price: 1599.0, original_price: 2799.0, discount_percentage: 43.0, image: "https://images.unsplash.com/photo-1572804013309-59a88b7e92f1", rating: 4.6, rating_count: 980, category: "dresses" },
    SeedEntry { id: 8, title: "Linen Shirt Dress", price: 1799.0, original_price: 2999.0, discount_percentage: 40.0, image: "https://images.unsplash.com/photo-1595777457583-95e059d581b8", rating: 4.3, rating_count: 410, category: "dresses" },
    SeedEntry { id: 9, title: "Oxford Button-Down Shirt", price: 999.0, original_price: 1799.0, discount_percentage: 44.0, image: "https://images.unsplash.com/photo-1596755094514-f87e34085b2c", rating: 4.4, rating_count: 1530, category: "shirts" },
    SeedEntry { id: 10, title: "Checked Flannel Shirt", price: 899.0, original_price: 1499.0, discount_percentage: 40.0, image: "https://images.unsplash.com/photo-1589310243389-96a5483213a8", rating: 4.1, rating_count: 590, category: "shirts" },
    SeedEntry { id: 11, title: "Kids Cotton Dungarees", price: 699.0, original_price: 1199.0, discount_percentage: 42.0, image: "https://images.unsplash.com/photo-1519238263530-99bdd11df2ea", rating: 4.5, rating_count: 320, category: "kids" },
    SeedEntry { id: 12, title: "Kids Printed Hoodie Set", price: 799.0, original_price: 1399.0, discount_percentage: 43.0, image: "https://images.unsplash.com/photo-1622290291468-a28f7a7dc6a8", rating: 4.2, rating_count: 275, category: "kids" },
];

pub fn seed_description(category: &str) -> String {
    format!(
        "High quality {category} with great comfort and style. Perfect for casual and formal occasions."
    )
}

pub fn seed_sku(category: &str, id: i64) -> String {
    let prefix: String = category.chars().take(3).collect::<String>().to_uppercase();
    format!("{prefix}-{id}00{id}")
}

/// Seed list with randomized stock, generated description and SKU.
pub fn enriched_seed<R: Rng + ?Sized>(rng: &mut R) -> Vec<SeedProduct> {
    SEED.iter()
        .map(|e| SeedProduct {
            id: e.id,
            product: NewProduct {
                title: e.title.to_string(),
                price: e.price,
                original_price: e.original_price,
                discount_percentage: e.discount_percentage,
                image: e.image.to_string(),
                rating: e.rating,
                rating_count: e.rating_count,
                category: e.category.to_string(),
                description: Some(seed_description(e.category)),
                stock: Some(rng.gen_range(10..100)),
                sku: Some(seed_sku(e.category, e.id)),
            },
        })
        .collect()
}

/// Populate an empty catalog from the built-in seed list.
///
/// No-op when the table already has a row. Batches go in sequentially; a
/// failed batch is logged and skipped, so seeding may end up partial.
/// Returns the number of rows inserted.
pub async fn initialize(catalog: &dyn CatalogAdapter) -> CatalogResult<usize> {
    if catalog.has_any().await? {
        return Ok(0);
    }

    info!("initializing products catalog");
    let rows = enriched_seed(&mut rand::thread_rng());
    let mut inserted = 0;
    for (n, batch) in rows.chunks(SEED_BATCH_SIZE).enumerate() {
        match catalog.insert_batch(batch).await {
            Ok(()) => inserted += batch.len(),
            Err(e) => error!(error = %e, batch = n, "seed batch insert failed"),
        }
    }
    info!(inserted, total = rows.len(), "catalog seeded");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::products::memory::InMemoryCatalog;

    #[test]
    fn sku_uses_category_prefix_and_id() {
        assert_eq!(seed_sku("tshirts", 1), "TSH-1001");
        assert_eq!(seed_sku("kids", 12), "KID-120012");
    }

    #[test]
    fn enrichment_fills_stock_description_and_sku() {
        let rows = enriched_seed(&mut rand::thread_rng());
        assert_eq!(rows.len(), 12);
        for r in &rows {
            let stock = r.product.stock.unwrap();
            assert!((10..100).contains(&stock), "stock {stock} out of range");
            assert!(!r.product.sku.as_deref().unwrap().is_empty());
            assert!(r.product.description.as_deref().unwrap().contains(&r.product.category));
        }
    }

    #[tokio::test]
    async fn seeds_empty_catalog_once() {
        let cat = InMemoryCatalog::new();
        assert_eq!(initialize(&cat).await.unwrap(), SEED.len());
        assert_eq!(cat.len(), SEED.len());

        assert_eq!(initialize(&cat).await.unwrap(), 0);
        assert_eq!(cat.len(), SEED.len());
    }

    /// Fails the second seed batch, delegates everything else.
    struct SecondBatchFails {
        inner: InMemoryCatalog,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CatalogAdapter for SecondBatchFails {
        async fn has_any(&self) -> CatalogResult<bool> {
            self.inner.has_any().await
        }
        async fn insert_batch(&self, rows: &[SeedProduct]) -> CatalogResult<()> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == 1 {
                return Err(crate::error::CatalogError::Unavailable("payload too large".into()));
            }
            self.inner.insert_batch(rows).await
        }
        async fn list_all(&self) -> CatalogResult<Vec<crate::products::repo_types::Product>> {
            self.inner.list_all().await
        }
        async fn list_by_category(
            &self,
            category: &str,
        ) -> CatalogResult<Vec<crate::products::repo_types::Product>> {
            self.inner.list_by_category(category).await
        }
        async fn get(&self, id: i64) -> CatalogResult<Option<crate::products::repo_types::Product>> {
            self.inner.get(id).await
        }
        async fn insert(&self, p: NewProduct) -> CatalogResult<crate::products::repo_types::Product> {
            self.inner.insert(p).await
        }
        async fn update(
            &self,
            p: &crate::products::repo_types::Product,
        ) -> CatalogResult<crate::products::repo_types::Product> {
            self.inner.update(p).await
        }
        async fn delete(&self, id: i64) -> CatalogResult<()> {
            self.inner.delete(id).await
        }
        async fn update_stock(&self, id: i64, stock: i32) -> CatalogResult<()> {
            self.inner.update_stock(id, stock).await
        }
    }

    #[tokio::test]
    async fn failed_batch_is_skipped_not_rolled_back() {
        let cat = SecondBatchFails {
            inner: InMemoryCatalog::new(),
            calls: Default::default(),
        };
        let inserted = initialize(&cat).await.unwrap();
        assert_eq!(inserted, SEED.len() - SEED_BATCH_SIZE);
        assert_eq!(cat.inner.len(), SEED.len() - SEED_BATCH_SIZE);
    }

    #[tokio::test]
    async fn unreachable_catalog_is_an_error() {
        let cat = InMemoryCatalog::new();
        cat.set_failing(true);
        assert!(initialize(&cat).await.is_err());
    }
}
