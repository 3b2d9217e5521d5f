use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::{CatalogError, CatalogResult};
use crate::products::repo::CatalogAdapter;
use crate::products::repo_types::{NewProduct, Product, SeedProduct};

#[derive(Default)]
struct Table {
    rows: Vec<Product>,
    /// Highest id ever handed out, so deleted ids are not reused.
    high_water: i64,
}

impl Table {
    fn next_id(&self) -> i64 {
        let max = self.rows.iter().map(|p| p.id).max().unwrap_or(0);
        max.max(self.high_water) + 1
    }
}

/// Process-local stand-in for the remote table.
#[derive(Default)]
pub struct InMemoryCatalog {
    table: Mutex<Table>,
    failing: AtomicBool,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails with [`CatalogError::Unavailable`].
    #[cfg(test)]
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    fn check(&self) -> CatalogResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("catalog offline".into()));
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Table> {
        // a panicked writer leaves plain data behind; keep serving it
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sorted(mut rows: Vec<Product>) -> Vec<Product> {
        rows.sort_by_key(|p| p.id);
        rows
    }
}

#[async_trait]
impl CatalogAdapter for InMemoryCatalog {
    async fn has_any(&self) -> CatalogResult<bool> {
        self.check()?;
        Ok(!self.lock().rows.is_empty())
    }

    async fn insert_batch(&self, rows: &[SeedProduct]) -> CatalogResult<()> {
        self.check()?;
        let mut table = self.lock();
        if let Some(dup) = rows
            .iter()
            .find(|r| table.rows.iter().any(|p| p.id == r.id))
        {
            return Err(CatalogError::Unavailable(format!(
                "duplicate key value: id {}",
                dup.id
            )));
        }
        let now = OffsetDateTime::now_utc();
        for row in rows {
            table.high_water = table.high_water.max(row.id);
            table.rows.push(row.product.clone().into_product(row.id, now));
        }
        Ok(())
    }

    async fn list_all(&self) -> CatalogResult<Vec<Product>> {
        self.check()?;
        Ok(Self::sorted(self.lock().rows.clone()))
    }

    async fn list_by_category(&self, category: &str) -> CatalogResult<Vec<Product>> {
        self.check()?;
        let rows = self
            .lock()
            .rows
            .iter()
            .filter(|p| p.category == category)
            .cloned()
            .collect();
        Ok(Self::sorted(rows))
    }

    async fn get(&self, id: i64) -> CatalogResult<Option<Product>> {
        self.check()?;
        Ok(self.lock().rows.iter().find(|p| p.id == id).cloned())
    }

    async fn insert(&self, product: NewProduct) -> CatalogResult<Product> {
        self.check()?;
        let mut table = self.lock();
        let id = table.next_id();
        let row = product.into_product(id, OffsetDateTime::now_utc());
        table.high_water = id;
        table.rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, product: &Product) -> CatalogResult<Product> {
        self.check()?;
        let mut table = self.lock();
        let slot = table
            .rows
            .iter_mut()
            .find(|p| p.id == product.id)
            .ok_or(CatalogError::NotFound(product.id))?;
        // created_at is server-owned
        let created_at = slot.created_at;
        *slot = Product {
            created_at,
            ..product.clone()
        };
        Ok(slot.clone())
    }

    async fn delete(&self, id: i64) -> CatalogResult<()> {
        self.check()?;
        let mut table = self.lock();
        let before = table.rows.len();
        table.rows.retain(|p| p.id != id);
        if table.rows.len() == before {
            return Err(CatalogError::NotFound(id));
        }
        Ok(())
    }

    async fn update_stock(&self, id: i64, stock: i32) -> CatalogResult<()> {
        self.check()?;
        let mut table = self.lock();
        let slot = table
            .rows
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(CatalogError::NotFound(id))?;
        slot.stock = Some(stock);
        Ok(())
    }
}
