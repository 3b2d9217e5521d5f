use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, instrument, warn};

use crate::error::CatalogError;
use crate::products::mirror::SnapshotMirror;
use crate::products::repo::CatalogAdapter;
use crate::products::repo_types::{NewProduct, Product};
use crate::products::seed;

/// Everything the store holds; also the persisted snapshot payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    pub products: Vec<Product>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub initialized: bool,
    /// The recorded error is the catalog reporting a missing row.
    #[serde(skip)]
    pub error_is_not_found: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub count: usize,
    pub is_loading: bool,
    pub initialized: bool,
    pub error: Option<String>,
}

/// Cached product collection kept in step with the remote catalog.
///
/// Remote failures never escape: they land in the single error slot and the
/// caller gets `None`, `false` or an empty list. Mutating calls are
/// serialized, so the loading flag reflects the one call in flight.
pub struct ProductStore {
    catalog: Arc<dyn CatalogAdapter>,
    state: RwLock<StoreState>,
    ops: Mutex<()>,
    mirror: Option<SnapshotMirror>,
    /// Bumped under the state write lock; orders snapshot saves.
    generation: AtomicU64,
}

impl ProductStore {
    #[cfg(test)]
    pub fn new(catalog: Arc<dyn CatalogAdapter>, mirror: Option<SnapshotMirror>) -> Self {
        Self::with_state(catalog, mirror, StoreState::default())
    }

    /// Start from the last mirrored snapshot, if any, before touching the network.
    pub async fn rehydrate(catalog: Arc<dyn CatalogAdapter>, mirror: SnapshotMirror) -> Self {
        let state = mirror.load().await.unwrap_or_default();
        Self::with_state(catalog, Some(mirror), state)
    }

    fn with_state(
        catalog: Arc<dyn CatalogAdapter>,
        mirror: Option<SnapshotMirror>,
        state: StoreState,
    ) -> Self {
        Self {
            catalog,
            state: RwLock::new(state),
            ops: Mutex::new(()),
            mirror,
            generation: AtomicU64::new(0),
        }
    }

    // ---- synchronous views ----

    pub fn products(&self) -> Vec<Product> {
        self.read().products.clone()
    }

    #[cfg(test)]
    pub fn is_loading(&self) -> bool {
        self.read().is_loading
    }

    pub fn error(&self) -> Option<String> {
        self.read().error.clone()
    }

    /// True when the last failure was a row missing from the catalog.
    pub fn missed_row(&self) -> bool {
        let st = self.read();
        st.error.is_some() && st.error_is_not_found
    }

    pub fn initialized(&self) -> bool {
        self.read().initialized
    }

    pub fn status(&self) -> StoreStatus {
        let st = self.read();
        StoreStatus {
            count: st.products.len(),
            is_loading: st.is_loading,
            initialized: st.initialized,
            error: st.error.clone(),
        }
    }

    /// Cached products of one category; never consults the catalog.
    pub fn get_by_category(&self, category: &str) -> Vec<Product> {
        self.read()
            .products
            .iter()
            .filter(|p| p.category == category)
            .cloned()
            .collect()
    }

    // ---- remote-backed operations ----

    /// Seed on first use, then replace the cache with the full catalog.
    #[instrument(skip(self))]
    pub async fn fetch_all(&self) -> bool {
        let _op = self.ops.lock().await;
        self.begin().await;

        if !self.initialized() {
            if let Err(e) = seed::initialize(self.catalog.as_ref()).await {
                self.fail("Failed to initialize products", &e).await;
                return false;
            }
            self.commit(|s| s.initialized = true).await;
        }

        match self.catalog.list_all().await {
            Ok(products) => {
                debug!(count = products.len(), "products fetched");
                self.commit(|s| {
                    s.products = products;
                    s.is_loading = false;
                })
                .await;
                true
            }
            Err(e) => {
                self.fail("Failed to fetch products", &e).await;
                false
            }
        }
    }

    /// Remote products of one category. The result is not merged into the cache.
    #[instrument(skip(self))]
    pub async fn fetch_by_category(&self, category: &str) -> Vec<Product> {
        let _op = self.ops.lock().await;
        self.begin().await;

        match self.catalog.list_by_category(category).await {
            Ok(products) => {
                self.commit(|s| s.is_loading = false).await;
                products
            }
            Err(e) => {
                self.fail(&format!("Failed to fetch {category} products"), &e)
                    .await;
                Vec::new()
            }
        }
    }

    /// Insert remotely and append the persisted row to the cache.
    #[instrument(skip(self, product), fields(title = %product.title))]
    pub async fn add(&self, product: NewProduct) -> Option<Product> {
        let _op = self.ops.lock().await;
        self.begin().await;

        match self.catalog.insert(product).await {
            Ok(created) => {
                debug!(product_id = created.id, "product added");
                let row = created.clone();
                self.commit(|s| {
                    s.products.push(row);
                    s.is_loading = false;
                })
                .await;
                Some(created)
            }
            Err(e) => {
                self.fail("Failed to add product", &e).await;
                None
            }
        }
    }

    /// Full-record replace by id; the cached entry keeps its position.
    #[instrument(skip(self, product), fields(product_id = product.id))]
    pub async fn update(&self, product: Product) -> Option<Product> {
        let _op = self.ops.lock().await;
        self.begin().await;

        match self.catalog.update(&product).await {
            Ok(saved) => {
                let row = saved.clone();
                self.commit(|s| {
                    if let Some(slot) = s.products.iter_mut().find(|p| p.id == row.id) {
                        *slot = row;
                    }
                    s.is_loading = false;
                })
                .await;
                Some(saved)
            }
            Err(e) => {
                self.fail(&format!("Failed to update product {}", product.id), &e)
                    .await;
                None
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> bool {
        let _op = self.ops.lock().await;
        self.begin().await;

        match self.catalog.delete(id).await {
            Ok(()) => {
                self.commit(|s| {
                    s.products.retain(|p| p.id != id);
                    s.is_loading = false;
                })
                .await;
                true
            }
            Err(e) => {
                self.fail(&format!("Failed to delete product {id}"), &e).await;
                false
            }
        }
    }

    /// Cache first; a miss always goes to the catalog and is not cached.
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: i64) -> Option<Product> {
        let local = self.read().products.iter().find(|p| p.id == id).cloned();
        if local.is_some() {
            return local;
        }

        match self.catalog.get(id).await {
            Ok(found) => found,
            Err(e) => {
                error!(error = %e, product_id = id, "product lookup failed");
                let message = format!("Failed to fetch product {id}: {e}");
                self.commit(|s| {
                    s.error = Some(message);
                    s.error_is_not_found = false;
                })
                .await;
                None
            }
        }
    }

    /// Patch only the stock field, remotely and in the cache.
    #[instrument(skip(self))]
    pub async fn update_stock(&self, id: i64, stock: i32) -> bool {
        let _op = self.ops.lock().await;
        if stock < 0 {
            warn!(product_id = id, stock, "negative stock rejected");
            self.commit(|s| {
                s.error = Some(format!("Stock for product {id} must not be negative"));
                s.error_is_not_found = false;
            })
            .await;
            return false;
        }
        self.begin().await;

        match self.catalog.update_stock(id, stock).await {
            Ok(()) => {
                self.commit(|s| {
                    if let Some(p) = s.products.iter_mut().find(|p| p.id == id) {
                        p.stock = Some(stock);
                    }
                    s.is_loading = false;
                })
                .await;
                true
            }
            Err(e) => {
                self.fail(&format!("Failed to update stock for product {id}"), &e)
                    .await;
                false
            }
        }
    }

    // ---- internals ----

    async fn begin(&self) {
        self.commit(|s| {
            s.is_loading = true;
            s.error = None;
            s.error_is_not_found = false;
        })
        .await;
    }

    async fn fail(&self, context: &str, err: &CatalogError) {
        error!(error = %err, "{}", context);
        let message = format!("{context}: {err}");
        let not_found = matches!(err, CatalogError::NotFound(_));
        self.commit(|s| {
            s.error = Some(message);
            s.error_is_not_found = not_found;
            s.is_loading = false;
        })
        .await;
    }

    /// Apply a change, then mirror the resulting state.
    async fn commit<F>(&self, change: F)
    where
        F: FnOnce(&mut StoreState),
    {
        let (generation, snapshot) = {
            let mut st = self.write();
            change(&mut st);
            (self.generation.fetch_add(1, Ordering::SeqCst) + 1, st.clone())
        };
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.save(generation, &snapshot).await {
                warn!(error = %e, path = %mirror.path().display(), "snapshot write failed");
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::products::memory::InMemoryCatalog;
    use crate::products::mirror::temp_snapshot_path;

    fn tee(category: &str) -> NewProduct {
        NewProduct {
            title: "Tee".into(),
            price: 399.0,
            original_price: 599.0,
            discount_percentage: 33.0,
            image: "https://img.local/tee.jpg".into(),
            rating: 4.0,
            rating_count: 0,
            category: category.into(),
            description: None,
            stock: Some(10),
            sku: Some("TSH-123456".into()),
        }
    }

    fn store() -> (Arc<InMemoryCatalog>, ProductStore) {
        let catalog = Arc::new(InMemoryCatalog::new());
        let store = ProductStore::new(catalog.clone(), None);
        (catalog, store)
    }

    #[tokio::test]
    async fn first_fetch_seeds_and_second_does_not() {
        let (catalog, store) = store();

        assert!(store.fetch_all().await);
        assert_eq!(store.products().len(), 12);
        assert!(store.initialized());
        assert!(!store.is_loading());
        assert!(store.error().is_none());

        let first = store.products();
        assert!(store.fetch_all().await);
        assert_eq!(store.products(), first);
        assert_eq!(catalog.len(), 12);

        let ids: Vec<i64> = first.iter().map(|p| p.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        for p in &first {
            assert!(!p.sku.as_deref().unwrap_or("").is_empty());
            assert!((10..100).contains(&p.stock.unwrap()));
        }
    }

    #[tokio::test]
    async fn add_allocates_next_id_and_appends() {
        let (_, store) = store();
        store.fetch_all().await;

        let created = store.add(tee("tshirts")).await.unwrap();
        assert_eq!(created.id, 13);
        assert_eq!(created.discount_percentage, 33.0);
        assert_eq!(store.products().last().unwrap().id, 13);
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn delete_removes_from_cache_views() {
        let (_, store) = store();
        store.fetch_all().await;

        assert!(store.delete(1).await);
        assert!(store.get_by_category("tshirts").iter().all(|p| p.id != 1));
        assert_eq!(store.products().len(), 11);

        assert!(!store.delete(1).await);
        assert!(store.error().unwrap().contains("Failed to delete product 1"));
    }

    #[tokio::test]
    async fn update_keeps_cache_position() {
        let (_, store) = store();
        store.fetch_all().await;

        let mut p = store.products()[4].clone();
        p.title = "Renamed".into();
        let saved = store.update(p.clone()).await.unwrap();
        assert_eq!(saved.title, "Renamed");

        let products = store.products();
        assert_eq!(products[4].id, p.id);
        assert_eq!(products[4].title, "Renamed");
    }

    #[tokio::test]
    async fn update_stock_touches_only_stock() {
        let (_, store) = store();
        store.fetch_all().await;

        let before = store.products()[2].clone();
        assert!(store.update_stock(before.id, 3).await);
        let after = store.products()[2].clone();
        assert_eq!(after.stock, Some(3));
        assert_eq!(Product { stock: before.stock, ..after }, before);

        assert!(!store.update_stock(before.id, -1).await);
        assert_eq!(store.products()[2].stock, Some(3));
    }

    #[tokio::test]
    async fn failures_leave_cache_and_record_error() {
        let (catalog, store) = store();
        store.fetch_all().await;
        let cached = store.products();

        catalog.set_failing(true);
        assert!(!store.fetch_all().await);
        assert_eq!(store.products(), cached);
        assert!(!store.is_loading());
        assert!(store.error().unwrap().starts_with("Failed to fetch products"));

        assert!(store.add(tee("kids")).await.is_none());
        assert!(store.error().unwrap().starts_with("Failed to add product"));
        assert!(store.fetch_by_category("kids").await.is_empty());
        assert_eq!(store.products(), cached);

        catalog.set_failing(false);
        assert!(store.fetch_all().await);
        assert!(store.error().is_none());
    }

    #[tokio::test]
    async fn failed_writes_leave_cache_and_record_error() {
        let (catalog, store) = store();
        store.fetch_all().await;
        let cached = store.products();
        catalog.set_failing(true);

        let mut renamed = cached[0].clone();
        renamed.title = "Renamed".into();
        assert!(store.update(renamed).await.is_none());
        assert_eq!(store.products(), cached);
        assert!(store.error().unwrap().starts_with("Failed to update product 1"));
        assert!(!store.is_loading());

        assert!(!store.delete(2).await);
        assert_eq!(store.products(), cached);
        assert!(store.error().unwrap().starts_with("Failed to delete product 2"));
        assert!(!store.is_loading());

        assert!(!store.update_stock(3, 0).await);
        assert_eq!(store.products(), cached);
        assert!(store
            .error()
            .unwrap()
            .starts_with("Failed to update stock for product 3"));
        assert!(!store.is_loading());
        assert!(!store.missed_row());
    }

    #[tokio::test]
    async fn missing_remote_row_is_flagged() {
        let (catalog, store) = store();
        store.fetch_all().await;
        catalog.delete(4).await.unwrap();

        assert!(!store.delete(4).await);
        assert!(store.missed_row());
        assert_eq!(store.products().len(), 12);

        assert!(store.fetch_all().await);
        assert!(!store.missed_row());
    }

    /// Parks `delete` until released, delegates everything else.
    struct Gated {
        inner: InMemoryCatalog,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl CatalogAdapter for Gated {
        async fn has_any(&self) -> crate::error::CatalogResult<bool> {
            self.inner.has_any().await
        }
        async fn insert_batch(
            &self,
            rows: &[crate::products::repo_types::SeedProduct],
        ) -> crate::error::CatalogResult<()> {
            self.inner.insert_batch(rows).await
        }
        async fn list_all(&self) -> crate::error::CatalogResult<Vec<Product>> {
            self.inner.list_all().await
        }
        async fn list_by_category(
            &self,
            category: &str,
        ) -> crate::error::CatalogResult<Vec<Product>> {
            self.inner.list_by_category(category).await
        }
        async fn get(&self, id: i64) -> crate::error::CatalogResult<Option<Product>> {
            self.inner.get(id).await
        }
        async fn insert(&self, p: NewProduct) -> crate::error::CatalogResult<Product> {
            self.inner.insert(p).await
        }
        async fn update(&self, p: &Product) -> crate::error::CatalogResult<Product> {
            self.inner.update(p).await
        }
        async fn delete(&self, id: i64) -> crate::error::CatalogResult<()> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.delete(id).await
        }
        async fn update_stock(&self, id: i64, stock: i32) -> crate::error::CatalogResult<()> {
            self.inner.update_stock(id, stock).await
        }
    }

    #[tokio::test]
    async fn loading_flag_is_set_while_a_call_is_in_flight() {
        let catalog = Arc::new(Gated {
            inner: InMemoryCatalog::new(),
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let store = Arc::new(ProductStore::new(catalog.clone(), None));
        store.fetch_all().await;
        assert!(!store.is_loading());

        let pending = {
            let store = store.clone();
            tokio::spawn(async move { store.delete(1).await })
        };
        catalog.entered.notified().await;
        assert!(store.is_loading());
        assert!(store.status().is_loading);
        assert!(store.error().is_none());

        catalog.release.notify_one();
        assert!(pending.await.unwrap());
        assert!(!store.is_loading());
        assert_eq!(store.products().len(), 11);
    }

    #[tokio::test]
    async fn seed_failure_keeps_store_uninitialized() {
        let (catalog, store) = store();
        catalog.set_failing(true);
        assert!(!store.fetch_all().await);
        assert!(!store.initialized());
        assert!(store.error().unwrap().starts_with("Failed to initialize products"));
    }

    #[tokio::test]
    async fn category_fetch_is_not_merged_into_cache() {
        let (catalog, store) = store();
        catalog
            .insert_batch(&seed::enriched_seed(&mut rand::thread_rng()))
            .await
            .unwrap();

        let jeans = store.fetch_by_category("jeans").await;
        assert_eq!(jeans.len(), 2);
        assert!(store.products().is_empty());
        assert!(store.get_by_category("jeans").is_empty());
    }

    #[tokio::test]
    async fn get_by_id_prefers_cache() {
        let (catalog, store) = store();
        store.fetch_all().await;

        catalog.delete(5).await.unwrap();
        assert_eq!(store.get_by_id(5).await.unwrap().id, 5);

        let remote = catalog.insert(tee("kids")).await.unwrap();
        assert_eq!(store.get_by_id(remote.id).await.unwrap().id, remote.id);
        assert!(store.products().iter().all(|p| p.id != remote.id));

        assert!(store.get_by_id(999).await.is_none());
    }

    #[tokio::test]
    async fn concurrent_adds_get_distinct_ids() {
        let (_, store) = store();
        let store = Arc::new(store);
        store.fetch_all().await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.add(tee("hoodies")).await })
            })
            .collect();
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap().unwrap().id);
        }
        ids.sort();
        assert_eq!(ids, (13..21).collect::<Vec<_>>());
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn mirror_restores_last_state() {
        let path = temp_snapshot_path();
        let catalog = Arc::new(InMemoryCatalog::new());

        let store = ProductStore::rehydrate(catalog.clone(), SnapshotMirror::new(&path)).await;
        store.fetch_all().await;
        store.delete(2).await;
        let expected = store.products();

        // catalog down: the restarted store still shows the mirrored cache
        catalog.set_failing(true);
        let restarted = ProductStore::rehydrate(catalog.clone(), SnapshotMirror::new(&path)).await;
        assert_eq!(restarted.products(), expected);
        assert!(restarted.initialized());
        assert!(!restarted.is_loading());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn mirror_matches_cache_after_concurrent_changes() {
        let path = temp_snapshot_path();
        let catalog = Arc::new(InMemoryCatalog::new());
        let store = Arc::new(ProductStore::rehydrate(catalog, SnapshotMirror::new(&path)).await);
        store.fetch_all().await;

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move {
                    if n % 2 == 0 {
                        store.add(tee("kids")).await.is_some()
                    } else {
                        store.update_stock(n, 50 + n as i32).await
                    }
                })
            })
            .collect();
        for h in handles {
            assert!(h.await.unwrap());
        }

        let on_disk = SnapshotMirror::new(&path).load().await.unwrap();
        assert_eq!(on_disk.products, store.products());
        assert_eq!(on_disk.products.len(), 16);
        assert_eq!(on_disk.products[2].stock, Some(53));

        let _ = std::fs::remove_file(&path);
    }
}
