use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    routing::{get, patch, post, put},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{instrument, warn};

use crate::products::dto::{CategoryQuery, StockUpdate};
use crate::products::form::ProductDraft;
use crate::products::repo_types::Product;
use crate::products::store::{ProductStore, StoreStatus};
use crate::state::AppState;

type ApiError = (StatusCode, String);

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/cached", get(cached_products))
        .route("/products/:id", get(get_product))
        .route("/store", get(store_status))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/products", post(create_product))
        .route("/products/:id", put(update_product).delete(delete_product))
        .route("/products/:id/stock", patch(update_stock))
}

/// GET /products[?category=c]
#[instrument(skip(state))]
pub async fn list_products(
    State(state): State<AppState>,
    Query(q): Query<CategoryQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let store = &state.store;
    match q.category {
        Some(category) => {
            let products = store.fetch_by_category(&category).await;
            if products.is_empty() {
                if let Some(err) = store.error() {
                    return Err(remote_failure(err));
                }
            }
            Ok(Json(products))
        }
        None => {
            if !store.fetch_all().await {
                return Err(remote_failure(store.error().unwrap_or_default()));
            }
            Ok(Json(store.products()))
        }
    }
}

/// GET /products/cached[?category=c]: cache only, no round-trip
pub async fn cached_products(
    State(state): State<AppState>,
    Query(q): Query<CategoryQuery>,
) -> Json<Vec<Product>> {
    let products = match q.category {
        Some(category) => state.store.get_by_category(&category),
        None => state.store.products(),
    };
    Json(products)
}

#[instrument(skip(state))]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Product>, ApiError> {
    state
        .store
        .get_by_id(id)
        .await
        .map(Json)
        .ok_or_else(|| not_found(id))
}

#[instrument(skip(state, draft))]
pub async fn create_product(
    State(state): State<AppState>,
    Json(draft): Json<ProductDraft>,
) -> Result<(StatusCode, HeaderMap, Json<Product>), ApiError> {
    let new_product = draft
        .into_new_product(OffsetDateTime::now_utc())
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let created = state
        .store
        .add(new_product)
        .await
        .ok_or_else(|| remote_failure(state.store.error().unwrap_or_default()))?;

    let mut headers = HeaderMap::new();
    let location = HeaderValue::from_str(&format!("/api/v1/products/{}", created.id))
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    headers.insert(axum::http::header::LOCATION, location);

    Ok((StatusCode::CREATED, headers, Json(created)))
}

#[instrument(skip(state, draft))]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(draft): Json<ProductDraft>,
) -> Result<Json<Product>, ApiError> {
    let existing = state.store.get_by_id(id).await.ok_or_else(|| not_found(id))?;
    let product = draft
        .apply_to(&existing)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    state
        .store
        .update(product)
        .await
        .map(Json)
        .ok_or_else(|| write_failure(&state.store, id))
}

#[instrument(skip(state))]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    ensure_exists(&state.store, id).await?;
    if !state.store.delete(id).await {
        return Err(write_failure(&state.store, id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /products/:id/stock { "stock": n }
#[instrument(skip(state))]
pub async fn update_stock(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<StockUpdate>,
) -> Result<StatusCode, ApiError> {
    if body.stock < 0 {
        return Err((StatusCode::BAD_REQUEST, "stock must not be negative".into()));
    }
    ensure_exists(&state.store, id).await?;
    if !state.store.update_stock(id, body.stock).await {
        return Err(write_failure(&state.store, id));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn store_status(State(state): State<AppState>) -> Json<StoreStatus> {
    Json(state.store.status())
}

async fn ensure_exists(store: &ProductStore, id: i64) -> Result<(), ApiError> {
    match store.get_by_id(id).await {
        Some(_) => Ok(()),
        None => Err(not_found(id)),
    }
}

fn not_found(id: i64) -> ApiError {
    (StatusCode::NOT_FOUND, format!("Product {id} not found"))
}

/// A row that vanished remotely after the existence check is still a 404.
fn write_failure(store: &ProductStore, id: i64) -> ApiError {
    if store.missed_row() {
        return not_found(id);
    }
    remote_failure(store.error().unwrap_or_default())
}

fn remote_failure(message: String) -> ApiError {
    warn!(error = %message, "catalog request failed");
    (StatusCode::BAD_GATEWAY, message)
}
