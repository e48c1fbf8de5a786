//! In-process stand-ins for the product and order services.
//!
//! They implement only the HTTP contract the harness scenarios exercise, plus a few fault knobs
//! so tests can drive the harness down its failure paths.

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    Extension, Json, Router,
    extract::Path,
    http::StatusCode,
    routing::{get, post},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::{net::TcpListener, sync::watch, task::JoinHandle, time::sleep};
use tracing::{info, warn};
use uuid::Uuid;

/// Which of the two stubbed services a counter refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StubService {
    Product,
    Order,
}

impl StubService {
    pub fn name(self) -> &'static str {
        match self {
            StubService::Product => "product-service",
            StubService::Order => "order-service",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StubFaults {
    /// Answer `/health` with 503 for this many polls per service before turning healthy.
    pub unhealthy_polls: usize,
    /// Hold every `/health` response this long.
    pub slow_health: Duration,
    /// Hold every `GET /products/{id}` response this long.
    pub slow_reads: Duration,
    /// Accept orders without touching stock.
    pub skip_stock_deduction: bool,
    /// Answer every `DELETE /products/{id}` with 500 and keep the product.
    pub fail_deletes: bool,
    /// Answer every `POST /products` with 500.
    pub reject_creates: bool,
}

/// Body of `POST /products`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    pub stock_quantity: i64,
}

impl ProductInput {
    pub fn new(name: impl Into<String>, price: f64, stock_quantity: i64) -> Self {
        Self {
            name: name.into(),
            description: "Test".into(),
            price,
            stock_quantity,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct OrderLine {
    product_id: Value,
    quantity: i64,
}

/// Body of `POST /orders`; shipping and pricing fields are accepted and ignored.
#[derive(Debug, Clone, Deserialize)]
struct OrderInput {
    user_id: Value,
    items: Vec<OrderLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredProduct {
    pub product_id: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub stock_quantity: i64,
}

#[derive(Default)]
struct StubInner {
    faults: Mutex<StubFaults>,
    products: Mutex<HashMap<String, StoredProduct>>,
    health_polls: Mutex<HashMap<StubService, usize>>,
    delete_attempts: Mutex<HashMap<String, usize>>,
    orders: Mutex<u64>,
}

/// Shared state behind both stub routers. Cheap to clone.
#[derive(Clone, Default)]
pub struct StubState {
    inner: Arc<StubInner>,
}

impl StubState {
    pub fn new(faults: StubFaults) -> Self {
        let state = Self::default();
        state.set_faults(faults);
        state
    }

    pub fn set_faults(&self, faults: StubFaults) {
        *self.inner.faults.lock() = faults;
    }

    pub fn faults(&self) -> StubFaults {
        self.inner.faults.lock().clone()
    }

    pub fn health_polls(&self, service: StubService) -> usize {
        self.inner
            .health_polls
            .lock()
            .get(&service)
            .copied()
            .unwrap_or_default()
    }

    pub fn delete_attempts(&self, product_id: &str) -> usize {
        self.inner
            .delete_attempts
            .lock()
            .get(product_id)
            .copied()
            .unwrap_or_default()
    }

    /// Delete attempts per product id, for every id that saw at least one.
    pub fn all_delete_attempts(&self) -> HashMap<String, usize> {
        self.inner.delete_attempts.lock().clone()
    }

    pub fn product(&self, product_id: &str) -> Option<StoredProduct> {
        self.inner.products.lock().get(product_id).cloned()
    }

    pub fn product_count(&self) -> usize {
        self.inner.products.lock().len()
    }

    pub fn order_count(&self) -> u64 {
        *self.inner.orders.lock()
    }

    /// Insert a product directly, bypassing HTTP. Returns its generated id.
    pub fn seed_product(&self, product: ProductInput) -> String {
        let id = Uuid::new_v4().to_string();
        self.seed_product_as(&id, product);
        id
    }

    /// Insert a product under a caller-chosen id.
    pub fn seed_product_as(&self, id: &str, product: ProductInput) {
        self.inner.products.lock().insert(
            id.to_string(),
            StoredProduct {
                product_id: id.to_string(),
                name: product.name,
                description: product.description,
                price: product.price,
                stock_quantity: product.stock_quantity,
            },
        );
    }

    fn record_health_poll(&self, service: StubService) -> bool {
        let mut polls = self.inner.health_polls.lock();
        let count = polls.entry(service).or_default();
        *count += 1;
        *count > self.inner.faults.lock().unhealthy_polls
    }

    fn record_delete_attempt(&self, product_id: &str) {
        *self
            .inner
            .delete_attempts
            .lock()
            .entry(product_id.to_string())
            .or_default() += 1;
    }
}

pub fn product_router(state: StubState) -> Router {
    Router::new()
        .route("/health", get(product_health))
        .route("/products", post(create_product))
        .route("/products/{id}", get(get_product).delete(delete_product))
        .layer(Extension(state))
}

pub fn order_router(state: StubState) -> Router {
    Router::new()
        .route("/health", get(order_health))
        .route("/orders", post(create_order))
        .layer(Extension(state))
}

type Reply = (StatusCode, Json<Value>);

async fn health(state: &StubState, service: StubService) -> Reply {
    let ready = state.record_health_poll(service);
    let delay = state.faults().slow_health;
    if !delay.is_zero() {
        sleep(delay).await;
    }
    if ready {
        (
            StatusCode::OK,
            Json(json!({"status": "ok", "service": service.name()})),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "starting", "service": service.name()})),
        )
    }
}

async fn product_health(Extension(state): Extension<StubState>) -> Reply {
    health(&state, StubService::Product).await
}

async fn order_health(Extension(state): Extension<StubState>) -> Reply {
    health(&state, StubService::Order).await
}

async fn create_product(
    Extension(state): Extension<StubState>,
    Json(payload): Json<ProductInput>,
) -> Reply {
    if state.faults().reject_creates {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "catalog unavailable"})),
        );
    }
    if payload.name.trim().is_empty() || payload.stock_quantity < 0 || payload.price < 0.0 {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"detail": "invalid product"})),
        );
    }
    let id = state.seed_product(payload);
    let stored = state.product(&id);
    (StatusCode::CREATED, Json(json!(stored)))
}

async fn get_product(
    Extension(state): Extension<StubState>,
    Path(id): Path<String>,
) -> Result<Json<StoredProduct>, StatusCode> {
    let delay = state.faults().slow_reads;
    if !delay.is_zero() {
        sleep(delay).await;
    }
    state.product(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn delete_product(
    Extension(state): Extension<StubState>,
    Path(id): Path<String>,
) -> StatusCode {
    state.record_delete_attempt(&id);
    if state.faults().fail_deletes {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    match state.inner.products.lock().remove(&id) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

/// Catalog key for an id as it arrives in an order line (string or number).
fn product_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

async fn create_order(
    Extension(state): Extension<StubState>,
    Json(order): Json<OrderInput>,
) -> Reply {
    if order.items.is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"detail": "order has no items"})),
        );
    }
    let skip_deduction = state.faults().skip_stock_deduction;

    let mut products = state.inner.products.lock();
    for item in &order.items {
        let id = product_key(&item.product_id);
        let Some(product) = products.get(&id) else {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"detail": format!("product {id} not found")})),
            );
        };
        if item.quantity <= 0 || product.stock_quantity < item.quantity {
            return (
                StatusCode::CONFLICT,
                Json(json!({"detail": format!("insufficient stock for product {id}")})),
            );
        }
    }
    if !skip_deduction {
        for item in &order.items {
            if let Some(product) = products.get_mut(&product_key(&item.product_id)) {
                product.stock_quantity -= item.quantity;
            }
        }
    }
    drop(products);

    let order_id = {
        let mut orders = state.inner.orders.lock();
        *orders += 1;
        *orders
    };
    (
        StatusCode::CREATED,
        Json(json!({
            "order_id": order_id,
            "user_id": order.user_id,
            "status": "confirmed",
        })),
    )
}

/// Both stub services bound to local sockets. Stops serving on [`StubServices::shutdown`]
/// or drop.
pub struct StubServices {
    state: StubState,
    product_url: String,
    order_url: String,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl StubServices {
    /// Bind both services on ephemeral localhost ports.
    pub async fn spawn(faults: StubFaults) -> Result<Self> {
        let any_port: SocketAddr = ([127, 0, 0, 1], 0).into();
        Self::bind(any_port, any_port, faults).await
    }

    pub async fn bind(
        product_addr: SocketAddr,
        order_addr: SocketAddr,
        faults: StubFaults,
    ) -> Result<Self> {
        let state = StubState::new(faults);
        let (shutdown, signal) = watch::channel(false);

        let product_listener = TcpListener::bind(product_addr)
            .await
            .with_context(|| format!("failed to bind product stub on {product_addr}"))?;
        let order_listener = TcpListener::bind(order_addr)
            .await
            .with_context(|| format!("failed to bind order stub on {order_addr}"))?;
        let product_url = format!("http://{}", product_listener.local_addr()?);
        let order_url = format!("http://{}", order_listener.local_addr()?);

        let tasks = vec![
            serve(
                "product",
                product_listener,
                product_router(state.clone()),
                signal.clone(),
            ),
            serve("order", order_listener, order_router(state.clone()), signal),
        ];
        info!(%product_url, %order_url, "stub services listening");

        Ok(Self {
            state,
            product_url,
            order_url,
            shutdown,
            tasks,
        })
    }

    pub fn state(&self) -> &StubState {
        &self.state
    }

    pub fn product_url(&self) -> &str {
        &self.product_url
    }

    pub fn order_url(&self) -> &str {
        &self.order_url
    }

    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            if let Err(err) = task.await {
                warn!(?err, "stub server task ended unexpectedly");
            }
        }
    }
}

impl Drop for StubServices {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

fn serve(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    mut signal: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = signal.wait_for(|stop| *stop).await;
            })
            .await;
        if let Err(err) = result {
            warn!(?err, service = name, "stub server exited with an error");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_turns_ready_after_configured_polls() {
        let state = StubState::new(StubFaults {
            unhealthy_polls: 2,
            ..StubFaults::default()
        });
        assert!(!state.record_health_poll(StubService::Product));
        assert!(!state.record_health_poll(StubService::Product));
        assert!(state.record_health_poll(StubService::Product));
        assert_eq!(state.health_polls(StubService::Product), 3);
        assert_eq!(state.health_polls(StubService::Order), 0);
    }

    #[test]
    fn seeded_products_are_visible() {
        let state = StubState::default();
        let id = state.seed_product(ProductInput::new("Widget", 1.5, 4));
        let stored = state.product(&id).expect("seeded product");
        assert_eq!(stored.name, "Widget");
        assert_eq!(stored.stock_quantity, 4);

        state.seed_product_as("p1", ProductInput::new("Fixed", 2.0, 1));
        assert_eq!(state.product("p1").map(|p| p.name), Some("Fixed".to_string()));
        assert_eq!(state.product_count(), 2);
    }

    #[test]
    fn numeric_order_ids_map_to_catalog_keys() {
        assert_eq!(product_key(&json!(42)), "42");
        assert_eq!(product_key(&json!("abc")), "abc");
    }
}
