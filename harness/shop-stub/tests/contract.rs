use axum::{
    Router,
    body::{self, Body},
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use shop_stub::{ProductInput, StubFaults, StubState, order_router, product_router};
use tower::ServiceExt;

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health_bodies_name_their_service() {
    let state = StubState::default();
    let (status, body) = call(&product_router(state.clone()), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "product-service");

    let (status, body) = call(&order_router(state), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "order-service");
}

#[tokio::test]
async fn product_crud_follows_contract() {
    let app = product_router(StubState::default());
    let (status, created) = call(
        &app,
        "POST",
        "/products",
        Some(json!({
            "name": "Test Product",
            "description": "Test",
            "price": 9.99,
            "stock_quantity": 10,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["product_id"].as_str().expect("string id").to_string();

    let (status, fetched) = call(&app, "GET", &format!("/products/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "Test Product");
    assert_eq!(fetched["stock_quantity"], 10);

    let (status, _) = call(&app, "DELETE", &format!("/products/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "GET", &format!("/products/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn orders_deduct_stock_and_reject_overdraw() {
    let state = StubState::default();
    let products = product_router(state.clone());
    let orders = order_router(state.clone());
    let id = state.seed_product(ProductInput::new("Order Test Product", 19.99, 5));

    let order = |quantity: i64| {
        json!({
            "user_id": 1,
            "shipping_address": "123 Test St",
            "items": [{"product_id": id, "quantity": quantity, "price_at_purchase": 19.99}],
        })
    };

    let (status, receipt) = call(&orders, "POST", "/orders", Some(order(2))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["status"], "confirmed");

    let (_, fetched) = call(&products, "GET", &format!("/products/{id}"), None).await;
    assert_eq!(fetched["stock_quantity"], 3);

    let (status, _) = call(&orders, "POST", "/orders", Some(order(4))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(state.product(&id).unwrap().stock_quantity, 3);
}

#[tokio::test]
async fn fault_knobs_change_responses() {
    let state = StubState::new(StubFaults {
        unhealthy_polls: 1,
        fail_deletes: true,
        ..StubFaults::default()
    });
    let app = product_router(state.clone());

    let (status, _) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let (status, _) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);

    let id = state.seed_product(ProductInput::new("Sticky", 1.0, 1));
    let (status, _) = call(&app, "DELETE", &format!("/products/{id}"), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(state.product(&id).is_some());
    assert_eq!(state.delete_attempts(&id), 1);
}
