//! REST target tests against an in-process fake platform

use aging_client::RestTarget;
use aging_core::{AgingError, Credentials, EntityKind, ListFilter, SessionConnector};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const TOKEN: &str = "session-token-1";

#[derive(Clone, Default)]
struct Platform {
    records: Arc<Mutex<BTreeMap<(String, u64), Value>>>,
    next_id: Arc<Mutex<u64>>,
}

#[derive(Deserialize)]
struct Paging {
    page: usize,
    page_size: usize,
}

fn authorize(headers: &HeaderMap) -> Result<(), StatusCode> {
    let expected = format!("Bearer {}", TOKEN);
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => Ok(()),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

async fn login(Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    if body["password"] == "secret" {
        Ok(Json(json!({ "token": TOKEN })))
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

async fn create(
    State(platform): State<Platform>,
    headers: HeaderMap,
    Path(resource): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    authorize(&headers)?;
    let id = {
        let mut next = platform.next_id.lock();
        *next += 1;
        *next
    };
    platform.records.lock().insert((resource, id), body);
    Ok(Json(json!({ "data": { "id": id } })))
}

async fn list(
    State(platform): State<Platform>,
    headers: HeaderMap,
    Path(resource): Path<String>,
    Query(paging): Query<Paging>,
) -> Result<Json<Value>, StatusCode> {
    authorize(&headers)?;
    let items: Vec<Value> = platform
        .records
        .lock()
        .iter()
        .filter(|((r, _), _)| *r == resource)
        .skip((paging.page - 1) * paging.page_size)
        .take(paging.page_size)
        .map(|(_, v)| v.clone())
        .collect();
    Ok(Json(json!({ "items": items })))
}

async fn read(
    State(platform): State<Platform>,
    headers: HeaderMap,
    Path((resource, id)): Path<(String, u64)>,
) -> Result<Json<Value>, StatusCode> {
    authorize(&headers)?;
    platform
        .records
        .lock()
        .get(&(resource, id))
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn update(
    State(platform): State<Platform>,
    headers: HeaderMap,
    Path((resource, id)): Path<(String, u64)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    authorize(&headers)?;
    let mut records = platform.records.lock();
    let record = records.get_mut(&(resource, id)).ok_or(StatusCode::NOT_FOUND)?;
    *record = body.clone();
    Ok(Json(body))
}

async fn remove(
    State(platform): State<Platform>,
    headers: HeaderMap,
    Path((resource, id)): Path<(String, u64)>,
) -> Result<StatusCode, StatusCode> {
    authorize(&headers)?;
    platform
        .records
        .lock()
        .remove(&(resource, id))
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn spawn_platform() -> (String, Platform) {
    let platform = Platform::default();
    let app = Router::new()
        .route("/auth/login", post(login))
        .route("/api/:resource", post(create).get(list))
        .route("/api/:resource/:id", get(read).put(update).delete(remove))
        .with_state(platform.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), platform)
}

#[tokio::test]
async fn test_rest_crud_cycle() {
    let (base_url, platform) = spawn_platform().await;
    let target = RestTarget::new(base_url, Duration::from_secs(5)).unwrap();

    let registry = target
        .connect(&Credentials::new("aging", "secret"), 1)
        .await
        .unwrap();
    assert_eq!(registry.len(), EntityKind::ALL.len());

    let products = registry.client(EntityKind::Product).unwrap();
    let id = products
        .create(&json!({ "name": "bolt", "price": 1.5 }))
        .await
        .unwrap();
    assert_eq!(platform.records.lock().len(), 1);
    assert!(platform
        .records
        .lock()
        .contains_key(&("products".to_string(), 1)));

    let record = products.read(&id).await.unwrap();
    assert_eq!(record["name"], "bolt");

    let updated = products
        .update(&id, &json!({ "name": "bolt-m6", "price": 1.7 }))
        .await
        .unwrap();
    assert_eq!(updated["name"], "bolt-m6");

    let page = products.list(&ListFilter::first_page(20)).await.unwrap();
    assert_eq!(page.len(), 1);

    assert!(products.delete(&id).await.unwrap());
    assert!(!products.delete(&id).await.unwrap());

    let err = products.read(&id).await.unwrap_err();
    assert!(matches!(err, AgingError::NotFound { entity: "product", .. }));
}

#[tokio::test]
async fn test_rest_login_failure() {
    let (base_url, _platform) = spawn_platform().await;
    let target = RestTarget::new(base_url, Duration::from_secs(5)).unwrap();

    let err = target
        .connect(&Credentials::new("aging", "wrong"), 2)
        .await
        .unwrap_err();
    assert!(matches!(err, AgingError::Authentication(_)));
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn test_rest_unreachable_target() {
    // Port 9 (discard) on loopback is not expected to accept HTTP
    let target = RestTarget::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
    let err = target
        .connect(&Credentials::new("aging", "secret"), 3)
        .await
        .unwrap_err();
    assert!(matches!(err, AgingError::Authentication(_)));
}
