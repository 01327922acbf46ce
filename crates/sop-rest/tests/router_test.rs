//! Router tests driven through `tower::ServiceExt::oneshot`.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use sop_cache::build_cache_manager;
use sop_config::{RedisConfig, ServerConfig};
use sop_core::{Page, PageRequest, SopError, SopResult};
use sop_repository::{InMemorySchoolRepository, School, SchoolRepository};
use sop_rest::{create_router, AppState};
use std::sync::Arc;
use tower::ServiceExt;

struct BrokenRepository;

#[async_trait]
impl SchoolRepository for BrokenRepository {
    async fn find_page(&self, _page: PageRequest) -> SopResult<Page<School>> {
        Err(SopError::Database("connection reset".to_string()))
    }

    async fn count(&self) -> SopResult<u64> {
        Err(SopError::Database("connection reset".to_string()))
    }
}

fn memory_cache_config() -> RedisConfig {
    RedisConfig {
        enabled: false,
        ..RedisConfig::default()
    }
}

fn app(schools: Arc<dyn SchoolRepository>, redis: &RedisConfig) -> Router {
    let state = AppState::new(schools, build_cache_manager(redis));
    create_router(state, &ServerConfig::default())
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_values_returns_first_ten_as_array() {
    let app = app(
        Arc::new(InMemorySchoolRepository::seeded(23)),
        &memory_cache_config(),
    );

    let (status, body) = get(app, "/api/values").await;

    assert_eq!(status, StatusCode::OK);
    let items = body.as_array().expect("bare JSON array");
    assert_eq!(items.len(), 10);
    assert_eq!(items[0]["id"], 1);
    assert_eq!(items[9]["id"], 10);
    assert_eq!(items[0]["name"], "School 1");
    assert!(items[0].get("createdAt").is_some());
}

#[tokio::test]
async fn test_values_with_few_records() {
    let app = app(
        Arc::new(InMemorySchoolRepository::seeded(4)),
        &memory_cache_config(),
    );

    let (status, body) = get(app, "/api/values").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(4));
}

#[tokio::test]
async fn test_values_empty_repository() {
    let app = app(Arc::new(InMemorySchoolRepository::new()), &memory_cache_config());

    let (status, body) = get(app, "/api/values").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Array(Vec::new()));
}

#[tokio::test]
async fn test_values_repository_error_uses_envelope() {
    let app = app(Arc::new(BrokenRepository), &memory_cache_config());

    let (status, body) = get(app, "/api/values").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "DATABASE_ERROR");
}

#[tokio::test]
async fn test_health_and_live() {
    let repo: Arc<dyn SchoolRepository> = Arc::new(InMemorySchoolRepository::new());

    let (status, body) = get(app(repo.clone(), &memory_cache_config()), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _) = get(app(repo, &memory_cache_config()), "/live").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_ready_with_in_process_cache() {
    let app = app(Arc::new(InMemorySchoolRepository::new()), &memory_cache_config());

    let (status, body) = get(app, "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
    assert_eq!(body["cache"], "connected");
}

#[tokio::test]
async fn test_not_ready_without_connection_string() {
    let redis = RedisConfig {
        enabled: true,
        connection: String::new(),
        ..RedisConfig::default()
    };
    let app = app(Arc::new(InMemorySchoolRepository::new()), &redis);

    let (status, body) = get(app, "/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);
    assert_eq!(body["cache"], "uninitialized");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = app(Arc::new(InMemorySchoolRepository::new()), &memory_cache_config());
    let (status, _) = get(app, "/api/nothing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
