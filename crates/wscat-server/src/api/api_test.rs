use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::Request;
use rust_decimal::Decimal;
use tower::ServiceExt;
use wscat_catalog::sync::{CsvDropSource, FeedStockSource};
use wscat_catalog::{OverrideCache, SyncOptions};
use wscat_core::{MergePolicy, MergedProduct, SyncRunStatus};
use wscat_db::MemoryCatalogStore;

use super::*;

struct Harness {
    app: Router,
    store: Arc<MemoryCatalogStore>,
    dir: tempfile::TempDir,
}

impl Harness {
    fn feed_path(&self) -> std::path::PathBuf {
        self.dir.path().join("overrides.csv")
    }

    fn drops_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("drops")
    }
}

fn product(id: &str, name: &str, price: &str) -> MergedProduct {
    MergedProduct {
        id: id.to_string(),
        name: name.to_string(),
        brand: "Acme".to_string(),
        category: "Snacks".to_string(),
        price: Decimal::from_str(price).unwrap(),
        in_stock: true,
        images: vec![],
        flavours: vec![],
        flavour_images: BTreeMap::new(),
        member_skus: vec![id.to_string()],
        family_key: name.to_lowercase(),
        description: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn harness_with_limit(products: Vec<MergedProduct>, max_requests: usize) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("drops")).unwrap();
    let feed = dir.path().join("overrides.csv");

    let store = Arc::new(MemoryCatalogStore::with_products(products));
    let dyn_store: Arc<dyn CatalogStore> = store.clone();
    let catalog = CatalogQueryService::new(Arc::clone(&dyn_store), Arc::new(OverrideCache::new(&feed)));
    let sync = SyncOrchestrator::new(
        dyn_store.clone(),
        Arc::new(CsvDropSource::new(dir.path().join("drops"))),
        Arc::new(FeedStockSource::new(&feed)),
        MergePolicy::default(),
        SyncOptions::default(),
    );

    let app = build_app(
        AppState {
            store: dyn_store,
            catalog,
            sync,
        },
        RateLimitState::per_minute(max_requests),
    );
    Harness { app, store, dir }
}

fn harness(products: Vec<MergedProduct>) -> Harness {
    harness_with_limit(products, 1_000)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read_json(response).await
}

async fn post_json(app: &Router, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read_json(response).await
}

async fn read_json(response: axum::response::Response) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[test]
fn normalize_limit_applies_defaults_and_bounds() {
    assert_eq!(normalize_limit(None), 20);
    assert_eq!(normalize_limit(Some(0)), 1);
    assert_eq!(normalize_limit(Some(1_000)), 200);
    assert_eq!(normalize_limit(Some(25)), 25);
}

#[test]
fn api_error_codes_map_to_statuses() {
    let cases = [
        ("not_found", StatusCode::NOT_FOUND),
        ("validation_error", StatusCode::BAD_REQUEST),
        ("conflict", StatusCode::CONFLICT),
        ("rate_limited", StatusCode::TOO_MANY_REQUESTS),
        ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (code, status) in cases {
        assert_eq!(ApiError::new("req-1", code, "x").into_response().status(), status);
    }
}

#[test]
fn already_running_maps_to_conflict() {
    let err = map_sync_error("req-1".to_string(), &SyncError::AlreadyRunning);
    assert_eq!(err.error.code, "conflict");
    assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
}

#[test]
fn contract_violations_map_to_validation_errors() {
    let err = map_query_error(
        "req-1".to_string(),
        &QueryError::UnknownSort("cheapest".to_string()),
    );
    assert_eq!(err.error.code, "validation_error");
    assert!(err.error.message.contains("cheapest"));
}

#[tokio::test]
async fn health_reports_ok_and_echoes_request_id() {
    let h = harness(vec![]);
    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .header("x-request-id", "health-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["x-request-id"], "health-1");
    let (status, json) = read_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "ok");
    assert_eq!(json["data"]["sync_running"], false);
    assert_eq!(json["meta"]["request_id"], "health-1");
}

#[tokio::test]
async fn products_are_paged_inside_the_envelope() {
    let h = harness(vec![
        product("A", "Almond Bar", "2.00"),
        product("B", "Banana Chips", "3.00"),
        product("C", "Cashew Mix", "4.00"),
    ]);

    let (status, json) = get(&h.app, "/api/v1/products?page_size=2&sort=price_desc").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total"], 3);
    assert_eq!(json["data"]["page"], 1);
    assert_eq!(json["data"]["page_size"], 2);
    let ids: Vec<&str> = json["data"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["C", "B"]);
    assert_eq!(json["data"]["categories"], serde_json::json!(["Snacks"]));
    assert!(json["meta"]["request_id"].is_string());
}

#[tokio::test]
async fn override_price_is_served_for_list_and_detail() {
    let h = harness(vec![product("A", "Almond Bar", "2.00")]);
    std::fs::write(h.feed_path(), "sku,price\nA,1.50\n").unwrap();

    let (_, list) = get(&h.app, "/api/v1/products").await;
    assert_eq!(list["data"]["items"][0]["price"], "1.50");

    let (status, detail) = get(&h.app, "/api/v1/products/A").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["data"]["price"], "1.50");
}

#[tokio::test]
async fn unknown_product_is_not_found() {
    let h = harness(vec![]);
    let (status, json) = get(&h.app, "/api/v1/products/NOPE").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "not_found");
}

#[tokio::test]
async fn invalid_query_arguments_are_rejected() {
    let h = harness(vec![product("A", "Almond Bar", "2.00")]);

    for uri in [
        "/api/v1/products?sort=cheapest",
        "/api/v1/products?min_price=abc",
        "/api/v1/products?min_price=10&max_price=5",
    ] {
        let (status, json) = get(&h.app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(json["error"]["code"], "validation_error", "{uri}");
    }
}

#[tokio::test]
async fn triggered_run_is_accepted_and_completes_in_background() {
    let h = harness(vec![]);
    std::fs::write(
        h.drops_dir().join("drop.csv"),
        "sku,name,price,stock\nOAT-1,Oat Bar,1.20,5\nRICE-1,Rice Cake,0.80,0\n",
    )
    .unwrap();

    let (status, json) = post_json(&h.app, "/api/v1/sync/runs", r#"{"type":"full"}"#).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["data"]["status"], "running");
    assert_eq!(json["data"]["run_type"], "full");
    assert_eq!(json["data"]["trigger_source"], "api");

    let mut run = None;
    for _ in 0..200 {
        let runs = h.store.list_sync_runs(1).await.unwrap();
        if runs.first().is_some_and(|r| r.status.is_terminal()) {
            run = runs.into_iter().next();
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let run = run.expect("run should finish");
    assert_eq!(run.status, SyncRunStatus::Success);
    assert_eq!(run.fetched_count, 2);
    assert_eq!(h.store.product_count(), 2);

    let (status, json) = get(&h.app, "/api/v1/sync/runs?limit=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"][0]["status"], "success");
    assert_eq!(json["data"][0]["upserted_count"], 2);
}

#[tokio::test]
async fn unknown_run_type_is_rejected() {
    let h = harness(vec![]);
    let (status, _) = post_json(&h.app, "/api/v1/sync/runs", r#"{"type":"weekly"}"#).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn override_status_reports_loaded_feed() {
    let h = harness(vec![]);
    std::fs::write(h.feed_path(), "sku,price,stock\nA,1.00,\nB,,maybe\n").unwrap();

    let (status, json) = get(&h.app, "/api/v1/overrides/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["entries"], 2);
    assert_eq!(json["data"]["layout"], "named");
    assert_eq!(json["data"]["unrecognized_stock"], 1);
    assert!(json["data"]["last_error"].is_null());
}

#[tokio::test]
async fn rate_limit_covers_api_routes_but_not_health() {
    let h = harness_with_limit(vec![], 1);

    let (first, _) = get(&h.app, "/api/v1/sync/runs").await;
    let (second, json) = get(&h.app, "/api/v1/sync/runs").await;
    let (health, _) = get(&h.app, "/api/v1/health").await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["error"]["code"], "rate_limited");
    assert_eq!(health, StatusCode::OK);
}

#[sqlx::test(migrations = "../../migrations")]
async fn health_is_ok_against_postgres(pool: sqlx::PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let feed = dir.path().join("overrides.csv");
    let store: Arc<dyn CatalogStore> = Arc::new(wscat_db::PgCatalogStore::new(pool));
    let catalog = CatalogQueryService::new(Arc::clone(&store), Arc::new(OverrideCache::new(&feed)));
    let sync = SyncOrchestrator::new(
        Arc::clone(&store),
        Arc::new(CsvDropSource::new(dir.path())),
        Arc::new(FeedStockSource::new(&feed)),
        MergePolicy::default(),
        SyncOptions::default(),
    );
    let app = build_app(
        AppState {
            store,
            catalog,
            sync,
        },
        RateLimitState::per_minute(10),
    );

    let (status, json) = get(&app, "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["database"], "ok");

    let (status, json) = get(&app, "/api/v1/products").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total"], 0);
}
