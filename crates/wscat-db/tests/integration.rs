//! Offline tests for wscat-db: pool configuration and the in-memory store.
//! These tests do not require a live database connection.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use wscat_core::{
    build_app_config, MergedProduct, StockSignal, SyncCounts, SyncRunStatus, SyncRunType,
    TriggerSource,
};
use wscat_db::{
    CatalogStore, MemoryCatalogStore, PoolConfig, ProductFilter, StockApplyOutcome,
    UpsertOutcome,
};

fn product(id: &str, category: &str, price: &str) -> MergedProduct {
    let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    MergedProduct {
        id: id.to_string(),
        name: format!("Product {id}"),
        brand: "Acme".to_string(),
        category: category.to_string(),
        price: Decimal::from_str(price).unwrap(),
        in_stock: true,
        images: vec![format!("https://img.example.com/{id}.jpg")],
        flavours: vec![],
        flavour_images: BTreeMap::new(),
        member_skus: vec![id.to_string()],
        family_key: format!("product {id}").to_lowercase(),
        description: None,
        created_at: ts,
        updated_at: ts,
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("DATABASE_URL", "postgres://example"),
        ("WSCAT_DB_MAX_CONNECTIONS", "42"),
        ("WSCAT_DB_MIN_CONNECTIONS", "7"),
        ("WSCAT_DB_ACQUIRE_TIMEOUT_SECS", "9"),
    ]);
    let app_config = build_app_config(|key| {
        vars.get(key)
            .map(|v| (*v).to_string())
            .ok_or(std::env::VarError::NotPresent)
    })
    .unwrap();

    let pool_config = PoolConfig::from_app_config(&app_config);
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[tokio::test]
async fn upsert_is_idempotent_and_preserves_created_at() {
    let store = MemoryCatalogStore::new();
    let first = product("A", "Protein", "29.99");

    assert_eq!(
        store.upsert_product(&first, None).await.unwrap(),
        UpsertOutcome::Inserted
    );

    let mut second = first.clone();
    second.created_at = first.created_at + Duration::days(1);
    second.updated_at = first.updated_at + Duration::days(1);
    second.price = Decimal::from_str("24.99").unwrap();
    assert_eq!(
        store.upsert_product(&second, None).await.unwrap(),
        UpsertOutcome::Updated
    );

    let stored = store.get_product("A").await.unwrap().unwrap();
    assert_eq!(stored.created_at, first.created_at);
    assert_eq!(stored.price, Decimal::from_str("24.99").unwrap());
    assert_eq!(store.product_count(), 1);
}

#[tokio::test]
async fn upsert_never_overwrites_a_newer_row() {
    let store = MemoryCatalogStore::new();
    let newer = product("A", "Protein", "29.99");
    store.upsert_product(&newer, None).await.unwrap();

    let mut older = newer.clone();
    older.updated_at = newer.updated_at - Duration::minutes(5);
    older.price = Decimal::ONE;
    assert_eq!(
        store.upsert_product(&older, None).await.unwrap(),
        UpsertOutcome::SkippedNewer
    );
    assert_eq!(
        store.get_product("A").await.unwrap().unwrap().price,
        Decimal::from_str("29.99").unwrap()
    );
}

#[tokio::test]
async fn stock_signal_writes_only_carried_fields() {
    let store = MemoryCatalogStore::with_products([
        product("A", "Protein", "10.00"),
        product("B", "Protein", "12.00"),
    ]);
    let later = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();

    let a = StockSignal {
        sku: "A".to_string(),
        price: None,
        in_stock: Some(false),
    };
    let b = StockSignal {
        sku: "B".to_string(),
        price: Some(Decimal::from_str("19.99").unwrap()),
        in_stock: None,
    };
    assert_eq!(
        store.apply_stock_signal(&a, later).await.unwrap(),
        StockApplyOutcome::Applied
    );
    assert_eq!(
        store.apply_stock_signal(&b, later).await.unwrap(),
        StockApplyOutcome::Applied
    );

    let a = store.get_product("A").await.unwrap().unwrap();
    let b = store.get_product("B").await.unwrap().unwrap();
    assert!(!a.in_stock);
    assert_eq!(a.price, Decimal::from_str("10.00").unwrap());
    assert!(b.in_stock);
    assert_eq!(b.price, Decimal::from_str("19.99").unwrap());
}

#[tokio::test]
async fn stock_signal_matches_member_sku_and_ignores_unknown() {
    let mut merged = product("fam-1", "Protein", "10.00");
    merged.member_skus = vec!["WHEY-VAN".to_string(), "WHEY-CHOC".to_string()];
    let store = MemoryCatalogStore::with_products([merged]);
    let later = Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap();

    let member = StockSignal {
        sku: "WHEY-CHOC".to_string(),
        price: None,
        in_stock: Some(false),
    };
    let unknown = StockSignal {
        sku: "NOPE".to_string(),
        price: None,
        in_stock: Some(false),
    };
    assert_eq!(
        store.apply_stock_signal(&member, later).await.unwrap(),
        StockApplyOutcome::Applied
    );
    assert_eq!(
        store.apply_stock_signal(&unknown, later).await.unwrap(),
        StockApplyOutcome::UnknownSku
    );
    assert!(!store.get_product("fam-1").await.unwrap().unwrap().in_stock);
    assert_eq!(
        store.get_product("WHEY-VAN").await.unwrap().unwrap().id,
        "fam-1"
    );
}

#[tokio::test]
async fn list_products_filters_category_case_insensitively() {
    let store = MemoryCatalogStore::with_products([
        product("A", "Protein", "10.00"),
        product("B", "Snacks", "2.00"),
    ]);
    let filter = ProductFilter {
        category: Some("PROTEIN".to_string()),
    };
    let listed = store.list_products(&filter).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, "A");

    assert_eq!(
        store.list_categories().await.unwrap(),
        vec!["Protein".to_string(), "Snacks".to_string()]
    );
}

#[tokio::test]
async fn known_skus_include_ids_and_members() {
    let mut merged = product("fam-1", "Protein", "10.00");
    merged.member_skus = vec!["WHEY-VAN".to_string(), "WHEY-CHOC".to_string()];
    let store = MemoryCatalogStore::with_products([merged, product("B", "Snacks", "2.00")]);

    assert_eq!(
        store.known_skus().await.unwrap(),
        vec!["B", "WHEY-CHOC", "WHEY-VAN", "fam-1"]
    );
}

#[tokio::test]
async fn delete_product_removes_only_the_named_row() {
    let store = MemoryCatalogStore::with_products([
        product("A", "Protein", "10.00"),
        product("B", "Snacks", "2.00"),
    ]);

    assert!(store.delete_product("A").await.unwrap());
    assert!(!store.delete_product("A").await.unwrap());
    assert!(store.get_product("A").await.unwrap().is_none());
    assert_eq!(store.product_count(), 1);
}

#[tokio::test]
async fn sync_run_lifecycle_is_guarded() {
    let store = MemoryCatalogStore::new();
    let run = store
        .create_sync_run(SyncRunType::Full, TriggerSource::Cli)
        .await
        .unwrap();
    assert_eq!(run.status, SyncRunStatus::Running);

    let counts = SyncCounts {
        fetched: 3,
        upserted: 2,
        errors: 1,
        skipped: 0,
    };
    let finished = store
        .finish_sync_run(run.id, SyncRunStatus::Partial, counts, None)
        .await
        .unwrap();
    assert_eq!(finished.status, SyncRunStatus::Partial);
    assert!(finished.completed_at.is_some());
    assert_eq!(finished.counts(), counts);

    let again = store
        .finish_sync_run(run.id, SyncRunStatus::Success, counts, None)
        .await;
    assert!(again.is_err(), "a finished run must not be edited");
}

#[tokio::test]
async fn last_successful_run_ignores_partial_and_other_types() {
    let store = MemoryCatalogStore::new();
    let full = store
        .create_sync_run(SyncRunType::Full, TriggerSource::Scheduler)
        .await
        .unwrap();
    store
        .finish_sync_run(full.id, SyncRunStatus::Success, SyncCounts::default(), None)
        .await
        .unwrap();
    let partial = store
        .create_sync_run(SyncRunType::Incremental, TriggerSource::Scheduler)
        .await
        .unwrap();
    store
        .finish_sync_run(partial.id, SyncRunStatus::Partial, SyncCounts::default(), None)
        .await
        .unwrap();
    let stock = store
        .create_sync_run(SyncRunType::Stock, TriggerSource::Scheduler)
        .await
        .unwrap();
    store
        .finish_sync_run(stock.id, SyncRunStatus::Success, SyncCounts::default(), None)
        .await
        .unwrap();

    let last = store
        .last_successful_run(&[SyncRunType::Full, SyncRunType::Incremental])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(last.id, full.id);

    let runs = store.list_sync_runs(2).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].id, stock.id, "newest first");
}

#[tokio::test]
async fn fail_stale_runs_closes_only_old_running_rows() {
    let store = MemoryCatalogStore::new();
    let stale = store
        .create_sync_run(SyncRunType::Full, TriggerSource::Cli)
        .await
        .unwrap();

    let closed = store
        .fail_stale_runs(Utc::now() + Duration::seconds(1), "interrupted")
        .await
        .unwrap();
    assert_eq!(closed, 1);

    let runs = store.list_sync_runs(10).await.unwrap();
    assert_eq!(runs[0].id, stale.id);
    assert_eq!(runs[0].status, SyncRunStatus::Failed);
    assert_eq!(runs[0].error_message.as_deref(), Some("interrupted"));

    let fresh = store
        .create_sync_run(SyncRunType::Stock, TriggerSource::Cli)
        .await
        .unwrap();
    let closed = store
        .fail_stale_runs(fresh.started_at - Duration::minutes(1), "interrupted")
        .await
        .unwrap();
    assert_eq!(closed, 0);
}
