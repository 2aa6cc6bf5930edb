//! Order sync runs against a fake ShipStation and an in-memory store.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use printline_core::{OrderStatus, SyncStatus, SyncType};
use printline_engine::services::order_sync::{default_start, format_query_timestamp};
use printline_engine::services::{OrderSyncService, SyncError, SyncMode, SyncOptions};
use printline_engine::shipstation::{Order as ShipStationOrder, Tag};
use printline_integration_tests::fixtures::listed_order;
use printline_integration_tests::{FakeShipStation, MemorySyncStore};

const PAGE_ONE_MODIFIED: [&str; 2] = ["2024-05-01T10:00:00.0000000", "2024-05-02T10:00:00.0000000"];
const PAGE_TWO_MODIFIED: &str = "2024-05-03T10:00:00.0000000";

fn pages() -> Vec<Vec<ShipStationOrder>> {
    vec![
        vec![
            listed_order(101, "1001", PAGE_ONE_MODIFIED[0], Some("ann@example.com")),
            listed_order(102, "1002", PAGE_ONE_MODIFIED[1], Some("bob@example.com")),
        ],
        vec![listed_order(103, "1003", PAGE_TWO_MODIFIED, Some("ann@example.com"))],
    ]
}

fn options() -> SyncOptions {
    SyncOptions {
        page_delay: Duration::ZERO,
        ..SyncOptions::default()
    }
}

fn service(api: &Arc<FakeShipStation>, store: &Arc<MemorySyncStore>, options: SyncOptions) -> OrderSyncService {
    OrderSyncService::new(api.clone(), store.clone(), options)
}

fn full() -> SyncMode {
    SyncMode::Full {
        since: None,
        resume: false,
    }
}

#[tokio::test]
async fn test_first_full_sync_pages_through_everything() {
    let api = Arc::new(FakeShipStation::with_pages(pages()));
    let store = Arc::new(MemorySyncStore::default());

    let summary = service(&api, &store, options()).run(full()).await.unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.sync_type, SyncType::Full);
    assert_eq!((summary.orders_fetched, summary.orders_processed, summary.orders_failed), (3, 3, 0));
    assert_eq!(summary.pages_synced, 2);
    assert_eq!(summary.pages_available, Some(2));
    assert_eq!(store.order_count(), 3);

    let requests = api.list_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].order_status.as_deref(), Some("awaiting_shipment"));
    assert_eq!(
        requests[0].modify_date_start,
        Some(format_query_timestamp(default_start()))
    );
    assert_eq!(requests[1].page, 2);

    let runs = store.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, SyncStatus::Completed);
    assert_eq!(runs[0].total_orders, 3);
    assert_eq!(runs[0].processed_orders, 3);
    assert_eq!(runs[0].last_processed_order_id, Some(103));
}

#[tokio::test]
async fn test_next_full_sync_starts_just_after_latest_stored_change() {
    let api = Arc::new(FakeShipStation::with_pages(pages()));
    let store = Arc::new(MemorySyncStore::default());
    let sync = service(&api, &store, options());

    sync.run(full()).await.unwrap();
    sync.run(full()).await.unwrap();

    let requests = api.list_requests();
    assert_eq!(
        requests[2].modify_date_start.as_deref(),
        Some("2024-05-03 10:00:00.001")
    );
}

#[tokio::test]
async fn test_page_failure_fails_run_and_resume_continues_from_checkpoint() {
    let failing = Arc::new(FakeShipStation::with_pages(pages()));
    failing.fail_page(2);
    let store = Arc::new(MemorySyncStore::default());

    let summary = service(&failing, &store, options()).run(full()).await.unwrap();

    assert_eq!(summary.status, SyncStatus::Failed);
    assert!(summary.error.as_deref().unwrap().contains("503"));
    assert_eq!(summary.orders_processed, 2);
    let runs = store.runs();
    assert_eq!(runs[0].status, SyncStatus::Failed);
    assert!(runs[0].error.is_some());

    let healthy = Arc::new(FakeShipStation::with_pages(pages()));
    let resumed = service(&healthy, &store, options())
        .run(SyncMode::Full {
            since: None,
            resume: true,
        })
        .await
        .unwrap();

    assert!(resumed.is_success());
    assert_eq!(
        healthy.list_requests()[0].modify_date_start.as_deref(),
        Some("2024-05-02 10:00:00.001")
    );
    let runs = store.runs();
    assert_eq!(runs.len(), 2);
    assert_eq!(resumed.progress_id, Some(runs[1].id));
    assert_ne!(runs[1].id, runs[0].id);
    assert_eq!(runs[0].status, SyncStatus::Failed);
    assert_eq!(runs[1].status, SyncStatus::Completed);
    assert_eq!(runs[1].error, None);
}

#[tokio::test]
async fn test_resume_keeps_checkpoint_past_order_without_modify_date() {
    let mut undated = listed_order(102, "1002", PAGE_ONE_MODIFIED[1], Some("bob@example.com"));
    undated.modify_date = Some(String::new());
    let failing = Arc::new(FakeShipStation::with_pages(vec![
        vec![
            listed_order(101, "1001", PAGE_ONE_MODIFIED[0], Some("ann@example.com")),
            undated,
        ],
        vec![listed_order(103, "1003", PAGE_TWO_MODIFIED, Some("ann@example.com"))],
    ]));
    failing.fail_page(2);
    let store = Arc::new(MemorySyncStore::default());

    service(&failing, &store, options()).run(full()).await.unwrap();
    assert_eq!(store.runs()[0].last_processed_order_id, Some(102));

    let healthy = Arc::new(FakeShipStation::with_pages(pages()));
    let resumed = service(&healthy, &store, options())
        .run(SyncMode::Full {
            since: None,
            resume: true,
        })
        .await
        .unwrap();

    assert!(resumed.is_success());
    assert_eq!(
        healthy.list_requests()[0].modify_date_start.as_deref(),
        Some("2024-05-01 10:00:00.001")
    );
    assert!(store.order(103).is_some());
}

#[tokio::test]
async fn test_resume_ignores_failed_run_without_checkpoint() {
    let failing = Arc::new(FakeShipStation::with_pages(pages()));
    failing.fail_page(1);
    let store = Arc::new(MemorySyncStore::default());

    let summary = service(&failing, &store, options()).run(full()).await.unwrap();
    assert_eq!(summary.status, SyncStatus::Failed);
    assert_eq!(store.runs()[0].last_processed_order_id, None);

    let healthy = Arc::new(FakeShipStation::with_pages(pages()));
    service(&healthy, &store, options())
        .run(SyncMode::Full {
            since: None,
            resume: true,
        })
        .await
        .unwrap();

    let runs = store.runs();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[1].status, SyncStatus::Completed);
    assert_eq!(runs[1].processed_orders, 3);
    assert_eq!(
        healthy.list_requests()[0].modify_date_start,
        Some(format_query_timestamp(default_start()))
    );
}

#[tokio::test]
async fn test_dry_run_stores_nothing_and_keeps_no_progress() {
    let api = Arc::new(FakeShipStation::with_pages(pages()));
    let store = Arc::new(MemorySyncStore::default());
    let dry = SyncOptions {
        dry_run: true,
        ..options()
    };

    let summary = service(&api, &store, dry).run(full()).await.unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.orders_processed, 3);
    assert_eq!(summary.progress_id, None);
    assert_eq!(store.order_count(), 0);
    assert!(store.runs().is_empty());
    assert!(store.customers().is_empty());
}

#[tokio::test]
async fn test_single_order_sync() {
    let api = Arc::new(FakeShipStation::with_orders([listed_order(
        555,
        "5555",
        PAGE_TWO_MODIFIED,
        Some("cat@example.com"),
    )]));
    let store = Arc::new(MemorySyncStore::default());
    let sync = service(&api, &store, options());

    let summary = sync
        .run(SyncMode::Single {
            shipstation_order_id: 555,
        })
        .await
        .unwrap();
    assert!(summary.is_success());
    assert_eq!(summary.sync_type, SyncType::Single);
    let stored = store.order(555).unwrap();
    assert_eq!(stored.order.shipstation_order_number, "5555");
    assert_eq!(stored.order.marketplace.as_deref(), Some("etsy"));
    assert_eq!(stored.items.len(), 1);
    assert_eq!(stored.items[0].shipstation_line_item_key, "li-555");
    assert!(stored.customer_id.is_some());

    let missing = sync
        .run(SyncMode::Single {
            shipstation_order_id: 9999,
        })
        .await;
    assert!(matches!(missing, Err(SyncError::OrderNotFound(9999))));
    assert_eq!(store.runs()[1].status, SyncStatus::Failed);
}

#[tokio::test]
async fn test_customer_conflict_still_stores_order() {
    let api = Arc::new(FakeShipStation::with_pages(pages()));
    let store = Arc::new(MemorySyncStore::default());
    store.conflict_on("bob@example.com");

    let summary = service(&api, &store, options()).run(full()).await.unwrap();

    assert!(summary.is_success());
    assert_eq!(store.order(102).unwrap().customer_id, None);
    assert!(store.order(101).unwrap().customer_id.is_some());
    assert_eq!(store.order(101).unwrap().customer_id, store.order(103).unwrap().customer_id);
    assert_eq!(store.customers().len(), 1);
}

#[tokio::test]
async fn test_order_without_email_has_no_customer() {
    let api = Arc::new(FakeShipStation::with_pages(vec![vec![listed_order(
        201,
        "2001",
        PAGE_TWO_MODIFIED,
        None,
    )]]));
    let store = Arc::new(MemorySyncStore::default());

    service(&api, &store, options()).run(full()).await.unwrap();

    assert_eq!(store.order(201).unwrap().customer_id, None);
    assert!(store.customers().is_empty());
}

#[tokio::test]
async fn test_all_statuses_and_page_limit() {
    let api = Arc::new(FakeShipStation::with_pages(pages()));
    let store = Arc::new(MemorySyncStore::default());
    let limited = SyncOptions {
        all_statuses: true,
        page_limit: Some(1),
        ..options()
    };

    let summary = service(&api, &store, limited).run(SyncMode::Recent { days: 2 }).await.unwrap();

    assert_eq!(summary.sync_type, SyncType::Recent);
    assert_eq!(summary.pages_synced, 1);
    assert_eq!(store.order_count(), 2);
    let requests = api.list_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].order_status, None);
}

#[tokio::test]
async fn test_tags_are_mirrored() {
    let api = Arc::new(FakeShipStation::default().with_tags(vec![
        Tag {
            tag_id: 1,
            name: "Rush".to_string(),
            color: Some("#FF0000".to_string()),
        },
        Tag {
            tag_id: 2,
            name: "Gift".to_string(),
            color: None,
        },
    ]));
    let store = Arc::new(MemorySyncStore::default());

    let count = service(&api, &store, options()).sync_tags().await.unwrap();

    assert_eq!(count, 2);
    let tags = store.tags();
    assert_eq!(tags[0].name, "Rush");
    assert_eq!(tags[0].color_hex.as_deref(), Some("#FF0000"));
}

#[tokio::test]
async fn test_shipped_order_auto_completes_open_tasks() {
    let store = Arc::new(MemorySyncStore::default());
    let awaiting = Arc::new(FakeShipStation::with_pages(vec![vec![listed_order(
        101,
        "1001",
        PAGE_ONE_MODIFIED[0],
        Some("ann@example.com"),
    )]]));
    service(&awaiting, &store, options()).run(full()).await.unwrap();
    store.seed_open_tasks(101, 2);

    let mut shipped = listed_order(101, "1001", PAGE_TWO_MODIFIED, Some("ann@example.com"));
    shipped.order_status = "shipped".to_string();
    let api = Arc::new(FakeShipStation::with_pages(vec![vec![shipped]]));
    let summary = service(&api, &store, options()).run(full()).await.unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.tasks_auto_completed, 2);
    assert_eq!(store.open_tasks(101), 0);
    assert_eq!(store.order(101).unwrap().order.order_status, OrderStatus::Shipped);
}

#[tokio::test]
async fn test_first_seen_shipped_order_leaves_tasks_alone() {
    let store = Arc::new(MemorySyncStore::default());
    store.seed_open_tasks(101, 1);
    let mut shipped = listed_order(101, "1001", PAGE_TWO_MODIFIED, Some("ann@example.com"));
    shipped.order_status = "shipped".to_string();
    let api = Arc::new(FakeShipStation::with_pages(vec![vec![shipped]]));

    let summary = service(&api, &store, options()).run(full()).await.unwrap();

    assert_eq!(summary.tasks_auto_completed, 0);
    assert_eq!(store.open_tasks(101), 1);
}

#[tokio::test]
async fn test_failing_line_item_keeps_rest_of_order() {
    let mut order = listed_order(301, "3001", PAGE_TWO_MODIFIED, Some("dan@example.com"));
    let mut second = order.items[0].clone();
    second.line_item_key = Some("li-301-b".to_string());
    second.sku = Some("KEY-BLUE".to_string());
    order.items.push(second);
    let api = Arc::new(FakeShipStation::with_pages(vec![vec![order]]));
    let store = Arc::new(MemorySyncStore::default());
    store.fail_item("li-301-b");

    let summary = service(&api, &store, options()).run(full()).await.unwrap();

    assert!(summary.is_success());
    assert_eq!((summary.orders_processed, summary.orders_failed), (1, 0));
    assert_eq!(summary.items_failed, 1);
    let stored = store.order(301).unwrap();
    assert_eq!(stored.items.len(), 1);
    assert_eq!(stored.items[0].shipstation_line_item_key, "li-301");
    assert_eq!(store.runs()[0].processed_orders, 1);
}
