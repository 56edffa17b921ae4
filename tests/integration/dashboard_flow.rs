//! Cache, poller and fetchers wired over real HTTP.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use queuewatch::{
    Dashboard, FetchError, FetchOutcome, HistoryFilterPatch, HttpTransport, QueueSnapshot,
    Resource, ResourceCache, StatsQuery, TaskStatus, WatchConfig,
};
use tokio_test::{assert_err, assert_ok};

use crate::support::{spawn_backend, Mode};

fn config(base_url: &str) -> WatchConfig {
    WatchConfig::new()
        .with_base_url(base_url)
        .with_request_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn test_concurrent_gets_share_one_request() {
    let (backend, base_url) = spawn_backend().await;
    backend.set_delay(Duration::from_millis(200));
    let transport = Arc::new(assert_ok!(HttpTransport::new(base_url, Duration::from_secs(5))));
    let cache: ResourceCache<QueueSnapshot> =
        ResourceCache::new(transport, Resource::Status, Duration::from_secs(5));

    let results = join_all((0..10).map(|_| {
        let cache = cache.clone();
        async move { cache.get(false).await }
    }))
    .await;

    assert_eq!(backend.status_calls(), 1);
    let first = assert_ok!(results[0].clone());
    for result in results {
        let snapshot = assert_ok!(result);
        assert!(Arc::ptr_eq(&first, &snapshot));
    }

    // inside the TTL window nothing new goes out
    assert_ok!(cache.get(false).await);
    assert_eq!(backend.status_calls(), 1);
}

#[tokio::test]
async fn test_failure_is_not_cached() {
    let (backend, base_url) = spawn_backend().await;
    let dashboard = assert_ok!(Dashboard::new(config(&base_url)));

    backend.set_mode(Mode::ServerError);
    let err = assert_err!(dashboard.snapshot(false).await);
    assert!(matches!(err, FetchError::Status { status: 500, .. }));

    backend.set_mode(Mode::Healthy);
    let snapshot = assert_ok!(dashboard.snapshot(false).await);
    assert_eq!(snapshot.max_concurrency, 4);
    assert_eq!(backend.status_calls(), 2);
}

#[tokio::test]
async fn test_status_poller_keeps_value_through_outage() {
    let (backend, base_url) = spawn_backend().await;
    let config = config(&base_url)
        .with_status_ttl(Duration::from_millis(1))
        .with_status_poll_interval(Duration::from_millis(100));
    let dashboard = assert_ok!(Dashboard::new(config));

    assert_eq!(dashboard.refresh_status().await, FetchOutcome::Applied);
    let first = dashboard.status_state();
    assert!(first.value.is_some());
    assert!(first.error.is_none());

    backend.set_mode(Mode::ServerError);
    assert_eq!(dashboard.refresh_status().await, FetchOutcome::Failed);
    let degraded = dashboard.status_state();
    assert_eq!(degraded.value, first.value);
    assert!(degraded.error.is_some());

    backend.set_mode(Mode::Healthy);
    let mut updates = dashboard.subscribe_status();
    dashboard.start().await;
    let recovered = tokio::time::timeout(
        Duration::from_secs(5),
        updates.wait_for(|state| state.error.is_none() && state.value.is_some()),
    )
    .await
    .map(|result| result.is_ok());
    assert_eq!(recovered, Ok(true));
    dashboard.stop().await;
}

#[tokio::test]
async fn test_history_paging_over_http() {
    let (backend, base_url) = spawn_backend().await;
    let dashboard = assert_ok!(Dashboard::new(config(&base_url)));
    let history = dashboard.history();

    history.set_filters(HistoryFilterPatch::new().status(Some(TaskStatus::Failed)));
    history.go_to_page(4);
    assert_eq!(history.refetch().await, FetchOutcome::Applied);

    let info = history.page_info();
    assert_eq!(info.total, 95);
    assert_eq!(info.total_pages, 5);
    assert_eq!(info.current_page, 4);
    assert!(!info.has_next_page);
    assert_eq!(history.tasks().len(), 15);
    assert!(history.tasks().iter().all(|t| t.status == TaskStatus::Failed));
    assert_eq!(
        backend.last_query().get("offset").map(String::as_str),
        Some("80")
    );

    // changing filters always goes back to the first page
    let query = history.set_filters(HistoryFilterPatch::new().method(Some("GET")));
    assert_eq!(query.offset, 0);
    history.refetch().await;
    assert_eq!(backend.history_calls(), 2);
    assert_eq!(backend.last_query().get("offset").map(String::as_str), Some("0"));
    assert_eq!(history.tasks().len(), 20);
}

#[tokio::test]
async fn test_history_past_last_page_is_empty() {
    let (_backend, base_url) = spawn_backend().await;
    let dashboard = assert_ok!(Dashboard::new(config(&base_url)));
    let history = dashboard.history();

    history.go_to_page(10);
    history.refetch().await;

    assert!(history.tasks().is_empty());
    assert_eq!(history.page_info().total, 95);
    assert!(history.page_info().is_past_end());
}

#[tokio::test]
async fn test_stats_on_demand() {
    let (backend, base_url) = spawn_backend().await;
    let dashboard = assert_ok!(Dashboard::new(config(&base_url)));

    let query = StatsQuery::new().with_range(
        chrono::NaiveDate::from_ymd_opt(2024, 5, 1),
        chrono::NaiveDate::from_ymd_opt(2024, 5, 7),
    );
    assert_eq!(dashboard.stats().set_query(query).await, FetchOutcome::Applied);

    let state = dashboard.stats().state();
    let stats = state.value.expect("stats loaded");
    assert_eq!(stats.total, 10);
    assert_eq!(stats.success_rate(), Some(0.6));
    assert_eq!(backend.stats_calls(), 1);
    assert_eq!(
        backend.last_query().get("startDate").map(String::as_str),
        Some("2024-05-01")
    );
    assert_eq!(
        backend.last_query().get("endDate").map(String::as_str),
        Some("2024-05-07")
    );
}
