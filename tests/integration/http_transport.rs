//! `HttpTransport` against a real HTTP server.

use std::time::Duration;

use queuewatch::model::{EventKind, HistoryQuery, QueueSnapshot, StatsQuery};
use queuewatch::transport::fetch_typed;
use queuewatch::{FetchError, HttpTransport, Resource, TaskStatus, Transport};
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use crate::support::{spawn_backend, Mode};

fn transport(base_url: &str) -> HttpTransport {
    assert_ok!(HttpTransport::new(base_url, Duration::from_secs(5)))
}

#[tokio::test]
async fn test_fetches_status_snapshot() {
    let (backend, base_url) = spawn_backend().await;
    let transport = transport(&base_url);

    let snapshot: QueueSnapshot = assert_ok!(
        fetch_typed(&transport, &Resource::Status, &CancellationToken::new()).await
    );

    assert_eq!(snapshot.queue_length, 3);
    assert_eq!(snapshot.pending_sample.len(), 2);
    assert_eq!(snapshot.recent_events[0].kind, EventKind::Completed);
    assert_eq!(snapshot.latest_daily_total().map(|t| t.processed), Some(120));
    assert_eq!(backend.status_calls(), 1);
}

#[tokio::test]
async fn test_history_query_string() {
    let (backend, base_url) = spawn_backend().await;
    let transport = transport(&base_url);

    let mut query = HistoryQuery::new(20);
    query.filters.status = Some(TaskStatus::Failed);
    query.filters.method = Some("POST".to_string());
    query.filters.usuario_id = Some(7);
    query.offset = 80;

    let body = assert_ok!(
        transport
            .fetch(&Resource::History(query), &CancellationToken::new())
            .await
    );

    let params = backend.last_query();
    assert_eq!(params.get("status").map(String::as_str), Some("failed"));
    assert_eq!(params.get("method").map(String::as_str), Some("POST"));
    assert_eq!(params.get("usuarioId").map(String::as_str), Some("7"));
    assert_eq!(params.get("limit").map(String::as_str), Some("20"));
    assert_eq!(params.get("offset").map(String::as_str), Some("80"));
    assert_eq!(body["total"], 95);
    assert_eq!(body["tasks"].as_array().map(Vec::len), Some(15));
}

#[tokio::test]
async fn test_stats_query_omits_absent_fields() {
    let (backend, base_url) = spawn_backend().await;
    let transport = transport(&base_url);

    let query = StatsQuery::new().with_usuario_id(Some(3));
    assert_ok!(
        transport
            .fetch(&Resource::Stats(query), &CancellationToken::new())
            .await
    );

    let params = backend.last_query();
    assert_eq!(params.get("usuarioId").map(String::as_str), Some("3"));
    assert!(!params.contains_key("startDate"));
    assert!(!params.contains_key("endDate"));
}

#[tokio::test]
async fn test_server_error_maps_to_status() {
    let (backend, base_url) = spawn_backend().await;
    backend.set_mode(Mode::ServerError);

    let err = assert_err!(
        transport(&base_url)
            .fetch(&Resource::Status, &CancellationToken::new())
            .await
    );

    match &err {
        FetchError::Status { status, message } => {
            assert_eq!(*status, 500);
            assert!(message.contains("queue store unavailable"));
        }
        other => panic!("expected status error, got {:?}", other),
    }
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_truncated_body_is_malformed() {
    let (backend, base_url) = spawn_backend().await;
    backend.set_mode(Mode::Malformed);

    let err = assert_err!(
        transport(&base_url)
            .fetch(&Resource::Status, &CancellationToken::new())
            .await
    );
    assert!(matches!(err, FetchError::Malformed(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_cancel_while_request_outstanding() {
    let (backend, base_url) = spawn_backend().await;
    backend.set_delay(Duration::from_secs(2));
    let transport = transport(&base_url);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = assert_err!(transport.fetch(&Resource::Status, &cancel).await);
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_request_timeout_is_network_error() {
    let (backend, base_url) = spawn_backend().await;
    backend.set_delay(Duration::from_secs(2));
    let transport = assert_ok!(HttpTransport::new(base_url, Duration::from_millis(100)));

    let err = assert_err!(
        transport
            .fetch(&Resource::Status, &CancellationToken::new())
            .await
    );
    assert!(matches!(err, FetchError::Network(_)), "got {:?}", err);
}
