//! Fake queue backend served by axum on an ephemeral port.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

/// How the backend answers the next requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Healthy,
    ServerError,
    Malformed,
}

#[derive(Default)]
pub struct Backend {
    mode: Mutex<Option<Mode>>,
    delay: Mutex<Duration>,
    status_calls: AtomicUsize,
    history_calls: AtomicUsize,
    stats_calls: AtomicUsize,
    last_query: Mutex<HashMap<String, String>>,
}

impl Backend {
    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = Some(mode);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    pub fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> HashMap<String, String> {
        self.last_query.lock().unwrap().clone()
    }

    fn mode(&self) -> Mode {
        self.mode.lock().unwrap().unwrap_or(Mode::Healthy)
    }

    async fn respond(&self, params: HashMap<String, String>, body: Value) -> Response {
        *self.last_query.lock().unwrap() = params;
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.mode() {
            Mode::Healthy => Json(body).into_response(),
            Mode::ServerError => (StatusCode::INTERNAL_SERVER_ERROR, "queue store unavailable").into_response(),
            Mode::Malformed => (
                StatusCode::OK,
                [("content-type", "application/json")],
                "{\"queueLength\": ",
            )
                .into_response(),
        }
    }
}

pub fn status_body() -> Value {
    json!({
        "queueLength": 3,
        "processing": 2,
        "maxConcurrency": 4,
        "estimatedWaitMs": 1200,
        "oldestWaitingMs": 900,
        "pendingSample": [{"id": 41, "waitingMs": 900}, {"id": 42, "waitingMs": 300}],
        "recentEvents": [
            {"taskId": 40, "type": "completed", "timestamp": "2024-05-01T12:00:05Z"},
            {"taskId": 41, "type": "enqueued", "waitMs": 0, "timestamp": "2024-05-01T12:00:04Z"}
        ],
        "dailyTotals": [{"date": "2024-05-01", "processed": 120, "rejected": 3}]
    })
}

fn history_body(params: &HashMap<String, String>) -> Value {
    let total = 95u64;
    let limit: u64 = params.get("limit").and_then(|v| v.parse().ok()).unwrap_or(20);
    let offset: u64 = params.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
    let status = params.get("status").cloned().unwrap_or_else(|| "completed".to_string());
    let tasks: Vec<Value> = (offset..total.min(offset + limit))
        .map(|n| {
            json!({
                "id": 1000 - n,
                "status": status,
                "method": "POST",
                "endpoint": "/api/paquetes",
                "usuarioId": 7,
                "enqueuedAt": "2024-05-01T12:00:00Z",
                "startedAt": "2024-05-01T12:00:01Z",
                "completedAt": "2024-05-01T12:00:03Z",
                "queueLengthAtEnqueue": 2
            })
        })
        .collect();
    json!({"tasks": tasks, "total": total})
}

fn stats_body() -> Value {
    json!({
        "total": 10,
        "byStatus": {"completed": 6, "failed": 2, "rejected": 2},
        "byMethod": {"GET": 4, "POST": 6},
        "avgWaitTimeMs": 150.0,
        "avgExecutionTimeMs": 900.0,
        "avgTotalTimeMs": 1050.0,
        "topEndpoints": [{"name": "/api/paquetes", "count": 6}],
        "topUsers": [{"name": "ana", "count": 5}]
    })
}

async fn status(State(backend): State<Arc<Backend>>, Query(params): Query<HashMap<String, String>>) -> Response {
    backend.status_calls.fetch_add(1, Ordering::SeqCst);
    backend.respond(params, status_body()).await
}

async fn history(State(backend): State<Arc<Backend>>, Query(params): Query<HashMap<String, String>>) -> Response {
    backend.history_calls.fetch_add(1, Ordering::SeqCst);
    let body = history_body(&params);
    backend.respond(params, body).await
}

async fn stats(State(backend): State<Arc<Backend>>, Query(params): Query<HashMap<String, String>>) -> Response {
    backend.stats_calls.fetch_add(1, Ordering::SeqCst);
    backend.respond(params, stats_body()).await
}

/// Serves the backend on 127.0.0.1 and returns it with its `.../api/queue` root.
pub async fn spawn_backend() -> (Arc<Backend>, String) {
    let backend = Arc::new(Backend::default());
    let app = Router::new()
        .route("/api/queue/status", get(status))
        .route("/api/queue/history", get(history))
        .route("/api/queue/stats", get(stats))
        .with_state(Arc::clone(&backend));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test backend");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve test backend");
    });

    (backend, format!("http://{}/api/queue", addr))
}
