//! Server-side aggregate statistics.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::task::TaskStatus;

/// A ranked name with its count (top endpoints, top users).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCount {
    pub name: String,
    pub count: u64,
}

/// Statistics snapshot. Derived entirely by the backend; the client only
/// replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsAggregate {
    pub total: u64,
    #[serde(default)]
    pub by_status: BTreeMap<TaskStatus, u64>,
    #[serde(default)]
    pub by_method: BTreeMap<String, u64>,
    #[serde(default)]
    pub avg_wait_time_ms: Option<f64>,
    #[serde(default)]
    pub avg_execution_time_ms: Option<f64>,
    #[serde(default)]
    pub avg_total_time_ms: Option<f64>,
    #[serde(default)]
    pub top_endpoints: Vec<NamedCount>,
    #[serde(default)]
    pub top_users: Vec<NamedCount>,
}

impl StatsAggregate {
    /// Tasks in `status`, or 0 when the server omitted it.
    pub fn count_for(&self, status: TaskStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    /// Completed over finished (completed + failed + rejected), if anything finished.
    pub fn success_rate(&self) -> Option<f64> {
        let completed = self.count_for(TaskStatus::Completed);
        let finished = completed
            + self.count_for(TaskStatus::Failed)
            + self.count_for(TaskStatus::Rejected);
        (finished > 0).then(|| completed as f64 / finished as f64)
    }
}

/// Window and requester filter for a statistics request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub usuario_id: Option<u64>,
}

impl StatsQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    pub fn with_usuario_id(mut self, usuario_id: Option<u64>) -> Self {
        self.usuario_id = usuario_id;
        self
    }

    /// Query-string pairs for the wire request; absent fields are omitted.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(start) = self.start_date {
            pairs.push(("startDate", start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = self.end_date {
            pairs.push(("endDate", end.format("%Y-%m-%d").to_string()));
        }
        if let Some(usuario_id) = self.usuario_id {
            pairs.push(("usuarioId", usuario_id.to_string()));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_wire_format() {
        let json = r#"{
            "total": 10,
            "byStatus": {"completed": 6, "failed": 2, "rejected": 1, "started": 1},
            "byMethod": {"GET": 7, "POST": 3},
            "avgWaitTimeMs": 120.5,
            "avgExecutionTimeMs": 800,
            "avgTotalTimeMs": null,
            "topEndpoints": [{"name": "/api/paquetes", "count": 5}],
            "topUsers": [{"name": "ana", "count": 4}]
        }"#;
        let stats: StatsAggregate = serde_json::from_str(json).expect("decode");

        assert_eq!(stats.total, 10);
        assert_eq!(stats.count_for(TaskStatus::Completed), 6);
        assert_eq!(stats.count_for(TaskStatus::Enqueued), 0);
        assert_eq!(stats.by_method.get("GET"), Some(&7));
        assert_eq!(stats.avg_execution_time_ms, Some(800.0));
        assert_eq!(stats.avg_total_time_ms, None);
        assert_eq!(stats.top_endpoints[0].name, "/api/paquetes");
    }

    #[test]
    fn test_success_rate() {
        let mut stats = StatsAggregate::default();
        assert_eq!(stats.success_rate(), None);

        stats.by_status.insert(TaskStatus::Completed, 3);
        stats.by_status.insert(TaskStatus::Failed, 1);
        assert_eq!(stats.success_rate(), Some(0.75));
    }

    #[test]
    fn test_query_pairs() {
        let query = StatsQuery::new()
            .with_range(NaiveDate::from_ymd_opt(2024, 5, 1), None)
            .with_usuario_id(Some(2));
        assert_eq!(
            query.query_pairs(),
            vec![
                ("startDate", "2024-05-01".to_string()),
                ("usuarioId", "2".to_string()),
            ]
        );
        assert!(StatsQuery::new().query_pairs().is_empty());
    }
}
