//! Filtered, offset-paginated task history.

use serde::{Deserialize, Serialize};

use super::task::{Task, TaskStatus};

/// Filters applied to a history query. `None` means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryFilters {
    pub status: Option<TaskStatus>,
    pub method: Option<String>,
    pub usuario_id: Option<u64>,
}

/// Partial update to [`HistoryFilters`].
///
/// Outer `None` leaves a filter untouched; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilterPatch {
    pub status: Option<Option<TaskStatus>>,
    pub method: Option<Option<String>>,
    pub usuario_id: Option<Option<u64>>,
}

impl HistoryFilterPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: Option<TaskStatus>) -> Self {
        self.status = Some(status);
        self
    }

    pub fn method(mut self, method: Option<impl Into<String>>) -> Self {
        self.method = Some(method.map(Into::into));
        self
    }

    pub fn usuario_id(mut self, usuario_id: Option<u64>) -> Self {
        self.usuario_id = Some(usuario_id);
        self
    }
}

impl HistoryFilters {
    /// Applies a patch in place.
    pub fn merge(&mut self, patch: HistoryFilterPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(method) = patch.method {
            self.method = method;
        }
        if let Some(usuario_id) = patch.usuario_id {
            self.usuario_id = usuario_id;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.method.is_none() && self.usuario_id.is_none()
    }
}

/// A filter set plus the page window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    #[serde(flatten)]
    pub filters: HistoryFilters,
    pub limit: u32,
    pub offset: u64,
}

impl HistoryQuery {
    /// First page of an unfiltered query. A zero `limit` is raised to 1.
    pub fn new(limit: u32) -> Self {
        Self {
            filters: HistoryFilters::default(),
            limit: limit.max(1),
            offset: 0,
        }
    }

    /// Query-string pairs for the wire request; absent filters are omitted.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(5);
        if let Some(status) = self.filters.status {
            pairs.push(("status", status.to_string()));
        }
        if let Some(method) = &self.filters.method {
            pairs.push(("method", method.clone()));
        }
        if let Some(usuario_id) = self.filters.usuario_id {
            pairs.push(("usuarioId", usuario_id.to_string()));
        }
        pairs.push(("limit", self.limit.to_string()));
        pairs.push(("offset", self.offset.to_string()));
        pairs
    }

    /// Navigation values for this query given the server's `total`.
    pub fn page_info(&self, total: u64) -> PageInfo {
        PageInfo::new(total, self.limit, self.offset)
    }
}

/// One page of history plus the total across all pages for the filter set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoryPage {
    pub tasks: Vec<Task>,
    pub total: u64,
}

/// Page navigation values derived from `{total, limit, offset}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub total: u64,
    pub limit: u32,
    pub offset: u64,
    /// Zero-based.
    pub current_page: u64,
    pub total_pages: u64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl PageInfo {
    /// Derives page navigation from a total, page size and offset.
    ///
    /// # Arguments
    ///
    /// * `total` - Matching tasks across all pages
    /// * `limit` - Page size; zero is treated as 1
    /// * `offset` - Index of the first task on the page
    ///
    /// # Returns
    ///
    /// Page numbers and flags. Offsets near `u64::MAX` saturate instead of
    /// wrapping, so such a page never reports a next page.
    pub fn new(total: u64, limit: u32, offset: u64) -> Self {
        let page_size = u64::from(limit.max(1));
        Self {
            total,
            limit,
            offset,
            current_page: offset / page_size,
            total_pages: total.div_ceil(page_size),
            has_next_page: offset.saturating_add(page_size) < total,
            has_prev_page: offset > 0,
        }
    }

    /// Whether the window starts past the last result.
    pub fn is_past_end(&self) -> bool {
        self.offset > 0 && self.offset >= self.total
    }
}
