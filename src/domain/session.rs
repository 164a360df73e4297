//! In-memory per-scrape session state
//!
//! One `PaginationSession` is owned exclusively by the orchestrator for the
//! duration of a scrape; nothing is persisted. `ScrollState` is scoped to a
//! single page-load operation and discarded on completion or failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::page::SiteType;
use crate::domain::record::Record;

/// Lifecycle status of a scrape session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Running,
    Completed,
    /// Stopped early but with usable partial results.
    Partial,
    Failed,
    Cancelled,
}

/// Mutable state of the multi-page loop, one per scrape request.
#[derive(Debug)]
pub struct PaginationSession {
    pub id: Uuid,
    /// Base URL with pagination parameters stripped.
    pub base_url: String,
    pub site_type: SiteType,
    /// Page number the next iteration will fetch (1-based).
    pub current_page: u32,
    pub has_more: bool,
    pub pages_fetched: u32,
    pub page_titles: Vec<String>,
    pub records: Vec<Record>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
}

impl PaginationSession {
    pub fn new(base_url: String, site_type: SiteType) -> Self {
        Self {
            id: Uuid::new_v4(),
            base_url,
            site_type,
            current_page: 1,
            has_more: true,
            pages_fetched: 0,
            page_titles: Vec::new(),
            records: Vec::new(),
            status: SessionStatus::Running,
            started_at: Utc::now(),
        }
    }

    /// Fold one page's results in and advance the cursor. Returns how many
    /// records the page contributed.
    pub fn absorb_page(&mut self, title: String, records: Vec<Record>) -> usize {
        let added = records.len();
        self.page_titles.push(title);
        self.records.extend(records);
        self.pages_fetched += 1;
        self.current_page += 1;
        added
    }

    /// Terminal when the loop must not fetch another page.
    pub fn is_terminal(&self) -> bool {
        !self.has_more || self.status != SessionStatus::Running
    }
}

/// Scroll-loop bookkeeping for one content-loading operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollState {
    /// Completed scroll cycles.
    pub scroll_count: u32,
    /// Document height observed after the most recent cycle.
    pub last_document_height: u32,
    /// Screenshots captured across the operation.
    pub screenshots_taken: u32,
    /// Bottom-of-page grace waits that saw no height growth.
    pub stable_poll_count: u32,
}
