//! VirtualList: an in-memory list that renders like a virtualized feed.
//!
//! Only rows within `overscan` of the viewport exist at any moment. Rows
//! load a page at a time once the viewport reaches the end of what has
//! loaded, so the list looks infinite until the source runs dry.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use trawl_collector::Viewport;
use trawl_common::Artifact;

use crate::snapshot::{LogEntry, PassLog};

/// Geometry of the rendered window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListShape {
    /// Rows fully visible in the viewport. One scroll of `1.0` moves this many rows.
    pub viewport_rows: usize,
    /// Rows rendered above and below the viewport.
    pub overscan: usize,
    /// Rows loaded per page. `None` loads everything up front.
    pub page_size: Option<usize>,
}

impl Default for ListShape {
    fn default() -> Self {
        Self {
            viewport_rows: 8,
            overscan: 2,
            page_size: Some(20),
        }
    }
}

struct ListState {
    /// Index of the top visible row, fractional between rows.
    position: f64,
    loaded: usize,
    reads: u32,
    scrolls: u32,
    log: PassLog,
}

pub struct VirtualList<U> {
    rows: Vec<U>,
    shape: ListShape,
    flaky_every: Option<u32>,
    fail_scroll_at: Option<u32>,
    capture: bool,
    state: Mutex<ListState>,
}

impl<U> VirtualList<U>
where
    U: Serialize + Clone + Send + Sync,
{
    pub fn new(label: impl Into<String>, rows: Vec<U>) -> Self {
        Self::with_shape(label, rows, ListShape::default())
    }

    pub fn with_shape(label: impl Into<String>, rows: Vec<U>, shape: ListShape) -> Self {
        let shape = ListShape {
            viewport_rows: shape.viewport_rows.max(1),
            ..shape
        };
        let loaded = shape.page_size.unwrap_or(rows.len()).min(rows.len());
        Self {
            rows,
            shape,
            flaky_every: None,
            fail_scroll_at: None,
            capture: false,
            state: Mutex::new(ListState {
                position: 0.0,
                loaded,
                reads: 0,
                scrolls: 0,
                log: PassLog::new(label),
            }),
        }
    }

    /// Every `n`th read fails as if the list were mid-render.
    pub fn flaky_every(mut self, n: u32) -> Self {
        self.flaky_every = (n > 0).then_some(n);
        self
    }

    /// The `n`th scroll (1-based) and every later one fails, as if the page
    /// had navigated away.
    pub fn fail_scroll_at(mut self, n: u32) -> Self {
        self.fail_scroll_at = Some(n);
        self
    }

    /// Capture a JSON rendering of each first-seen row as its artifact.
    pub fn with_capture(mut self) -> Self {
        self.capture = true;
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub async fn position(&self) -> f64 {
        self.state.lock().await.position
    }

    pub async fn pass_log(&self) -> PassLog {
        self.state.lock().await.log.clone()
    }

    fn max_top(&self, loaded: usize) -> f64 {
        loaded.saturating_sub(self.shape.viewport_rows) as f64
    }
}

#[async_trait]
impl<U> Viewport for VirtualList<U>
where
    U: Serialize + Clone + Send + Sync,
{
    type Unit = U;

    async fn visible_units(&self) -> Result<Vec<U>> {
        let mut state = self.state.lock().await;
        state.reads += 1;

        if let Some(n) = self.flaky_every {
            if state.reads % n == 0 {
                let error = format!("list not rendered yet (read {})", state.reads);
                state.log.entries.push(LogEntry::ReadFailed {
                    error: error.clone(),
                    timestamp: Utc::now(),
                });
                bail!(error);
            }
        }

        let top = state.position.floor() as usize;
        let end = (top + self.shape.viewport_rows + self.shape.overscan).min(state.loaded);
        let start = top.saturating_sub(self.shape.overscan).min(end);
        let units = self.rows[start..end].to_vec();

        if top + self.shape.viewport_rows >= state.loaded {
            if let Some(page) = self.shape.page_size {
                let before = state.loaded;
                state.loaded = (state.loaded + page).min(self.rows.len());
                if state.loaded > before {
                    debug!(loaded = state.loaded, "VirtualList loaded next page");
                }
            }
        }

        let logged = units
            .iter()
            .filter_map(|u| serde_json::to_value(u).ok())
            .collect();
        state.log.entries.push(LogEntry::Read {
            units: logged,
            timestamp: Utc::now(),
        });

        Ok(units)
    }

    async fn scroll_by(&self, fraction: f64) -> Result<()> {
        let mut state = self.state.lock().await;
        state.scrolls += 1;

        if self.fail_scroll_at.is_some_and(|n| state.scrolls >= n) {
            let error = format!("viewport detached at scroll {}", state.scrolls);
            state.log.entries.push(LogEntry::ScrollFailed {
                fraction,
                error: error.clone(),
                timestamp: Utc::now(),
            });
            bail!(error);
        }

        let max_top = self.max_top(state.loaded);
        state.position = (state.position + fraction * self.shape.viewport_rows as f64)
            .clamp(0.0, max_top);
        let position = state.position;
        state.log.entries.push(LogEntry::Scroll {
            fraction,
            position,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn capture_artifact(&self, unit: &U) -> Result<Option<Artifact>> {
        if !self.capture {
            return Ok(None);
        }
        let bytes = serde_json::to_vec(unit)?;
        Ok(Some(Artifact::new(bytes).with_format("json")))
    }
}
