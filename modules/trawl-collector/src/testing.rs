// Test mocks for the collector.
//
// - ScriptedViewport: replays a fixed sequence of passes, then renders
//   nothing; can inject read failures and scroll failures.
// - EndlessViewport: every pass renders a fresh batch of distinct keys;
//   can raise a cancel flag after N reads.
//
// Units are plain key strings; `key_extractor` turns them into candidates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;

use trawl_common::{Artifact, CandidateItem};

use crate::traits::Viewport;

/// Identity extractor for key-string units.
pub fn key_extractor(unit: &String) -> Option<CandidateItem> {
    Some(CandidateItem::new(unit.clone()))
}

/// Build a pass from string literals.
pub fn pass(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

// ---------------------------------------------------------------------------
// ScriptedViewport
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ScriptState {
    /// Successful reads so far; selects the next pass to render.
    reads: usize,
    /// Failures still to inject, keyed by pass position.
    pending_failures: HashMap<usize, u32>,
    scrolls: Vec<f64>,
    captures: Vec<String>,
}

pub struct ScriptedViewport {
    passes: Vec<Vec<String>>,
    fail_scroll_after_reads: Option<usize>,
    capture: bool,
    state: Mutex<ScriptState>,
}

impl ScriptedViewport {
    pub fn new(passes: Vec<Vec<String>>) -> Self {
        Self {
            passes,
            fail_scroll_after_reads: None,
            capture: false,
            state: Mutex::new(ScriptState::default()),
        }
    }

    /// The read of pass `pass_position` (zero-based) fails `times` times
    /// before succeeding.
    pub fn fail_reads(self, pass_position: usize, times: u32) -> Self {
        self.state
            .lock()
            .unwrap()
            .pending_failures
            .insert(pass_position, times);
        self
    }

    /// Every scroll issued once `reads` passes have been read fails.
    pub fn fail_scroll_after(mut self, reads: usize) -> Self {
        self.fail_scroll_after_reads = Some(reads);
        self
    }

    /// Capture an artifact (the key's bytes) for first sightings.
    pub fn with_capture(mut self) -> Self {
        self.capture = true;
        self
    }

    pub fn reads(&self) -> usize {
        self.state.lock().unwrap().reads
    }

    pub fn scrolls(&self) -> Vec<f64> {
        self.state.lock().unwrap().scrolls.clone()
    }

    pub fn captures(&self) -> Vec<String> {
        self.state.lock().unwrap().captures.clone()
    }
}

#[async_trait]
impl Viewport for ScriptedViewport {
    type Unit = String;

    async fn visible_units(&self) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        let position = state.reads;
        if let Some(remaining) = state.pending_failures.get_mut(&position) {
            if *remaining > 0 {
                *remaining -= 1;
                bail!("ScriptedViewport: injected read failure at pass {position}");
            }
        }
        state.reads += 1;
        Ok(self.passes.get(position).cloned().unwrap_or_default())
    }

    async fn scroll_by(&self, fraction: f64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if self
            .fail_scroll_after_reads
            .is_some_and(|reads| state.reads >= reads)
        {
            bail!("ScriptedViewport: scroll failed after {} reads", state.reads);
        }
        state.scrolls.push(fraction);
        Ok(())
    }

    async fn capture_artifact(&self, unit: &String) -> Result<Option<Artifact>> {
        if !self.capture {
            return Ok(None);
        }
        self.state.lock().unwrap().captures.push(unit.clone());
        Ok(Some(Artifact::new(unit.as_bytes().to_vec()).with_format("png")))
    }
}

// ---------------------------------------------------------------------------
// EndlessViewport
// ---------------------------------------------------------------------------

/// Renders `per_pass` never-before-seen keys on every read.
pub struct EndlessViewport {
    per_pass: usize,
    next: Mutex<usize>,
    reads: AtomicUsize,
    cancel_after: Option<(usize, Arc<AtomicBool>)>,
}

impl EndlessViewport {
    pub fn new(per_pass: usize) -> Self {
        Self {
            per_pass,
            next: Mutex::new(0),
            reads: AtomicUsize::new(0),
            cancel_after: None,
        }
    }

    /// Raise `flag` during read number `reads`, the way an interrupt lands
    /// while a pass is in flight.
    pub fn cancel_after(mut self, reads: usize, flag: Arc<AtomicBool>) -> Self {
        self.cancel_after = Some((reads, flag));
        self
    }
}

#[async_trait]
impl Viewport for EndlessViewport {
    type Unit = String;

    async fn visible_units(&self) -> Result<Vec<String>> {
        let reads = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, ref flag)) = self.cancel_after {
            if reads >= after {
                flag.store(true, Ordering::Relaxed);
            }
        }
        let mut next = self.next.lock().unwrap();
        let start = *next;
        *next += self.per_pass;
        Ok((start..start + self.per_pass)
            .map(|n| format!("item-{n}"))
            .collect())
    }

    async fn scroll_by(&self, _fraction: f64) -> Result<()> {
        Ok(())
    }
}
