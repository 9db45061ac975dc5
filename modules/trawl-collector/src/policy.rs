//! Scroll-distance staging, correction scrolls and settle delays.
//!
//! Distances depend on the pass index alone, never on what a pass found:
//! short steps early so nothing the virtualization layer hasn't rendered yet
//! is skipped, longer steps later to get through long lists.

use std::time::Duration;

use trawl_common::{ScrollConfig, ScrollStage};

/// Reverse-then-forward nudge that makes the virtualization layer remount
/// rows it may have dropped out of order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    pub back: f64,
    pub pause: Duration,
    pub forward: f64,
}

/// What to do after a given pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollPlan {
    /// Forward distance in viewport heights.
    pub distance: f64,
    pub correction: Option<Correction>,
}

#[derive(Debug, Clone)]
pub struct ScrollPolicy {
    stages: Vec<ScrollStage>,
    final_fraction: f64,
    correction_interval: u32,
    correction_back: f64,
    correction_forward: f64,
    correction_pause: Duration,
    settle_after_new: Duration,
    settle_after_empty: Duration,
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self::from(&ScrollConfig::default())
    }
}

impl From<&ScrollConfig> for ScrollPolicy {
    fn from(config: &ScrollConfig) -> Self {
        let mut stages = config.stages.clone();
        stages.sort_by_key(|s| s.until_pass);
        Self {
            stages,
            final_fraction: config.final_fraction,
            correction_interval: config.correction_interval,
            correction_back: config.correction_back,
            correction_forward: config.correction_forward,
            correction_pause: Duration::from_millis(config.correction_pause_ms),
            settle_after_new: Duration::from_millis(config.settle_after_new_ms),
            settle_after_empty: Duration::from_millis(config.settle_after_empty_ms),
        }
    }
}

impl ScrollPolicy {
    /// Default distances with every delay set to zero. For tests and
    /// replayed viewports, where nothing needs to settle.
    pub fn immediate() -> Self {
        Self {
            correction_pause: Duration::ZERO,
            settle_after_new: Duration::ZERO,
            settle_after_empty: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_correction_interval(mut self, interval: u32) -> Self {
        self.correction_interval = interval;
        self
    }

    pub fn distance(&self, pass_index: u32) -> f64 {
        self.stages
            .iter()
            .find(|s| pass_index < s.until_pass)
            .map(|s| s.fraction)
            .unwrap_or(self.final_fraction)
    }

    pub fn plan(&self, pass_index: u32) -> ScrollPlan {
        let correction = (self.correction_interval > 0
            && pass_index > 0
            && pass_index % self.correction_interval == 0)
            .then_some(Correction {
                back: self.correction_back,
                pause: self.correction_pause,
                forward: self.correction_forward,
            });
        ScrollPlan {
            distance: self.distance(pass_index),
            correction,
        }
    }

    /// Rendering lags more often after a pass that found nothing.
    pub fn settle_delay(&self, found_new: bool) -> Duration {
        if found_new {
            self.settle_after_new
        } else {
            self.settle_after_empty
        }
    }
}
