//! Scaling Policy
//!
//! Hysteresis rules for the auto-scaler. Pure decision logic: the caller
//! supplies the clock and the timestamps of previous decisions.

use crate::domain::entities::ScaleDirection;
use std::time::Duration;
use tokio::time::Instant;

/// Bounds and thresholds for scaling decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingPolicy {
    pub min_instances: usize,
    pub max_instances: usize,
    /// Scale up when load is strictly above this
    pub upper_threshold: f64,
    /// Scale down when load is strictly below this
    pub lower_threshold: f64,
    /// Minimum time between two decisions in the same direction
    pub cooldown: Duration,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self {
            min_instances: 1,
            max_instances: 10,
            upper_threshold: 80.0,
            lower_threshold: 20.0,
            cooldown: Duration::from_secs(300),
        }
    }
}

impl ScalingPolicy {
    /// Load proxy: average active connections per healthy backend.
    ///
    /// Returns `None` when there are no healthy backends.
    pub fn load(total_active: usize, healthy_count: usize) -> Option<f64> {
        if healthy_count == 0 {
            return None;
        }
        Some(total_active as f64 / healthy_count as f64)
    }

    /// Decide whether to scale, and to how many instances.
    pub fn decide(
        &self,
        load: f64,
        healthy_count: usize,
        now: Instant,
        last_up: Option<Instant>,
        last_down: Option<Instant>,
    ) -> Option<(ScaleDirection, usize)> {
        if healthy_count == 0 {
            return None;
        }

        if load > self.upper_threshold
            && healthy_count < self.max_instances
            && self.cooled_down(now, last_up)
        {
            return Some((ScaleDirection::Up, healthy_count + 1));
        }

        if load < self.lower_threshold
            && healthy_count > self.min_instances
            && self.cooled_down(now, last_down)
        {
            return Some((ScaleDirection::Down, healthy_count - 1));
        }

        None
    }

    fn cooled_down(&self, now: Instant, last: Option<Instant>) -> bool {
        match last {
            Some(at) => now.saturating_duration_since(at) > self.cooldown,
            None => true,
        }
    }
}
