//! Auto Scaler
//!
//! Hysteresis controller evaluated once per health-check cycle. Decisions
//! go to a ScaleSink; provisioning happens elsewhere.

use crate::domain::entities::{HealthState, ScaleDirection, ScaleSignal};
use crate::domain::ports::{BackendRegistry, ScaleSink};
use crate::domain::services::ScalingPolicy;
use crate::domain::value_objects::unix_millis;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct ScalerState {
    last_scale_up: Option<Instant>,
    last_scale_down: Option<Instant>,
    last_decision: Option<ScaleSignal>,
}

/// Auto-scaler statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutoScalerStats {
    pub min_instances: usize,
    pub max_instances: usize,
    pub upper_threshold: f64,
    pub lower_threshold: f64,
    pub cooldown_secs: u64,
    pub healthy_backends: usize,
    pub current_load: Option<f64>,
    pub evaluations: u64,
    pub scale_ups: u64,
    pub scale_downs: u64,
    pub last_decision: Option<ScaleSignal>,
}

pub struct AutoScaler {
    policy: ScalingPolicy,
    registry: Arc<dyn BackendRegistry>,
    sink: Arc<dyn ScaleSink>,
    state: Mutex<ScalerState>,
    evaluations: AtomicU64,
    scale_ups: AtomicU64,
    scale_downs: AtomicU64,
}

impl AutoScaler {
    pub fn new(
        policy: ScalingPolicy,
        registry: Arc<dyn BackendRegistry>,
        sink: Arc<dyn ScaleSink>,
    ) -> Self {
        Self {
            policy,
            registry,
            sink,
            state: Mutex::new(ScalerState::default()),
            evaluations: AtomicU64::new(0),
            scale_ups: AtomicU64::new(0),
            scale_downs: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &ScalingPolicy {
        &self.policy
    }

    /// Healthy backend count and summed active connections over them.
    fn observe(&self) -> (usize, usize) {
        self.registry
            .statuses()
            .iter()
            .filter(|s| s.health == HealthState::Healthy)
            .fold((0, 0), |(n, active), s| (n + 1, active + s.active_connections))
    }

    /// Evaluate the policy once, emitting at most one signal.
    pub fn evaluate(&self) -> Option<ScaleSignal> {
        self.evaluations.fetch_add(1, Ordering::Relaxed);

        let (healthy, total_active) = self.observe();
        let load = ScalingPolicy::load(total_active, healthy)?;
        let now = Instant::now();

        let mut state = self.state.lock();
        let (direction, desired) = self.policy.decide(
            load,
            healthy,
            now,
            state.last_scale_up,
            state.last_scale_down,
        )?;

        let signal = ScaleSignal {
            direction,
            current_healthy: healthy,
            desired,
            load,
            timestamp_ms: unix_millis(),
        };

        match direction {
            ScaleDirection::Up => {
                state.last_scale_up = Some(now);
                self.scale_ups.fetch_add(1, Ordering::Relaxed);
            }
            ScaleDirection::Down => {
                state.last_scale_down = Some(now);
                self.scale_downs.fetch_add(1, Ordering::Relaxed);
            }
        }
        state.last_decision = Some(signal.clone());
        drop(state);

        tracing::info!(
            "scale {:?}: load {:.1} on {} healthy backends, desired {}",
            direction,
            load,
            healthy,
            desired
        );
        self.sink.emit(signal.clone());
        Some(signal)
    }

    pub fn stats(&self) -> AutoScalerStats {
        let (healthy, total_active) = self.observe();
        AutoScalerStats {
            min_instances: self.policy.min_instances,
            max_instances: self.policy.max_instances,
            upper_threshold: self.policy.upper_threshold,
            lower_threshold: self.policy.lower_threshold,
            cooldown_secs: self.policy.cooldown.as_secs(),
            healthy_backends: healthy,
            current_load: ScalingPolicy::load(total_active, healthy),
            evaluations: self.evaluations.load(Ordering::Relaxed),
            scale_ups: self.scale_ups.load(Ordering::Relaxed),
            scale_downs: self.scale_downs.load(Ordering::Relaxed),
            last_decision: self.state.lock().last_decision.clone(),
        }
    }
}
