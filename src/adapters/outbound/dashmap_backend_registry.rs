//! DashMap Backend Registry
//!
//! Implements BackendRegistry using DashMap for lock-free concurrent access.

use crate::domain::entities::{Backend, BackendStatus, HealthState};
use crate::domain::ports::BackendRegistry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};

/// Runtime state for a single backend.
#[derive(Debug)]
pub struct BackendSlot {
    pub backend: Backend,
    /// HealthState as u8
    pub health: AtomicU8,
    /// Current number of in-flight requests
    pub active_connections: AtomicUsize,
    /// Last observed response time in milliseconds
    pub response_time_ms: AtomicU64,
    pub consecutive_errors: AtomicU32,
    /// Unix millis of the last health check (0 = never)
    pub last_check_ms: AtomicU64,
}

impl BackendSlot {
    fn new(backend: Backend) -> Self {
        Self {
            backend,
            health: AtomicU8::new(HealthState::Unknown as u8),
            active_connections: AtomicUsize::new(0),
            response_time_ms: AtomicU64::new(0),
            consecutive_errors: AtomicU32::new(0),
            last_check_ms: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> BackendStatus {
        let last_check = self.last_check_ms.load(Ordering::Relaxed);
        BackendStatus {
            id: self.backend.id.clone(),
            url: self.backend.url.clone(),
            health: HealthState::from(self.health.load(Ordering::Relaxed)),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            response_time_ms: self.response_time_ms.load(Ordering::Relaxed),
            consecutive_errors: self.consecutive_errors.load(Ordering::Relaxed),
            last_check_ms: (last_check > 0).then_some(last_check),
        }
    }
}

/// DashMap-backed backend registry.
///
/// Each backend has its own slot of atomics; configuration order is kept
/// separately so snapshots and strategies see a stable ordering.
pub struct DashMapBackendRegistry {
    order: Vec<String>,
    slots: DashMap<String, BackendSlot>,
}

impl DashMapBackendRegistry {
    /// Create a registry from configured backends. Later duplicates of an id
    /// are ignored.
    pub fn new(backends: Vec<Backend>) -> Self {
        let slots = DashMap::new();
        let mut order = Vec::with_capacity(backends.len());

        for backend in backends {
            if slots.contains_key(&backend.id) {
                tracing::warn!("duplicate backend id {} ignored", backend.id);
                continue;
            }
            order.push(backend.id.clone());
            slots.insert(backend.id.clone(), BackendSlot::new(backend));
        }

        Self { order, slots }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl BackendRegistry for DashMapBackendRegistry {
    fn backends(&self) -> Vec<Backend> {
        self.order
            .iter()
            .filter_map(|id| self.slots.get(id).map(|s| s.backend.clone()))
            .collect()
    }

    fn get(&self, id: &str) -> Option<Backend> {
        self.slots.get(id).map(|s| s.backend.clone())
    }

    fn health(&self, id: &str) -> HealthState {
        self.slots
            .get(id)
            .map(|s| HealthState::from(s.health.load(Ordering::Relaxed)))
            .unwrap_or(HealthState::Unknown)
    }

    fn set_health(&self, id: &str, state: HealthState) -> HealthState {
        self.slots
            .get(id)
            .map(|s| HealthState::from(s.health.swap(state as u8, Ordering::Relaxed)))
            .unwrap_or(HealthState::Unknown)
    }

    fn active_connections(&self, id: &str) -> usize {
        self.slots
            .get(id)
            .map(|s| s.active_connections.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn acquire(&self, id: &str) {
        if let Some(s) = self.slots.get(id) {
            s.active_connections.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn release(&self, id: &str) {
        if let Some(s) = self.slots.get(id) {
            // Use compare_exchange loop to prevent underflow
            let mut current = s.active_connections.load(Ordering::Relaxed);
            while current > 0 {
                match s.active_connections.compare_exchange_weak(
                    current,
                    current - 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => break,
                    Err(c) => current = c,
                }
            }
        }
    }

    fn record_response_time(&self, id: &str, ms: u64) {
        if let Some(s) = self.slots.get(id) {
            s.response_time_ms.store(ms, Ordering::Relaxed);
        }
    }

    fn record_error(&self, id: &str) -> u32 {
        self.slots
            .get(id)
            .map(|s| s.consecutive_errors.fetch_add(1, Ordering::Relaxed).saturating_add(1))
            .unwrap_or(0)
    }

    fn reset_errors(&self, id: &str) {
        if let Some(s) = self.slots.get(id) {
            s.consecutive_errors.store(0, Ordering::Relaxed);
        }
    }

    fn mark_checked(&self, id: &str, at_ms: u64) {
        if let Some(s) = self.slots.get(id) {
            s.last_check_ms.store(at_ms, Ordering::Relaxed);
        }
    }

    fn status(&self, id: &str) -> Option<BackendStatus> {
        self.slots.get(id).map(|s| s.snapshot())
    }

    fn statuses(&self) -> Vec<BackendStatus> {
        self.order
            .iter()
            .filter_map(|id| self.slots.get(id).map(|s| s.snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> DashMapBackendRegistry {
        DashMapBackendRegistry::new(vec![
            Backend::new("b1", "http://10.0.0.1:8080"),
            Backend::new("b2", "http://10.0.0.2:8080"),
            Backend::new("b3", "http://10.0.0.3:8080"),
        ])
    }

    #[test]
    fn test_keeps_configuration_order() {
        let reg = registry();
        let ids: Vec<String> = reg.backends().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["b1", "b2", "b3"]);

        let ids: Vec<String> = reg.statuses().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["b1", "b2", "b3"]);
    }

    #[test]
    fn test_duplicate_ids_ignored() {
        let reg = DashMapBackendRegistry::new(vec![
            Backend::new("b1", "http://a"),
            Backend::new("b1", "http://b"),
        ]);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("b1").unwrap().url, "http://a");
    }

    #[test]
    fn test_initial_status() {
        let reg = registry();
        let status = reg.status("b1").unwrap();
        assert_eq!(status.health, HealthState::Unknown);
        assert_eq!(status.active_connections, 0);
        assert_eq!(status.consecutive_errors, 0);
        assert!(status.last_check_ms.is_none());
    }

    #[test]
    fn test_set_health_returns_previous() {
        let reg = registry();
        assert_eq!(reg.set_health("b1", HealthState::Healthy), HealthState::Unknown);
        assert_eq!(reg.set_health("b1", HealthState::Unhealthy), HealthState::Healthy);
        assert_eq!(reg.health("b1"), HealthState::Unhealthy);
    }

    #[test]
    fn test_unknown_id_is_harmless() {
        let reg = registry();
        reg.acquire("nope");
        reg.release("nope");
        assert_eq!(reg.active_connections("nope"), 0);
        assert_eq!(reg.health("nope"), HealthState::Unknown);
        assert_eq!(reg.record_error("nope"), 0);
        assert!(reg.status("nope").is_none());
    }

    #[test]
    fn test_acquire_release() {
        let reg = registry();
        reg.acquire("b2");
        reg.acquire("b2");
        assert_eq!(reg.active_connections("b2"), 2);

        reg.release("b2");
        reg.release("b2");
        reg.release("b2");
        // Never underflows
        assert_eq!(reg.active_connections("b2"), 0);
    }

    #[test]
    fn test_error_counter() {
        let reg = registry();
        assert_eq!(reg.record_error("b3"), 1);
        assert_eq!(reg.record_error("b3"), 2);
        reg.reset_errors("b3");
        assert_eq!(reg.status("b3").unwrap().consecutive_errors, 0);
    }

    #[test]
    fn test_mark_checked_and_response_time() {
        let reg = registry();
        reg.mark_checked("b1", 1_700_000_000_000);
        reg.record_response_time("b1", 42);

        let status = reg.status("b1").unwrap();
        assert_eq!(status.last_check_ms, Some(1_700_000_000_000));
        assert_eq!(status.response_time_ms, 42);
    }

    #[test]
    fn test_concurrent_acquire() {
        use std::sync::Arc;
        use std::thread;

        let reg = Arc::new(registry());
        let mut handles = vec![];

        for _ in 0..10 {
            let reg = reg.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    reg.acquire("b1");
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(reg.active_connections("b1"), 1000);
    }
}
