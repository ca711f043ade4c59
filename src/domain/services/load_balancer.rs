//! Load Balancer Service
//!
//! Selection strategies over the set of currently eligible backends.
//! Strategies see a filtered candidate list in configuration order and
//! return an index into it; eligibility is decided by the router.

use crate::domain::value_objects::StrategyKind;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A backend as seen by a selection strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub weight: u32,
    pub active_connections: usize,
}

impl Candidate {
    pub fn new(id: impl Into<String>, weight: u32, active_connections: usize) -> Self {
        Self {
            id: id.into(),
            weight,
            active_connections,
        }
    }
}

/// A backend selection strategy.
///
/// Implementations must be safe to call from many tasks at once.
pub trait LoadBalancer: Send + Sync {
    /// Pick one candidate. Returns `None` only when `candidates` is empty.
    fn select(&self, candidates: &[Candidate], routing_key: Option<&str>) -> Option<usize>;

    fn kind(&self) -> StrategyKind;
}

/// Build the strategy for a configured kind.
pub fn strategy_for(kind: StrategyKind) -> Box<dyn LoadBalancer> {
    match kind {
        StrategyKind::RoundRobin => Box::new(RoundRobin::new()),
        StrategyKind::LeastConnections => Box::new(LeastConnections::new()),
        StrategyKind::Weighted => Box::new(WeightedRandom::new()),
        StrategyKind::AffinityHash => Box::new(AffinityHash::new()),
    }
}

/// Round-robin selector.
/// Stores an internal counter to rotate through candidates.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn select(&self, candidates: &[Candidate], _routing_key: Option<&str>) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Some(n % candidates.len())
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::RoundRobin
    }
}

/// Least connections selector.
/// Ties go to the candidate listed first.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastConnections {
    fn select(&self, candidates: &[Candidate], _routing_key: Option<&str>) -> Option<usize> {
        // min_by_key keeps the first minimum
        candidates
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| c.active_connections)
            .map(|(i, _)| i)
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::LeastConnections
    }
}

/// Weighted random selector.
///
/// Each candidate is picked with probability `weight / sum(weights)`.
/// A weight of 0 counts as 1.
pub struct WeightedRandom {
    rng: Mutex<StdRng>,
}

impl WeightedRandom {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic selector for reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for WeightedRandom {
    fn default() -> Self {
        Self::new()
    }
}

fn effective_weight(c: &Candidate) -> u64 {
    c.weight.max(1) as u64
}

impl LoadBalancer for WeightedRandom {
    fn select(&self, candidates: &[Candidate], _routing_key: Option<&str>) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        let total: u64 = candidates.iter().map(effective_weight).sum();
        let mut point = self.rng.lock().gen_range(0..total);

        for (i, c) in candidates.iter().enumerate() {
            let w = effective_weight(c);
            if point < w {
                return Some(i);
            }
            point -= w;
        }
        Some(candidates.len() - 1)
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Weighted
    }
}

/// Sticky selector: `crc32(routing_key) mod N`.
///
/// Without a routing key it rotates like round-robin.
#[derive(Debug, Default)]
pub struct AffinityHash {
    fallback: RoundRobin,
}

impl AffinityHash {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for AffinityHash {
    fn select(&self, candidates: &[Candidate], routing_key: Option<&str>) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        match routing_key {
            Some(key) => {
                let hash = crc32fast::hash(key.as_bytes()) as usize;
                Some(hash % candidates.len())
            }
            None => self.fallback.select(candidates, None),
        }
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::AffinityHash
    }
}
