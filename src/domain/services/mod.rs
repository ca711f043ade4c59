mod alert_rules;
mod load_balancer;
mod scaling_policy;

pub use alert_rules::{AlertThresholds, Breach};
pub use load_balancer::{
    strategy_for, AffinityHash, Candidate, LeastConnections, LoadBalancer, RoundRobin,
    WeightedRandom,
};
pub use scaling_policy::ScalingPolicy;
