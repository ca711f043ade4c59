//! Scale Sink Port
//!
//! Destination for auto-scaling decisions. Provisioning itself happens
//! outside this process.

use crate::domain::entities::ScaleSignal;

pub trait ScaleSink: Send + Sync {
    /// Hand a scaling decision to the provisioner. Must not block.
    fn emit(&self, signal: ScaleSignal);
}
