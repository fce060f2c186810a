//! Cluster provisioning monitor.
//!
//! Combines periodic status polling with a namespace-scoped event watch into
//! a single progress feed that terminates when the cluster reaches a terminal
//! phase.

pub mod phase;
pub mod producer;
pub mod significant;

pub use phase::*;
pub use producer::*;
pub use significant::*;
