//! Scheduling layer
//!
//! Fans the artifacts of a run out to their backends under the configured
//! strategy and collects the results in input order.

pub mod coordinator;

pub use coordinator::BuildCoordinator;
