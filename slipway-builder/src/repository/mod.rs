//! Repository layer
//!
//! Repositories are thin adapters over the cluster and staging clients.
//! They expose simple, focused interfaces without any business logic.
//!
//! All repositories are trait-based to enable testing and mocking.

mod cluster;
mod staging;

// Re-export traits
pub use cluster::ClusterRepository;
pub use staging::ObjectStore;

// Re-export implementations
pub use cluster::HttpClusterRepository;
pub use staging::HttpObjectStore;
