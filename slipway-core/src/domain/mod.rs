//! Core domain types
//!
//! These types describe what gets built and what a build produced. They are
//! read by the build engine and never mutated by it.

pub mod artifact;
pub mod build;
pub mod log;
pub mod probe;
