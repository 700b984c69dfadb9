//! Slipway Builder
//!
//! The artifact build engine. A run hands a list of artifacts to the
//! [`BuildCoordinator`], which tags each one and routes it through the
//! [`Dispatcher`] to its backend:
//! - local Dockerfile builds through the image daemon or the docker CLI
//! - Bazel image targets
//! - Jib through Maven or Gradle
//! - Kaniko executor pods inside a cluster
//!
//! Project detection ([`jib`]) and context diagnostics ([`diagnose`]) share
//! the same collaborators.

pub mod backend;
pub mod config;
pub mod diagnose;
pub mod docker;
pub mod error;
pub mod jib;
pub mod output;
pub mod process;
pub mod remote;
pub mod repository;
pub mod scheduler;
pub mod tag;

#[cfg(test)]
mod testing;

pub use backend::{ArtifactBuilder, Dispatcher};
pub use config::{BuildConfig, ClusterConfig, Strategy};
pub use error::BuildError;
pub use output::{BuildLog, ConsoleSink, InMemorySink, OutputSink};
pub use remote::{KanikoBuilder, RemoteBuildSession, SessionReport};
pub use scheduler::BuildCoordinator;
pub use tag::{DateTimeTagger, EnvTemplateTagger, ShaTagger, Tagger};
