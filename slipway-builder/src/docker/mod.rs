//! Dockerfile builds
//!
//! Dependency resolution, build context packaging and the local image
//! daemon.

pub mod args;
pub mod context;
pub mod daemon;
pub mod dependencies;

pub use context::{BuildContextArchive, create_docker_tar_context, create_tar, create_tar_gz};
pub use daemon::{DockerCli, ImageDaemon};
pub use dependencies::{DependencyResolver, DockerIgnore, DockerfileDependencies};
