//! Build configuration
//!
//! Defines every tunable of a build run: the scheduling strategy, local
//! daemon options, and the cluster settings used by the remote pod backend.

use std::path::PathBuf;
use std::time::Duration;

/// Default namespace remote builds run in
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default name of the registry credential secret
pub const DEFAULT_PULL_SECRET_NAME: &str = "kaniko-secret";

/// Default executor image for remote builds
pub const DEFAULT_EXECUTOR_IMAGE: &str = "gcr.io/kaniko-project/executor";

/// How artifacts of one run are scheduled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// One task per artifact, optionally bounded
    Parallel { max_concurrency: Option<usize> },

    /// One artifact at a time, stopping at the first failure
    Sequential,
}

impl Strategy {
    /// Parses a strategy name (`parallel` or `sequential`)
    pub fn parse(name: &str, max_concurrency: Option<usize>) -> anyhow::Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "parallel" => Ok(Strategy::Parallel { max_concurrency }),
            "sequential" => Ok(Strategy::Sequential),
            other => anyhow::bail!(
                "unknown build strategy '{}', expected 'parallel' or 'sequential'",
                other
            ),
        }
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Parallel {
            max_concurrency: None,
        }
    }
}

/// Layer cache settings of the remote executor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheConfig {
    /// Repository layers are cached in; empty lets the executor derive one
    pub repo: String,
}

/// Where the remote executor reads the build context from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextSourceConfig {
    /// Carried inside the cluster in a config map
    Inline,

    /// Uploaded to an HTTP object store
    Staging { base_url: String },
}

/// Settings of the remote pod backend
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// API server base URL (e.g., "https://10.0.0.1:6443")
    pub api_url: String,

    /// Bearer token sent with every API request
    pub token: Option<String>,

    pub namespace: String,

    /// Name of the registry credential secret
    pub pull_secret_name: String,

    /// Local credential file; when unset the secret must already exist
    pub pull_secret_path: Option<PathBuf>,

    pub executor_image: String,

    /// Maximum time to wait for the build pod to finish
    pub timeout: Duration,

    /// Executor log verbosity (`-v=`)
    pub verbosity: String,

    /// Extra executor flags, passed before build args
    pub additional_flags: Vec<String>,

    pub cache: Option<CacheConfig>,

    pub context_source: ContextSourceConfig,

    /// How long logs may keep draining after the pod completed
    pub log_drain_timeout: Duration,
}

impl ClusterConfig {
    /// Creates cluster settings with defaults
    pub fn new(api_url: String) -> Self {
        Self {
            api_url,
            token: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            pull_secret_name: DEFAULT_PULL_SECRET_NAME.to_string(),
            pull_secret_path: None,
            executor_image: DEFAULT_EXECUTOR_IMAGE.to_string(),
            timeout: Duration::from_secs(20 * 60),
            verbosity: "info".to_string(),
            additional_flags: Vec::new(),
            cache: None,
            context_source: ContextSourceConfig::Inline,
            log_drain_timeout: Duration::from_secs(10),
        }
    }

    /// Validates the cluster settings
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_url("cluster api_url", &self.api_url)?;

        if self.namespace.is_empty() {
            anyhow::bail!("namespace cannot be empty");
        }

        if self.pull_secret_name.is_empty() {
            anyhow::bail!("pull_secret_name cannot be empty");
        }

        if self.executor_image.is_empty() {
            anyhow::bail!("executor_image cannot be empty");
        }

        if self.timeout.is_zero() {
            anyhow::bail!("timeout must be greater than 0");
        }

        if self.log_drain_timeout.is_zero() {
            anyhow::bail!("log_drain_timeout must be greater than 0");
        }

        if let ContextSourceConfig::Staging { base_url } = &self.context_source {
            validate_url("staging base_url", base_url)?;
        }

        Ok(())
    }
}

/// Build run configuration
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub strategy: Strategy,

    /// Push images after local builds
    pub push_images: bool,

    /// Build through the docker CLI rather than streaming a context to the daemon
    pub use_docker_cli: bool,

    /// Enable BuildKit (`DOCKER_BUILDKIT=1`); implies the CLI path
    pub use_buildkit: bool,

    /// Remote pod backend; `None` disables remote builds
    pub cluster: Option<ClusterConfig>,
}

impl BuildConfig {
    /// Creates a new configuration with defaults
    pub fn new() -> Self {
        Self {
            strategy: Strategy::default(),
            push_images: false,
            use_docker_cli: false,
            use_buildkit: false,
            cluster: None,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - SLIPWAY_BUILD_STRATEGY (optional, `parallel` or `sequential`, default: parallel)
    /// - SLIPWAY_MAX_CONCURRENCY (optional, default: unbounded)
    /// - SLIPWAY_PUSH (optional, bool, default: false)
    /// - SLIPWAY_USE_DOCKER_CLI (optional, bool, default: false)
    /// - SLIPWAY_USE_BUILDKIT (optional, bool, default: false)
    /// - SLIPWAY_CLUSTER_URL (optional, enables the remote backend)
    /// - SLIPWAY_CLUSTER_TOKEN (optional)
    /// - SLIPWAY_NAMESPACE (optional, default: default)
    /// - SLIPWAY_PULL_SECRET (optional, local credential file)
    /// - SLIPWAY_BUILD_TIMEOUT (optional, seconds, default: 1200)
    /// - SLIPWAY_CACHE_REPO (optional, enables layer caching)
    /// - SLIPWAY_STAGING_URL (optional, uploads contexts instead of inlining them)
    pub fn from_env() -> anyhow::Result<Self> {
        let max_concurrency = std::env::var("SLIPWAY_MAX_CONCURRENCY")
            .ok()
            .and_then(|s| s.parse::<usize>().ok());

        let strategy = match std::env::var("SLIPWAY_BUILD_STRATEGY") {
            Ok(name) => Strategy::parse(&name, max_concurrency)?,
            Err(_) => Strategy::Parallel { max_concurrency },
        };

        let cluster = match std::env::var("SLIPWAY_CLUSTER_URL") {
            Ok(api_url) => {
                let mut cluster = ClusterConfig::new(api_url);
                cluster.token = std::env::var("SLIPWAY_CLUSTER_TOKEN").ok();

                if let Ok(namespace) = std::env::var("SLIPWAY_NAMESPACE") {
                    cluster.namespace = namespace;
                }

                cluster.pull_secret_path = std::env::var("SLIPWAY_PULL_SECRET").ok().map(PathBuf::from);

                if let Some(timeout) = std::env::var("SLIPWAY_BUILD_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                {
                    cluster.timeout = Duration::from_secs(timeout);
                }

                cluster.cache = std::env::var("SLIPWAY_CACHE_REPO")
                    .ok()
                    .map(|repo| CacheConfig { repo });

                if let Ok(base_url) = std::env::var("SLIPWAY_STAGING_URL") {
                    cluster.context_source = ContextSourceConfig::Staging { base_url };
                }

                Some(cluster)
            }
            Err(_) => None,
        };

        Ok(Self {
            strategy,
            push_images: env_flag("SLIPWAY_PUSH"),
            use_docker_cli: env_flag("SLIPWAY_USE_DOCKER_CLI"),
            use_buildkit: env_flag("SLIPWAY_USE_BUILDKIT"),
            cluster,
        })
    }

    /// Sets the remote backend settings
    pub fn with_cluster(mut self, cluster: ClusterConfig) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Strategy::Parallel {
            max_concurrency: Some(0),
        } = self.strategy
        {
            anyhow::bail!("max_concurrency must be greater than 0");
        }

        if let Some(cluster) = &self.cluster {
            cluster.validate()?;
        }

        Ok(())
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn validate_url(field: &str, url: &str) -> anyhow::Result<()> {
    if url.is_empty() {
        anyhow::bail!("{} cannot be empty", field);
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", field);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BuildConfig::default();
        assert_eq!(
            config.strategy,
            Strategy::Parallel {
                max_concurrency: None
            }
        );
        assert!(!config.push_images);
        assert!(config.cluster.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cluster_defaults() {
        let cluster = ClusterConfig::new("https://cluster.local".to_string());
        assert_eq!(cluster.namespace, "default");
        assert_eq!(cluster.pull_secret_name, "kaniko-secret");
        assert_eq!(cluster.executor_image, "gcr.io/kaniko-project/executor");
        assert_eq!(cluster.timeout, Duration::from_secs(1200));
        assert_eq!(cluster.context_source, ContextSourceConfig::Inline);
        assert!(cluster.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = BuildConfig::default();
        config.strategy = Strategy::Parallel {
            max_concurrency: Some(0),
        };
        assert!(config.validate().is_err());

        config.strategy = Strategy::Sequential;
        assert!(config.validate().is_ok());

        let mut cluster = ClusterConfig::new("not-a-url".to_string());
        assert!(cluster.validate().is_err());

        cluster.api_url = "https://cluster.local".to_string();
        cluster.namespace = String::new();
        assert!(cluster.validate().is_err());

        cluster.namespace = "builds".to_string();
        cluster.timeout = Duration::ZERO;
        assert!(cluster.validate().is_err());

        cluster.timeout = Duration::from_secs(60);
        cluster.context_source = ContextSourceConfig::Staging {
            base_url: "s3://bucket".to_string(),
        };
        let config = BuildConfig::default().with_cluster(cluster);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(
            Strategy::parse("Parallel", Some(3)).unwrap(),
            Strategy::Parallel {
                max_concurrency: Some(3)
            }
        );
        assert_eq!(
            Strategy::parse("sequential", None).unwrap(),
            Strategy::Sequential
        );
        assert!(Strategy::parse("random", None).is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(parse_flag(" YES "));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }
}
