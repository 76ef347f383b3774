//! Service settings read from the environment.

use std::collections::{HashMap, HashSet};
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::IndexingError;
use search_indexer_pipeline::{BuildPolicyConfig, OrchestratorConfig, QueueingPublisherConfig};
use search_indexer_repository::opensearch::DEFAULT_INDEX_PREFIX;
use search_indexer_shared::IndexType;

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

const DEFAULT_QUEUE_CAPACITY: usize = 1000;
const DEFAULT_QUEUE_DRAIN_SIZE: usize = 100;
const DEFAULT_MAX_DOCS_BEFORE_ADD: u64 = 500;
const DEFAULT_MAX_OPERATIONS_BEFORE_COMMIT: u64 = 5000;
const DEFAULT_OPTIMIZE_INTERVAL_MINUTES: i64 = 60;
const DEFAULT_MAX_BUILD_ITERATIONS: usize = 3;
const DEFAULT_BUILD_INTERVAL_SECS: u64 = 60;
const DEFAULT_OPTIMIZE_SWEEP_INTERVAL_SECS: u64 = 600;

/// Which publisher variant every index type gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherKind {
    Queueing,
    Simple,
}

impl FromStr for PublisherKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queueing" | "queue" => Ok(Self::Queueing),
            "simple" => Ok(Self::Simple),
            other => Err(format!("unknown publisher kind: {other}")),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Everything the service reads from its environment.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub opensearch_url: String,
    pub index_prefix: String,
    pub publisher_kind: PublisherKind,
    pub queue: QueueingPublisherConfig,
    pub policy: BuildPolicyConfig,
    pub orchestrator: OrchestratorConfig,
    pub build_interval: Duration,
    pub optimize_sweep_interval: Duration,
    /// Local index directories; enables the filesystem existence check.
    pub index_data_dir: Option<PathBuf>,
    /// Status record directory; enables the JSON status store.
    pub status_dir: Option<PathBuf>,
    /// Notification journal directory; enables the durable notification
    /// store. Falls back to `status_dir`.
    pub notification_dir: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl IndexerConfig {
    /// Read the configuration from the process environment, after loading
    /// a `.env` file if one is present.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `INDEX_PREFIX`: prefix of every index name (default: ep)
    /// - `PUBLISHER_KIND`: `queueing` or `simple` (default: queueing)
    /// - `PUBLISH_QUEUE_CAPACITY`, `PUBLISH_QUEUE_DRAIN_SIZE`
    /// - `MAX_DOCS_BEFORE_ADD`, `MAX_OPERATIONS_BEFORE_COMMIT`
    /// - `OPTIMIZE_INTERVAL_MINUTES` and `OPTIMIZE_INTERVAL_MINUTES_<TYPE>`
    /// - `OPTIMIZE_EXCLUSIONS`: comma-separated index names
    /// - `MAX_BUILD_ITERATIONS`, `BUILD_INTERVAL_SECS`, `OPTIMIZE_SWEEP_INTERVAL_SECS`
    /// - `INDEX_DATA_DIR`, `STATUS_DIR`: optional directories
    /// - `NOTIFICATION_DIR`: notification journal directory (default: `STATUS_DIR`)
    /// - `LOG_FORMAT`: `text` or `json` (default: text)
    pub fn from_env() -> Result<Self, IndexingError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, IndexingError> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let queue = QueueingPublisherConfig {
            queue_capacity: parse_var(&lookup, "PUBLISH_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?,
            queue_drain_size: parse_var(&lookup, "PUBLISH_QUEUE_DRAIN_SIZE", DEFAULT_QUEUE_DRAIN_SIZE)?,
        };
        if queue.queue_capacity == 0 {
            return Err(IndexingError::config("PUBLISH_QUEUE_CAPACITY must be positive"));
        }

        let default_optimize_interval_minutes =
            parse_var(&lookup, "OPTIMIZE_INTERVAL_MINUTES", DEFAULT_OPTIMIZE_INTERVAL_MINUTES)?;
        let mut optimize_intervals = HashMap::new();
        for index_type in IndexType::ALL {
            let key = optimize_interval_key(index_type);
            if let Some(minutes) = parse_opt_var::<i64>(&lookup, &key)? {
                optimize_intervals.insert(index_type, minutes);
            }
        }
        if default_optimize_interval_minutes < 0 || optimize_intervals.values().any(|m| *m < 0) {
            return Err(IndexingError::config("Optimize intervals must not be negative"));
        }

        let policy = BuildPolicyConfig {
            max_docs_before_add: parse_var(&lookup, "MAX_DOCS_BEFORE_ADD", DEFAULT_MAX_DOCS_BEFORE_ADD)?,
            max_operations_before_commit: parse_var(
                &lookup,
                "MAX_OPERATIONS_BEFORE_COMMIT",
                DEFAULT_MAX_OPERATIONS_BEFORE_COMMIT,
            )?,
            default_optimize_interval_minutes,
            optimize_intervals,
        };

        let orchestrator = OrchestratorConfig {
            max_build_iterations: parse_var(&lookup, "MAX_BUILD_ITERATIONS", DEFAULT_MAX_BUILD_ITERATIONS)?,
            optimize_exclusions: parse_exclusions(lookup("OPTIMIZE_EXCLUSIONS").as_deref())?,
        };
        if orchestrator.max_build_iterations == 0 {
            return Err(IndexingError::config("MAX_BUILD_ITERATIONS must be positive"));
        }

        let build_interval = positive_secs(&lookup, "BUILD_INTERVAL_SECS", DEFAULT_BUILD_INTERVAL_SECS)?;
        let optimize_sweep_interval = positive_secs(
            &lookup,
            "OPTIMIZE_SWEEP_INTERVAL_SECS",
            DEFAULT_OPTIMIZE_SWEEP_INTERVAL_SECS,
        )?;

        let config = Self {
            opensearch_url: lookup("OPENSEARCH_URL").unwrap_or_else(|| DEFAULT_OPENSEARCH_URL.to_string()),
            index_prefix: lookup("INDEX_PREFIX").unwrap_or_else(|| DEFAULT_INDEX_PREFIX.to_string()),
            publisher_kind: parse_var(&lookup, "PUBLISHER_KIND", PublisherKind::Queueing)?,
            queue,
            policy,
            orchestrator,
            build_interval,
            optimize_sweep_interval,
            index_data_dir: lookup("INDEX_DATA_DIR").map(PathBuf::from),
            status_dir: lookup("STATUS_DIR").map(PathBuf::from),
            notification_dir: lookup("NOTIFICATION_DIR")
                .or_else(|| lookup("STATUS_DIR"))
                .map(PathBuf::from),
            log_format: parse_var(&lookup, "LOG_FORMAT", LogFormat::Text)?,
        };

        info!(
            opensearch_url = %config.opensearch_url,
            index_prefix = %config.index_prefix,
            publisher_kind = ?config.publisher_kind,
            build_interval_secs = config.build_interval.as_secs(),
            "Loaded configuration"
        );
        Ok(config)
    }
}

fn optimize_interval_key(index_type: IndexType) -> String {
    format!(
        "OPTIMIZE_INTERVAL_MINUTES_{}",
        index_type.index_name().to_ascii_uppercase()
    )
}

fn parse_opt_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, IndexingError>
where
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| IndexingError::config(format!("Invalid {key} '{raw}': {e}")))
        })
        .transpose()
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, IndexingError>
where
    T: FromStr,
    T::Err: Display,
{
    Ok(parse_opt_var(lookup, key)?.unwrap_or(default))
}

fn positive_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<Duration, IndexingError> {
    match parse_var(lookup, key, default)? {
        0 => Err(IndexingError::config(format!("{key} must be positive"))),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn parse_exclusions(raw: Option<&str>) -> Result<HashSet<IndexType>, IndexingError> {
    let Some(raw) = raw else {
        return Ok(HashSet::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| IndexType::from_name(name).map_err(|e| IndexingError::config(e.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<IndexerConfig, IndexingError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        IndexerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.opensearch_url, "http://localhost:9200");
        assert_eq!(config.index_prefix, "ep");
        assert_eq!(config.publisher_kind, PublisherKind::Queueing);
        assert_eq!(config.queue.queue_capacity, 1000);
        assert_eq!(config.queue.queue_drain_size, 100);
        assert_eq!(config.policy.max_docs_before_add, 500);
        assert_eq!(config.policy.max_operations_before_commit, 5000);
        assert_eq!(config.policy.default_optimize_interval_minutes, 60);
        assert!(config.policy.optimize_intervals.is_empty());
        assert_eq!(config.orchestrator.max_build_iterations, 3);
        assert!(config.orchestrator.optimize_exclusions.is_empty());
        assert_eq!(config.build_interval, Duration::from_secs(60));
        assert_eq!(config.optimize_sweep_interval, Duration::from_secs(600));
        assert!(config.index_data_dir.is_none());
        assert!(config.status_dir.is_none());
        assert!(config.notification_dir.is_none());
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PUBLISHER_KIND", "Simple"),
            ("MAX_OPERATIONS_BEFORE_COMMIT", "3"),
            ("OPTIMIZE_INTERVAL_MINUTES_SHIPPINGSERVICELEVEL", "15"),
            ("OPTIMIZE_EXCLUSIONS", "product, cmuser,"),
            ("STATUS_DIR", "/var/lib/indexer/status"),
            ("LOG_FORMAT", "json"),
            ("INDEX_PREFIX", "staging"),
        ])
        .unwrap();

        assert_eq!(config.publisher_kind, PublisherKind::Simple);
        assert_eq!(config.policy.max_operations_before_commit, 3);
        assert_eq!(
            config.policy.optimize_intervals.get(&IndexType::ShippingServiceLevel),
            Some(&15)
        );
        assert_eq!(
            config.orchestrator.optimize_exclusions,
            [IndexType::Product, IndexType::CmUser].into_iter().collect::<HashSet<_>>()
        );
        assert_eq!(config.status_dir, Some(PathBuf::from("/var/lib/indexer/status")));
        assert_eq!(config.notification_dir, Some(PathBuf::from("/var/lib/indexer/status")));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.index_prefix, "staging");
    }

    #[test]
    fn test_notification_dir_override() {
        let config = config_from(&[
            ("STATUS_DIR", "/var/lib/indexer/status"),
            ("NOTIFICATION_DIR", "/var/lib/indexer/queue"),
        ])
        .unwrap();

        assert_eq!(config.notification_dir, Some(PathBuf::from("/var/lib/indexer/queue")));
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = config_from(&[("PUBLISH_QUEUE_CAPACITY", "  "), ("INDEX_DATA_DIR", "")]).unwrap();

        assert_eq!(config.queue.queue_capacity, 1000);
        assert!(config.index_data_dir.is_none());
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        for vars in [
            vec![("MAX_DOCS_BEFORE_ADD", "many")],
            vec![("PUBLISHER_KIND", "batching")],
            vec![("OPTIMIZE_EXCLUSIONS", "product,warehouse")],
            vec![("BUILD_INTERVAL_SECS", "0")],
            vec![("PUBLISH_QUEUE_CAPACITY", "0")],
            vec![("MAX_BUILD_ITERATIONS", "0")],
            vec![("OPTIMIZE_INTERVAL_MINUTES_PRODUCT", "-5")],
        ] {
            let err = config_from(&vars).unwrap_err();
            assert!(matches!(err, IndexingError::ConfigError(_)), "{vars:?}");
        }
    }
}
