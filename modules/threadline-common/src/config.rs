use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::{Result, ThreadlineError};
use crate::types::Subject;

/// TOML-backed run configuration. Secrets stay as env vars (see [`Neo4jConfig`]).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub subjects: Vec<Subject>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractionConfig {
    /// Number of subjects extracted concurrently.
    pub workers: usize,
    /// Bounded capacity of the worker -> sink channel.
    pub channel_capacity: usize,
    /// How long the sink waits on an empty channel before logging a heartbeat.
    pub heartbeat_secs: u64,
    /// How long the sink may take to finish once every task is done.
    pub sink_join_timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            workers: 6,
            channel_capacity: 256,
            heartbeat_secs: 10,
            sink_join_timeout_secs: 60,
        }
    }
}

impl ExtractionConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn sink_join_timeout(&self) -> Duration {
        Duration::from_secs(self.sink_join_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Csv,
    Graph,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub kind: OutputKind,
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            kind: OutputKind::Csv,
            dir: PathBuf::from("import"),
        }
    }
}

impl FileConfig {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ThreadlineError::Config(e.to_string()))
    }

    /// Load and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ThreadlineError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Reject configurations the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.subjects.is_empty() {
            return Err(ThreadlineError::Config("at least one subject is required".into()));
        }
        if self.extraction.workers == 0 {
            return Err(ThreadlineError::Config("extraction.workers must be >= 1".into()));
        }
        if self.extraction.channel_capacity == 0 {
            return Err(ThreadlineError::Config(
                "extraction.channel_capacity must be >= 1".into(),
            ));
        }
        if self.extraction.heartbeat_secs == 0 {
            return Err(ThreadlineError::Config(
                "extraction.heartbeat_secs must be >= 1".into(),
            ));
        }
        if self.extraction.sink_join_timeout_secs == 0 {
            return Err(ThreadlineError::Config(
                "extraction.sink_join_timeout_secs must be >= 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ThreadlineError::Config("retry.max_attempts must be >= 1".into()));
        }

        let mut seen = HashSet::new();
        for subject in &self.subjects {
            if !seen.insert(subject.id.as_str()) {
                return Err(ThreadlineError::Config(format!(
                    "duplicate subject id {}",
                    subject.id
                )));
            }
        }
        Ok(())
    }
}

/// Neo4j connection settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: Option<String>,
}

impl Neo4jConfig {
    /// Load from `NEO4J_URI`, `NEO4J_USER`, `NEO4J_PASSWORD` and optional `NEO4J_DB`.
    /// A `.env` file in the working directory is honoured if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Ok(Self {
            uri: required_env("NEO4J_URI")?,
            user: required_env("NEO4J_USER")?,
            password: required_env("NEO4J_PASSWORD")?,
            database: env::var("NEO4J_DB").ok().filter(|db| !db.is_empty()),
        })
    }

    /// Log the connection target without the password.
    pub fn log_redacted(&self) {
        info!(
            uri = self.uri.as_str(),
            user = self.user.as_str(),
            database = self.database.as_deref().unwrap_or("<default>"),
            "Neo4j config loaded"
        );
    }
}

fn required_env(key: &str) -> Result<String> {
    env::var(key).map_err(|_| ThreadlineError::Config(format!("{key} environment variable is required")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [extraction]
        workers = 4
        channel_capacity = 32
        heartbeat_secs = 5
        sink_join_timeout_secs = 30

        [retry]
        max_attempts = 3
        base_delay_ms = 250

        [output]
        kind = "graph"
        dir = "out"

        [[subjects]]
        id = "22536055"
        name = "American Airlines"

        [[subjects]]
        id = "56377143"
    "#;

    #[test]
    fn parses_full_config() {
        let config = FileConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.extraction.workers, 4);
        assert_eq!(config.extraction.heartbeat(), Duration::from_secs(5));
        assert_eq!(config.retry.base_delay_ms, 250);
        assert_eq!(config.output.kind, OutputKind::Graph);
        assert_eq!(config.output.dir, PathBuf::from("out"));
        assert_eq!(config.subjects.len(), 2);
        assert_eq!(config.subjects[0].name.as_deref(), Some("American Airlines"));
        assert!(config.subjects[1].name.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config = FileConfig::parse("[[subjects]]\nid = \"1\"\n").unwrap();
        assert_eq!(config.extraction.workers, 6);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.output.kind, OutputKind::Csv);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = FileConfig::parse("[extraction]\nworkers = 2\n\n[[subjects]]\nid = \"1\"\n").unwrap();
        assert_eq!(config.extraction.workers, 2);
        assert_eq!(config.extraction.channel_capacity, 256);
    }

    #[test]
    fn shipped_config_is_valid() {
        let config = FileConfig::parse(include_str!("../../../config/threadline.toml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.subjects.len(), 13);
        assert_eq!(config.extraction.workers, 6);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = FileConfig::parse("[extraction]\nworkers = 2\nthreads = 9\n").unwrap_err();
        assert!(matches!(err, ThreadlineError::Config(_)));
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut config = FileConfig::parse(SAMPLE).unwrap();
        config.extraction.workers = 0;
        assert!(config.validate().is_err());

        let mut config = FileConfig::parse(SAMPLE).unwrap();
        config.subjects.push(Subject::new("22536055"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate subject id 22536055"));

        let config = FileConfig::parse("").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_durations_are_rejected() {
        let mut config = FileConfig::parse(SAMPLE).unwrap();
        config.extraction.heartbeat_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("extraction.heartbeat_secs must be >= 1"));

        let mut config = FileConfig::parse(SAMPLE).unwrap();
        config.extraction.sink_join_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("extraction.sink_join_timeout_secs must be >= 1"));
    }

    #[test]
    fn punctuation_variants_of_an_id_get_their_own_projection() {
        let config = FileConfig::parse(
            "[[subjects]]\nid = \"a-b\"\n\n[[subjects]]\nid = \"a_b\"\n",
        )
        .unwrap();
        config.validate().unwrap();
        assert_ne!(config.subjects[0].scope_name(), config.subjects[1].scope_name());
    }
}
