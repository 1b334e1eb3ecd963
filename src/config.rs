use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::providers::teamcity::client::locator::{BuildStatus, LocatorFlag};
use crate::providers::teamcity::client::{
    ClientSettings, DispatchSettings, RetryPolicy, Timeouts, DEFAULT_CONCURRENCY,
};

/// Configuration file structure for tclens.
///
/// Allows users to save server and query settings and reuse them across runs.
/// Configuration files are loaded from the current directory, the user's
/// config directory, or a specified path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// TeamCity server and credentials
    #[serde(default)]
    pub server: ServerConfig,

    /// Request dispatcher limits
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Retry behaviour of the HTTP transport
    #[serde(default)]
    pub transport: TransportConfig,

    /// Which builds count as "latest"
    #[serde(default)]
    pub query: QueryConfig,

    /// Output format preferences
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    /// TeamCity base URL (e.g., 'https://ci.example.com')
    pub url: Option<String>,

    /// Access token for bearer authentication
    pub token: Option<String>,

    /// Username for basic authentication
    pub username: Option<String>,

    /// Password for basic authentication
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DispatchConfig {
    /// Maximum number of HTTP calls in flight (0 selects the default)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Requests that may wait for a worker before submitters block
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TransportConfig {
    /// Retries for transient network failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for any retry delay, in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Growth factor between consecutive retry delays
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Limit for one attempt until the response arrives, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Limit for establishing a connection, in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct QueryConfig {
    /// Leave paused build configurations out
    #[serde(default = "default_true")]
    pub exclude_paused: bool,

    /// Only configurations of this project
    pub project: Option<String>,

    /// Query this branch for every configuration instead of discovering branches
    pub branch: Option<String>,

    /// Only builds with this status
    pub status: Option<BuildStatus>,

    /// Running filter
    pub running: Option<LocatorFlag>,

    /// Canceled filter
    pub canceled: Option<LocatorFlag>,

    /// Builds per filter; 0 fetches every page
    #[serde(default = "default_count")]
    pub count: u32,

    /// Look up real branch names for builds labelled `<default>`
    #[serde(default)]
    pub name_default_branches: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Default output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Summary,
    Json,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            exclude_paused: true,
            project: None,
            branch: None,
            status: None,
            running: None,
            canceled: None,
            count: default_count(),
            name_default_branches: false,
        }
    }
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_queue_capacity() -> usize {
    DispatchSettings::default().queue_capacity
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_request_timeout_secs() -> u64 {
    Timeouts::default().request.as_secs()
}

fn default_connect_timeout_secs() -> u64 {
    Timeouts::default().connect.as_secs()
}

fn default_true() -> bool {
    true
}

fn default_count() -> u32 {
    1
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./tclens.toml
    /// 3. ./tclens.json
    /// 4. ./tclens.yaml
    /// 5. ./tclens.yml
    /// 6. `<config dir>/tclens/config.toml`
    ///
    /// An explicit path must exist. Without one, the default configuration is
    /// returned if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = ["tclens.toml", "tclens.json", "tclens.yaml", "tclens.yml"]
            .into_iter()
            .map(PathBuf::from)
            .chain(Self::user_config_path());

        for candidate in candidates {
            if candidate.exists() {
                return Self::load_from_path(&candidate);
            }
        }

        // No config file found, return defaults
        Ok(Self::default())
    }

    /// Per-user configuration file, if the platform has a config directory.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tclens").join("config.toml"))
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => {
                // Try TOML first, then JSON, then YAML
                toml::from_str(&contents)
                    .or_else(|_| serde_json::from_str(&contents))
                    .or_else(|_| serde_yaml::from_str(&contents))
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))
            }
        }
    }

    /// Client settings derived from the dispatch and transport sections.
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            dispatch: DispatchSettings {
                concurrency: self.dispatch.concurrency,
                queue_capacity: self.dispatch.queue_capacity,
            },
            retry: RetryPolicy {
                max_retries: self.transport.max_retries,
                initial_delay: Duration::from_millis(self.transport.initial_backoff_ms),
                max_delay: Duration::from_millis(self.transport.max_backoff_ms),
                multiplier: self.transport.backoff_multiplier,
            },
            timeouts: Timeouts {
                request: Duration::from_secs(self.transport.request_timeout_secs),
                connect: Duration::from_secs(self.transport.connect_timeout_secs),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.url, None);
        assert_eq!(config.dispatch.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.transport.max_retries, 5);
        assert!(config.query.exclude_paused);
        assert_eq!(config.query.count, 1);
        assert_eq!(config.output.format, OutputFormat::Summary);
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[server]
url = "https://ci.example.com"
token = "eyJ0eXAi"

[dispatch]
concurrency = 4

[transport]
max-retries = 2
initial-backoff-ms = 100

[query]
exclude-paused = false
status = "SUCCESS"
running = "false"
count = 0

[output]
format = "json"
pretty = true
"#;
        write!(temp_file, "{toml_content}").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.server.url.as_deref(), Some("https://ci.example.com"));
        assert_eq!(config.server.token.as_deref(), Some("eyJ0eXAi"));
        assert_eq!(config.dispatch.concurrency, 4);
        assert_eq!(config.transport.max_retries, 2);
        assert_eq!(config.transport.max_backoff_ms, 10_000);
        assert!(!config.query.exclude_paused);
        assert_eq!(config.query.status, Some(BuildStatus::Success));
        assert_eq!(config.query.running, Some(LocatorFlag::False));
        assert_eq!(config.query.count, 0);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.output.pretty);
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "server": {
    "url": "https://ci.json.example.com",
    "username": "admin",
    "password": "secret"
  },
  "query": {
    "branch": "release"
  }
}"#;
        write!(temp_file, "{json_content}").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.server.username.as_deref(), Some("admin"));
        assert_eq!(config.query.branch.as_deref(), Some("release"));
        assert_eq!(config.query.count, 1);
    }

    #[test]
    fn test_load_yaml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        let yaml_content = "dispatch:\n  concurrency: 16\n  queue-capacity: 64\n";
        write!(temp_file, "{yaml_content}").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.dispatch.concurrency, 16);
        assert_eq!(config.dispatch.queue_capacity, 64);
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nonexistent.toml");

        let error = Config::load(Some(&path)).unwrap_err();
        assert!(error.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_invalid_config_is_reported() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "[dispatch]\nconcurrency = \"many\"\n").unwrap();

        let error = Config::load_from_path(temp_file.path()).unwrap_err();
        assert!(error.to_string().contains("Failed to parse TOML config"));
    }

    #[test]
    fn test_explicit_path_is_loaded_directly() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("ci");
        std::fs::write(&path, "[server]\nurl = \"https://ci.example.com\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.url.as_deref(), Some("https://ci.example.com"));
    }

    #[test]
    fn test_client_settings_from_config() {
        let mut config = Config::default();
        config.dispatch.concurrency = 3;
        config.transport.initial_backoff_ms = 50;
        config.transport.request_timeout_secs = 5;

        let settings = config.client_settings();
        assert_eq!(settings.dispatch.concurrency, 3);
        assert_eq!(settings.retry.initial_delay, Duration::from_millis(50));
        assert_eq!(settings.retry.max_retries, 5);
        assert_eq!(settings.timeouts.request, Duration::from_secs(5));
        assert_eq!(settings.timeouts.connect, Duration::from_secs(10));
    }
}
