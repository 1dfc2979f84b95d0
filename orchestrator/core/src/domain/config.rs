// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// GENESIS Configuration Types
//
// Defines the configuration manifest shared by the orchestrator, the message
// bus and the genetic memory store:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Orchestrator concurrency limits and default deadlines
// - Message bus request timeouts
// - Genome store backend selection (in-memory or sled)
// - Logging settings consumed by the CLI

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "genesis.ai/v1";
pub const KIND: &str = "GenesisConfig";

/// Top-level configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// API version (must be "genesis.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "GenesisConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: GenesisConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenesisConfigSpec {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub message_bus: MessageBusConfig,

    #[serde(default)]
    pub genetic_memory: GeneticMemoryConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound on tasks running at once within one parallel batch
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Size of the offload pool for blocking task bodies
    #[serde(default = "default_max_blocking")]
    pub max_blocking: usize,

    /// Deadline applied to parallel batches that do not pass their own
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub default_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBusConfig {
    /// Deadline for `request()` calls that do not pass their own
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneticMemoryConfig {
    #[serde(default)]
    pub backend: GenomeBackend,

    /// Database directory (sled backend only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Default number of evolution events returned by history queries
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenomeBackend {
    #[default]
    InMemory,
    Sled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

fn default_max_concurrent() -> usize {
    10
}

fn default_max_blocking() -> usize {
    4
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_history_limit() -> usize {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_blocking: default_max_blocking(),
            default_timeout: None,
        }
    }
}

impl Default for MessageBusConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
        }
    }
}

impl Default for GeneticMemoryConfig {
    fn default() -> Self {
        Self {
            backend: GenomeBackend::InMemory,
            path: None,
            history_limit: default_history_limit(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Compact,
        }
    }
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "genesis-local".to_string(),
                version: None,
                labels: None,
            },
            spec: GenesisConfigSpec::default(),
        }
    }
}

impl GenesisConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Candidate configuration paths, in discovery order
    pub fn discovery_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(path) = std::env::var("GENESIS_CONFIG_PATH") {
            paths.push(PathBuf::from(path));
        }

        paths.push(PathBuf::from("./genesis-config.yaml"));

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".genesis").join("config.yaml"));
        }

        #[cfg(unix)]
        paths.push(PathBuf::from("/etc/genesis/config.yaml"));
        #[cfg(windows)]
        paths.push(PathBuf::from("C:\\ProgramData\\Genesis\\config.yaml"));

        paths
    }

    /// First existing configuration file (Env -> Cwd -> Home -> System)
    pub fn discover_config() -> Option<PathBuf> {
        Self::discovery_paths().into_iter().find(|p| p.exists())
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails hard if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            Self::from_yaml_file(config_path)?
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("GENESIS_MAX_CONCURRENT") {
            match val.parse::<usize>() {
                Ok(n) => {
                    tracing::info!("Environment override: GENESIS_MAX_CONCURRENT={}", n);
                    self.spec.orchestrator.max_concurrent = n;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for GENESIS_MAX_CONCURRENT: '{}'. Expected a positive integer. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("GENESIS_GENOME_BACKEND") {
            match val.to_lowercase().as_str() {
                "in-memory" | "memory" => self.spec.genetic_memory.backend = GenomeBackend::InMemory,
                "sled" => self.spec.genetic_memory.backend = GenomeBackend::Sled,
                _ => {
                    tracing::warn!(
                        "Invalid value for GENESIS_GENOME_BACKEND: '{}'. Expected in-memory/sled. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("GENESIS_GENOME_PATH") {
            tracing::info!("Environment override: GENESIS_GENOME_PATH={}", val);
            self.spec.genetic_memory.path = Some(PathBuf::from(val));
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let orchestrator = &self.spec.orchestrator;
        if orchestrator.max_concurrent == 0 {
            anyhow::bail!("spec.orchestrator.max_concurrent must be at least 1");
        }
        if orchestrator.max_blocking == 0 {
            anyhow::bail!("spec.orchestrator.max_blocking must be at least 1");
        }

        if self.spec.message_bus.request_timeout.is_zero() {
            anyhow::bail!("spec.message_bus.request_timeout must be non-zero");
        }

        let memory = &self.spec.genetic_memory;
        if memory.backend == GenomeBackend::Sled && memory.path.is_none() {
            anyhow::bail!("spec.genetic_memory.path is required for the sled backend");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let config = GenesisConfig::default();
        assert_eq!(config.api_version, API_VERSION);
        assert_eq!(config.kind, KIND);
        assert_eq!(config.spec.orchestrator.max_concurrent, 10);
        assert_eq!(config.spec.message_bus.request_timeout, Duration::from_secs(30));
        assert_eq!(config.spec.genetic_memory.backend, GenomeBackend::InMemory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
apiVersion: genesis.ai/v1
kind: GenesisConfig
metadata:
  name: lab
spec:
  orchestrator:
    max_concurrent: 2
    default_timeout: 1m 30s
  message_bus:
    request_timeout: 5s
  genetic_memory:
    backend: sled
    path: /var/lib/genesis/genomes
  observability:
    log_level: debug
    log_format: json
"#;
        let config = GenesisConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.metadata.name, "lab");
        assert_eq!(config.spec.orchestrator.max_concurrent, 2);
        assert_eq!(config.spec.orchestrator.max_blocking, 4);
        assert_eq!(config.spec.orchestrator.default_timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.spec.message_bus.request_timeout, Duration::from_secs(5));
        assert_eq!(config.spec.genetic_memory.backend, GenomeBackend::Sled);
        assert_eq!(config.spec.observability.log_format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis-config.yaml");

        let mut config = GenesisConfig::default();
        config.spec.orchestrator.default_timeout = Some(Duration::from_millis(250));
        config.to_yaml_file(&path).unwrap();

        let loaded = GenesisConfig::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.spec.orchestrator.default_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let result = GenesisConfig::load_or_default(Some(PathBuf::from("/nonexistent/genesis.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = GenesisConfig::default();
        config.kind = "NodeConfig".to_string();
        assert!(config.validate().is_err());

        let mut config = GenesisConfig::default();
        config.spec.orchestrator.max_concurrent = 0;
        assert!(config.validate().is_err());

        let mut config = GenesisConfig::default();
        config.spec.genetic_memory.backend = GenomeBackend::Sled;
        assert!(config.validate().is_err());
        config.spec.genetic_memory.path = Some(PathBuf::from("/tmp/genomes"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let yaml = r#"
apiVersion: genesis.ai/v1
kind: GenesisConfig
metadata:
  name: lab
spec:
  genetic_memory:
    backend: firestore
"#;
        assert!(GenesisConfig::from_yaml_str(yaml).is_err());
    }
}
