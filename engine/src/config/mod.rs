//! Configuration management
//!
//! This module handles loading, validation, and management of the Cadence
//! configuration. Configuration is stored in TOML format at
//! ~/.cadence/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Workspace path, log level, data directory
//! - **cycle**: Iteration ceiling and per-phase retry limit
//! - **gateway**: Tool invocation deadline
//! - **capability**: Static capability registrations (patterns, permissions,
//!   priority, playbook)
//!
//! # Path Expansion
//!
//! The configuration system automatically expands `~` to the user's home
//! directory and creates the workspace directory if it doesn't exist.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// Cycle controller limits
    #[serde(default)]
    pub cycle: CycleSettings,

    /// Tool gateway settings
    #[serde(default)]
    pub gateway: GatewaySettings,

    /// Capability registrations, applied once at startup
    #[serde(default, rename = "capability")]
    pub capabilities: Vec<CapabilityConfig>,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Workspace directory path (supports ~ expansion)
    pub workspace: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Cycle controller limits.
///
/// The numeric defaults are deliberate configuration, not inferences: the
/// ceiling stops runaway OBSERVE→ACT loops, the retry limit bounds how often
/// a failing phase is replanned before the objective fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSettings {
    /// Maximum OBSERVE→ACT cycles per objective
    #[serde(default = "default_iteration_ceiling")]
    pub iteration_ceiling: u32,

    /// Consecutive failures tolerated per phase before the objective fails
    #[serde(default = "default_phase_retry_limit")]
    pub phase_retry_limit: u32,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            iteration_ceiling: default_iteration_ceiling(),
            phase_retry_limit: default_phase_retry_limit(),
        }
    }
}

/// Tool gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Per-invocation deadline in seconds
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// One statically registered capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConfig {
    pub name: String,
    pub trigger_patterns: Vec<String>,
    pub tool_permissions: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    /// Ordered tool requests the built-in playbook handler executes, one per
    /// cycle.
    #[serde(default)]
    pub playbook: Vec<PlaybookStepConfig>,
}

/// One step of a capability's playbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookStepConfig {
    pub tool: String,
    #[serde(default)]
    pub args: HashMap<String, serde_json::Value>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.cadence/data")
}

fn default_iteration_ceiling() -> u32 {
    16
}

fn default_phase_retry_limit() -> u32 {
    3
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// Template written on first run.
const DEFAULT_CONFIG: &str = r#"[core]
workspace = "~/cadence-workspace"
log_level = "info"
data_dir = "~/.cadence/data"

[cycle]
iteration_ceiling = 16
phase_retry_limit = 3

[gateway]
tool_timeout_secs = 30

[[capability]]
name = "inspector"
trigger_patterns = ["\\binspect\\b", "\\bcheck\\b", "\\bhealth\\b"]
tool_permissions = ["list_dir", "read_file"]
priority = 0

[[capability.playbook]]
tool = "list_dir"
args = { path = "." }
"#;

impl Config {
    /// Default configuration file location: ~/.cadence/config.toml
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".cadence").join("config.toml"))
    }

    /// Load the configuration from the default location, writing the default
    /// template first if no file exists yet.
    pub fn load_or_create() -> Result<Self> {
        let path = Self::default_path()?;

        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
            fs::write(&path, DEFAULT_CONFIG).context("Failed to write default config")?;
            tracing::info!("Wrote default configuration to {}", path.display());
        }

        Self::load_from_path(&path)
    }

    /// Load configuration from an explicit path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        config.core.workspace = expand_path(&config.core.workspace)?;
        config.core.data_dir = expand_path(&config.core.data_dir)?;
        config.validate()?;

        if !config.core.workspace.exists() {
            fs::create_dir_all(&config.core.workspace)
                .context("Failed to create workspace directory")?;
        }

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
        if !LEVELS.contains(&self.core.log_level.as_str()) {
            anyhow::bail!("invalid log_level '{}'", self.core.log_level);
        }
        if self.cycle.iteration_ceiling == 0 {
            anyhow::bail!("cycle.iteration_ceiling must be at least 1");
        }
        if self.cycle.phase_retry_limit == 0 {
            anyhow::bail!("cycle.phase_retry_limit must be at least 1");
        }
        if self.gateway.tool_timeout_secs == 0 {
            anyhow::bail!("gateway.tool_timeout_secs must be at least 1");
        }
        for capability in &self.capabilities {
            if capability.trigger_patterns.is_empty() {
                anyhow::bail!(
                    "capability '{}' declares no trigger patterns",
                    capability.name
                );
            }
        }
        Ok(())
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_path(path: &Path) -> Result<PathBuf> {
    let text = path.to_string_lossy();
    if let Some(rest) = text.strip_prefix("~/") {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(rest))
    } else if text == "~" {
        dirs::home_dir().context("Could not determine home directory")
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_default_template_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.cycle.iteration_ceiling, 16);
        assert_eq!(config.cycle.phase_retry_limit, 3);
        assert_eq!(config.gateway.tool_timeout_secs, 30);
        assert_eq!(config.capabilities.len(), 1);
        assert_eq!(config.capabilities[0].name, "inspector");
        assert_eq!(config.capabilities[0].playbook.len(), 1);
        assert_eq!(config.capabilities[0].playbook[0].tool, "list_dir");
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let tmp = TempDir::new().unwrap();
        let workspace = tmp.path().join("ws");
        let path = write_config(
            &tmp,
            &format!(
                "[core]\nworkspace = \"{}\"\n",
                workspace.to_string_lossy()
            ),
        );

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.cycle.iteration_ceiling, 16);
        assert_eq!(config.gateway.tool_timeout_secs, 30);
        assert!(config.capabilities.is_empty());
        // Workspace directory is created on load
        assert!(workspace.is_dir());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            &format!(
                "[core]\nworkspace = \"{}\"\nlog_level = \"verbose\"\n",
                tmp.path().join("ws").to_string_lossy()
            ),
        );

        assert!(Config::load_from_path(&path).is_err());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            &format!(
                "[core]\nworkspace = \"{}\"\n[cycle]\niteration_ceiling = 0\n",
                tmp.path().join("ws").to_string_lossy()
            ),
        );

        assert!(Config::load_from_path(&path).is_err());
    }

    #[test]
    fn test_capability_without_patterns_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            &format!(
                "[core]\nworkspace = \"{}\"\n\n[[capability]]\nname = \"x\"\ntrigger_patterns = []\ntool_permissions = []\n",
                tmp.path().join("ws").to_string_lossy()
            ),
        );

        assert!(Config::load_from_path(&path).is_err());
    }

    #[test]
    fn test_playbook_args_carry_json_values() {
        let toml_text = r#"
[core]
workspace = "/tmp/ws"

[[capability]]
name = "qa"
trigger_patterns = ["test"]
tool_permissions = ["run_command"]
priority = 10

[[capability.playbook]]
tool = "run_command"
args = { command = "cargo test", quiet = true }
"#;
        let config: Config = toml::from_str(toml_text).unwrap();
        let step = &config.capabilities[0].playbook[0];
        assert_eq!(step.args["command"], serde_json::json!("cargo test"));
        assert_eq!(step.args["quiet"], serde_json::json!(true));
    }

    #[test]
    fn test_config_round_trip() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(parsed.core.log_level, config.core.log_level);
        assert_eq!(parsed.cycle.iteration_ceiling, config.cycle.iteration_ceiling);
        assert_eq!(parsed.capabilities.len(), config.capabilities.len());
    }
}
