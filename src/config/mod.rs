//! Configuration management for the fixa controller
//!
//! Handles loading, parsing and validation of the YAML configuration file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use crate::bindings::{BindingDescriptor, BindingKind};
use crate::fixable::FixableId;
use crate::session::{SendFrequency, SessionSettings};

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// Session with the target application
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Target to connect to at startup (`ws://host:port`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_send_frequency")]
    pub send_frequency: SendFrequency,
    #[serde(default = "default_controller_frequency")]
    pub controller_frequency: SendFrequency,
    #[serde(default = "default_true")]
    pub sync_on_start: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            send_frequency: default_send_frequency(),
            controller_frequency: default_controller_frequency(),
            sync_on_start: true,
        }
    }
}

/// MIDI controller input
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MidiConfig {
    /// Substring of the input port name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_port: Option<String>,
    #[serde(default)]
    pub bindings: Vec<BindingConfig>,
}

/// Binding installed at startup
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BindingConfig {
    /// Note or CC number
    pub input: u8,
    pub kind: BindingKind,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl BindingConfig {
    pub fn target_id(&self) -> FixableId {
        match &self.group {
            Some(group) => FixableId::in_group(self.target.clone(), group.clone()),
            None => FixableId::new(self.target.clone()),
        }
    }

    pub fn descriptor(&self) -> BindingDescriptor {
        BindingDescriptor::new(self.kind, self.target_id(), false)
    }
}

/// Stored values
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PersistenceConfig {
    /// sled database directory; defaults to the application state directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from file with validation
    ///
    /// A missing file yields the defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::parse(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Parse and validate YAML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.controller.endpoint {
            if !endpoint.starts_with("ws://") && !endpoint.starts_with("wss://") {
                anyhow::bail!(
                    "Controller endpoint '{}' must be a ws:// or wss:// URL",
                    endpoint
                );
            }
        }

        if let Some(port) = &self.midi.input_port {
            if port.trim().is_empty() {
                anyhow::bail!("MIDI input_port cannot be empty");
            }
        }

        let mut inputs = HashSet::new();
        for (idx, binding) in self.midi.bindings.iter().enumerate() {
            if binding.input > 127 {
                anyhow::bail!(
                    "Binding {} input {} is out of range (must be 0-127)",
                    idx,
                    binding.input
                );
            }
            if binding.target.trim().is_empty() {
                anyhow::bail!("Binding {} target cannot be empty", idx);
            }
            if !inputs.insert(binding.input) {
                anyhow::bail!("Input {} is bound more than once", binding.input);
            }
        }

        Ok(())
    }

    /// Session actor settings derived from this config
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            send_frequency: self.controller.send_frequency,
            controller_frequency: self.controller.controller_frequency,
            sync_on_start: self.controller.sync_on_start,
            preset_bindings: self
                .midi
                .bindings
                .iter()
                .map(|b| (b.input, b.descriptor()))
                .collect(),
        }
    }
}

fn default_send_frequency() -> SendFrequency {
    SendFrequency::Normal
}

fn default_controller_frequency() -> SendFrequency {
    SendFrequency::Immediate
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::parse("{}").unwrap();
        assert!(config.controller.endpoint.is_none());
        assert_eq!(config.controller.send_frequency, SendFrequency::Normal);
        assert_eq!(
            config.controller.controller_frequency,
            SendFrequency::Immediate
        );
        assert!(config.controller.sync_on_start);
        assert!(config.midi.bindings.is_empty());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
controller:
  endpoint: ws://127.0.0.1:9400
  send_frequency: careful
  sync_on_start: false
midi:
  input_port: nanoKONTROL
  bindings:
    - { input: 1, kind: stepper, target: angle }
    - { input: 9, kind: stepper, target: size, group: geometry }
    - { input: 21, kind: hold, target: open }
persistence:
  path: /tmp/fixa
"#;
        let config = AppConfig::parse(yaml).unwrap();
        assert_eq!(config.controller.send_frequency, SendFrequency::Careful);
        assert!(!config.controller.sync_on_start);
        assert_eq!(config.midi.input_port.as_deref(), Some("nanoKONTROL"));

        let settings = config.session_settings();
        assert_eq!(settings.preset_bindings.len(), 3);
        assert_eq!(
            settings.preset_bindings[1],
            (
                9,
                BindingDescriptor::Stepper(FixableId::in_group("size", "geometry"))
            )
        );
        assert_eq!(
            settings.preset_bindings[2],
            (21, BindingDescriptor::Hold(FixableId::new("open")))
        );
    }

    #[test]
    fn test_rejects_non_websocket_endpoint() {
        let err = AppConfig::parse("controller:\n  endpoint: http://localhost:80\n").unwrap_err();
        assert!(err.to_string().contains("ws://"));
    }

    #[test]
    fn test_rejects_duplicate_inputs() {
        let yaml = r#"
midi:
  bindings:
    - { input: 9, kind: stepper, target: size }
    - { input: 9, kind: hold, target: open }
"#;
        assert!(AppConfig::parse(yaml).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_input() {
        let yaml = "midi:\n  bindings:\n    - { input: 200, kind: hold, target: open }\n";
        assert!(AppConfig::parse(yaml).is_err());
    }

    #[tokio::test]
    async fn test_load_missing_file_is_default() {
        let temp = tempdir().unwrap();
        let config = AppConfig::load(temp.path().join("absent.yaml")).await.unwrap();
        assert!(config.controller.endpoint.is_none());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, "controller:\n  send_frequency: immediate\n").unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.controller.send_frequency, SendFrequency::Immediate);
    }
}
