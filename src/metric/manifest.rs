use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

const DEFAULT_PLUGIN_TIMEOUT_MS: u64 = 10_000;

fn default_timeout_ms() -> u64 {
    DEFAULT_PLUGIN_TIMEOUT_MS
}

/// How to launch an out-of-process metric plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricManifest {
    pub name: String,
    /// Program to execute
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Environment variables forwarded to the plugin; everything else is cleared
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl MetricManifest {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            timeout_ms: DEFAULT_PLUGIN_TIMEOUT_MS,
            env: Vec::new(),
            working_dir: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let manifest: Self = serde_yaml::from_str(content)?;
        if manifest.command.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "metric plugin '{}' has an empty command",
                manifest.name
            )));
        }
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_yaml_manifest() {
        let content = r#"
name: rouge
command: python3
args: ["-m", "metrics.rouge"]
env: [PYTHONPATH]
"#;
        let manifest = MetricManifest::from_yaml(content).unwrap();
        assert_eq!(manifest.name, "rouge");
        assert_eq!(manifest.args, vec!["-m", "metrics.rouge"]);
        assert_eq!(manifest.timeout_ms, DEFAULT_PLUGIN_TIMEOUT_MS);
        assert_eq!(manifest.env, vec!["PYTHONPATH"]);
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = MetricManifest::from_yaml("name: broken\ncommand: '  '\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
