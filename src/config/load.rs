use std::fs;
use std::path::{Path, PathBuf};

use super::error::ConfigError;
use super::types::EvalConfig;

/// Loads and validates the configuration.
///
/// Without an override the file is read from `~/.config/batch-eval/config.toml`.
/// A missing file yields the defaults.
pub fn load_config(path_override: Option<PathBuf>) -> Result<EvalConfig, ConfigError> {
    let path = match path_override {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = read_config(&path)?;
    config.validate()?;
    Ok(config)
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::MissingHome)?;
    Ok(home.join(".config").join("batch-eval").join("config.toml"))
}

fn read_config(path: &Path) -> Result<EvalConfig, ConfigError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("no config at {}, using defaults", path.display());
            Ok(EvalConfig::default())
        }
        Err(err) => Err(ConfigError::Io(err)),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::config::BackendKind;
    use crate::evaluator::{RecordFailurePolicy, ScoringMode};

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, EvalConfig::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = NamedTempFile::new()?;
        write!(
            file,
            r#"
[rate_limit]
requests_per_second = 2.5

[inference]
model_id = "anthropic.claude-3-haiku"
timeout_seconds = 30

[batching]
batch_size = 20
scoring = "batch"

[failures]
bounded = "zero_score"

[backend]
kind = "bedrock"
region = "us-west-2"
"#
        )?;

        let config = load_config(Some(file.path().to_path_buf()))?;
        assert_eq!(config.rate_limit.requests_per_second, 2.5);
        assert_eq!(config.inference.model_id.as_deref(), Some("anthropic.claude-3-haiku"));
        assert_eq!(config.inference.max_tokens, 4096);
        assert_eq!(config.batching.batch_size, Some(20));
        assert!(config.batching.enabled);
        assert_eq!(config.batching.scoring, ScoringMode::Batch);
        assert_eq!(config.failures.batched, RecordFailurePolicy::ZeroScore);
        assert_eq!(config.failures.bounded, RecordFailurePolicy::ZeroScore);
        assert_eq!(config.backend.kind, BackendKind::Bedrock);
        assert_eq!(config.logging.level, "info");
        Ok(())
    }

    #[test]
    fn invalid_values_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "[batching]\nbatch_size = 0")?;
        let err = load_config(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        Ok(())
    }

    #[test]
    fn malformed_toml_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "[rate_limit\nrequests_per_second = ")?;
        let err = load_config(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
        Ok(())
    }
}
