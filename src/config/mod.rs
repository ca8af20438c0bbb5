//! TOML configuration for evaluation runs.

mod error;
mod load;
mod types;

pub use error::ConfigError;
pub use load::{default_config_path, load_config};
pub use types::{
    BackendConfig, BackendKind, BatchingConfig, EvalConfig, FailureConfig, InferenceSettings,
    LoggingConfig, RateLimitConfig,
};
