use std::path::PathBuf;

use batch_eval::config::EvalConfig;
use batch_eval::evaluator::ScoringMode;
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "batch-eval",
    version,
    about = "Score a model against a labeled dataset"
)]
pub struct CliArgs {
    /// Config file; defaults to ~/.config/batch-eval/config.toml
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,
    /// Overrides the configured log level
    #[arg(long, global = true)]
    pub log_level: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate a model on a JSONL dataset and print the result as JSON
    Run(RunArgs),
    /// Check a metric against a few dataset records before using it
    Validate(ValidateArgs),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Many records per call
    #[default]
    Batched,
    /// One call per record
    Bounded,
}

#[derive(Args, Debug, Clone)]
pub struct MetricArgs {
    /// Built-in metric: exact_match, contains or token_f1
    #[arg(long, short = 'M', conflicts_with = "metric_manifest")]
    pub metric: Option<String>,
    /// YAML manifest of an out-of-process metric plugin
    #[arg(long)]
    pub metric_manifest: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DatasetArgs {
    /// JSONL file, one JSON object per line
    #[arg(long, short = 'd')]
    pub dataset: PathBuf,
    /// Column holding the expected output
    #[arg(long, default_value = batch_eval::dataset::DEFAULT_OUTPUT_FIELD)]
    pub output_field: String,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,
    #[command(flatten)]
    pub metric: MetricArgs,
    #[arg(long, short = 'm')]
    pub model: Option<String>,
    #[arg(long, value_enum, default_value_t = Mode::Batched)]
    pub mode: Mode,
    /// User template, e.g. "Question: {{input}}"
    #[arg(long)]
    pub template: Option<String>,
    #[arg(long)]
    pub system: Option<String>,
    #[arg(long)]
    pub batch_size: Option<usize>,
    #[arg(long)]
    pub rps: Option<f64>,
    #[arg(long)]
    pub temperature: Option<f32>,
    #[arg(long)]
    pub max_tokens: Option<u32>,
    /// Aggregate with the metric's batch_apply instead of per-record apply
    #[arg(long)]
    pub batch_scoring: bool,
    /// Write the JSON result here instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,
    #[command(flatten)]
    pub metric: MetricArgs,
    /// Records to sample, at most 5
    #[arg(long, default_value_t = batch_eval::validator::DEFAULT_SAMPLE_SIZE)]
    pub samples: usize,
}

impl CliArgs {
    /// Folds command-line overrides into the loaded config.
    pub fn apply_overrides(&self, config: &mut EvalConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        let Command::Run(run) = &self.command else {
            return;
        };
        if let Some(model) = &run.model {
            config.inference.model_id = Some(model.clone());
        }
        if let Some(batch_size) = run.batch_size {
            config.batching.batch_size = Some(batch_size);
        }
        if let Some(rps) = run.rps {
            config.rate_limit.requests_per_second = rps;
        }
        if let Some(temperature) = run.temperature {
            config.inference.temperature = temperature;
        }
        if let Some(max_tokens) = run.max_tokens {
            config.inference.max_tokens = max_tokens;
        }
        if run.batch_scoring {
            config.batching.scoring = ScoringMode::Batch;
        }
        match run.mode {
            Mode::Batched => config.batching.enabled = true,
            Mode::Bounded => config.batching.enabled = false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_overrides_reach_the_config() {
        let args = CliArgs::parse_from([
            "batch-eval",
            "run",
            "--dataset",
            "data.jsonl",
            "--metric",
            "exact_match",
            "--model",
            "gpt-4o-mini",
            "--mode",
            "bounded",
            "--rps",
            "0",
            "--batch-scoring",
        ]);
        let mut config = EvalConfig::default();
        args.apply_overrides(&mut config);

        assert_eq!(config.inference.model_id.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.rate_limit.requests_per_second, 0.0);
        assert!(!config.batching.enabled);
        assert_eq!(config.batching.scoring, ScoringMode::Batch);
    }

    #[test]
    fn metric_and_manifest_conflict() {
        let parsed = CliArgs::try_parse_from([
            "batch-eval",
            "validate",
            "--dataset",
            "d.jsonl",
            "--metric",
            "exact_match",
            "--metric-manifest",
            "m.yaml",
        ]);
        assert!(parsed.is_err());
    }
}
