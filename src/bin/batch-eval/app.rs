use std::fs;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use batch_eval::config::{load_config, EvalConfig};
use batch_eval::dataset::{DatasetAdapter, InMemoryDataset};
use batch_eval::evaluator::{BatchedEvaluator, BoundedEvaluator};
use batch_eval::prompt::{PromptAdapter, TemplatePrompt, DEFAULT_USER_TEMPLATE};
use batch_eval::rate_limiter::RateLimiterRegistry;
use batch_eval::validator::MetricValidator;
use clap::Parser;

use crate::args::{CliArgs, Command, RunArgs, ValidateArgs};
use crate::backend::build_backend;
use crate::dataset::load_jsonl;
use crate::logging::init_logging;
use crate::metric::{metric_for_run, validation_report};

const EXIT_EVALUATION_FAILED: u8 = 2;
const EXIT_METRIC_REJECTED: u8 = 1;

pub async fn run() -> anyhow::Result<ExitCode> {
    let args = CliArgs::parse();
    let mut config = load_config(args.config.clone())?;
    args.apply_overrides(&mut config);
    config.validate()?;
    let _logger = init_logging(&config.logging)?;

    match &args.command {
        Command::Run(run) => evaluate(&config, run).await,
        Command::Validate(validate) => validate_metric(validate).await,
    }
}

async fn evaluate(config: &EvalConfig, args: &RunArgs) -> anyhow::Result<ExitCode> {
    let model_id = config
        .inference
        .model_id
        .clone()
        .context("no model given; pass --model or set inference.model_id")?;
    let dataset = load_jsonl(&args.dataset.dataset, &args.dataset.output_field)?;
    let metric = metric_for_run(&args.metric, &dataset).await?;
    let backend = build_backend(config)?;
    let limiter = RateLimiterRegistry::new(config.rate_limit.requests_per_second)
        .limiter_for(backend.name(), &model_id);

    let template = args
        .template
        .clone()
        .unwrap_or_else(|| DEFAULT_USER_TEMPLATE.to_string());
    let mut prompt = TemplatePrompt::new(template);
    if let Some(system) = &args.system {
        prompt = prompt.system(system.clone());
    }
    let prompt: Arc<dyn PromptAdapter> = Arc::new(prompt);
    let source: Arc<dyn DatasetAdapter> =
        Arc::new(InMemoryDataset::new(dataset).with_output_field(&args.dataset.output_field));

    let result = if config.batching.enabled {
        BatchedEvaluator::new(backend, metric, source, config.batched_evaluator_config())
            .prompt(prompt)
            .rate_limiter(limiter)
            .aggregate_score(&model_id)
            .await
    } else {
        BoundedEvaluator::new(backend, metric, source, config.bounded_evaluator_config())
            .prompt(prompt)
            .rate_limiter(limiter)
            .aggregate_score(&model_id)
            .await
    };

    let json = serde_json::to_string_pretty(&result)?;
    match &args.output {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("failed to write result to {}", path.display()))?,
        None => println!("{json}"),
    }

    if let Some(failure) = &result.failure {
        eprintln!("evaluation failed: {}", failure.message);
        return Ok(ExitCode::from(EXIT_EVALUATION_FAILED));
    }
    eprintln!(
        "average {:.4} over {} records ({} skipped)",
        result.average,
        result.records.len(),
        result.skipped.len()
    );
    Ok(ExitCode::SUCCESS)
}

async fn validate_metric(args: &ValidateArgs) -> anyhow::Result<ExitCode> {
    let dataset = load_jsonl(&args.dataset.dataset, &args.dataset.output_field)?;
    let validator = MetricValidator::new().sample_size(args.samples);
    let report = validation_report(&args.metric, &dataset, &validator).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    eprintln!("{report}");
    if report.is_valid {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_METRIC_REJECTED))
    }
}
