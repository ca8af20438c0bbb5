use std::sync::Arc;

use anyhow::{bail, Context};
use batch_eval::dataset::StandardizedDataset;
use batch_eval::metric::{builtin_metric, Metric, MetricManifest, BUILTIN_METRICS};
use batch_eval::validator::{MetricValidator, ValidationReport};

use crate::args::MetricArgs;

enum MetricSource {
    Builtin(Arc<dyn Metric>),
    Plugin(MetricManifest),
}

fn resolve(args: &MetricArgs) -> anyhow::Result<MetricSource> {
    if let Some(path) = &args.metric_manifest {
        let manifest = MetricManifest::load(path)
            .with_context(|| format!("failed to load metric manifest {}", path.display()))?;
        return Ok(MetricSource::Plugin(manifest));
    }
    let name = args.metric.as_deref().unwrap_or("exact_match");
    match builtin_metric(name) {
        Some(metric) => Ok(MetricSource::Builtin(metric)),
        None => bail!(
            "unknown metric '{name}'; built-in metrics are {}",
            BUILTIN_METRICS.join(", ")
        ),
    }
}

/// Metric for an evaluation run. Plugins must pass validation first.
pub async fn metric_for_run(
    args: &MetricArgs,
    dataset: &StandardizedDataset,
) -> anyhow::Result<Arc<dyn Metric>> {
    match resolve(args)? {
        MetricSource::Builtin(metric) => Ok(metric),
        MetricSource::Plugin(manifest) => {
            match MetricValidator::new().validate_manifest(manifest, dataset).await {
                Ok((metric, report)) => {
                    for warning in &report.warnings {
                        log::warn!("metric {}: {warning}", report.metric_name);
                    }
                    let metric: Arc<dyn Metric> = Arc::new(metric);
                    Ok(metric)
                }
                Err(report) => bail!("{report}"),
            }
        }
    }
}

pub async fn validation_report(
    args: &MetricArgs,
    dataset: &StandardizedDataset,
    validator: &MetricValidator,
) -> anyhow::Result<ValidationReport> {
    let report = match resolve(args)? {
        MetricSource::Builtin(metric) => validator.validate(metric.as_ref(), dataset).await,
        MetricSource::Plugin(manifest) => match validator.validate_manifest(manifest, dataset).await
        {
            Ok((_, report)) | Err(report) => report,
        },
    };
    Ok(report)
}
