#[path = "batch-eval/app.rs"]
mod app;
#[path = "batch-eval/args.rs"]
mod args;
#[path = "batch-eval/backend.rs"]
mod backend;
#[path = "batch-eval/dataset.rs"]
mod dataset;
#[path = "batch-eval/logging.rs"]
mod logging;
#[path = "batch-eval/metric.rs"]
mod metric;

use std::process::ExitCode;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    app::run().await
}
