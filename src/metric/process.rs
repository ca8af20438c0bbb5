use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::MetricError;

use super::manifest::MetricManifest;
use super::traits::{ensure_finite, mean_of_apply, Metric};

const STDERR_SNIPPET_LEN: usize = 500;

#[derive(Serialize, Debug)]
#[serde(tag = "op", rename_all = "snake_case")]
enum PluginRequest<'a> {
    Describe,
    Apply {
        predicted: &'a str,
        expected: &'a str,
    },
    BatchApply {
        predicted: &'a [String],
        expected: &'a [String],
    },
}

#[derive(Deserialize, Debug)]
struct DescribeReply {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    capabilities: Vec<String>,
}

#[derive(Deserialize, Debug)]
struct ScoreReply {
    #[serde(default)]
    score: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Metric implemented by an external program.
///
/// Every request runs in a fresh child process: one JSON object on stdin,
/// one JSON object on the last non-empty stdout line. The child gets a
/// cleared environment (plus `PATH` and the manifest's allow-list) and is
/// killed if it outlives the timeout.
#[derive(Debug)]
pub struct ProcessMetric {
    manifest: MetricManifest,
    name: String,
    batch_capable: bool,
}

impl ProcessMetric {
    /// Starts the plugin once to read its capabilities.
    ///
    /// Fails with [`MetricError::NotScorable`] unless `apply` is advertised.
    pub async fn load(manifest: MetricManifest) -> Result<Self, MetricError> {
        let reply: DescribeReply = call(&manifest, &PluginRequest::Describe).await?;
        if !reply.capabilities.iter().any(|c| c == "apply") {
            return Err(MetricError::NotScorable(format!(
                "plugin '{}' does not advertise the 'apply' capability",
                manifest.name
            )));
        }
        let name = reply.name.unwrap_or_else(|| manifest.name.clone());
        let batch_capable = reply.capabilities.iter().any(|c| c == "batch_apply");
        log::debug!("loaded metric plugin {name} (batch_apply: {batch_capable})");
        Ok(Self {
            manifest,
            name,
            batch_capable,
        })
    }

    pub fn manifest(&self) -> &MetricManifest {
        &self.manifest
    }
}

#[async_trait]
impl Metric for ProcessMetric {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, predicted: &str, expected: &str) -> Result<f32, MetricError> {
        let reply: ScoreReply = call(
            &self.manifest,
            &PluginRequest::Apply {
                predicted,
                expected,
            },
        )
        .await?;
        score_from(reply)
    }

    async fn batch_apply(
        &self,
        predicted: &[String],
        expected: &[String],
    ) -> Result<f32, MetricError> {
        if !self.batch_capable {
            return mean_of_apply(self, predicted, expected).await;
        }
        let reply: ScoreReply = call(
            &self.manifest,
            &PluginRequest::BatchApply {
                predicted,
                expected,
            },
        )
        .await?;
        score_from(reply)
    }
}

fn score_from(reply: ScoreReply) -> Result<f32, MetricError> {
    if let Some(error) = reply.error {
        return Err(MetricError::Execution(error));
    }
    let value = reply
        .score
        .ok_or_else(|| MetricError::Protocol("reply has neither 'score' nor 'error'".to_string()))?;
    let score = value
        .as_f64()
        .ok_or_else(|| MetricError::NonNumeric(value.to_string()))?;
    ensure_finite(score as f32)
}

async fn call<R: DeserializeOwned>(
    manifest: &MetricManifest,
    request: &PluginRequest<'_>,
) -> Result<R, MetricError> {
    let mut command = Command::new(&manifest.command);
    command
        .args(&manifest.args)
        .env_clear()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for var in std::iter::once("PATH").chain(manifest.env.iter().map(String::as_str)) {
        if let Ok(value) = std::env::var(var) {
            command.env(var, value);
        }
    }
    if let Some(dir) = &manifest.working_dir {
        command.current_dir(dir);
    }

    let mut child = command.spawn()?;
    let mut payload = serde_json::to_vec(request)?;
    payload.push(b'\n');
    let stdin = child.stdin.take();

    // The deadline covers the request write as well as the wait: a plugin
    // that never reads stdin blocks the write once the pipe buffer is full.
    let exchange = async move {
        if let Some(mut stdin) = stdin {
            match stdin.write_all(&payload).await {
                Ok(()) => {}
                // The plugin exited without reading; its status says why.
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
                Err(e) => {
                    return Err(MetricError::Protocol(format!(
                        "failed to write request: {e}"
                    )))
                }
            }
            // Closing stdin signals end of request.
            drop(stdin);
        }
        child
            .wait_with_output()
            .await
            .map_err(|e| MetricError::Execution(format!("failed to wait for plugin: {e}")))
    };

    // On timeout the exchange is dropped with the child, and `kill_on_drop`
    // reaps it.
    let output = timeout(Duration::from_millis(manifest.timeout_ms), exchange)
        .await
        .map_err(|_| MetricError::Timeout(manifest.timeout_ms))??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let snippet: String = stderr.chars().take(STDERR_SNIPPET_LEN).collect();
        return Err(MetricError::Execution(format!(
            "plugin '{}' exited with {}: {}",
            manifest.name,
            output.status,
            snippet.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| MetricError::Protocol("plugin wrote nothing to stdout".to_string()))?;
    Ok(serde_json::from_str(line.trim())?)
}
