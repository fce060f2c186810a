//! Helm CLI wrapper.
//!
//! Installation shells out to the `helm` binary rather than linking a Helm
//! SDK; the binary must be on PATH. Failures are classified by matching
//! stderr against a small catalogue of known patterns.

use std::process::Stdio;
use std::time::Duration;

use k0rdent_core::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

const HELM_TIMEOUT: Duration = Duration::from_secs(6 * 60);

#[derive(Debug)]
pub struct HelmOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

/// One revision from `helm history -o json`.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    pub revision: u32,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub chart: String,
    #[serde(default)]
    pub description: String,
}

/// When the latest revision is stuck in a `pending-*` state, pick the most
/// recent revision that can be rolled back to.
pub fn pending_rollback_target(history: &[HistoryEntry]) -> Option<u32> {
    let latest = history.iter().max_by_key(|e| e.revision)?;
    if !latest.status.starts_with("pending-") {
        return None;
    }
    history
        .iter()
        .filter(|e| e.revision < latest.revision)
        .filter(|e| e.status == "deployed" || e.status == "superseded")
        .map(|e| e.revision)
        .max()
}

/// Map helm stderr onto the error taxonomy with a human sentence.
pub fn classify_helm_error(stderr: &str) -> Error {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("another operation (install/upgrade/rollback) is in progress") {
        return Error::Conflict(
            "another Helm operation is in progress for this release; retry shortly".into(),
        );
    }
    if lower.contains("cannot re-use a name that is still in use") {
        return Error::Conflict("a Helm release with this name already exists".into());
    }
    if lower.contains("chart not found")
        || lower.contains("manifest unknown")
        || lower.contains("failed to download")
    {
        return Error::NotFound("the requested chart was not found in the catalog registry".into());
    }
    if lower.contains("authentication failed")
        || lower.contains("unauthorized")
        || lower.contains("401")
    {
        return Error::Forbidden("registry authentication failed while pulling the chart".into());
    }
    if lower.contains("connection refused")
        || lower.contains("no such host")
        || lower.contains("i/o timeout")
    {
        return Error::Unavailable("the chart registry is unreachable".into());
    }
    if lower.contains("admission webhook") || lower.contains("denied the request") {
        return Error::InvalidParams(format!(
            "a validation webhook rejected the install: {}",
            first_line(stderr)
        ));
    }
    if lower.contains("failed pre-install") || lower.contains("verification") {
        return Error::Internal(format!(
            "the chart's verification job failed: {}",
            first_line(stderr)
        ));
    }
    if lower.contains("failed to delete hook") || lower.contains("warning: hook") {
        return Error::Internal(format!("a chart hook could not be cleaned up: {}", first_line(stderr)));
    }
    Error::Internal(format!("helm failed: {}", first_line(stderr)))
}

fn first_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no output")
}

fn release_missing(stderr: &str) -> bool {
    stderr.to_ascii_lowercase().contains("release: not found")
}

pub struct HelmCli {
    binary: String,
}

impl HelmCli {
    pub fn new() -> Self {
        Self {
            binary: "helm".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<HelmOutput> {
        debug!(args = ?args, "running helm");
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| Error::Unavailable(format!("failed to run helm (is it on PATH?): {e}")))?;

        if let Some(payload) = stdin {
            let mut handle = child
                .stdin
                .take()
                .ok_or_else(|| Error::internal("helm stdin unavailable"))?;
            handle
                .write_all(payload)
                .await
                .map_err(|e| Error::internal(format!("failed to write helm stdin: {e}")))?;
            drop(handle);
        }

        let output = tokio::time::timeout(HELM_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| Error::Timeout("helm did not finish in time".into()))?
            .map_err(|e| Error::internal(format!("helm wait failed: {e}")))?;

        Ok(HelmOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
        })
    }

    /// Release history, oldest first. A release that does not exist yields an
    /// empty history rather than an error.
    pub async fn history(&self, release: &str, namespace: &str) -> Result<Vec<HistoryEntry>> {
        let output = self
            .run(
                &["history", release, "--namespace", namespace, "--output", "json", "--max", "50"],
                None,
            )
            .await?;
        if !output.success {
            if release_missing(&output.stderr) {
                return Ok(Vec::new());
            }
            return Err(classify_helm_error(&output.stderr));
        }
        serde_json::from_str(&output.stdout)
            .map_err(|e| Error::internal(format!("unparsable helm history: {e}")))
    }

    pub async fn rollback(&self, release: &str, revision: u32, namespace: &str) -> Result<()> {
        let revision = revision.to_string();
        let output = self
            .run(
                &["rollback", release, &revision, "--namespace", namespace, "--wait"],
                None,
            )
            .await?;
        if !output.success {
            return Err(classify_helm_error(&output.stderr));
        }
        Ok(())
    }

    /// `helm upgrade --install` with the values document on stdin.
    pub async fn upgrade_install(
        &self,
        release: &str,
        chart_ref: &str,
        namespace: &str,
        values: &Value,
    ) -> Result<()> {
        let payload = serde_json::to_vec(values)
            .map_err(|e| Error::internal(format!("values serialization failed: {e}")))?;
        let output = self
            .run(
                &[
                    "upgrade",
                    "--install",
                    release,
                    chart_ref,
                    "--namespace",
                    namespace,
                    "--wait",
                    "--timeout",
                    "5m",
                    "--atomic",
                    "--values",
                    "-",
                ],
                Some(&payload),
            )
            .await?;
        if !output.success {
            return Err(classify_helm_error(&output.stderr));
        }
        Ok(())
    }

    pub async fn status(&self, release: &str, namespace: &str) -> Result<Value> {
        let output = self
            .run(
                &["status", release, "--namespace", namespace, "--output", "json"],
                None,
            )
            .await?;
        if !output.success {
            return Err(classify_helm_error(&output.stderr));
        }
        serde_json::from_str(&output.stdout)
            .map_err(|e| Error::internal(format!("unparsable helm status: {e}")))
    }

    pub async fn get_manifest(&self, release: &str, namespace: &str) -> Result<String> {
        let output = self
            .run(&["get", "manifest", release, "--namespace", namespace], None)
            .await?;
        if !output.success {
            return Err(classify_helm_error(&output.stderr));
        }
        Ok(output.stdout)
    }

    /// Uninstall a release. Returns false when the release did not exist.
    pub async fn uninstall(&self, release: &str, namespace: &str) -> Result<bool> {
        let output = self
            .run(&["uninstall", release, "--namespace", namespace, "--wait"], None)
            .await?;
        if !output.success {
            if release_missing(&output.stderr) {
                return Ok(false);
            }
            return Err(classify_helm_error(&output.stderr));
        }
        Ok(true)
    }
}

impl Default for HelmCli {
    fn default() -> Self {
        Self::new()
    }
}
