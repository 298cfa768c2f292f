//! Multipass driver
//!
//! Drives Canonical Multipass through its CLI: `multipass launch`,
//! `multipass list --format=json`, `multipass exec` and `multipass transfer`.
//! Remote commands run under `bash -c` on the instance so callers can use
//! shell redirection; each call is bounded by a configurable timeout.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::{ExecOutput, Instance, LaunchSpec, VmDriver, VmState};
use crate::error::Error;
use crate::Result;

/// Default timeout for a single remote command
const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for VM launches; image download on first use can be slow
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(600);

/// VM driver backed by the `multipass` CLI
#[derive(Debug, Clone)]
pub struct MultipassDriver {
    exec_timeout: Duration,
}

impl Default for MultipassDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipassDriver {
    /// Create a driver with the default per-command timeout
    pub fn new() -> Self {
        Self {
            exec_timeout: DEFAULT_EXEC_TIMEOUT,
        }
    }

    /// Override the per-command timeout
    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = timeout;
        self
    }

    /// Check that the `multipass` binary is on PATH
    pub async fn check_available() -> Result<()> {
        let result = Command::new("which")
            .arg("multipass")
            .output()
            .await
            .map_err(|e| Error::driver(format!("failed to run 'which': {}", e)))?;

        if result.status.success() {
            Ok(())
        } else {
            Err(Error::PrerequisiteNotFound {
                tool: "multipass".to_string(),
                hint: "Install Multipass: https://canonical.com/multipass/install".to_string(),
            })
        }
    }

    /// Run `multipass` with the given arguments and capture its output
    async fn multipass(&self, args: &[&str], timeout: Duration) -> Result<std::process::Output> {
        let output = tokio::time::timeout(timeout, Command::new("multipass").args(args).output())
            .await
            .map_err(|_| {
                Error::driver(format!(
                    "multipass {} timed out after {:?}",
                    args.join(" "),
                    timeout
                ))
            })?
            .map_err(|e| Error::driver(format!("failed to invoke multipass: {}", e)))?;
        Ok(output)
    }
}

#[async_trait]
impl VmDriver for MultipassDriver {
    async fn launch(&self, name: &str, spec: &LaunchSpec<'_>) -> Result<()> {
        let cpus = spec.cpus.to_string();
        let memory = format!("{}M", spec.memory_mb);
        let mut args = vec!["launch", "-n", name, "--cpus", &cpus, "--memory", &memory];

        let cloud_init;
        if let Some(profile) = spec.cloud_init {
            cloud_init = profile.display().to_string();
            args.extend(["--cloud-init", &cloud_init]);
        }

        let output = self.multipass(&args, LAUNCH_TIMEOUT).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            // Re-running bootstrap against a live cluster is supported; an
            // existing instance is not a failure, discovery validates it.
            if stderr.contains("already exists") {
                tracing::info!(node = %name, "Instance already exists, reusing");
                return Ok(());
            }
            return Err(Error::provision(name, stderr));
        }
        Ok(())
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let output = self
            .multipass(&["list", "--format=json"], self.exec_timeout)
            .await?;

        if !output.status.success() {
            return Err(Error::driver(format!(
                "multipass list failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_list_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn execute(&self, node: &str, command: &str) -> Result<ExecOutput> {
        let args = ["exec", node, "--", "bash", "-c", command];
        let output = tokio::time::timeout(
            self.exec_timeout,
            Command::new("multipass").args(args).output(),
        )
        .await
        .map_err(|_| Error::Timeout {
            node: node.to_string(),
            command: command.to_string(),
        })?
        .map_err(|e| Error::driver(format!("failed to invoke multipass exec: {}", e)))?;

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status.code().unwrap_or(-1),
        })
    }

    async fn transfer(&self, local: &Path, node: &str, remote: &str) -> Result<()> {
        let source = local.display().to_string();
        let dest = format!("{}:{}", node, remote);
        let output = self
            .multipass(&["transfer", &source, &dest], self.exec_timeout)
            .await?;

        if !output.status.success() {
            return Err(Error::driver(format!(
                "multipass transfer {} -> {} failed: {}",
                source,
                dest,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// One instance entry in `multipass list --format=json`
#[derive(Debug, Deserialize)]
struct ListedInstance {
    name: String,
    state: String,
    #[serde(default)]
    ipv4: Vec<String>,
}

/// Top-level shape of `multipass list --format=json`
#[derive(Debug, Deserialize)]
struct ListOutput {
    list: Vec<ListedInstance>,
}

/// Parse the JSON document produced by `multipass list --format=json`
fn parse_list_output(json: &str) -> Result<Vec<Instance>> {
    let parsed: ListOutput = serde_json::from_str(json)
        .map_err(|e| Error::driver(format!("unparseable multipass list output: {}", e)))?;

    Ok(parsed
        .list
        .into_iter()
        .map(|i| Instance {
            name: i.name,
            state: VmState::from(i.state.as_str()),
            addresses: i.ipv4,
        })
        .collect())
}
