//! Checked remote execution helpers
//!
//! Bootstrap stages issue their remote commands through [`exec_checked`],
//! which retries transient failures with backoff and turns a persistent
//! non-zero exit into a [`RemoteExec`](crate::Error::RemoteExec) error
//! carrying the node, command, exit status and stderr.
//!
//! [`append_line_if_absent`] is the idempotent upsert used for every table
//! mutation during bootstrap (`/etc/hosts`, `authorized_keys`, `/etc/exports`,
//! `/etc/fstab`): it reads the current content and only appends lines that
//! are not already present, so re-running bootstrap never duplicates entries.

use crate::error::Error;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::vm::{ExecOutput, VmDriver};
use crate::Result;

/// Run a remote command, retrying transient failures, and require exit zero.
///
/// Both transport failures and non-zero exits are retried; the last error is
/// surfaced once the retry budget is exhausted.
pub async fn exec_checked(
    driver: &dyn VmDriver,
    node: &str,
    command: &str,
) -> Result<ExecOutput> {
    let config = RetryConfig::default();
    let op = format!("{}: {}", node, command);

    retry_with_backoff(&config, &op, || async {
        let output = driver.execute(node, command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(Error::RemoteExec {
                node: node.to_string(),
                command: command.to_string(),
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            })
        }
    })
    .await
}

/// Append `line` to `path` on `node` unless the file already contains it.
///
/// Returns `true` if the line was appended, `false` if it was already
/// present. `sudo` controls whether the append runs as root (the read never
/// needs to; the tables we touch are world-readable).
pub async fn append_line_if_absent(
    driver: &dyn VmDriver,
    node: &str,
    path: &str,
    line: &str,
    sudo: bool,
) -> Result<bool> {
    let current = read_remote_file(driver, node, path).await?;
    if current.lines().any(|l| l.trim() == line) {
        return Ok(false);
    }

    let command = if sudo {
        format!("sudo bash -c \"echo '{}' >> {}\"", line, path)
    } else {
        format!("echo '{}' >> {}", line, path)
    };
    exec_checked(driver, node, &command).await?;
    Ok(true)
}

/// Read a remote file's content, treating a missing file as empty
pub async fn read_remote_file(driver: &dyn VmDriver, node: &str, path: &str) -> Result<String> {
    let command = format!("cat {} 2>/dev/null || true", path);
    let output = exec_checked(driver, node, &command).await?;
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    use crate::vm::{Instance, LaunchSpec};

    /// Minimal driver: canned file content, records executed commands
    struct ScriptedDriver {
        file_content: String,
        commands: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VmDriver for ScriptedDriver {
        async fn launch(&self, _name: &str, _spec: &LaunchSpec<'_>) -> Result<()> {
            unreachable!("launch not used in these tests")
        }

        async fn list_instances(&self) -> Result<Vec<Instance>> {
            Ok(vec![])
        }

        async fn execute(&self, _node: &str, command: &str) -> Result<ExecOutput> {
            self.commands.lock().unwrap().push(command.to_string());
            if command.starts_with("cat ") {
                Ok(ExecOutput::ok(self.file_content.clone()))
            } else {
                Ok(ExecOutput::ok(""))
            }
        }

        async fn transfer(&self, _local: &Path, _node: &str, _remote: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_append_skips_present_line() {
        let driver = ScriptedDriver {
            file_content: "127.0.0.1 localhost\n10.0.0.2 worker1\n".to_string(),
            commands: Mutex::new(Vec::new()),
        };

        let appended =
            append_line_if_absent(&driver, "coordinator", "/etc/hosts", "10.0.0.2 worker1", true)
                .await
                .expect("should succeed");

        assert!(!appended);
        // Only the read happened, no append command was issued
        let commands = driver.commands.lock().unwrap();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].starts_with("cat /etc/hosts"));
    }

    #[tokio::test]
    async fn test_append_adds_missing_line() {
        let driver = ScriptedDriver {
            file_content: "127.0.0.1 localhost\n".to_string(),
            commands: Mutex::new(Vec::new()),
        };

        let appended =
            append_line_if_absent(&driver, "coordinator", "/etc/hosts", "10.0.0.2 worker1", true)
                .await
                .expect("should succeed");

        assert!(appended);
        let commands = driver.commands.lock().unwrap();
        assert_eq!(commands.len(), 2);
        assert!(commands[1].contains("sudo"));
        assert!(commands[1].contains("echo '10.0.0.2 worker1' >> /etc/hosts"));
    }

    #[tokio::test]
    async fn test_append_without_sudo() {
        let driver = ScriptedDriver {
            file_content: String::new(),
            commands: Mutex::new(Vec::new()),
        };

        append_line_if_absent(
            &driver,
            "worker1",
            "/home/ubuntu/.ssh/authorized_keys",
            "ssh-ed25519 AAAA coordinator",
            false,
        )
        .await
        .expect("should succeed");

        let commands = driver.commands.lock().unwrap();
        assert!(!commands[1].contains("sudo"));
    }
}
