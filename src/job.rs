//! Job dispatch: remote compilation and distributed execution
//!
//! Dispatch is a separate entry point from bootstrap; it only needs the
//! mounted share and the published host list to exist. Compile copies a local
//! source file into the share and runs the MPI compiler on the coordinator;
//! run launches a previously compiled artifact across the cluster through
//! `mpiexec` and the published host list.

use std::path::Path;

use tracing::info;

use crate::error::Error;
use crate::vm::VmDriver;
use crate::Result;

/// Compile a local source file on the coordinator.
///
/// The artifact lands on the share under the source file's base name with the
/// extension stripped; that name is returned for the subsequent run step.
/// Fails with [`SourceNotFound`](Error::SourceNotFound) before any remote
/// call when the local path does not exist, and with
/// [`Compile`](Error::Compile) carrying the toolchain diagnostics on a
/// non-zero compile.
pub async fn compile(driver: &dyn VmDriver, source: &Path) -> Result<String> {
    if !tokio::fs::try_exists(source).await.unwrap_or(false) {
        return Err(Error::SourceNotFound(source.to_path_buf()));
    }

    let file_name = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::SourceNotFound(source.to_path_buf()))?;
    let artifact = source
        .file_stem()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::SourceNotFound(source.to_path_buf()))?
        .to_string();

    let remote_source = format!("{}/{}", crate::SHARE_DIR, file_name);
    let remote_artifact = format!("{}/{}", crate::SHARE_DIR, artifact);

    info!(source = %source.display(), "Transferring source to coordinator");
    driver
        .transfer(source, crate::COORDINATOR, &remote_source)
        .await?;

    info!(artifact = %artifact, "Compiling on coordinator");
    let output = driver
        .execute(
            crate::COORDINATOR,
            &format!("mpicc -o {} {}", remote_artifact, remote_source),
        )
        .await?;

    if !output.success() {
        return Err(Error::Compile {
            diagnostics: output.stderr.trim().to_string(),
        });
    }

    info!(artifact = %artifact, "Compilation succeeded");
    Ok(artifact)
}

/// Run a compiled artifact across the cluster.
///
/// `processes` overrides the process count; when `None`, the runtime infers
/// it from the host list. Returns the program's stdout. Fails with
/// [`ArtifactNotFound`](Error::ArtifactNotFound) when the artifact is not on
/// the coordinator's share.
pub async fn run(
    driver: &dyn VmDriver,
    artifact: &str,
    processes: Option<u32>,
) -> Result<String> {
    let remote_artifact = format!("{}/{}", crate::SHARE_DIR, artifact);

    let probe = driver
        .execute(crate::COORDINATOR, &format!("test -f {}", remote_artifact))
        .await?;
    if !probe.success() {
        return Err(Error::ArtifactNotFound(artifact.to_string()));
    }

    let command = mpiexec_command(artifact, processes);
    info!(artifact = %artifact, processes = ?processes, "Launching distributed job");

    let output = driver.execute(crate::COORDINATOR, &command).await?;
    if !output.success() {
        return Err(Error::RemoteExec {
            node: crate::COORDINATOR.to_string(),
            command,
            status: output.status,
            stderr: output.stderr.trim().to_string(),
        });
    }

    Ok(output.stdout)
}

/// Build the `mpiexec` invocation for an artifact.
///
/// `-n` is passed only when a process count was explicitly supplied.
fn mpiexec_command(artifact: &str, processes: Option<u32>) -> String {
    let mut command = format!("mpiexec -hostfile {}", crate::hostfile_path());
    if let Some(n) = processes {
        command.push_str(&format!(" -n {}", n));
    }
    command.push_str(&format!(" {}/{}", crate::SHARE_DIR, artifact));
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mpiexec_with_explicit_process_count() {
        assert_eq!(
            mpiexec_command("job", Some(4)),
            "mpiexec -hostfile /home/ubuntu/cloud/mpi_hosts -n 4 /home/ubuntu/cloud/job"
        );
    }

    #[test]
    fn test_mpiexec_without_process_count_lets_runtime_infer() {
        let command = mpiexec_command("job", None);
        assert_eq!(
            command,
            "mpiexec -hostfile /home/ubuntu/cloud/mpi_hosts /home/ubuntu/cloud/job"
        );
        assert!(!command.contains(" -n "));
    }
}
