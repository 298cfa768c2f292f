//! Simulated VM collaborator for integration tests
//!
//! The fake driver keeps an in-memory file store per node and interprets the
//! small command vocabulary the orchestrator actually emits (`cat`, guarded
//! appends, `printf` overwrites, `test -f`, `ssh-keygen`, the guarded mount).
//! That makes the idempotence laws directly observable: re-running a phase
//! against the same driver must leave every file unchanged.
//!
//! Failure injection and canned responses let individual tests simulate a
//! failing launch, a missing node, or a broken pairwise connection.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use stratus::vm::{ExecOutput, Instance, LaunchSpec, VmDriver, VmState};
use stratus::{Error, Result};

/// One recorded collaborator call
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Launch { name: String },
    List,
    Exec { node: String, command: String },
    Transfer { node: String, remote: String },
}

#[derive(Default)]
struct State {
    instances: Vec<Instance>,
    files: HashMap<(String, String), String>,
    mounted: HashSet<(String, String)>,
    calls: Vec<Call>,
    launch_failures: HashSet<String>,
    omit_from_list: HashSet<String>,
    exec_failures: Vec<(String, String, String)>,
    responses: Vec<(String, String, ExecOutput)>,
}

/// Simulated VM collaborator with an in-memory per-node filesystem
#[derive(Default)]
pub struct FakeDriver {
    state: Mutex<State>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make launching the named instance fail
    pub fn fail_launch(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .launch_failures
            .insert(name.to_string());
    }

    /// Hide the named instance from list_instances even after a launch
    pub fn omit_from_list(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .omit_from_list
            .insert(name.to_string());
    }

    /// Make any command containing `fragment` fail on `node` with `stderr`
    pub fn fail_exec(&self, node: &str, fragment: &str, stderr: &str) {
        self.state.lock().unwrap().exec_failures.push((
            node.to_string(),
            fragment.to_string(),
            stderr.to_string(),
        ));
    }

    /// Respond to commands containing `fragment` on `node` with `output`
    pub fn on_exec(&self, node: &str, fragment: &str, output: ExecOutput) {
        self.state
            .lock()
            .unwrap()
            .responses
            .push((node.to_string(), fragment.to_string(), output));
    }

    /// Pre-create a file on a node
    pub fn seed_file(&self, node: &str, path: &str, content: &str) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert((node.to_string(), path.to_string()), content.to_string());
    }

    /// Content of a file on a node, if it exists
    pub fn file(&self, node: &str, path: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(&(node.to_string(), path.to_string()))
            .cloned()
    }

    /// Whether a directory is mounted on a node
    pub fn is_mounted(&self, node: &str, dir: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .mounted
            .contains(&(node.to_string(), dir.to_string()))
    }

    /// All recorded calls, in order
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// All recorded remote commands as (node, command), in order
    pub fn exec_calls(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Exec { node, command } => Some((node, command)),
                _ => None,
            })
            .collect()
    }

    /// Number of recorded remote commands containing `fragment`
    pub fn count_execs_containing(&self, fragment: &str) -> usize {
        self.exec_calls()
            .iter()
            .filter(|(_, c)| c.contains(fragment))
            .count()
    }

    /// All recorded transfers as (node, remote path)
    pub fn transfers(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Transfer { node, remote } => Some((node, remote)),
                _ => None,
            })
            .collect()
    }

    /// Interpret the orchestrator's command vocabulary against the file store
    fn interpret(state: &mut State, node: &str, command: &str) -> ExecOutput {
        let key = |path: &str| (node.to_string(), path.to_string());

        if let Some(rest) = command.strip_prefix("test -f ") {
            let path = rest.trim();
            let status = if state.files.contains_key(&key(path)) { 0 } else { 1 };
            return ExecOutput {
                stdout: String::new(),
                stderr: String::new(),
                status,
            };
        }

        if let Some(rest) = command.strip_prefix("cat ") {
            let path = rest.split_whitespace().next().unwrap_or("");
            let content = state.files.get(&key(path)).cloned().unwrap_or_default();
            return ExecOutput::ok(content);
        }

        if command.contains("ssh-keygen") {
            let path = command
                .split(" -f ")
                .nth(1)
                .and_then(|rest| rest.split_whitespace().next())
                .expect("ssh-keygen command should carry -f <path>");
            state.files.insert(key(path), "PRIVATE KEY".to_string());
            state.files.insert(
                key(&format!("{}.pub", path)),
                format!("ssh-ed25519 FAKEKEY_{} {}", node, node),
            );
            return ExecOutput::ok("");
        }

        // Guarded append: echo '<line>' >> <path>, optionally sudo-wrapped
        if let Some(echo_at) = command.find("echo '") {
            if let Some(close_at) = command.find("' >> ") {
                let line = &command[echo_at + "echo '".len()..close_at];
                let path = command[close_at + "' >> ".len()..]
                    .trim_end_matches('"')
                    .trim();
                let entry = state.files.entry(key(path)).or_default();
                entry.push_str(line);
                entry.push('\n');
                return ExecOutput::ok("");
            }
        }

        // Overwrite: printf '%s' '<content>' > <path>
        if let Some(rest) = command.strip_prefix("printf '%s' '") {
            if let Some(close_at) = rest.find("' > ") {
                let content = &rest[..close_at];
                let path = rest[close_at + "' > ".len()..].trim();
                state.files.insert(key(path), content.to_string());
                return ExecOutput::ok("");
            }
        }

        if command.starts_with("mountpoint -q ") {
            let dir = command
                .split_whitespace()
                .nth(2)
                .expect("mount command should name a directory");
            state.mounted.insert((node.to_string(), dir.to_string()));
            return ExecOutput::ok("");
        }

        // mkdir -p, exportfs, service restart, ssh no-ops: succeed silently
        ExecOutput::ok("")
    }
}

#[async_trait]
impl VmDriver for FakeDriver {
    async fn launch(&self, name: &str, _spec: &LaunchSpec<'_>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Launch {
            name: name.to_string(),
        });

        if state.launch_failures.contains(name) {
            return Err(Error::provision(name, "launch failed: exit status 1"));
        }

        if !state.instances.iter().any(|i| i.name == name) {
            let index = state.instances.len();
            state.instances.push(Instance {
                name: name.to_string(),
                state: VmState::Running,
                addresses: vec![format!("10.77.0.{}", index + 2)],
            });
        }
        Ok(())
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::List);
        let omitted = state.omit_from_list.clone();
        Ok(state
            .instances
            .iter()
            .filter(|i| !omitted.contains(&i.name))
            .cloned()
            .collect())
    }

    async fn execute(&self, node: &str, command: &str) -> Result<ExecOutput> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Exec {
            node: node.to_string(),
            command: command.to_string(),
        });

        if let Some((_, _, stderr)) = state
            .exec_failures
            .iter()
            .find(|(n, fragment, _)| n == node && command.contains(fragment))
        {
            return Ok(ExecOutput {
                stdout: String::new(),
                stderr: stderr.clone(),
                status: 1,
            });
        }

        if let Some((_, _, output)) = state
            .responses
            .iter()
            .find(|(n, fragment, _)| n == node && command.contains(fragment))
        {
            return Ok(output.clone());
        }

        Ok(Self::interpret(&mut state, node, command))
    }

    async fn transfer(&self, _local: &Path, node: &str, remote: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Transfer {
            node: node.to_string(),
            remote: remote.to_string(),
        });
        state.files.insert(
            (node.to_string(), remote.to_string()),
            "TRANSFERRED".to_string(),
        );
        Ok(())
    }
}
