//! Mock infrastructure for testing
//!
//! Stand-ins for the camera utility, process signalling, resource eviction
//! and the pipeline launcher, so tests never need real hardware.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::process::{Child, Command};

use ptzcast_core::error::{PtzError, Result};
use ptzcast_core::exec::{CommandOutput, CommandRunner};
use ptzcast_core::reaper::{
    DiscoveryStrategy, EvictionReport, ProcessSignaller, ResourceArbiter, ResourceId,
};
use ptzcast_core::supervisor::PipelineSpawner;

/// A simulated camera answering `v4l2-ctl` invocations
#[derive(Default)]
pub struct FakeCamera {
    values: Mutex<BTreeMap<String, i64>>,
    calls: Mutex<Vec<Vec<String>>>,
    /// Controls whose set reports a failure on stderr with exit status 0
    soft_failures: Mutex<HashSet<String>>,
    /// Controls whose set exits non-zero
    hard_failures: Mutex<HashSet<String>>,
}

impl FakeCamera {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_softly(&self, control: &str) {
        self.soft_failures.lock().insert(control.to_string());
    }

    pub fn fail_hard(&self, control: &str) {
        self.hard_failures.lock().insert(control.to_string());
    }

    pub fn value(&self, control: &str) -> Option<i64> {
        self.values.lock().get(control).copied()
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    /// `(name, value)` of every set, in call order
    pub fn sets(&self) -> Vec<(String, i64)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|args| args.iter().find_map(|a| a.strip_prefix("--set-ctrl=")))
            .filter_map(|spec| {
                let (name, value) = spec.split_once('=')?;
                Some((name.to_string(), value.parse().ok()?))
            })
            .collect()
    }

    pub fn set_names(&self) -> Vec<String> {
        self.sets().into_iter().map(|(name, _)| name).collect()
    }
}

#[async_trait]
impl CommandRunner for FakeCamera {
    async fn run(&self, _program: &str, args: &[String]) -> Result<CommandOutput> {
        self.calls.lock().push(args.to_vec());

        for arg in args {
            if let Some(spec) = arg.strip_prefix("--set-ctrl=") {
                let Some((name, value)) = spec.split_once('=') else {
                    return Ok(failure(1, "bad argument"));
                };
                if self.hard_failures.lock().contains(name) {
                    return Ok(failure(255, "VIDIOC_S_EXT_CTRLS: Input/output error"));
                }
                if self.soft_failures.lock().contains(name) {
                    return Ok(CommandOutput {
                        code: Some(0),
                        stdout: String::new(),
                        stderr: format!("{}: VIDIOC_S_EXT_CTRLS: failed: Invalid argument", name),
                    });
                }
                let value: i64 = value.parse().unwrap_or_default();
                self.values.lock().insert(name.to_string(), value);
                return Ok(CommandOutput::ok(""));
            }
            if let Some(name) = arg.strip_prefix("--get-ctrl=") {
                return Ok(match self.values.lock().get(name) {
                    Some(value) => CommandOutput::ok(format!("{}: {}\n", name, value)),
                    None => CommandOutput::ok(format!("{}: \n", name)),
                });
            }
            if arg == "--all" {
                let listing = self
                    .values
                    .lock()
                    .iter()
                    .map(|(k, v)| format!("{} : value={}\n", k, v))
                    .collect::<String>();
                return Ok(CommandOutput::ok(listing));
            }
        }
        Ok(CommandOutput::ok(""))
    }
}

fn failure(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// Runner returning canned output per program
#[derive(Default)]
pub struct CannedRunner {
    outputs: Mutex<BTreeMap<String, CommandOutput>>,
    /// Responses for an exact program and argument list, checked first
    exact: Mutex<BTreeMap<(String, Vec<String>), CommandOutput>>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl CannedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, program: &str, output: CommandOutput) {
        self.outputs.lock().insert(program.to_string(), output);
    }

    pub fn respond_to(&self, program: &str, args: &[&str], output: CommandOutput) {
        let args = args.iter().map(|a| a.to_string()).collect();
        self.exact
            .lock()
            .insert((program.to_string(), args), output);
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CommandRunner for CannedRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        self.calls.lock().push((program.to_string(), args.to_vec()));
        let key = (program.to_string(), args.to_vec());
        if let Some(output) = self.exact.lock().get(&key) {
            return Ok(output.clone());
        }
        self.outputs
            .lock()
            .get(program)
            .cloned()
            .ok_or_else(|| PtzError::external(program, "not installed"))
    }
}

/// Records signals instead of sending them
#[derive(Default)]
pub struct RecordingSignaller {
    pub terminated: Mutex<Vec<u32>>,
    pub killed: Mutex<Vec<u32>>,
    /// Pids that ignore SIGTERM
    stubborn: Mutex<HashSet<u32>>,
}

impl RecordingSignaller {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn ignore_term(&self, pid: u32) {
        self.stubborn.lock().insert(pid);
    }
}

impl ProcessSignaller for RecordingSignaller {
    fn terminate(&self, pid: u32) -> std::io::Result<()> {
        self.terminated.lock().push(pid);
        Ok(())
    }

    fn kill(&self, pid: u32) -> std::io::Result<()> {
        self.killed.lock().push(pid);
        Ok(())
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.stubborn.lock().contains(&pid) && !self.killed.lock().contains(&pid)
    }
}

/// Discovery strategy with a fixed answer
pub struct StaticStrategy {
    pub name: &'static str,
    pub pids: std::result::Result<Vec<u32>, String>,
}

impl StaticStrategy {
    pub fn finds(name: &'static str, pids: Vec<u32>) -> Self {
        Self {
            name,
            pids: Ok(pids),
        }
    }

    pub fn fails(name: &'static str) -> Self {
        Self {
            name,
            pids: Err("tool missing".to_string()),
        }
    }
}

#[async_trait]
impl DiscoveryStrategy for StaticStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn discover(&self, _resource: &ResourceId) -> Result<Vec<u32>> {
        self.pids
            .clone()
            .map_err(|e| PtzError::external(self.name, e))
    }
}

/// Arbiter that only records what it was asked to free
#[derive(Default)]
pub struct RecordingArbiter {
    freed: Mutex<Vec<ResourceId>>,
}

impl RecordingArbiter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn freed(&self) -> Vec<ResourceId> {
        self.freed.lock().clone()
    }
}

#[async_trait]
impl ResourceArbiter for RecordingArbiter {
    async fn free(&self, resource: &ResourceId) -> EvictionReport {
        self.freed.lock().push(resource.clone());
        EvictionReport {
            resource: resource.clone(),
            strategy: None,
            discovered: Vec::new(),
            terminated: Vec::new(),
            forced: Vec::new(),
        }
    }
}

/// Runs a shell script in place of the pipeline tool, recording the
/// arguments it would have received
pub struct ScriptSpawner {
    script: Mutex<String>,
    spawned: AtomicUsize,
    args: Mutex<Vec<Vec<String>>>,
}

impl ScriptSpawner {
    pub fn new(script: &str) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.to_string()),
            spawned: AtomicUsize::new(0),
            args: Mutex::new(Vec::new()),
        })
    }

    /// Long-running process that exits 0 on SIGINT
    pub fn long_running() -> Arc<Self> {
        Self::new("trap 'exit 0' INT; echo 'Setting pipeline to PLAYING ...'; while true; do sleep 0.05; done")
    }

    pub fn set_script(&self, script: &str) {
        *self.script.lock() = script.to_string();
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    pub fn last_args(&self) -> Option<Vec<String>> {
        self.args.lock().last().cloned()
    }
}

impl PipelineSpawner for ScriptSpawner {
    fn spawn(&self, _program: &str, args: &[String]) -> std::io::Result<Child> {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        self.args.lock().push(args.to_vec());
        let script = self.script.lock().clone();
        Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }
}

/// Spawner that always fails like a missing executable
pub struct MissingSpawner;

impl PipelineSpawner for MissingSpawner {
    fn spawn(&self, _program: &str, _args: &[String]) -> std::io::Result<Child> {
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "No such file or directory",
        ))
    }
}
