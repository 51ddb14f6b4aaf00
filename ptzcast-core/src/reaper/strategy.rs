//! Holder discovery strategies
//!
//! Each strategy asks a different host tool who holds a device or port.
//! They are ordered from most to least precise; the reaper stops at the
//! first one that finds anything.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

use super::ResourceId;
use crate::error::Result;
use crate::exec::CommandRunner;

/// A way of finding the processes that hold a resource
#[async_trait]
pub trait DiscoveryStrategy: Send + Sync {
    /// Short name for logs and reports
    fn name(&self) -> &'static str;

    /// Pids currently holding `resource`. Empty if none or not applicable.
    async fn discover(&self, resource: &ResourceId) -> Result<Vec<u32>>;
}

/// Direct query with `fuser`
pub struct FuserStrategy {
    runner: Arc<dyn CommandRunner>,
}

impl FuserStrategy {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl DiscoveryStrategy for FuserStrategy {
    fn name(&self) -> &'static str {
        "fuser"
    }

    async fn discover(&self, resource: &ResourceId) -> Result<Vec<u32>> {
        let args = match resource {
            ResourceId::Device(path) => vec![path.display().to_string()],
            ResourceId::Port(port) => vec!["-n".to_string(), "tcp".to_string(), port.to_string()],
        };
        // fuser exits 1 when nothing holds the resource
        let output = self.runner.run("fuser", &args).await?;
        Ok(parse_fuser_pids(&output.stdout))
    }
}

/// Text scan of the process list for known consumer programs
pub struct ProcessScanStrategy {
    runner: Arc<dyn CommandRunner>,
    consumers: Vec<String>,
}

impl ProcessScanStrategy {
    pub fn new(runner: Arc<dyn CommandRunner>, consumers: Vec<String>) -> Self {
        Self { runner, consumers }
    }
}

#[async_trait]
impl DiscoveryStrategy for ProcessScanStrategy {
    fn name(&self) -> &'static str {
        "process-scan"
    }

    async fn discover(&self, resource: &ResourceId) -> Result<Vec<u32>> {
        let args = vec!["-eo".to_string(), "pid=,args=".to_string()];
        let output = self.runner.run("ps", &args).await?;
        Ok(scan_process_list(&output.stdout, &self.consumers, resource))
    }
}

/// Listening-socket table from `ss`
pub struct SocketListStrategy {
    runner: Arc<dyn CommandRunner>,
}

impl SocketListStrategy {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl DiscoveryStrategy for SocketListStrategy {
    fn name(&self) -> &'static str {
        "socket-list"
    }

    async fn discover(&self, resource: &ResourceId) -> Result<Vec<u32>> {
        let ResourceId::Port(port) = resource else {
            return Ok(Vec::new());
        };
        let args = vec!["-Htlnp".to_string()];
        let output = self.runner.run("ss", &args).await?;
        Ok(parse_ss_listeners(&output.stdout, *port))
    }
}

/// Pids from `fuser` stdout, e.g. `  1234m  5678`
pub fn parse_fuser_pids(stdout: &str) -> Vec<u32> {
    stdout
        .split_whitespace()
        .filter_map(|token| {
            let digits: String = token.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        })
        .collect()
}

/// Pids from `ps -eo pid=,args=` output whose command matches a consumer.
///
/// A consumer must also name the resource among its arguments: the device
/// path as a word or a `key=value` value, or the port number.
pub fn scan_process_list(stdout: &str, consumers: &[String], resource: &ResourceId) -> Vec<u32> {
    let own_pid = std::process::id();
    let mut pids = Vec::new();

    for line in stdout.lines() {
        let line = line.trim_start();
        let Some((pid, args)) = line.split_once(char::is_whitespace) else {
            continue;
        };
        let Ok(pid) = pid.parse::<u32>() else {
            continue;
        };
        if pid == own_pid {
            continue;
        }

        let Some(program) = args.split_whitespace().next() else {
            continue;
        };
        let program = program.rsplit('/').next().unwrap_or(program);
        if !consumers.iter().any(|c| c == program) {
            continue;
        }

        let matched = match resource {
            ResourceId::Device(path) => {
                let path = path.to_string_lossy();
                args.split(|c: char| c.is_whitespace() || c == '=')
                    .any(|t| t == &*path)
            }
            ResourceId::Port(port) => {
                let port = port.to_string();
                args.split(|c: char| !c.is_ascii_digit()).any(|t| t == port)
            }
        };
        if matched {
            trace!("process-scan matched {}: {}", pid, args);
            pids.push(pid);
        }
    }
    pids
}

/// Pids listening on `port` from `ss -Htlnp`, e.g.
/// `LISTEN 0 5 0.0.0.0:8081 0.0.0.0:* users:(("ffmpeg",pid=4242,fd=3))`
pub fn parse_ss_listeners(stdout: &str, port: u16) -> Vec<u32> {
    let suffix = format!(":{}", port);
    let mut pids = Vec::new();

    for line in stdout.lines() {
        let columns: Vec<&str> = line.split_whitespace().collect();
        let Some(local) = columns.get(3) else {
            continue;
        };
        if !local.ends_with(&suffix) {
            continue;
        }
        for part in line.split("pid=").skip(1) {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(pid) = digits.parse() {
                pids.push(pid);
            }
        }
    }
    pids
}
