//! Resource eviction
//!
//! Frees the camera device or a TCP port by terminating whatever process
//! currently holds it. Eviction is advisory: every failure is logged and
//! swallowed, and nothing confirms the resource is actually free afterwards.
//!
//! The supervisor only sees [`ResourceArbiter`], so a future implementation
//! backed by a real OS-level lock can replace [`ProcessReaper`].

mod signal;
mod strategy;

pub use signal::{LibcSignaller, ProcessSignaller, interrupt};
pub use strategy::{
    DiscoveryStrategy, FuserStrategy, ProcessScanStrategy, SocketListStrategy, parse_fuser_pids,
    parse_ss_listeners, scan_process_list,
};

use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ReaperSettings;
use crate::exec::CommandRunner;

/// A resource a single consumer may hold
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum ResourceId {
    /// A device node such as `/dev/video0`
    Device(PathBuf),
    /// A TCP port
    Port(u16),
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Device(path) => write!(f, "{}", path.display()),
            Self::Port(port) => write!(f, "tcp:{}", port),
        }
    }
}

/// What an eviction attempt did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvictionReport {
    /// Resource that was freed
    pub resource: ResourceId,
    /// Strategy that found the holders, if any did
    pub strategy: Option<&'static str>,
    /// Holder pids found
    pub discovered: Vec<u32>,
    /// Pids that accepted SIGTERM
    pub terminated: Vec<u32>,
    /// Pids still alive after the grace period and sent SIGKILL
    pub forced: Vec<u32>,
}

impl EvictionReport {
    fn empty(resource: &ResourceId) -> Self {
        Self {
            resource: resource.clone(),
            strategy: None,
            discovered: Vec::new(),
            terminated: Vec::new(),
            forced: Vec::new(),
        }
    }
}

/// Grants exclusive use of a resource to the caller
#[async_trait]
pub trait ResourceArbiter: Send + Sync {
    /// Make `resource` available. Best effort; never fails.
    async fn free(&self, resource: &ResourceId) -> EvictionReport;
}

/// Evicts holders by discovering their pids and signalling them
pub struct ProcessReaper {
    strategies: Vec<Box<dyn DiscoveryStrategy>>,
    signaller: Arc<dyn ProcessSignaller>,
    grace: Duration,
}

impl ProcessReaper {
    /// A reaper with no discovery strategies
    pub fn new(signaller: Arc<dyn ProcessSignaller>, grace: Duration) -> Self {
        Self {
            strategies: Vec::new(),
            signaller,
            grace,
        }
    }

    /// The standard strategy chain: fuser, process scan, socket listing
    pub fn system(runner: Arc<dyn CommandRunner>, settings: &ReaperSettings) -> Self {
        Self::new(Arc::new(LibcSignaller), settings.grace())
            .with_strategy(FuserStrategy::new(runner.clone()))
            .with_strategy(ProcessScanStrategy::new(
                runner.clone(),
                settings.consumers.clone(),
            ))
            .with_strategy(SocketListStrategy::new(runner))
    }

    /// Replace the signaller
    pub fn with_signaller(mut self, signaller: Arc<dyn ProcessSignaller>) -> Self {
        self.signaller = signaller;
        self
    }

    /// Append a strategy; strategies run in insertion order
    pub fn with_strategy(mut self, strategy: impl DiscoveryStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Names of the configured strategies in order
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run strategies until one finds holders
    async fn discover(&self, resource: &ResourceId) -> (Option<&'static str>, Vec<u32>) {
        let own_pid = std::process::id();

        for strategy in &self.strategies {
            match strategy.discover(resource).await {
                Ok(mut pids) => {
                    pids.retain(|pid| *pid != own_pid && *pid != 0);
                    pids.sort_unstable();
                    pids.dedup();
                    if !pids.is_empty() {
                        debug!("{} found holders of {}: {:?}", strategy.name(), resource, pids);
                        return (Some(strategy.name()), pids);
                    }
                }
                Err(e) => {
                    debug!("{} discovery failed for {}: {}", strategy.name(), resource, e);
                }
            }
        }
        (None, Vec::new())
    }
}

#[async_trait]
impl ResourceArbiter for ProcessReaper {
    async fn free(&self, resource: &ResourceId) -> EvictionReport {
        let mut report = EvictionReport::empty(resource);
        let (strategy, pids) = self.discover(resource).await;
        report.strategy = strategy;

        if pids.is_empty() {
            debug!("No holders found for {}", resource);
        } else {
            info!("Evicting {} holder(s) of {}: {:?}", pids.len(), resource, pids);
        }

        for pid in &pids {
            match self.signaller.terminate(*pid) {
                Ok(()) => report.terminated.push(*pid),
                Err(e) => warn!("Failed to terminate {} holding {}: {}", pid, resource, e),
            }
        }

        tokio::time::sleep(self.grace).await;

        for pid in &pids {
            if !self.signaller.is_alive(*pid) {
                continue;
            }
            match self.signaller.kill(*pid) {
                Ok(()) => {
                    warn!("Force killed {} holding {}", pid, resource);
                    report.forced.push(*pid);
                }
                Err(e) => warn!("Failed to kill {} holding {}: {}", pid, resource, e),
            }
        }

        report.discovered = pids;
        report
    }
}
