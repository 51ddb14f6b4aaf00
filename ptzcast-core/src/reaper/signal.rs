//! Signal delivery to discovered holder processes

use std::io;

/// Sends termination signals to arbitrary processes
pub trait ProcessSignaller: Send + Sync {
    /// Ask a process to exit (SIGTERM)
    fn terminate(&self, pid: u32) -> io::Result<()>;

    /// Force a process to exit (SIGKILL)
    fn kill(&self, pid: u32) -> io::Result<()>;

    /// Whether a process with this pid still exists
    fn is_alive(&self, pid: u32) -> bool;
}

/// Signals processes with `kill(2)`
#[derive(Debug, Clone, Copy, Default)]
pub struct LibcSignaller;

impl LibcSignaller {
    fn send(pid: u32, signal: libc::c_int) -> io::Result<()> {
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        if pid <= 0 {
            // 0 and negatives address process groups
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "refusing group pid"));
        }
        // SAFETY: kill(2) has no memory-safety preconditions; pid is a positive
        // single-process id, so no process group is addressed.
        let rc = unsafe { libc::kill(pid, signal) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

impl ProcessSignaller for LibcSignaller {
    fn terminate(&self, pid: u32) -> io::Result<()> {
        Self::send(pid, libc::SIGTERM)
    }

    fn kill(&self, pid: u32) -> io::Result<()> {
        Self::send(pid, libc::SIGKILL)
    }

    fn is_alive(&self, pid: u32) -> bool {
        match Self::send(pid, 0) {
            Ok(()) => true,
            // Exists but owned by someone else
            Err(e) => e.raw_os_error() == Some(libc::EPERM),
        }
    }
}

/// Send SIGINT to a child we own
pub fn interrupt(pid: u32) -> io::Result<()> {
    LibcSignaller::send(pid, libc::SIGINT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refuses_group_pids() {
        assert!(LibcSignaller.terminate(0).is_err());
        assert!(!LibcSignaller.is_alive(0));
    }

    #[test]
    fn test_own_process_is_alive() {
        assert!(LibcSignaller.is_alive(std::process::id()));
    }
}
