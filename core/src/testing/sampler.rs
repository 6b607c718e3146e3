use std::{process::Stdio, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

/// Queries the resident memory of a live process.
///
/// Implementations must give up within a short time budget and return `None` instead of
/// failing: memory telemetry is best-effort and must never break a test run.
#[async_trait]
pub trait MemorySampler: Send + Sync {
    /// Resident memory of `pid` in megabytes, or `None` when unavailable.
    async fn sample(&self, pid: u32) -> Option<f64>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SamplerKind {
    /// procfs on Linux, PowerShell on Windows, `ps` elsewhere
    #[default]
    Auto,
    Procfs,
    Ps,
    #[serde(rename = "powershell")]
    #[strum(serialize = "powershell")]
    PowerShell,
    #[serde(rename = "none")]
    #[strum(serialize = "none")]
    Disabled,
}

impl SamplerKind {
    pub fn build(self, query_timeout: Duration) -> Box<dyn MemorySampler> {
        use SamplerKind::*;
        match self {
            Auto if cfg!(target_os = "linux") => Box::new(ProcfsSampler::new(query_timeout)),
            Auto if cfg!(windows) => Box::new(PowerShellSampler::new(query_timeout)),
            Auto => Box::new(PsSampler::new(query_timeout)),
            Procfs => Box::new(ProcfsSampler::new(query_timeout)),
            Ps => Box::new(PsSampler::new(query_timeout)),
            PowerShell => Box::new(PowerShellSampler::new(query_timeout)),
            Disabled => Box::new(NullSampler),
        }
    }
}

fn kb_to_mb(kb: u64) -> f64 {
    kb as f64 / 1024.0
}

/// Runs a one-shot query command and returns its stdout, or `None` if it could not be run,
/// failed, or did not finish within `timeout`.
async fn query_stdout(cmd: &mut Command, timeout: Duration) -> Option<String> {
    let query = cmd
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, query).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            log::debug!("Failed to run {:?}: {}", cmd.as_std().get_program(), e);
            return None;
        }
        Err(_) => {
            log::debug!("{:?} timed out", cmd.as_std().get_program());
            return None;
        }
    };
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Reads `VmRSS` from `/proc/<pid>/status`.
#[derive(Debug, Clone)]
pub struct ProcfsSampler {
    query_timeout: Duration,
}

impl ProcfsSampler {
    pub fn new(query_timeout: Duration) -> Self {
        Self { query_timeout }
    }

    /// Extracts `VmRSS` (kB) from the contents of a `/proc/<pid>/status` file.
    /// Kernel threads and zombies have no such line.
    pub fn parse_vm_rss_kb(status: &str) -> Option<u64> {
        status
            .lines()
            .find_map(|line| line.strip_prefix("VmRSS:"))
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|v| v.parse().ok())
    }
}

#[async_trait]
impl MemorySampler for ProcfsSampler {
    async fn sample(&self, pid: u32) -> Option<f64> {
        let path = format!("/proc/{}/status", pid);
        let status = match tokio::time::timeout(self.query_timeout, tokio::fs::read_to_string(&path))
            .await
        {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => {
                log::trace!("Cannot read {}: {}", path, e);
                return None;
            }
            Err(_) => {
                log::debug!("Reading {} timed out", path);
                return None;
            }
        };
        Self::parse_vm_rss_kb(&status).map(kb_to_mb)
    }

    fn name(&self) -> &'static str {
        "procfs"
    }
}

/// Runs `ps -o rss= -p <pid>`. Works on Linux and macOS.
#[derive(Debug, Clone)]
pub struct PsSampler {
    query_timeout: Duration,
}

impl PsSampler {
    pub fn new(query_timeout: Duration) -> Self {
        Self { query_timeout }
    }

    pub fn parse_rss_kb(stdout: &str) -> Option<u64> {
        stdout.trim().parse().ok()
    }
}

#[async_trait]
impl MemorySampler for PsSampler {
    async fn sample(&self, pid: u32) -> Option<f64> {
        let mut cmd = Command::new("ps");
        cmd.args(["-o", "rss=", "-p", &pid.to_string()]);
        let stdout = query_stdout(&mut cmd, self.query_timeout).await?;
        Self::parse_rss_kb(&stdout).map(kb_to_mb)
    }

    fn name(&self) -> &'static str {
        "ps"
    }
}

/// Asks PowerShell for the working set of the process. For Windows, which has neither
/// procfs nor `ps`.
#[derive(Debug, Clone)]
pub struct PowerShellSampler {
    query_timeout: Duration,
}

impl PowerShellSampler {
    pub fn new(query_timeout: Duration) -> Self {
        Self { query_timeout }
    }

    fn script(pid: u32) -> String {
        format!("(Get-Process -Id {}).WorkingSet64 / 1MB", pid)
    }

    /// PowerShell prints the quotient in MB, e.g. `12.34765625`, using the current culture's
    /// decimal separator.
    pub fn parse_working_set_mb(stdout: &str) -> Option<f64> {
        let s = stdout.trim().replace(',', ".");
        s.parse().ok().filter(|mb: &f64| mb.is_finite() && *mb >= 0.0)
    }
}

#[async_trait]
impl MemorySampler for PowerShellSampler {
    async fn sample(&self, pid: u32) -> Option<f64> {
        let mut cmd = Command::new("powershell");
        cmd.args(["-NoProfile", "-NonInteractive", "-Command", &Self::script(pid)]);
        let stdout = query_stdout(&mut cmd, self.query_timeout).await?;
        Self::parse_working_set_mb(&stdout)
    }

    fn name(&self) -> &'static str {
        "powershell"
    }
}

/// Never returns a reading.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSampler;

#[async_trait]
impl MemorySampler for NullSampler {
    async fn sample(&self, _pid: u32) -> Option<f64> {
        None
    }

    fn name(&self) -> &'static str {
        "none"
    }
}
