use std::{
    ffi::{OsStr, OsString},
    fmt,
    future::{self, Future},
    io,
    path::{Path, PathBuf},
    pin::Pin,
    process::{ExitStatus, Stdio},
    time::Duration,
};

use tokio::{
    io::AsyncReadExt as _,
    process::{Child, ChildStderr, Command},
    time::{self, Instant, MissedTickBehavior},
};

use super::{result::ExecutionOutcome, sampler::MemorySampler, signal::ShutdownEvent};

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Cannot launch '{}': {1}", .0.to_string_lossy())]
    Spawn(PathBuf, #[source] io::Error),

    #[error("Lost the pid of '{}' right after launching it", .0.to_string_lossy())]
    NoPid(PathBuf),

    #[error("Failed to poll process (pid={0}): {1}")]
    Wait(u32, #[source] io::Error),

    #[error("Interrupted by {0}")]
    Interrupted(ShutdownEvent),
}

/// The program under test: a path plus fixed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executable {
    path: PathBuf,
    args: Vec<OsString>,
}

impl Executable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for Executable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.path.to_string_lossy())?;
        for a in &self.args {
            write!(f, " {}", a.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Called on the controlling task once per poll tick while the child is alive.
pub trait MonitorObserver {
    fn on_poll(&self, _elapsed: Duration, _sample_mb: Option<f64>, _peak_mb: f64) {}
}

impl MonitorObserver for () {}

/// Runs one child process to completion or timeout while sampling its resident memory.
pub struct ExecutionMonitor {
    sampler: Box<dyn MemorySampler>,
    poll_interval: Duration,
    stderr_capture_max_bytes: usize,
}

enum Watched {
    Exited {
        status: ExitStatus,
        memory_before: f64,
        memory_peak: f64,
        elapsed: Duration,
    },
    TimedOut,
}

impl ExecutionMonitor {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
    pub const DEFAULT_STDERR_CAPTURE_MAX_BYTES: usize = 64 * 1024;
    const STDERR_DRAIN_LIMIT: Duration = Duration::from_millis(500);

    pub fn new(sampler: Box<dyn MemorySampler>) -> Self {
        Self {
            sampler,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            stderr_capture_max_bytes: Self::DEFAULT_STDERR_CAPTURE_MAX_BYTES,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn stderr_capture_max_bytes(mut self, max_bytes: usize) -> Self {
        self.stderr_capture_max_bytes = max_bytes;
        self
    }

    pub fn get_sampler(&self) -> &dyn MemorySampler {
        self.sampler.as_ref()
    }

    pub fn get_poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Launches `exe` with stdin from `input` and stdout into `output`, then polls it every
    /// `poll_interval` until it exits or `timeout` elapses.
    ///
    /// A launch failure is returned as [`ExecError::Spawn`]. On every path out of this
    /// function the child (and its process group on unix) has been killed or has exited.
    pub async fn run(
        &self,
        exe: &Executable,
        input: impl Into<Stdio>,
        output: impl Into<Stdio>,
        timeout: Duration,
        observer: &dyn MonitorObserver,
    ) -> Result<ExecutionOutcome, ExecError> {
        self.run_until(exe, input, output, timeout, observer, future::pending())
            .await
    }

    /// Like [`run`](Self::run), but gives up as soon as `shutdown` resolves: the child and
    /// its process group are killed and reaped, then [`ExecError::Interrupted`] is returned.
    pub async fn run_until(
        &self,
        exe: &Executable,
        input: impl Into<Stdio>,
        output: impl Into<Stdio>,
        timeout: Duration,
        observer: &dyn MonitorObserver,
        shutdown: impl Future<Output = ShutdownEvent>,
    ) -> Result<ExecutionOutcome, ExecError> {
        let mut std_cmd = std::process::Command::new(&exe.path);
        std_cmd
            .args(&exe.args)
            .stdin(input)
            .stdout(output)
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt as _;
            // Own process group, so a timeout can take down everything the child forked.
            std_cmd.process_group(0);
        }

        let mut child = Command::from(std_cmd)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::Spawn(exe.path.clone(), e))?;
        let start_at = Instant::now();

        let mut stderr = StderrCapture::new(child.stderr.take(), self.stderr_capture_max_bytes);
        let Some(pid) = child.id() else {
            return Err(ExecError::NoPid(exe.path.clone()));
        };
        let mut child = ChildGuard::new(child, pid);
        log::debug!("Launched '{}' (pid={}, timeout={:?})", exe, pid, timeout);

        tokio::pin!(shutdown);
        let watched = self
            .watch(&mut child, &mut stderr, start_at, timeout, observer, shutdown)
            .await;

        match watched {
            Ok(Watched::Exited {
                status,
                memory_before,
                memory_peak,
                elapsed,
            }) => {
                stderr.drain(Self::STDERR_DRAIN_LIMIT).await;
                log::debug!(
                    "pid={} exited with {} after {:?} (memory: before={:.2}MB, peak={:.2}MB)",
                    pid,
                    status,
                    elapsed,
                    memory_before,
                    memory_peak
                );
                Ok(ExecutionOutcome::exited(
                    status.code(),
                    self::terminating_signal(&status),
                    memory_before,
                    memory_peak,
                    elapsed,
                    stderr.into_string(),
                ))
            }
            Ok(Watched::TimedOut) => {
                log::debug!("pid={} exceeded {:?}, killing it", pid, timeout);
                child.terminate().await;
                stderr.drain(Self::STDERR_DRAIN_LIMIT).await;
                Ok(ExecutionOutcome::timed_out(
                    start_at.elapsed(),
                    stderr.into_string(),
                ))
            }
            Err(e) => {
                log::debug!("Killing pid={}: {}", pid, e);
                child.terminate().await;
                Err(e)
            }
        }
    }

    async fn watch<F>(
        &self,
        child: &mut ChildGuard,
        stderr: &mut StderrCapture,
        start_at: Instant,
        timeout: Duration,
        observer: &dyn MonitorObserver,
        mut shutdown: Pin<&mut F>,
    ) -> Result<Watched, ExecError>
    where
        F: Future<Output = ShutdownEvent>,
    {
        let pid = child.pid;
        let memory_before = self.sampler.sample(pid).await.unwrap_or(0.0);
        let mut memory_peak = memory_before;

        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(status) = child.try_wait()? {
                        return Ok(Watched::Exited {
                            status,
                            memory_before,
                            memory_peak,
                            elapsed: start_at.elapsed(),
                        });
                    }

                    let elapsed = start_at.elapsed();
                    if elapsed > timeout {
                        return Ok(Watched::TimedOut);
                    }

                    let sample = self.sampler.sample(pid).await;
                    if let Some(mb) = sample {
                        memory_peak = memory_peak.max(mb);
                    }
                    log::trace!("pid={} elapsed={:?} rss={:?} peak={:.2}", pid, elapsed, sample, memory_peak);
                    observer.on_poll(elapsed, sample, memory_peak);
                }

                // Keep the pipe flowing so the child never blocks on a full stderr buffer.
                _ = stderr.read_chunk(), if stderr.is_open() => {}

                event = &mut shutdown => return Err(ExecError::Interrupted(event)),
            }
        }
    }
}

/// Owns the spawned child. Dropping it kills whatever is left of the child's process group;
/// the direct child itself is killed on drop by tokio (`kill_on_drop`).
///
/// A pgid stays reserved while the group leader is unreaped or any member is alive. Once the
/// leader has been reaped here, the group is swept one last time and never signalled again.
struct ChildGuard {
    child: Child,
    pid: u32,
    group_pending: bool,
}

impl ChildGuard {
    fn new(child: Child, pid: u32) -> Self {
        Self {
            child,
            pid,
            group_pending: true,
        }
    }

    fn try_wait(&mut self) -> Result<Option<ExitStatus>, ExecError> {
        let status = self
            .child
            .try_wait()
            .map_err(|e| ExecError::Wait(self.pid, e))?;
        if status.is_some() {
            // Background processes the child left behind.
            self.sweep_group();
        }
        Ok(status)
    }

    /// Kills the process (and its group) and waits until it has been reaped.
    async fn terminate(&mut self) {
        #[cfg(unix)]
        self::kill_process_group(self.pid);

        self.child
            .kill()
            .await
            .unwrap_or_else(|e| log::warn!("Failed to kill process (pid={}): {:#}", self.pid, e));
        self.group_pending = false;
    }

    fn sweep_group(&mut self) {
        if self.group_pending {
            #[cfg(unix)]
            self::kill_process_group(self.pid);
            self.group_pending = false;
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.sweep_group();
    }
}

/// The child was started with `process_group(0)`, so its pgid equals its pid.
#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    use nix::{
        errno::Errno,
        sys::signal::{killpg, Signal},
        unistd::Pid,
    };

    let Ok(pgid) = i32::try_from(pgid) else {
        return
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => (),
        Err(e) => log::warn!("Failed to kill process group {}: {}", pgid, e),
    }
}

#[cfg(unix)]
fn terminating_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt as _;
    status.signal()
}

#[cfg(not(unix))]
fn terminating_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Bounded capture of the child's stderr. Bytes beyond the cap are read and discarded.
struct StderrCapture {
    pipe: Option<ChildStderr>,
    buf: Vec<u8>,
    max_bytes: usize,
}

impl StderrCapture {
    fn new(pipe: Option<ChildStderr>, max_bytes: usize) -> Self {
        Self {
            pipe,
            buf: Vec::new(),
            max_bytes,
        }
    }

    fn is_open(&self) -> bool {
        self.pipe.is_some()
    }

    async fn read_chunk(&mut self) {
        let Some(pipe) = self.pipe.as_mut() else {
            return
        };
        let mut chunk = [0u8; 4096];
        match pipe.read(&mut chunk).await {
            Ok(0) => self.pipe = None,
            Ok(n) => {
                let room = self.max_bytes.saturating_sub(self.buf.len());
                self.buf.extend_from_slice(&chunk[..n.min(room)]);
            }
            Err(e) => {
                log::debug!("Stopped reading stderr: {}", e);
                self.pipe = None;
            }
        }
    }

    /// Reads until EOF, giving up after `limit` (a grandchild may still hold the pipe).
    async fn drain(&mut self, limit: Duration) {
        let _ = time::timeout(limit, async {
            while self.is_open() {
                self.read_chunk().await;
            }
        })
        .await;
    }

    fn into_string(self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}
