//! Process supervisor owning the lifecycle of one replay-tool child
//!
//! The whole lifecycle is linear: spawn on a PTY, scan output until the
//! readiness marker, then shut down per the configured strategy and reap.
//! Every failure is fatal to the run; nothing is retried.

use crate::config::{ShutdownStrategy, SupervisorConfig};
use crate::errors::{SupervisorError, SupervisorResult};
use crate::signal::{process_exists, send_signal, SignalType};
use crate::stream::{LineStream, PtyStream};
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use portable_pty::{native_pty_system, Child, CommandBuilder, PtySize};
use std::fmt;
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Lifecycle state of a spawned child
///
/// Transitions only forward: `Running -> SignalSent -> Reaped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    Running,
    SignalSent,
    Reaped,
}

/// How the child left the process table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Normal exit with the given code
    Exited(i32),
    /// Terminated by the given signal
    Signaled(Signal),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    pub fn signaled(&self) -> bool {
        matches!(self, Self::Signaled(_))
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Signaled(sig) => write!(f, "terminated by signal {sig}"),
        }
    }
}

/// A spawned replay-tool process and its PTY handles
pub struct ReplayChild {
    pid: i32,
    state: ChildState,
    output: Option<PtyStream>,
    input: Option<Box<dyn Write + Send>>,
    // portable-pty's handle; kept so its fd bookkeeping outlives the spawn
    #[allow(dead_code)]
    handle: Box<dyn Child + Send + Sync>,
}

impl ReplayChild {
    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn state(&self) -> ChildState {
        self.state
    }

    /// Mutable access to the output stream, if it has not been taken or closed
    pub fn output_mut(&mut self) -> Option<&mut PtyStream> {
        self.output.as_mut()
    }

    /// Move the output stream out, e.g. to hand it to a background drain
    pub fn take_output(&mut self) -> Option<PtyStream> {
        self.output.take()
    }
}

impl Drop for ReplayChild {
    /// Last-resort cleanup so error paths never leak a live child or a
    /// zombie: SIGTERM first, escalate to SIGKILL, then always wait.
    fn drop(&mut self) {
        if self.state == ChildState::Reaped {
            return;
        }
        warn!(pid = self.pid, "child dropped before reap, cleaning up");

        let _ = send_signal(self.pid, SignalType::Terminate);
        thread::sleep(Duration::from_millis(100));

        // まだ生きていればSIGKILL
        if process_exists(self.pid) {
            let _ = send_signal(self.pid, SignalType::Kill);
        }

        // 必ずwait()してゾンビプロセスを防ぐ
        let _ = waitpid(Pid::from_raw(self.pid), None);
    }
}

/// Fire-and-forget handle to the background output drain
///
/// Dropping it detaches the thread; the drain ends on its own when the
/// stream reaches EOF (normally because the child exited).
pub struct BackgroundDrain {
    handle: thread::JoinHandle<()>,
}

impl BackgroundDrain {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the drain to end. Only tests have a reason to call this.
    pub fn join(self) {
        let _ = self.handle.join();
    }
}

/// Owns the full lifecycle of exactly one child process per run
pub struct ProcessSupervisor {
    config: SupervisorConfig,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Fail unless the effective user is root (when the config demands it)
    pub fn require_elevated_privileges(&self) -> SupervisorResult<()> {
        if !self.config.require_elevated {
            return Ok(());
        }
        if !nix::unistd::Uid::effective().is_root() {
            return Err(SupervisorError::PermissionDenied {
                context: "must run as root to drive the replay tool".into(),
            });
        }
        Ok(())
    }

    /// Launch the replay tool on a PTY pair so it buffers as if interactive
    pub fn spawn(&self) -> SupervisorResult<ReplayChild> {
        let exe = &self.config.replay_executable;
        // A path-like executable must exist; bare names resolve via PATH.
        if exe.components().count() > 1 && !exe.exists() {
            return Err(SupervisorError::Spawn {
                reason: format!("executable not found: {}", exe.display()),
            });
        }

        let pty = native_pty_system();
        let pair = pty
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SupervisorError::Spawn {
                reason: format!("openpty failed: {e}"),
            })?;

        let cmd = CommandBuilder::from_argv(self.config.command_args());
        let handle = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SupervisorError::Spawn {
                reason: format!("{}: {e}", exe.display()),
            })?;
        // The slave fd stays with the child; the parent keeps only the master.
        drop(pair.slave);

        let pid = handle.process_id().ok_or_else(|| SupervisorError::Spawn {
            reason: "child pid unavailable".into(),
        })? as i32;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| SupervisorError::Spawn {
                reason: format!("cloning PTY reader: {e}"),
            })?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| SupervisorError::Spawn {
                reason: format!("taking PTY writer: {e}"),
            })?;

        info!(pid, exe = %exe.display(), "spawned replay process");

        Ok(ReplayChild {
            pid,
            state: ChildState::Running,
            output: Some(PtyStream::new(reader, pair.master)),
            input: Some(writer),
            handle,
        })
    }

    /// Scan output lines until one matches the readiness pattern
    ///
    /// Each line is logged under the `replay` target. The stream is left
    /// open and positioned just past the matching line. With no
    /// `readiness_timeout` configured this blocks for as long as the child
    /// stays silent.
    pub fn await_readiness(&self, output: &mut dyn LineStream) -> SupervisorResult<()> {
        let deadline = self.config.readiness_timeout.map(|t| (Instant::now() + t, t));
        loop {
            if let Some((at, t)) = deadline {
                if Instant::now() >= at {
                    return Err(SupervisorError::Timeout { seconds: t.as_secs() });
                }
            }
            match output.read_line()? {
                Some(line) => {
                    info!(target: "replay", "{line}");
                    if self.config.readiness_pattern.is_match(&line) {
                        debug!("readiness marker matched");
                        return Ok(());
                    }
                }
                None => {
                    return Err(SupervisorError::Stream(
                        "child output ended before the readiness marker".into(),
                    ));
                }
            }
        }
    }

    /// Keep consuming and logging output on a background thread so the
    /// child cannot stall on a full PTY buffer during shutdown
    pub fn drain_in_background<S>(&self, mut output: S) -> SupervisorResult<BackgroundDrain>
    where
        S: LineStream + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name("replay-drain".into())
            .spawn(move || loop {
                match output.read_line() {
                    Ok(Some(line)) => info!(target: "replay", "{line}"),
                    Ok(None) => break,
                    Err(e) => {
                        warn!("background drain stopped: {e}");
                        break;
                    }
                }
            })?;
        Ok(BackgroundDrain { handle })
    }

    /// Request graceful shutdown with SIGTERM
    ///
    /// Delivery is asynchronous; whether the child actually stops is only
    /// observed by [`reap`](Self::reap).
    pub fn terminate(&self, child: &mut ReplayChild) -> SupervisorResult<()> {
        debug!(pid = child.pid, "sending SIGTERM");
        send_signal(child.pid, SignalType::Terminate)?;
        child.state = ChildState::SignalSent;
        Ok(())
    }

    /// Block until the child exits, returning its status
    pub fn reap(&self, child: &mut ReplayChild) -> SupervisorResult<ExitStatus> {
        let pid = Pid::from_raw(child.pid);
        let status = match self.config.reap_timeout {
            None => loop {
                match waitpid(pid, None) {
                    Ok(WaitStatus::Exited(_, code)) => break ExitStatus::Exited(code),
                    Ok(WaitStatus::Signaled(_, sig, _)) => break ExitStatus::Signaled(sig),
                    Ok(_) => continue,
                    Err(Errno::EINTR) => continue,
                    Err(Errno::ECHILD) => {
                        return Err(SupervisorError::ProcessGone { pid: child.pid })
                    }
                    Err(e) => return Err(e.into()),
                }
            },
            Some(timeout) => self.reap_with_timeout(pid, timeout)?,
        };
        child.state = ChildState::Reaped;
        info!(pid = child.pid, %status, "child reaped");
        Ok(status)
    }

    fn reap_with_timeout(&self, pid: Pid, timeout: Duration) -> SupervisorResult<ExitStatus> {
        let start = Instant::now();
        loop {
            match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(_, code)) => return Ok(ExitStatus::Exited(code)),
                Ok(WaitStatus::Signaled(_, sig, _)) => return Ok(ExitStatus::Signaled(sig)),
                Ok(_) => {
                    if start.elapsed() >= timeout {
                        return Err(SupervisorError::Timeout {
                            seconds: timeout.as_secs(),
                        });
                    }
                    thread::sleep(Duration::from_millis(10));
                }
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => {
                    return Err(SupervisorError::ProcessGone { pid: pid.as_raw() })
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Close both PTY handles before signalling
    ///
    /// After this the child's next write to its terminal fails with EIO,
    /// the PTY equivalent of a broken pipe.
    pub fn close_streams(&self, child: &mut ReplayChild) {
        debug!(pid = child.pid, "closing child streams");
        if let Some(mut output) = child.output.take() {
            output.close();
        }
        child.input.take();
    }

    /// The full session: privilege check, spawn, readiness scan, then the
    /// configured shutdown strategy, ending with the reaped exit status
    pub fn run(&self) -> SupervisorResult<ExitStatus> {
        self.require_elevated_privileges()?;
        let mut child = self.spawn()?;

        let output = child.output_mut().ok_or_else(|| {
            SupervisorError::Stream("child output stream unavailable".into())
        })?;
        self.await_readiness(output)?;

        match self.config.shutdown {
            ShutdownStrategy::SignalThenDrain => {
                if let Some(output) = child.take_output() {
                    // Detached on purpose; it ends when the stream does.
                    let _drain = self.drain_in_background(output)?;
                }
                self.terminate(&mut child)?;
                self.reap(&mut child)
            }
            ShutdownStrategy::CloseThenSignal => {
                self.close_streams(&mut child);
                self.terminate(&mut child)?;
                self.reap(&mut child)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;

    fn unprivileged() -> ProcessSupervisor {
        ProcessSupervisor::new(SupervisorConfig::new().require_elevated(false))
    }

    #[test]
    fn test_privilege_check_disabled() {
        assert!(unprivileged().require_elevated_privileges().is_ok());
    }

    #[test]
    fn test_readiness_stops_at_marker_without_draining() {
        let supervisor = unprivileged();
        let mut stream = MemoryStream::new([
            "booting",
            "HTTP server started on 8080",
            "HTTPS server started on 4443",
            "extra line one",
            "extra line two",
        ]);

        supervisor.await_readiness(&mut stream).expect("marker present");
        // Lines after the marker stay unread and the stream stays open.
        assert_eq!(stream.remaining(), 2);
        assert!(!stream.is_closed());
    }

    #[test]
    fn test_readiness_eof_is_an_error() {
        let supervisor = unprivileged();
        let mut stream = MemoryStream::new(["no marker here"]);
        let result = supervisor.await_readiness(&mut stream);
        assert!(matches!(result, Err(SupervisorError::Stream(_))));
    }

    #[test]
    fn test_readiness_timeout_expires() {
        let supervisor = ProcessSupervisor::new(
            SupervisorConfig::new()
                .require_elevated(false)
                .readiness_timeout(Duration::ZERO),
        );
        let mut stream = MemoryStream::new(["still booting"]);
        let result = supervisor.await_readiness(&mut stream);
        assert!(matches!(result, Err(SupervisorError::Timeout { .. })));
    }

    #[test]
    fn test_background_drain_ends_at_eof() {
        let supervisor = unprivileged();
        let stream = MemoryStream::new(["a", "b", "c"]);
        let drain = supervisor.drain_in_background(stream).expect("spawn drain");
        let deadline = Instant::now() + Duration::from_secs(5);
        while !drain.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(drain.is_finished());
        drain.join();
    }

    #[test]
    fn test_exit_status_display() {
        assert_eq!(ExitStatus::Exited(0).to_string(), "exited with code 0");
        assert!(ExitStatus::Exited(0).success());
        let status = ExitStatus::Signaled(Signal::SIGTERM);
        assert!(status.signaled());
        assert!(status.to_string().contains("SIGTERM"));
    }

    #[test]
    fn test_spawn_rejects_missing_executable() {
        let supervisor = ProcessSupervisor::new(
            SupervisorConfig::new()
                .require_elevated(false)
                .replay_executable("/nonexistent/replay.py"),
        );
        let result = supervisor.spawn();
        assert!(matches!(result, Err(SupervisorError::Spawn { .. })));
    }
}
