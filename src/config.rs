//! Supervisor configuration
//!
//! Defaults reproduce the original hardcoded session: run `./replay.py
//! --record /tmp/t.wpr` as root and wait for the HTTPS listener banner.

use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;

/// Default path of the replay tool executable
pub const DEFAULT_REPLAY_EXECUTABLE: &str = "./replay.py";

/// Default capture file handed to the replay tool via `--record`
pub const DEFAULT_CAPTURE_OUTPUT: &str = "/tmp/t.wpr";

/// Substring the replay tool prints once it is accepting connections
pub const DEFAULT_READINESS_PATTERN: &str = "HTTPS server started on";

/// How the supervisor winds the child down after readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownStrategy {
    /// Keep the output stream open, drain it from a background thread,
    /// then send SIGTERM. The drain prevents the child from stalling on a
    /// full PTY buffer while it shuts down.
    #[default]
    SignalThenDrain,
    /// Close both stream handles first, then send SIGTERM. Any write the
    /// child attempts after the close observes EIO on the PTY.
    CloseThenSignal,
}

/// Configuration for a [`ProcessSupervisor`](crate::ProcessSupervisor)
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Path to the replay tool executable
    pub replay_executable: PathBuf,
    /// Capture file passed to the child as `--record <path>`; never opened
    /// by the supervisor itself
    pub capture_output: PathBuf,
    /// Pattern marking the child as ready to serve
    pub readiness_pattern: Regex,
    /// Refuse to run unless the effective user is root
    pub require_elevated: bool,
    /// Shutdown strategy applied by [`run`](crate::ProcessSupervisor::run)
    pub shutdown: ShutdownStrategy,
    /// Bound on the readiness scan; `None` preserves the original
    /// wait-forever behavior
    pub readiness_timeout: Option<Duration>,
    /// Bound on reaping; `None` blocks until the kernel reports exit
    pub reap_timeout: Option<Duration>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            replay_executable: PathBuf::from(DEFAULT_REPLAY_EXECUTABLE),
            capture_output: PathBuf::from(DEFAULT_CAPTURE_OUTPUT),
            readiness_pattern: Regex::new(DEFAULT_READINESS_PATTERN)
                .expect("default readiness pattern is a valid regex"),
            require_elevated: true,
            shutdown: ShutdownStrategy::default(),
            readiness_timeout: None,
            reap_timeout: None,
        }
    }
}

impl SupervisorConfig {
    /// Create a configuration with the original defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the replay tool executable
    pub fn replay_executable<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.replay_executable = path.into();
        self
    }

    /// Set the capture output file path
    pub fn capture_output<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.capture_output = path.into();
        self
    }

    /// Set the readiness pattern
    pub fn readiness_pattern(mut self, pattern: Regex) -> Self {
        self.readiness_pattern = pattern;
        self
    }

    /// Enable or disable the root privilege check
    pub fn require_elevated(mut self, required: bool) -> Self {
        self.require_elevated = required;
        self
    }

    /// Set the shutdown strategy
    pub fn shutdown(mut self, strategy: ShutdownStrategy) -> Self {
        self.shutdown = strategy;
        self
    }

    /// Bound the readiness scan
    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = Some(timeout);
        self
    }

    /// Bound the reap wait
    pub fn reap_timeout(mut self, timeout: Duration) -> Self {
        self.reap_timeout = Some(timeout);
        self
    }

    /// Argument vector handed to the PTY spawner:
    /// `<replay_executable> --record <capture_output>`
    pub fn command_args(&self) -> Vec<std::ffi::OsString> {
        vec![
            self.replay_executable.as_os_str().to_os_string(),
            "--record".into(),
            self.capture_output.as_os_str().to_os_string(),
        ]
    }
}
