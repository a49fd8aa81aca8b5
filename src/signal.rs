//! Signal delivery with safe abstractions

use crate::errors::{SupervisorError, SupervisorResult};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Signal types the supervisor delivers or reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    /// Interrupt signal (Ctrl+C)
    Interrupt,
    /// Termination signal
    Terminate,
    /// Forced kill, not blockable
    Kill,
}

#[cfg(unix)]
impl SignalType {
    pub(crate) fn to_nix(self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal;
        match self {
            Self::Interrupt => Signal::SIGINT,
            Self::Terminate => Signal::SIGTERM,
            Self::Kill => Signal::SIGKILL,
        }
    }
}

/// Send a signal to a process (Unix only)
#[cfg(unix)]
pub fn send_signal(pid: i32, signal: SignalType) -> SupervisorResult<()> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid), signal.to_nix())
        .map_err(|e| SupervisorError::Signal(format!("kill({pid}, {signal:?}): {e}")))?;

    Ok(())
}

/// Send a signal to a process group (Unix only)
#[cfg(unix)]
pub fn send_signal_to_group(pgid: i32, signal: SignalType) -> SupervisorResult<()> {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    killpg(Pid::from_raw(pgid), signal.to_nix())
        .map_err(|e| SupervisorError::Signal(format!("killpg({pgid}, {signal:?}): {e}")))?;

    Ok(())
}

/// Check whether a pid is still live in the process table
/// (signal 0 probe, no signal actually delivered)
#[cfg(unix)]
pub fn process_exists(pid: i32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid), None).is_ok()
}

/// Register SIGINT/SIGTERM on a shared flag so a long-running session can
/// wind its child down gracefully instead of orphaning it
pub fn register_shutdown_flag() -> SupervisorResult<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(sig, Arc::clone(&flag))
            .map_err(|e| SupervisorError::Signal(format!("registering handler: {e}")))?;
    }
    Ok(flag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::Signal;

    #[test]
    fn test_signal_type_conversion() {
        assert_eq!(SignalType::Interrupt.to_nix(), Signal::SIGINT);
        assert_eq!(SignalType::Terminate.to_nix(), Signal::SIGTERM);
        assert_eq!(SignalType::Kill.to_nix(), Signal::SIGKILL);
    }

    #[test]
    fn test_send_signal_to_dead_pid_fails() {
        // Reserved pid range that cannot be a live process we own
        let result = send_signal(i32::MAX - 1, SignalType::Terminate);
        assert!(matches!(result, Err(SupervisorError::Signal(_))));
    }

    #[test]
    fn test_process_exists_for_self() {
        assert!(process_exists(std::process::id() as i32));
    }

    #[test]
    fn test_register_shutdown_flag() {
        let flag = register_shutdown_flag().expect("register handlers");
        assert!(!flag.load(std::sync::atomic::Ordering::SeqCst));
    }
}
