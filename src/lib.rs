//! Lifecycle supervisor for a web-page-replay recording process
//!
//! Spawns the replay tool under a pseudo-terminal (it buffers line-wise only
//! when it believes it is interactive), scans its output for the readiness
//! banner, then terminates and reaps it using one of two shutdown
//! strategies.

pub mod config;
pub mod errors;
pub mod signal;
pub mod stream;
pub mod supervisor;

// Re-export commonly used types
pub use config::{ShutdownStrategy, SupervisorConfig};
pub use errors::{SupervisorError, SupervisorResult};
pub use signal::{
    process_exists, register_shutdown_flag, send_signal, send_signal_to_group, SignalType,
};
pub use stream::{LineStream, MemoryStream, PipeStream, PtyStream};
pub use supervisor::{
    BackgroundDrain, ChildState, ExitStatus, ProcessSupervisor, ReplayChild,
};
