/// Record a replay session with the default shutdown strategy
///
/// Mirrors the original one-shot flow: run `./replay.py --record
/// /tmp/t.wpr` as root, wait for the HTTPS banner, then SIGTERM the tool
/// while a background thread keeps draining its output.
use anyhow::Result;
use std::sync::atomic::Ordering;
use tracing_subscriber::EnvFilter;
use wpr_supervisor::{register_shutdown_flag, ProcessSupervisor, SupervisorConfig};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // An operator Ctrl-C sets a flag instead of killing us outright, so the
    // error path still unwinds through the child's cleanup.
    let shutdown = register_shutdown_flag()?;

    let supervisor = ProcessSupervisor::new(SupervisorConfig::new());
    let status = supervisor.run()?;

    if shutdown.load(Ordering::SeqCst) {
        tracing::info!("session interrupted by operator");
    }
    tracing::info!("replay tool {status}");
    Ok(())
}
