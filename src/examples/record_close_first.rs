/// Record a replay session, closing the PTY handles before signalling
///
/// Variant of `record_session` for replay builds that only flush their
/// capture file once their terminal goes away: both stream handles are
/// closed first, then SIGTERM is sent and the child reaped.
use anyhow::Result;
use tracing_subscriber::EnvFilter;
use wpr_supervisor::{ProcessSupervisor, ShutdownStrategy, SupervisorConfig};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = SupervisorConfig::new().shutdown(ShutdownStrategy::CloseThenSignal);
    let supervisor = ProcessSupervisor::new(config);
    let status = supervisor.run()?;

    tracing::info!("replay tool {status}");
    Ok(())
}
