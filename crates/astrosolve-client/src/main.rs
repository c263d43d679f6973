use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use astrosolve_client::{ClientConfig, NovaGateway};
use astrosolve_core::{SessionStore, SolveOutcome, SolveWorkflow, WorkflowStatus};
use astrosolve_interfaces::AstrometryGateway;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Logging goes up before the configuration so its warnings are not lost
    astrosolve_core::init_tracing(&ClientConfig::log_level_from(|name| std::env::var(name).ok()));

    // Load configuration from environment variables
    let config = ClientConfig::load().context("Failed to load configuration")?;

    let file_path: PathBuf = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("Usage: astrosolve <image-file>")?;

    let gateway: Arc<dyn AstrometryGateway> =
        Arc::new(NovaGateway::new(config.gateway_config()).context("Failed to create astrometry.net client")?);
    let sessions = Arc::new(SessionStore::new(gateway.clone()));
    let workflow = SolveWorkflow::new(gateway, sessions, config.api_key.clone()).with_poll_policy(config.poll.clone());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, canceling solve");
            on_interrupt.cancel();
        }
    });

    info!(service_url = %config.service_url, "Solving {}", file_path.display());
    let outcome = workflow.run(&file_path, &cancel).await;

    match outcome {
        SolveOutcome::Completed(record) if record.status == WorkflowStatus::Success => {
            info!(
                ra = record.right_ascension,
                dec = record.declination,
                radius = record.radius,
                "Field solved"
            );
            println!(
                "RA {:.6} deg, Dec {:.6} deg, radius {:.4} deg",
                record.right_ascension, record.declination, record.radius
            );
            Ok(())
        }
        other => {
            let message = workflow.state().message().unwrap_or_default().to_string();
            bail!("Solve ended with status {}: {}", other.status(), message)
        }
    }
}
