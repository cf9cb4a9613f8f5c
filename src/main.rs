use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use portflow::demo::{cacert_workflow, CertificateAuthority, FileInstaller, CACERT, CERT_FILES_WRITTEN};
use portflow::{init_logging, EngineConfig, InMemoryStateProvider, LogExt, MonitoringConfig};
use portflow::core::{EventKind, SharedStorage, StorageFactory};

const RUN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let monitoring = MonitoringConfig::from_env();
    init_logging(&monitoring)?;

    let config = EngineConfig::from_env().context("Invalid engine configuration")?;

    let domain = std::env::var("DEMO_DOMAIN").unwrap_or_else(|_| "example.org".to_string());
    let fail_install = std::env::var("DEMO_FAIL_INSTALL")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let provider = InMemoryStateProvider::new();
    let ctx = provider.context(config);
    let authority = Arc::new(CertificateAuthority::default());

    ctx.generate_workflow(cacert_workflow(
        &domain,
        authority.clone(),
        Arc::new(FileInstaller::new(fail_install)),
    ))
    .await
    .context("Failed to register workflow")?;
    ctx.wire_ports(CACERT)
        .await
        .context("Failed to wire workflow ports")?;

    let mut events = provider.broker().subscribe();
    let model = ctx
        .run_workflow(CACERT)
        .await
        .log_err("Workflow start failed")
        .context("Failed to start workflow")?;
    info!(model_id = %model.id, domain = %domain, fail_install, "Workflow started");

    let finished = [
        CERT_FILES_WRITTEN.to_string(),
        EventKind::UndoWorked.event_name(CACERT),
        EventKind::UndoFailed.event_name(CACERT),
    ];
    let outcome = tokio::time::timeout(RUN_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) if finished.contains(&event.name) => return Ok(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event observer lagged");
                    continue;
                }
                Err(RecvError::Closed) => bail!("Event broker closed"),
            }
        }
    })
    .await
    .context("Workflow did not finish in time")??;

    info!(event = %outcome.name, "Workflow finished");

    if outcome.name == CERT_FILES_WRITTEN {
        let model = provider
            .storage()
            .get_shared_storage(CACERT)
            .await
            .log_err("Storage unavailable")?
            .find_by_id(&model.id)
            .await
            .log_err("Failed to reload model")
            .log_ok("Reloaded finished model")?
            .context("Model disappeared from storage")?;

        match ctx.compensate(model).await {
            Some(reverted) => info!(model_id = %reverted.id, "Workflow rolled back"),
            None => warn!("Rollback left ports in the flow"),
        }
    }

    info!(
        revoked = authority.revoked(),
        history = ?provider.broker().history(),
        "Demo complete"
    );
    Ok(())
}
