// ABOUTME: Self-update command implementation.
// ABOUTME: Runs one check or the scheduler loop until Ctrl-C.

use super::cancel_on_ctrl_c;
use super::runtime_connection::connect_to_runtime;
use std::sync::Arc;
use upshift::config::Config;
use upshift::error::Result;
use upshift::output::Output;
use upshift::self_update::{NoopApiServer, SelfUpdateOutcome, SelfUpdater};
use upshift::status::UpgradeStatusStore;

pub async fn self_update(config: Config, once: bool, mut output: Output) -> Result<()> {
    output.start_timer();
    let runtime = Arc::new(connect_to_runtime(&config.runtime, &output).await?);
    let store = Arc::new(UpgradeStatusStore::new(config.status.clone()));
    store.sweep_expired();
    let updater = Arc::new(SelfUpdater::new(
        runtime,
        Arc::new(NoopApiServer),
        store,
        config.self_update,
    ));
    let cancel = cancel_on_ctrl_c();

    if !once {
        output.progress(&format!(
            "Checking for updates every {}s",
            updater.interval().as_secs()
        ));
        let handle = Arc::clone(&updater).start(cancel.clone());
        cancel.cancelled().await;
        let _ = handle.await;
        return Ok(());
    }

    match updater.run_once(&cancel).await? {
        SelfUpdateOutcome::Skipped(reason) => {
            output.success(&format!("Skipped: {:?}", reason));
        }
        SelfUpdateOutcome::UpToDate => output.success("Already up to date"),
        SelfUpdateOutcome::Updated {
            container,
            warnings,
        } => {
            for warning in &warnings {
                output.warning(&warning.message);
            }
            output.success(&format!("Updated to container {}", container.short()));
        }
    }
    Ok(())
}
