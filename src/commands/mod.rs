// ABOUTME: Command module aggregator for the upshift CLI.
// ABOUTME: Re-exports upgrade, status and self-update command handlers.

mod runtime_connection;
mod self_update;
mod status;
mod upgrade;

pub use self_update::self_update;
pub use status::status;
pub use upgrade::{UpgradeArgs, upgrade};

use tokio_util::sync::CancellationToken;

/// Token cancelled on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted; cancelling");
            trigger.cancel();
        }
    });
    cancel
}
