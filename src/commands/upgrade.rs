// ABOUTME: Upgrade command implementation.
// ABOUTME: Starts an upgrade job and follows its log until the job ends.

use super::cancel_on_ctrl_c;
use super::runtime_connection::connect_to_runtime;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use upshift::config::Config;
use upshift::error::{Error, Result};
use upshift::output::Output;
use upshift::runtime::find_managed_containers;
use upshift::status::{JobStatus, UpgradeStatusStore};
use upshift::types::{ContainerId, ImageRef, LogToken};
use upshift::upgrade::{ReplacementOrder, UpgradeRequest, Upgrader};

pub struct UpgradeArgs {
    pub container: Option<String>,
    pub image: Option<ImageRef>,
    pub new_container_name: Option<String>,
    pub order: Option<ReplacementOrder>,
    pub detach: bool,
}

#[derive(Serialize)]
struct Started<'a> {
    event: &'static str,
    token: &'a LogToken,
}

pub async fn upgrade(config: Config, args: UpgradeArgs, mut output: Output) -> Result<()> {
    output.start_timer();
    let runtime = Arc::new(connect_to_runtime(&config.runtime, &output).await?);

    let container = match args.container {
        Some(container) => ContainerId::new(container),
        None => {
            let managed = find_managed_containers(&*runtime, &config.provenance).await?;
            let first = managed
                .into_iter()
                .next()
                .ok_or_else(|| Error::NoManagedContainer(config.provenance.to_string()))?;
            output.progress(&format!("  → Upgrading {} ({})", first.name, first.id.short()));
            first.id
        }
    };

    let mut request = UpgradeRequest::new(container);
    request.image = args.image;
    request.new_container_name = args.new_container_name;
    request.order = args.order;

    let store = Arc::new(UpgradeStatusStore::new(config.status.clone()));
    store.sweep_expired();
    let upgrader = Upgrader::new(runtime, Arc::clone(&store), config.upgrade, config.provenance);

    let token = upgrader.start_upgrade(request, cancel_on_ctrl_c()).await?;
    output.result(
        &format!("Upgrade started: {}", token),
        &Started {
            event: "started",
            token: &token,
        },
    );

    // The job runs in this process, so keep polling until it ends. Ctrl-C
    // cancels the job, not the polling.
    let polling = CancellationToken::new();
    let mut offset = 0;
    let status = loop {
        let response = store.upgrade_status(token.as_str(), offset, &polling).await?;
        if !args.detach {
            for line in &response.lines {
                output.log_line(line);
            }
        }
        offset = response.offset;
        if response.done {
            break response.status;
        }
    };

    match status {
        JobStatus::Succeeded => {
            output.success("Upgrade complete");
            Ok(())
        }
        _ => Err(Error::JobFailed(token.to_string())),
    }
}
