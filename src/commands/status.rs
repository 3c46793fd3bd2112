// ABOUTME: Status command implementation.
// ABOUTME: Polls an upgrade job log once from a byte offset.

use super::cancel_on_ctrl_c;
use upshift::config::Config;
use upshift::error::Result;
use upshift::output::Output;
use upshift::status::UpgradeStatusStore;

pub async fn status(config: Config, token: &str, offset: u64, output: Output) -> Result<()> {
    let store = UpgradeStatusStore::new(config.status);
    let response = store.upgrade_status(token, offset, &cancel_on_ctrl_c()).await?;

    for line in &response.lines {
        output.log_line(line);
    }
    output.result(
        &format!(
            "offset: {}  done: {}  status: {}",
            response.offset,
            response.done,
            response.status.as_str()
        ),
        &response,
    );

    Ok(())
}
