// ABOUTME: Shared helper for connecting to the local container runtime.
// ABOUTME: Detects the socket, reports it, connects and pings.

use upshift::error::Result;
use upshift::output::Output;
use upshift::runtime::{BollardRuntime, RuntimeConfig, RuntimeError, detect_runtime};

/// Connect to the container runtime on this host.
///
/// This handles the common pattern of:
/// 1. Detecting the runtime type and socket path
/// 2. Outputting progress messages
/// 3. Establishing and checking the connection
pub async fn connect_to_runtime(config: &RuntimeConfig, output: &Output) -> Result<BollardRuntime> {
    let runtime_info = detect_runtime(config).map_err(RuntimeError::from)?;

    output.progress(&format!(
        "  → Found {} at {}",
        runtime_info.runtime_type, runtime_info.socket_path
    ));

    let runtime = BollardRuntime::connect(&runtime_info).map_err(RuntimeError::from)?;
    runtime.ping().await.map_err(RuntimeError::from)?;

    Ok(runtime)
}
