// ABOUTME: Config scaffolding for new installations.
// ABOUTME: Writes an upshift.yml template listing every setting with its default.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::CONFIG_FILENAME;

/// Write a commented template to `dir/upshift.yml` and return its path.
pub fn init_config(dir: &Path, force: bool) -> Result<PathBuf> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    std::fs::write(&config_path, TEMPLATE)?;

    Ok(config_path)
}

const TEMPLATE: &str = r#"# Label marking containers installed by upshift
provenance:
  key: upshift.role
  value: server

# Container runtime (auto-detected when unset)
# runtime:
#   type: podman
#   socket: /run/podman/podman.sock

upgrade:
  # image: registry.example.com/org/server:latest
  container_name_prefix: upshift-server
  # stop-then-start or start-then-stop
  order: stop-then-start
  disable_pull: false
  backup_image: alpine:3
  # stop_timeout: 30s
  health_timeout: 30s
  health_poll_interval: 1s

status:
  # log_dir: /var/lib/upshift/logs
  max_response_bytes: 4194304
  poll_timeout: 30s
  poll_interval: 200ms
  flush_grace: 1s
  retention: 5m

self_update:
  # image: registry.example.com/org/upshift:latest
  interval: 24h
  disable_pull: false
  check_on_start: false
  health_timeout: 30s
  health_poll_interval: 1s
  container_name_prefix: upshift
"#;
