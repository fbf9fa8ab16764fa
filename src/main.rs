use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use portal_rbac::config::{has_flag, PortalConfig};

const USAGE: &str = "portal server

USAGE:
  portal_rbac [--port N] [--data-dir PATH] [--migrate-legacy FILE] [--compact]

OPTIONS:
  --port N               HTTP port (env: PORTAL_HTTP_PORT, default 7878)
  --data-dir PATH        Policy log and user directory (env: PORTAL_DATA_DIR, default data)
  --migrate-legacy FILE  Backfill legacy study admins from a JSON file (env: PORTAL_LEGACY_STUDY_ADMINS)
  --compact              Compact the policy log at startup (env: PORTAL_COMPACT_ON_START)
";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("{USAGE}");
        return Ok(());
    }

    let cfg = PortalConfig::from_env_and_args(&args);
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(target: "portal", "RUST_LOG='{}', admins={:?}", rust_log, cfg.bootstrap.admin_usernames);

    portal_rbac::server::run(cfg).await
}
