//!
//! portal HTTP server
//! ------------------
//! Axum router exposing two API surfaces, `web` (browsers) and `tre`
//! (machine clients), each nested under its own base path and wrapped in the
//! authorization layer. Every request is checked against the shared
//! [`Enforcer`] before its handler runs.
//!
//! Startup (`run`) opens the durable stores, seeds baseline policies, runs
//! the optional legacy migration and then serves. Any startup failure aborts.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, put};
use axum::Router;
use tracing::info;

use crate::config::{PortalConfig, HEALTH_PATH};
use crate::directory::{FileUserDirectory, UserDirectory};
use crate::rbac::{Bootstrapper, Enforcer, LegacyOwnershipTable, Migrator};

pub mod authz;
pub mod handlers;

pub use authz::Subject;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub enforcer: Arc<Enforcer>,
    pub directory: Arc<dyn UserDirectory>,
    /// Lower-cased name of the trusted subject header.
    pub subject_header: Arc<str>,
}

impl AppState {
    pub fn new(enforcer: Arc<Enforcer>, directory: Arc<dyn UserDirectory>, subject_header: &str) -> Self {
        Self { enforcer, directory, subject_header: Arc::from(subject_header.to_ascii_lowercase()) }
    }
}

/// Which API surface a router serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Web,
    Tre,
}

fn surface_routes(surface: Surface, state: AppState) -> Router {
    let mut r = Router::new()
        .route("/hello", get(handlers::hello))
        .route("/users/me/roles", get(handlers::my_roles))
        .route("/users/me/studies", get(handlers::my_studies))
        .route("/users/me/projects", get(handlers::my_projects));
    if surface == Surface::Web {
        r = r
            .route("/users/{username}/roles", get(handlers::user_roles))
            .route("/users/{username}/roles/{role}", put(handlers::grant_role).delete(handlers::revoke_role));
    }
    r.layer(from_fn_with_state(state.clone(), authz::authorize)).with_state(state)
}

/// Full application router: both surfaces nested under their base paths.
/// The paths must pass [`PortalConfig::validate`]; axum panics on a root or
/// overlapping nest.
pub fn router(state: AppState, web_base_path: &str, tre_base_path: &str) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(|| async { "ok" }))
        .nest(web_base_path, surface_routes(Surface::Web, state.clone()))
        .nest(tre_base_path, surface_routes(Surface::Tre, state))
}

/// Open stores, seed, migrate, then serve until the listener fails.
pub async fn run(cfg: PortalConfig) -> anyhow::Result<()> {
    cfg.validate().context("Invalid portal configuration")?;
    info!(
        target: "startup",
        data_dir = %cfg.data_dir.display(),
        http_port = cfg.http_port,
        web = %cfg.web_base_path,
        tre = %cfg.tre_base_path,
        "portal starting"
    );
    std::fs::create_dir_all(&cfg.data_dir)
        .with_context(|| format!("Failed to create or access data dir: {}", cfg.data_dir.display()))?;

    let data_dir = cfg.data_dir.clone();
    let enforcer = Enforcer::shared(|| Enforcer::open_dir(&data_dir))
        .with_context(|| format!("While opening policy store under {}", cfg.data_dir.display()))?;
    let directory: Arc<dyn UserDirectory> = Arc::new(
        FileUserDirectory::open(&cfg.data_dir)
            .with_context(|| format!("While opening user directory under {}", cfg.data_dir.display()))?,
    );

    Bootstrapper::new(&enforcer, directory.as_ref())
        .run(&cfg.bootstrap)
        .context("Bootstrap of baseline policies failed")?;

    if let Some(path) = &cfg.legacy_study_admins {
        let table = LegacyOwnershipTable::from_json_file(path)
            .with_context(|| format!("While reading legacy study admins from {}", path.display()))?;
        Migrator::studies(&enforcer).run(&table).context("Legacy study owner migration failed")?;
    }

    if cfg.compact_on_start {
        enforcer.compact().context("Policy log compaction failed")?;
        info!(target: "startup", "policy log compacted");
    }

    let state = AppState::new(enforcer, directory, &cfg.subject_header);
    let app = router(state, &cfg.web_base_path, &cfg.tre_base_path);

    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
