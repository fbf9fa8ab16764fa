//! Startup seeding of baseline policies and admin grants.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::enforcer::Enforcer;
use super::model::{Action, GlobalRole, RoleName};
use crate::directory::UserDirectory;
use crate::error::RbacResult;

/// Paths every authenticated user may read.
pub const DEFAULT_BASE_READ_PATHS: &[&str] = &["/hello", "/users/me", "/users/me/*"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub admin_usernames: Vec<String>,
    #[serde(default = "default_base_read_paths")]
    pub base_read_paths: Vec<String>,
}

fn default_base_read_paths() -> Vec<String> { DEFAULT_BASE_READ_PATHS.iter().map(|s| s.to_string()).collect() }

impl Default for BootstrapConfig {
    fn default() -> Self { Self { admin_usernames: Vec::new(), base_read_paths: default_base_read_paths() } }
}

/// What a bootstrap run changed. All zeros on a re-run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub policies_added: usize,
    pub users_created: usize,
    pub admins_granted: usize,
}

pub struct Bootstrapper<'a> {
    enforcer: &'a Enforcer,
    directory: &'a dyn UserDirectory,
}

impl<'a> Bootstrapper<'a> {
    pub fn new(enforcer: &'a Enforcer, directory: &'a dyn UserDirectory) -> Self { Self { enforcer, directory } }

    /// Seed `admin` full access, `base` read on the configured paths, and the
    /// admin role for each configured username. Safe to run on every start.
    pub fn run(&self, cfg: &BootstrapConfig) -> RbacResult<BootstrapReport> {
        let mut report = BootstrapReport::default();

        if self.enforcer.add_policy(GlobalRole::Admin, "*", Action::Any)? { report.policies_added += 1; }
        for path in &cfg.base_read_paths {
            if self.enforcer.add_policy(GlobalRole::Base, path, Action::Read)? { report.policies_added += 1; }
        }

        let admin = RoleName::from(GlobalRole::Admin);
        for raw in &cfg.admin_usernames {
            let (user, created) = self.directory.find_or_create(raw)?;
            if created { report.users_created += 1; }
            if self.enforcer.add_role(&user.username, &admin)? { report.admins_granted += 1; }
        }

        info!(
            target: "rbac",
            policies_added = report.policies_added,
            users_created = report.users_created,
            admins_granted = report.admins_granted,
            "bootstrap complete"
        );
        Ok(report)
    }
}
