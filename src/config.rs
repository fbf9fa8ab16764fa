//! Process configuration: environment variables overridden by CLI flags.

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::rbac::BootstrapConfig;

pub const DEFAULT_HTTP_PORT: u16 = 7878;
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_WEB_BASE_PATH: &str = "/api/web";
pub const DEFAULT_TRE_BASE_PATH: &str = "/api/tre";
pub const DEFAULT_SUBJECT_HEADER: &str = "x-portal-user";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalConfig {
    pub data_dir: PathBuf,
    pub http_port: u16,
    pub bootstrap: BootstrapConfig,
    pub web_base_path: String,
    pub tre_base_path: String,
    /// Header carrying the already-authenticated username. Only trust it
    /// behind a proxy that strips it from client requests.
    pub subject_header: String,
    /// JSON file of legacy `{study_id, username}` rows to migrate at start.
    pub legacy_study_admins: Option<PathBuf>,
    pub compact_on_start: bool,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            http_port: DEFAULT_HTTP_PORT,
            bootstrap: BootstrapConfig::default(),
            web_base_path: DEFAULT_WEB_BASE_PATH.to_string(),
            tre_base_path: DEFAULT_TRE_BASE_PATH.to_string(),
            subject_header: DEFAULT_SUBJECT_HEADER.to_string(),
            legacy_study_admins: None,
            compact_on_start: false,
        }
    }
}

impl PortalConfig {
    /// Read `PORTAL_*` variables from the process environment, then apply `args`.
    pub fn from_env_and_args(args: &[String]) -> Self {
        Self::from_lookup(|k| std::env::var(k).ok(), args)
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(env: F, args: &[String]) -> Self {
        let mut cfg = PortalConfig::default();

        if let Some(v) = env("PORTAL_DATA_DIR") { cfg.data_dir = PathBuf::from(v); }
        if let Some(p) = env("PORTAL_HTTP_PORT").and_then(|v| v.parse::<u16>().ok()) { cfg.http_port = p; }
        if let Some(v) = env("PORTAL_ADMIN_USERNAMES") { cfg.bootstrap.admin_usernames = parse_list(&v); }
        if let Some(v) = env("PORTAL_BASE_READ_PATHS") { cfg.bootstrap.base_read_paths = parse_list(&v); }
        if let Some(v) = env("PORTAL_WEB_BASE_PATH") { cfg.web_base_path = normalize_base(&v); }
        if let Some(v) = env("PORTAL_TRE_BASE_PATH") { cfg.tre_base_path = normalize_base(&v); }
        if let Some(v) = env("PORTAL_SUBJECT_HEADER").filter(|v| !v.trim().is_empty()) {
            cfg.subject_header = v.trim().to_ascii_lowercase();
        }
        if let Some(v) = env("PORTAL_LEGACY_STUDY_ADMINS").filter(|v| !v.trim().is_empty()) {
            cfg.legacy_study_admins = Some(PathBuf::from(v));
        }
        if let Some(b) = env("PORTAL_COMPACT_ON_START").and_then(|v| parse_bool(&v)) { cfg.compact_on_start = b; }

        // CLI flags override environment
        if let Some(p) = parse_port_arg(args, "--port") { cfg.http_port = p; }
        if let Some(v) = arg_value(args, "--data-dir") { cfg.data_dir = PathBuf::from(v); }
        if let Some(v) = arg_value(args, "--migrate-legacy") { cfg.legacy_study_admins = Some(PathBuf::from(v)); }
        if has_flag(args, "--compact") { cfg.compact_on_start = true; }
        cfg
    }

    /// Reject settings the router cannot serve: each surface needs its own
    /// non-root base path, and neither may shadow the other or `/healthz`.
    pub fn validate(&self) -> Result<()> {
        for (name, path) in [("web", &self.web_base_path), ("tre", &self.tre_base_path)] {
            if path.is_empty() || path == "/" {
                bail!("{name} base path must not be the root, got `{path}`");
            }
            if !path.starts_with('/') || path.ends_with('/') {
                bail!("{name} base path `{path}` must start with `/` and have no trailing `/`");
            }
            if path.contains(&['{', '}', '*'][..]) {
                bail!("{name} base path `{path}` must not contain route parameters");
            }
            if path == HEALTH_PATH || nests_under(HEALTH_PATH, path) {
                bail!("{name} base path `{path}` collides with {HEALTH_PATH}");
            }
        }
        let (web, tre) = (&self.web_base_path, &self.tre_base_path);
        if web == tre || nests_under(web, tre) || nests_under(tre, web) {
            bail!("web and tre base paths overlap: `{web}` and `{tre}`");
        }
        Ok(())
    }
}

pub const HEALTH_PATH: &str = "/healthz";

/// Is `inner` strictly below `outer` on a segment boundary?
fn nests_under(outer: &str, inner: &str) -> bool {
    inner.strip_prefix(outer).map_or(false, |rest| rest.starts_with('/'))
}

pub fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Comma-separated list; blanks dropped.
pub fn parse_list(v: &str) -> Vec<String> {
    v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

pub fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1)).cloned()
}

pub fn parse_port_arg(args: &[String], flag: &str) -> Option<u16> {
    arg_value(args, flag).and_then(|v| v.parse::<u16>().ok())
}

pub fn has_flag(args: &[String], flag: &str) -> bool { args.iter().any(|a| a == flag) }

/// `/api/web/` and `api/web` both become `/api/web`.
fn normalize_base(v: &str) -> String {
    let trimmed = v.trim().trim_end_matches('/');
    if trimmed.starts_with('/') { trimmed.to_string() } else { format!("/{trimmed}") }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn args(a: &[&str]) -> Vec<String> { a.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn defaults_without_env() {
        let cfg = PortalConfig::from_lookup(|_| None, &[]);
        assert_eq!(cfg, PortalConfig::default());
        assert_eq!(cfg.bootstrap.base_read_paths, vec!["/hello", "/users/me", "/users/me/*"]);
    }

    #[test]
    fn env_then_args() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PORTAL_HTTP_PORT", "9000"),
            ("PORTAL_DATA_DIR", "/var/lib/portal"),
            ("PORTAL_ADMIN_USERNAMES", "root, ops ,,"),
            ("PORTAL_WEB_BASE_PATH", "web/"),
            ("PORTAL_SUBJECT_HEADER", "X-Remote-User"),
            ("PORTAL_COMPACT_ON_START", "no"),
        ]);
        let lookup = |k: &str| env.get(k).map(|v| v.to_string());

        let cfg = PortalConfig::from_lookup(lookup, &[]);
        assert_eq!(cfg.http_port, 9000);
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/portal"));
        assert_eq!(cfg.bootstrap.admin_usernames, vec!["root", "ops"]);
        assert_eq!(cfg.web_base_path, "/web");
        assert_eq!(cfg.subject_header, "x-remote-user");
        assert!(!cfg.compact_on_start);

        let cfg = PortalConfig::from_lookup(lookup, &args(&["bin", "--port", "9100", "--data-dir", "d", "--compact", "--migrate-legacy", "l.json"]));
        assert_eq!(cfg.http_port, 9100);
        assert_eq!(cfg.data_dir, PathBuf::from("d"));
        assert!(cfg.compact_on_start);
        assert_eq!(cfg.legacy_study_admins, Some(PathBuf::from("l.json")));
    }

    #[test]
    fn default_base_paths_validate() {
        assert!(PortalConfig::default().validate().is_ok());
    }

    #[test]
    fn root_base_path_rejected() {
        for raw in ["/", "", "  //  "] {
            let cfg = PortalConfig::from_lookup(|k| (k == "PORTAL_WEB_BASE_PATH").then(|| raw.to_string()), &[]);
            assert_eq!(cfg.web_base_path, "/");
            let err = cfg.validate().unwrap_err();
            assert!(err.to_string().contains("root"), "{err}");
        }
    }

    #[test]
    fn overlapping_base_paths_rejected() {
        let with = |web: &str, tre: &str| PortalConfig { web_base_path: web.into(), tre_base_path: tre.into(), ..Default::default() };
        assert!(with("/api", "/api").validate().is_err());
        assert!(with("/api", "/api/tre").validate().is_err());
        assert!(with("/api/web/x", "/api/web").validate().is_err());
        assert!(with("/healthz", "/api/tre").validate().is_err());
        assert!(with("/api/{id}", "/api/tre").validate().is_err());
        // Shared prefix without nesting is fine.
        assert!(with("/api/web", "/api/webtre").validate().is_ok());
    }

    #[test]
    fn bad_port_is_ignored() {
        let cfg = PortalConfig::from_lookup(|k| (k == "PORTAL_HTTP_PORT").then(|| "http".to_string()), &args(&["--port"]));
        assert_eq!(cfg.http_port, DEFAULT_HTTP_PORT);
    }

    #[test]
    fn bools() {
        assert_eq!(parse_bool(" ON "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
