//!
//! portal RBAC admin CLI
//! ---------------------
//! Offline maintenance of the on-disk policy store: inspect and change role
//! grants, run the legacy study-owner migration and compact the policy log.
//! Do not run against a data dir a live server is writing to.

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{EnvFilter, fmt};

use portal_rbac::config::{arg_value, DEFAULT_DATA_DIR};
use portal_rbac::directory::normalize_username;
use portal_rbac::rbac::{parse_role_name, Enforcer, LegacyOwnershipTable, Migrator, RoleName};

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--data-dir <path>] <command> [args]\n\nCommands:\n  roles <user>            list roles held by <user>\n  grant <user> <role>     grant a global or scoped role\n  revoke <subject> <role> revoke a role (also clears role-to-role grants)\n  policies [role]         list policies, optionally for one role\n  migrate <legacy.json>   backfill study owners from legacy {{study_id, username}} rows\n  compact                 rewrite the policy log as its current state\n\nThe data dir defaults to $PORTAL_DATA_DIR, then `{DEFAULT_DATA_DIR}`."
    );
}

/// Positional arguments with `--data-dir <path>` removed.
fn positional(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 1;
    while i < args.len() {
        if args[i] == "--data-dir" { i += 2; continue; }
        out.push(args[i].clone());
        i += 1;
    }
    out
}

fn print_json<T: serde::Serialize>(v: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().cloned().unwrap_or_else(|| "portal_rbac_cli".to_string());
    let pos = positional(&args);
    let Some(cmd) = pos.first().map(String::as_str) else {
        print_usage(&program);
        return Err(anyhow!("missing command"));
    };
    if cmd == "help" || cmd == "--help" || cmd == "-h" {
        print_usage(&program);
        return Ok(());
    }

    let data_dir = arg_value(&args, "--data-dir")
        .or_else(|| env::var("PORTAL_DATA_DIR").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let enforcer = Enforcer::open_dir(&data_dir)
        .with_context(|| format!("While opening policy store under {}", data_dir.display()))?;

    let arg = |n: usize, what: &'static str| -> Result<String> {
        pos.get(n).cloned().ok_or_else(|| anyhow!("{cmd}: missing <{what}>"))
    };

    match cmd {
        "roles" => {
            let mut roles = enforcer.roles(&arg(1, "user")?)?;
            roles.sort();
            print_json(&roles)
        }
        "grant" => {
            let role = parse_role_name(&arg(2, "role")?)?;
            let user = arg(1, "user")?;
            let added = enforcer.add_role(normalize_username(&user)?, &role)?;
            println!("{}", if added { "granted" } else { "already held" });
            Ok(())
        }
        "revoke" => {
            let role = parse_role_name(&arg(2, "role")?)?;
            let removed = enforcer.remove_role(&arg(1, "user")?, &role)?;
            println!("{}", if removed { "revoked" } else { "not held" });
            Ok(())
        }
        "policies" => match pos.get(1) {
            Some(r) => print_json(&enforcer.policies_for_role(&RoleName::from(r.as_str()))?),
            None => print_json(&enforcer.policies()?),
        },
        "migrate" => {
            let path = PathBuf::from(arg(1, "legacy.json")?);
            let table = LegacyOwnershipTable::from_json_file(&path)
                .with_context(|| format!("While reading {}", path.display()))?;
            let report = Migrator::studies(&enforcer).run(&table).context("migration failed")?;
            print_json(&report)
        }
        "compact" => {
            enforcer.compact().context("compaction failed")?;
            println!("compacted");
            Ok(())
        }
        other => {
            print_usage(&program);
            Err(anyhow!("unknown command `{other}`"))
        }
    }
}
