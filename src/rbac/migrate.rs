//! One-shot backfill of legacy per-study admin rows into scoped owner roles.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::codec::ResourceKind;
use super::enforcer::Enforcer;
use crate::error::{RbacError, RbacResult};

/// Read side of the legacy ownership join table.
pub trait LegacyOwnershipSource {
    fn resource_ids(&self) -> RbacResult<Vec<Uuid>>;
    fn owners_of(&self, resource_id: Uuid) -> RbacResult<Vec<String>>;
}

/// One legacy join row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyOwnerRow {
    pub study_id: Uuid,
    pub username: String,
}

/// In-memory legacy table, from rows or a JSON array of rows.
#[derive(Debug, Clone, Default)]
pub struct LegacyOwnershipTable {
    rows: BTreeMap<Uuid, Vec<String>>,
}

impl LegacyOwnershipTable {
    pub fn from_rows<I: IntoIterator<Item = LegacyOwnerRow>>(rows: I) -> Self {
        let mut t = Self::default();
        for r in rows { t.rows.entry(r.study_id).or_default().push(r.username); }
        t
    }

    pub fn from_json_file(path: &Path) -> RbacResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| RbacError::store("read legacy table", e))?;
        let rows: Vec<LegacyOwnerRow> = serde_json::from_slice(&bytes)
            .map_err(|e| RbacError::store("parse legacy table", std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        Ok(Self::from_rows(rows))
    }

    pub fn len(&self) -> usize { self.rows.values().map(Vec::len).sum() }

    pub fn is_empty(&self) -> bool { self.rows.is_empty() }
}

impl LegacyOwnershipSource for LegacyOwnershipTable {
    fn resource_ids(&self) -> RbacResult<Vec<Uuid>> { Ok(self.rows.keys().copied().collect()) }

    fn owners_of(&self, resource_id: Uuid) -> RbacResult<Vec<String>> {
        Ok(self.rows.get(&resource_id).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub resources: usize,
    pub rows: usize,
    pub granted: usize,
    pub unchanged: usize,
}

pub struct Migrator<'a> {
    enforcer: &'a Enforcer,
    kind: ResourceKind,
    api_paths: Vec<String>,
}

impl<'a> Migrator<'a> {
    pub fn new(enforcer: &'a Enforcer, kind: ResourceKind, api_paths: Vec<String>) -> Self {
        Self { enforcer, kind, api_paths }
    }

    /// Studies exposed under `/studies`.
    pub fn studies(enforcer: &'a Enforcer) -> Self { Self::new(enforcer, ResourceKind::Study, vec!["/studies".into()]) }

    /// Grant each legacy owner the scoped owner role. Stops at the first
    /// error; resources already processed stay migrated.
    pub fn run(&self, source: &dyn LegacyOwnershipSource) -> RbacResult<MigrationReport> {
        let mut report = MigrationReport::default();
        for id in source.resource_ids()? {
            report.resources += 1;
            // Duplicate legacy rows collapse to one grant.
            let owners: BTreeSet<String> = source.owners_of(id)?.into_iter().map(|u| u.trim().to_string()).collect();
            for user in owners {
                report.rows += 1;
                if self.enforcer.add_scoped_owner_role(&user, self.kind, id, &self.api_paths)? {
                    report.granted += 1;
                } else {
                    report.unchanged += 1;
                }
            }
            debug!(target: "rbac", kind = %self.kind, resource = %id, "legacy owners migrated");
        }
        info!(
            target: "rbac",
            kind = %self.kind,
            resources = report.resources,
            rows = report.rows,
            granted = report.granted,
            unchanged = report.unchanged,
            "legacy ownership migration complete"
        );
        Ok(report)
    }
}
