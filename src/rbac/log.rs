//! Append-only policy log
//! ----------------------
//! Every policy and grouping mutation is appended as one record and fsynced
//! before the call returns. On open the log is replayed into a
//! [`PolicySnapshot`]. Record layout:
//!
//! ```text
//! magic u32 | kind u8 | version u8 | pad u16 | len u32 | payload[len] | crc32(payload) u32
//! ```
//!
//! Payload strings are u16 length-prefixed UTF-8; longer strings are refused
//! at encode time. A torn trailing record (crash mid-append) is cut off on
//! open; a complete record with a bad magic or CRC is a hard error. A failed
//! append is truncated away before the error is returned, and if that
//! truncation also fails the log is poisoned and refuses further appends.

use crc32fast::Hasher as Crc32;
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use super::model::{check_field_len, Action, Grouping, Policy, PolicySnapshot, RoleName};
use crate::error::{RbacError, RbacResult};

const MAGIC_LOG: u32 = 0x5042_4c31; // 'PBL1'
const VERSION: u8 = 1;
const HEADER_LEN: usize = 12;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecKind { AddPolicy = 1, RemovePolicy = 2, AddGrouping = 3, RemoveGrouping = 4 }

impl RecKind {
    fn from_u8(v: u8) -> Option<RecKind> {
        match v {
            1 => Some(RecKind::AddPolicy),
            2 => Some(RecKind::RemovePolicy),
            3 => Some(RecKind::AddGrouping),
            4 => Some(RecKind::RemoveGrouping),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    AddPolicy(Policy),
    RemovePolicy(Policy),
    AddGrouping(Grouping),
    RemoveGrouping(Grouping),
}

impl LogRecord {
    fn kind(&self) -> RecKind {
        match self {
            LogRecord::AddPolicy(_) => RecKind::AddPolicy,
            LogRecord::RemovePolicy(_) => RecKind::RemovePolicy,
            LogRecord::AddGrouping(_) => RecKind::AddGrouping,
            LogRecord::RemoveGrouping(_) => RecKind::RemoveGrouping,
        }
    }

    fn payload(&self) -> RbacResult<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            LogRecord::AddPolicy(p) | LogRecord::RemovePolicy(p) => {
                write_str(&mut buf, "role", p.role.as_str())?;
                write_str(&mut buf, "resource", &p.resource)?;
                buf.push(p.action.code());
            }
            LogRecord::AddGrouping(g) | LogRecord::RemoveGrouping(g) => {
                write_str(&mut buf, "subject", &g.subject)?;
                write_str(&mut buf, "role", g.role.as_str())?;
            }
        }
        Ok(buf)
    }

    fn decode(kind: RecKind, payload: &[u8]) -> Option<LogRecord> {
        let mut o = 0usize;
        match kind {
            RecKind::AddPolicy | RecKind::RemovePolicy => {
                let role = read_str(payload, &mut o)?;
                let resource = read_str(payload, &mut o)?;
                let action = Action::from_code(*payload.get(o)?)?;
                let p = Policy { role: RoleName::new(role), resource, action };
                Some(if kind == RecKind::AddPolicy { LogRecord::AddPolicy(p) } else { LogRecord::RemovePolicy(p) })
            }
            RecKind::AddGrouping | RecKind::RemoveGrouping => {
                let subject = read_str(payload, &mut o)?;
                let role = read_str(payload, &mut o)?;
                let g = Grouping { subject, role: RoleName::new(role) };
                Some(if kind == RecKind::AddGrouping { LogRecord::AddGrouping(g) } else { LogRecord::RemoveGrouping(g) })
            }
        }
    }
}

fn write_str(buf: &mut Vec<u8>, field: &'static str, s: &str) -> RbacResult<()> {
    check_field_len(field, s)?;
    buf.extend_from_slice(&(s.len() as u16).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn read_str(payload: &[u8], o: &mut usize) -> Option<String> {
    let len = u16::from_le_bytes(payload.get(*o..*o + 2)?.try_into().ok()?) as usize;
    *o += 2;
    let s = String::from_utf8(payload.get(*o..*o + len)?.to_vec()).ok()?;
    *o += len;
    Some(s)
}

fn encode_record(rec: &LogRecord) -> RbacResult<Vec<u8>> {
    let payload = rec.payload()?;
    let mut hasher = Crc32::new();
    hasher.update(&payload);
    let crc = hasher.finalize();
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len() + 4);
    buf.extend_from_slice(&MAGIC_LOG.to_le_bytes());
    buf.push(rec.kind() as u8);
    buf.push(VERSION);
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&payload);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// Outcome of scanning a log file.
#[derive(Debug)]
pub struct Replay {
    pub records: Vec<LogRecord>,
    /// Offset just past the last complete record.
    pub valid_len: u64,
    /// Bytes after `valid_len` belonging to a torn record.
    pub torn_bytes: u64,
}

/// Read every record in `path`. Missing file replays as empty.
pub fn replay(path: &Path) -> RbacResult<Replay> {
    let mut f = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Replay { records: Vec::new(), valid_len: 0, torn_bytes: 0 });
        }
        Err(e) => return Err(RbacError::store("open policy log", e)),
    };
    let mut bytes = Vec::new();
    f.read_to_end(&mut bytes).map_err(|e| RbacError::store("read policy log", e))?;
    let corrupt = |offset: usize, reason: &str| RbacError::CorruptLog {
        path: path.display().to_string(),
        offset: offset as u64,
        reason: reason.to_string(),
    };

    let mut records = Vec::new();
    let mut pos = 0usize;
    while pos < bytes.len() {
        if bytes.len() - pos < HEADER_LEN { break; }
        let h = &bytes[pos..pos + HEADER_LEN];
        let magic = u32::from_le_bytes([h[0], h[1], h[2], h[3]]);
        if magic != MAGIC_LOG { return Err(corrupt(pos, "bad magic")); }
        let kind = h[4];
        let len = u32::from_le_bytes([h[8], h[9], h[10], h[11]]) as usize;
        let end = pos + HEADER_LEN + len + 4;
        if end > bytes.len() { break; }
        let payload = &bytes[pos + HEADER_LEN..pos + HEADER_LEN + len];
        let expected = u32::from_le_bytes(bytes[end - 4..end].try_into().unwrap_or([0; 4]));
        let mut hasher = Crc32::new();
        hasher.update(payload);
        if hasher.finalize() != expected { return Err(corrupt(pos, "record crc mismatch")); }
        let kind = RecKind::from_u8(kind).ok_or_else(|| corrupt(pos, "unknown record kind"))?;
        let rec = LogRecord::decode(kind, payload).ok_or_else(|| corrupt(pos, "undecodable payload"))?;
        records.push(rec);
        pos = end;
    }
    Ok(Replay { records, valid_len: pos as u64, torn_bytes: (bytes.len() - pos) as u64 })
}

/// Fold a record stream into the state it describes.
pub fn fold(records: &[LogRecord]) -> PolicySnapshot {
    let mut policies: BTreeSet<Policy> = BTreeSet::new();
    let mut groupings: BTreeSet<Grouping> = BTreeSet::new();
    for r in records {
        match r {
            LogRecord::AddPolicy(p) => { policies.insert(p.clone()); }
            LogRecord::RemovePolicy(p) => { policies.remove(p); }
            LogRecord::AddGrouping(g) => { groupings.insert(g.clone()); }
            LogRecord::RemoveGrouping(g) => { groupings.remove(g); }
        }
    }
    PolicySnapshot { policies: policies.into_iter().collect(), groupings: groupings.into_iter().collect() }
}

/// Writer half of the log. Each append is durable on return.
pub struct PolicyLog {
    file: File,
    path: PathBuf,
    poisoned: bool,
}

impl PolicyLog {
    /// Open (or create) the log, cutting off any torn tail left by a crash.
    pub fn open(path: &Path) -> RbacResult<(Self, PolicySnapshot)> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RbacError::store("create policy dir", e))?;
        }
        let replayed = replay(path)?;
        let mut file = OpenOptions::new().create(true).read(true).write(true).open(path)
            .map_err(|e| RbacError::store("open policy log", e))?;
        if replayed.torn_bytes > 0 {
            warn!(target: "rbac", path = %path.display(), torn_bytes = replayed.torn_bytes, "truncating torn policy log tail");
            file.set_len(replayed.valid_len).map_err(|e| RbacError::store("truncate policy log", e))?;
            file.sync_all().map_err(|e| RbacError::store("sync policy log", e))?;
        }
        file.seek(SeekFrom::End(0)).map_err(|e| RbacError::store("seek policy log", e))?;
        debug!(target: "rbac", path = %path.display(), records = replayed.records.len(), "policy log opened");
        Ok((Self { file, path: path.to_path_buf(), poisoned: false }, fold(&replayed.records)))
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn is_poisoned(&self) -> bool { self.poisoned }

    /// Append one record and fsync it. On failure the file is cut back to
    /// its length before the call, so the next append starts on a record
    /// boundary.
    pub fn append(&mut self, rec: &LogRecord) -> RbacResult<()> {
        if self.poisoned {
            return Err(RbacError::LogPoisoned { path: self.path.display().to_string() });
        }
        let buf = encode_record(rec)?;
        let prev = self.file.stream_position().map_err(|e| RbacError::store("seek policy log", e))?;
        let written = self.file.write_all(&buf).map_err(|e| RbacError::store("append policy log", e))
            .and_then(|_| self.file.flush().map_err(|e| RbacError::store("flush policy log", e)))
            .and_then(|_| self.file.sync_data().map_err(|e| RbacError::store("sync policy log", e)));
        if let Err(err) = written {
            self.rollback(prev);
            return Err(err);
        }
        Ok(())
    }

    /// Truncate to `len` and position the cursor there. Poisons the log if
    /// the file cannot be restored.
    fn rollback(&mut self, len: u64) {
        let restored = self.file.set_len(len)
            .and_then(|_| self.file.seek(SeekFrom::Start(len)).map(|_| ()))
            .and_then(|_| self.file.sync_all());
        match restored {
            Ok(()) => warn!(target: "rbac", path = %self.path.display(), len, "rolled back failed policy log append"),
            Err(e) => {
                self.poisoned = true;
                error!(target: "rbac", path = %self.path.display(), len, error = %e, "policy log rollback failed; refusing further appends");
            }
        }
    }

    /// Rewrite the log as the Add records of `snapshot` and swap it in
    /// atomically via rename.
    pub fn compact(&mut self, snapshot: &PolicySnapshot) -> RbacResult<()> {
        let tmp = self.path.with_extension("log.compact");
        {
            let mut f = File::create(&tmp).map_err(|e| RbacError::store("create compacted log", e))?;
            let mut buf = Vec::new();
            for p in &snapshot.policies { buf.extend(encode_record(&LogRecord::AddPolicy(p.clone()))?); }
            for g in &snapshot.groupings { buf.extend(encode_record(&LogRecord::AddGrouping(g.clone()))?); }
            f.write_all(&buf).map_err(|e| RbacError::store("write compacted log", e))?;
            f.sync_all().map_err(|e| RbacError::store("sync compacted log", e))?;
        }
        std::fs::rename(&tmp, &self.path).map_err(|e| RbacError::store("swap compacted log", e))?;
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)
            .map_err(|e| RbacError::store("reopen policy log", e))?;
        file.seek(SeekFrom::End(0)).map_err(|e| RbacError::store("seek policy log", e))?;
        self.file = file;
        self.poisoned = false;
        debug!(target: "rbac", policies = snapshot.policies.len(), groupings = snapshot.groupings.len(), "policy log compacted");
        Ok(())
    }
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod log_tests;
