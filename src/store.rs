//! Durable pattern history.
//!
//! One UTF-8 text file: a `#` header line, then one record per line with the
//! seven fields `id|first_seen|last_seen|total_seen|severity|pattern|sample`.
//! Inside a field, backslash, newline, carriage return and `|` are written as
//! `\\`, `\n`, `\r` and `\|`, so a record can never span lines. Text without
//! those characters is stored verbatim.
//!
//! Readers take a shared lock, writers an exclusive one, both on the
//! `<path>.lock` sidecar. [`PatternStore::update`] holds the exclusive lock
//! across load, merge and save. Saves write `<path>.tmp` and rename it into
//! place, so a failed write never leaves a truncated store behind.

use crate::lock::{LockMode, LockedFile, DEFAULT_LOCK_TIMEOUT};
use crate::severity::Severity;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const STORE_HEADER: &str = "# logscout pattern store v1: id|first_seen|last_seen|total_seen|severity|pattern|sample";

const FIELD_COUNT: usize = 7;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed store {} at line {line}: {reason}", path.display())]
    Malformed { path: PathBuf, line: usize, reason: String },
    #[error("timed out after {}ms waiting for lock on {}", waited.as_millis(), path.display())]
    LockTimeout { path: PathBuf, waited: Duration },
    #[error("state encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io { path: path.to_path_buf(), source }
    }

    /// Contention is the only failure worth retrying from the outside.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::LockTimeout { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternRecord {
    pub id: String,
    pub first_seen: i64,
    pub last_seen: i64,
    pub total_seen: u64,
    pub severity: Severity,
    pub pattern: String,
    pub sample: String,
}

/// Records keyed by id; sorted so saved files diff cleanly.
pub type PatternMap = BTreeMap<String, PatternRecord>;

#[derive(Debug, Clone)]
pub struct PatternStore {
    path: PathBuf,
    lock_timeout: Duration,
}

impl PatternStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock_timeout: DEFAULT_LOCK_TIMEOUT }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Read the whole store under a shared lock. A missing file is empty history.
    pub fn load(&self) -> Result<PatternMap, StoreError> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "pattern store absent; starting empty");
            return Ok(PatternMap::new());
        }
        let _lock = lock_sidecar(&self.path, LockMode::Shared, self.lock_timeout)?;
        self.read_current()
    }

    /// Replace the store contents under an exclusive lock.
    pub fn save(&self, records: &PatternMap) -> Result<(), StoreError> {
        let _lock = lock_sidecar(&self.path, LockMode::Exclusive, self.lock_timeout)?;
        self.write_current(records)
    }

    /// Load, hand the records to `merge`, and save, all under one exclusive lock.
    pub fn update<T, F>(&self, merge: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut PatternMap) -> T,
    {
        let _lock = lock_sidecar(&self.path, LockMode::Exclusive, self.lock_timeout)?;
        let mut records = self.read_current()?;
        let out = merge(&mut records);
        self.write_current(&records)?;
        Ok(out)
    }

    /// Delete the store file and any half-written replacement. Absence is fine.
    pub fn reset(&self) -> Result<(), StoreError> {
        remove_if_exists(&self.path)?;
        remove_if_exists(&sidecar(&self.path, "tmp"))
    }

    /// File that carries the advisory lock. It outlives every rewrite of the store.
    pub fn lock_path(&self) -> PathBuf {
        sidecar(&self.path, "lock")
    }

    fn read_current(&self) -> Result<PatternMap, StoreError> {
        let buf = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(PatternMap::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };
        let text = String::from_utf8(buf).map_err(|e| StoreError::Malformed {
            path: self.path.clone(),
            line: 0,
            reason: format!("not valid UTF-8: {}", e),
        })?;
        let records = parse_store(&text).map_err(|(line, reason)| StoreError::Malformed {
            path: self.path.clone(),
            line,
            reason,
        })?;
        tracing::debug!(path = %self.path.display(), records = records.len(), "loaded pattern store");
        Ok(records)
    }

    fn write_current(&self, records: &PatternMap) -> Result<(), StoreError> {
        replace_file(&self.path, render_store(records).as_bytes())?;
        tracing::debug!(path = %self.path.display(), records = records.len(), "saved pattern store");
        Ok(())
    }
}

/// `<path>.<ext>`, next to `path`.
pub(crate) fn sidecar(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Lock `<path>.lock` rather than `path` itself, since `path` is replaced by rename.
pub(crate) fn lock_sidecar(path: &Path, mode: LockMode, timeout: Duration) -> Result<LockedFile, StoreError> {
    ensure_parent(path)?;
    let lock_path = sidecar(path, "lock");
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| StoreError::io(&lock_path, e))?;
    LockedFile::acquire(file, mode, path, timeout)
}

/// Write `<path>.tmp`, sync it, and rename it over `path`. On any failure
/// `path` keeps its previous contents.
pub(crate) fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = sidecar(path, "tmp");
    let written = write_synced(&tmp, bytes).and_then(|()| fs::rename(&tmp, path));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::io(path, e));
    }
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_data()
}

pub(crate) fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))
        }
        _ => Ok(()),
    }
}

pub(crate) fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Serialize a record set, header first.
pub fn render_store(records: &PatternMap) -> String {
    let mut out = String::with_capacity(STORE_HEADER.len() + 1 + records.len() * 128);
    out.push_str(STORE_HEADER);
    out.push('\n');
    for rec in records.values() {
        out.push_str(&encode_record(rec));
        out.push('\n');
    }
    out
}

/// Parse store text. Errors carry the 1-based line number.
pub fn parse_store(text: &str) -> Result<PatternMap, (usize, String)> {
    let mut records = PatternMap::new();
    for (idx, line) in text.lines().enumerate() {
        let lineno = idx + 1;
        if idx == 0 && line.starts_with('#') {
            continue;
        }
        let rec = decode_record(line).map_err(|reason| (lineno, reason))?;
        if records.contains_key(&rec.id) {
            return Err((lineno, format!("duplicate id {}", rec.id)));
        }
        records.insert(rec.id.clone(), rec);
    }
    Ok(records)
}

pub fn encode_record(rec: &PatternRecord) -> String {
    format!(
        "{}|{}|{}|{}|{}|{}|{}",
        escape_field(&rec.id),
        rec.first_seen,
        rec.last_seen,
        rec.total_seen,
        rec.severity,
        escape_field(&rec.pattern),
        escape_field(&rec.sample),
    )
}

pub fn decode_record(line: &str) -> Result<PatternRecord, String> {
    let fields = split_fields(line);
    if fields.len() != FIELD_COUNT {
        return Err(format!("expected {} fields, found {}", FIELD_COUNT, fields.len()));
    }
    let mut it = fields.into_iter();
    let mut next = || it.next().unwrap_or_default();

    let id = next();
    if id.is_empty() {
        return Err("empty id".into());
    }
    let first_seen: i64 = parse_num(&next(), "first_seen")?;
    let last_seen: i64 = parse_num(&next(), "last_seen")?;
    let total_seen: u64 = parse_num(&next(), "total_seen")?;
    let severity: Severity = next().parse()?;
    let pattern = next();
    let sample = next();

    if first_seen > last_seen {
        return Err(format!("first_seen {} is after last_seen {}", first_seen, last_seen));
    }
    Ok(PatternRecord { id, first_seen, last_seen, total_seen, severity, pattern, sample })
}

fn parse_num<T: std::str::FromStr>(s: &str, field: &str) -> Result<T, String> {
    s.parse().map_err(|_| format!("{} is not a number: '{}'", field, s))
}

fn escape_field(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '|' => out.push_str("\\|"),
            c => out.push(c),
        }
    }
    out
}

// Splits on unescaped `|` and unescapes each field. Unknown escapes are kept
// as written so files from writers that only escape newlines still load.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::with_capacity(FIELD_COUNT);
    let mut cur = String::new();
    let mut chars = line.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '|' => fields.push(std::mem::take(&mut cur)),
            '\\' => match chars.next() {
                Some('n') => cur.push('\n'),
                Some('r') => cur.push('\r'),
                Some('\\') => cur.push('\\'),
                Some('|') => cur.push('|'),
                Some(other) => {
                    cur.push('\\');
                    cur.push(other);
                }
                None => cur.push('\\'),
            },
            c => cur.push(c),
        }
    }
    fields.push(cur);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(pattern: &str, sample: &str) -> PatternRecord {
        PatternRecord {
            id: "abc".into(),
            first_seen: 10,
            last_seen: 20,
            total_seen: 3,
            severity: Severity::Warn,
            pattern: pattern.into(),
            sample: sample.into(),
        }
    }

    #[test]
    fn plain_record_is_written_verbatim() {
        let line = encode_record(&rec("conn <IP> slow", "conn 1.2.3.4 slow"));
        assert_eq!(line, "abc|10|20|3|WARN|conn <IP> slow|conn 1.2.3.4 slow");
    }

    #[test]
    fn special_characters_never_break_the_line() {
        let r = rec("a|b\\c", "line one\nline two\r\n|end");
        let line = encode_record(&r);
        assert!(!line.contains('\n'));
        assert_eq!(split_fields(&line).len(), FIELD_COUNT);
        assert_eq!(decode_record(&line).unwrap(), r);
    }

    #[test]
    fn unknown_escape_is_kept_literally() {
        let r = decode_record(r"abc|1|1|1|INFO|C:\temp\x|s").unwrap();
        assert_eq!(r.pattern, r"C:\temp\x");
    }

    #[test]
    fn rejects_wrong_field_count() {
        let err = decode_record("abc|1|2|3|INFO|only six").unwrap_err();
        assert!(err.contains("expected 7 fields"));
    }

    #[test]
    fn rejects_bad_numbers_and_severity() {
        assert!(decode_record("abc|x|2|3|INFO|p|s").is_err());
        assert!(decode_record("abc|1|2|-3|INFO|p|s").is_err());
        assert!(decode_record("abc|1|2|3|LOUD|p|s").is_err());
        assert!(decode_record("abc|5|2|3|INFO|p|s").is_err());
    }

    #[test]
    fn header_only_on_first_line() {
        let text = format!("{}\n# stray comment\n", STORE_HEADER);
        let (line, _) = parse_store(&text).unwrap_err();
        assert_eq!(line, 2);
        assert!(parse_store("").unwrap().is_empty());
    }
}
