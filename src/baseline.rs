//! Baseline learning window.
//!
//! While `now < suppress_until` every run still records history but no
//! alert fires. The file is advisory: a missing or unreadable file means
//! "no suppression" rather than a failed run.

use crate::clock::Clock;
use crate::lock::{LockMode, DEFAULT_LOCK_TIMEOUT};
use crate::store::{lock_sidecar, remove_if_exists, replace_file, sidecar, StoreError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineState {
    #[serde(default, alias = "baseline_until")]
    pub suppress_until: i64,
}

impl BaselineState {
    /// Strictly before the expiry; zero never suppresses.
    pub fn is_active(&self, now: i64) -> bool {
        now < self.suppress_until
    }
}

#[derive(Debug, Clone)]
pub struct BaselineFile {
    path: PathBuf,
    lock_timeout: Duration,
}

impl BaselineFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock_timeout: DEFAULT_LOCK_TIMEOUT }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Never fails: anything short of a readable, well-formed file yields the
    /// zero state.
    pub fn load(&self) -> BaselineState {
        match self.try_load() {
            Ok(Some(state)) => state,
            Ok(None) => BaselineState::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable baseline state");
                BaselineState::default()
            }
        }
    }

    fn try_load(&self) -> Result<Option<BaselineState>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let _lock = lock_sidecar(&self.path, LockMode::Shared, self.lock_timeout)?;
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    pub fn save(&self, state: &BaselineState) -> Result<(), StoreError> {
        let mut body = serde_json::to_string_pretty(state)?;
        body.push('\n');
        let _lock = lock_sidecar(&self.path, LockMode::Exclusive, self.lock_timeout)?;
        replace_file(&self.path, body.as_bytes())
    }

    pub fn reset(&self) -> Result<(), StoreError> {
        remove_if_exists(&self.path)?;
        remove_if_exists(&sidecar(&self.path, "tmp"))
    }

    /// Start (or restart) suppression for `seconds` from now. Overwrites any
    /// previous window instead of extending it. Returns the new expiry.
    pub fn enable(&self, seconds: u64, clock: &dyn Clock) -> Result<i64, StoreError> {
        let secs = i64::try_from(seconds).unwrap_or(i64::MAX);
        let until = clock.now().saturating_add(secs);
        self.save(&BaselineState { suppress_until: until })?;
        tracing::info!(path = %self.path.display(), suppress_until = until, "baseline learning enabled");
        Ok(until)
    }
}

#[derive(Debug, Error)]
#[error("invalid duration '{0}': use e.g. \"30s\", \"30m\", \"2h\", \"1d\"")]
pub struct DurationError(pub String);

static RE_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)\s*([smhd])$").unwrap()
});

/// `"<n><s|m|h|d>"` to seconds. Case-insensitive, surrounding space ignored.
pub fn parse_duration(s: &str) -> Result<u64, DurationError> {
    let lowered = s.trim().to_lowercase();
    let caps = RE_DURATION
        .captures(&lowered)
        .ok_or_else(|| DurationError(s.to_string()))?;
    let n: u64 = caps[1].parse().map_err(|_| DurationError(s.to_string()))?;
    let mult = match &caps[2] {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => 86_400,
    };
    n.checked_mul(mult).ok_or_else(|| DurationError(s.to_string()))
}
