use std::path::PathBuf;

pub const APP_NAME: &str = "logscout";
pub const PATTERN_DB_FILE: &str = "patterns.db";
pub const BASELINE_FILE: &str = "baseline.json";

/// `$XDG_STATE_HOME/logscout`, falling back to `~/.local/state/logscout`,
/// then to a relative `.logscout` when no home directory is known.
pub fn default_state_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("XDG_STATE_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(dir).join(APP_NAME);
    }
    dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("state")))
        .map(|d| d.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from(format!(".{}", APP_NAME)))
}

pub fn default_pattern_db() -> PathBuf {
    default_state_dir().join(PATTERN_DB_FILE)
}

pub fn default_baseline_file() -> PathBuf {
    default_state_dir().join(BASELINE_FILE)
}
