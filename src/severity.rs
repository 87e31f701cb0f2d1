use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[default]
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INFO" => Ok(Severity::Info),
            "WARN" | "WARNING" => Ok(Severity::Warn),
            "ERROR" => Ok(Severity::Error),
            other => Err(format!("unknown severity '{}' (expected INFO, WARN or ERROR)", other)),
        }
    }
}

const ERROR_HINTS: &[&str] = &[
    "error",
    "fatal",
    "exception",
    "traceback",
    "panic",
    "segfault",
    "failed",
    "failure",
    "critical",
];

const WARN_HINTS: &[&str] = &[
    "warn",
    "warning",
    "timeout",
    "timed out",
    "retry",
    "throttle",
    "rate limit",
    "deprecated",
    "slow",
    "unavailable",
];

// Checked top to bottom; first table with a hit wins.
const RULES: &[(Severity, &[&str])] = &[
    (Severity::Error, ERROR_HINTS),
    (Severity::Warn, WARN_HINTS),
];

/// Keyword scan over the lowercased text. ERROR beats WARN; no hit is INFO.
pub fn classify(text: &str) -> Severity {
    let t = text.to_lowercase();
    RULES
        .iter()
        .find(|(_, hints)| hints.iter().any(|h| t.contains(h)))
        .map(|(sev, _)| *sev)
        .unwrap_or(Severity::Info)
}
