use once_cell::sync::Lazy;
use regex::Regex;

/// Lines longer than this are cut (on a char boundary) before any rule runs.
pub const MAX_LINE_BYTES: usize = 16 * 1024;

static RE_SYSLOG_PREFIX: Lazy<Regex> = Lazy::new(|| {
    // Jan 15 10:30:46 myhost sshd[12345]: ...
    Regex::new(r"^[A-Z][a-z]{2}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}\s+[^ ]+\s+[^:]+:\s*").unwrap()
});

static RE_ISO_PREFIX: Lazy<Regex> = Lazy::new(|| {
    // 2024-01-15T10:30:45.123+00:00 / 2024-01-15T10:30:00Z
    Regex::new(r"^\d{4}-\d{2}-\d{2}T[\d:.+\-]+Z?\s*").unwrap()
});

static RE_UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b").unwrap()
});

static RE_HASH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{32,64}\b").unwrap()
});

static RE_IPV4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap()
});

static RE_MAC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:[0-9a-f]{2}:){5}[0-9a-f]{2}\b").unwrap()
});

static RE_HEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b0x[0-9a-f]+\b").unwrap()
});

static RE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:/[A-Za-z0-9._\-]+)+").unwrap()
});

static RE_INT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d+\b").unwrap()
});

static RE_WS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+").unwrap()
});

/// Reduce a raw log line to its pattern text.
///
/// Returns an empty string for blank input; callers drop those lines.
/// Rules run in a fixed order: specific shapes (UUID, long hashes, addresses)
/// are consumed whole before the generic integer rule can split them.
pub fn normalize_line(raw: &str) -> String {
    let line = truncate_to_boundary(raw.trim(), MAX_LINE_BYTES).trim_end();
    if line.is_empty() {
        return String::new();
    }

    let s = RE_SYSLOG_PREFIX.replace(line, "");
    let s = RE_ISO_PREFIX.replace(&s, "");

    let s = RE_UUID.replace_all(&s, "<UUID>");
    let s = RE_HASH.replace_all(&s, "<HASH>");
    let s = RE_IPV4.replace_all(&s, "<IP>");
    let s = RE_MAC.replace_all(&s, "<MAC>");
    let s = RE_HEX.replace_all(&s, "<HEX>");
    // Paths before integers so numeric segments stay inside <PATH>
    let s = RE_PATH.replace_all(&s, "<PATH>");
    let s = RE_INT.replace_all(&s, "<N>");

    RE_WS.replace_all(&s, " ").trim().to_string()
}

fn truncate_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "é".repeat(10);
        let t = truncate_to_boundary(&s, 5);
        assert_eq!(t, "éé");
        assert_eq!(truncate_to_boundary("short", 100), "short");
    }

    #[test]
    fn oversized_line_is_capped_before_rules() {
        let raw = format!("boom {}", "x".repeat(MAX_LINE_BYTES * 2));
        let out = normalize_line(&raw);
        assert!(out.len() <= MAX_LINE_BYTES);
        assert!(out.starts_with("boom "));
    }
}
