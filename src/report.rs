use crate::baseline::BaselineState;
use crate::clock::{fmt_local_ts, Clock};
use crate::cluster::{Window, WindowPattern};
use crate::severity::Severity;
use crate::store::{PatternMap, PatternRecord, PatternStore, StoreError};
use itertools::Itertools;
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tag {
    New,
    Seen,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::New => "NEW",
            Tag::Seen => "SEEN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportItem {
    pub tag: Tag,
    pub count_window: usize,
    pub total_seen: u64,
    pub severity: Severity,
    pub pattern: String,
    pub sample: String,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub source: String,
    pub since: String,
    pub lines_limit: usize,
    pub state_db: String,
    pub baseline_active: bool,
    pub baseline_until: i64,
    pub generated_at: i64,
    pub items: Vec<ReportItem>,
}

/// What the run was asked to look at; copied into the report header.
#[derive(Debug, Clone, Default)]
pub struct ReportRequest {
    pub source: String,
    pub since: String,
    pub lines_limit: usize,
}

/// Narrow what the report shows. Never affects what is persisted.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportFilters {
    pub min_severity: Severity,
    pub new_only: bool,
}

#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub report: Report,
    /// NEW items outside the baseline window, in report order.
    pub alerts: Vec<ReportItem>,
}

/// Diff a window against history, persist the merge, and build the report.
///
/// The whole batch is merged inside a single [`PatternStore::update`], so
/// concurrent runs cannot drop each other's counts.
pub fn build_report(
    window: &Window,
    store: &PatternStore,
    baseline: &BaselineState,
    request: &ReportRequest,
    filters: ReportFilters,
    clock: &dyn Clock,
) -> Result<BuildOutcome, StoreError> {
    let now = clock.now();
    let baseline_active = baseline.is_active(now);

    let ordered: Vec<&WindowPattern> = window
        .iter()
        .sorted_by(|a, b| b.count.cmp(&a.count))
        .collect();

    let (items, alerts) = store.update(|records| {
        let mut items = Vec::new();
        let mut alerts = Vec::new();
        for w in &ordered {
            let is_new = !records.contains_key(&w.id);
            let rec = merge_observation(records, w, now);
            let total_seen = rec.total_seen;

            if w.severity < filters.min_severity {
                continue;
            }
            if filters.new_only && !is_new {
                continue;
            }

            let item = ReportItem {
                tag: if is_new { Tag::New } else { Tag::Seen },
                count_window: w.count,
                total_seen,
                severity: w.severity,
                pattern: w.pattern.clone(),
                sample: w.sample.clone(),
                hash: w.id.clone(),
            };
            if is_new && !baseline_active {
                alerts.push(item.clone());
            }
            items.push(item);
        }
        (items, alerts)
    })?;

    let new_count = items.iter().filter(|i| i.tag == Tag::New).count();
    tracing::info!(
        patterns = window.len(),
        reported = items.len(),
        new = new_count,
        alerts = alerts.len(),
        baseline_active,
        "report built"
    );

    let report = Report {
        source: request.source.clone(),
        since: request.since.clone(),
        lines_limit: request.lines_limit,
        state_db: store.path().display().to_string(),
        baseline_active,
        baseline_until: baseline.suppress_until,
        generated_at: now,
        items,
    };
    Ok(BuildOutcome { report, alerts })
}

// First sighting creates the record; later ones bump counters, refresh the
// classification and pattern text, and keep the original sample.
fn merge_observation<'a>(
    records: &'a mut PatternMap,
    w: &WindowPattern,
    now: i64,
) -> &'a PatternRecord {
    let count = w.count as u64;
    records
        .entry(w.id.clone())
        .and_modify(|r| {
            r.last_seen = now.max(r.first_seen);
            r.total_seen = r.total_seen.saturating_add(count);
            r.severity = w.severity;
            r.pattern = w.pattern.clone();
            if r.sample.is_empty() {
                r.sample = w.sample.clone();
            }
        })
        .or_insert_with(|| PatternRecord {
            id: w.id.clone(),
            first_seen: now,
            last_seen: now,
            total_seen: count,
            severity: w.severity,
            pattern: w.pattern.clone(),
            sample: w.sample.clone(),
        })
}

pub fn to_json(report: &Report) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

pub fn render_text(report: &Report, show_samples: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n=== logscout report ===");
    let _ = writeln!(out, "Source: {} | since={} | lines<={}", report.source, report.since, report.lines_limit);
    let _ = writeln!(out, "State: {}", report.state_db);
    if report.baseline_active {
        let _ = writeln!(out, "Baseline: ACTIVE (learning) until {}", fmt_local_ts(report.baseline_until));
    }
    out.push('\n');

    if report.items.is_empty() {
        out.push_str("No patterns to show.\n");
    } else {
        for it in &report.items {
            let _ = writeln!(
                out,
                "[{}][{}] x{:<5} total={:<7}  {}",
                it.tag.as_str(), it.severity, it.count_window, it.total_seen, it.pattern
            );
            if show_samples {
                let _ = writeln!(out, "  sample: {}", it.sample);
            }
        }
    }
    out.push_str("\nTip: use --show-new to only display never-seen patterns.\n");
    out
}

pub const DEFAULT_ALERT_ITEMS: usize = 10;

/// Plain-text body handed to every notification channel.
pub fn format_alert_message(report: &Report, alerts: &[ReportItem], max_items: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "logscout ALERT ({} new patterns)", alerts.len());
    let _ = writeln!(out, "Source: {} | since={}", report.source, report.since);
    out.push('\n');
    for it in alerts.iter().take(max_items) {
        let _ = writeln!(out, "[NEW][{}] x{}  {}", it.severity, it.count_window, it.pattern);
        let _ = writeln!(out, "sample: {}", it.sample);
        out.push('\n');
    }
    if alerts.len() > max_items {
        let _ = writeln!(out, "...and {} more.", alerts.len() - max_items);
    }
    let mut msg = out.trim_end().to_string();
    msg.push('\n');
    msg
}
