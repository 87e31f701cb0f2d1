use logscout::baseline::BaselineState;
use logscout::clock::{fmt_local_ts, FixedClock};
use logscout::cluster::{cluster, Window, WindowPattern};
use logscout::report::{build_report, format_alert_message, render_text, to_json, ReportFilters, ReportRequest, Tag};
use logscout::severity::Severity;
use logscout::store::PatternStore;
use tempfile::TempDir;

fn wp(id: &str, pattern: &str, count: usize, severity: Severity, sample: &str) -> WindowPattern {
    WindowPattern { id: id.into(), pattern: pattern.into(), severity, count, sample: sample.into() }
}

fn request() -> ReportRequest {
    ReportRequest { source: "test".into(), since: "1h".into(), lines_limit: 100 }
}

fn setup() -> (TempDir, PatternStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = PatternStore::new(dir.path().join("patterns.db"));
    (dir, store)
}

const NO_BASELINE: BaselineState = BaselineState { suppress_until: 0 };

#[test]
fn first_sighting_new_then_seen() {
    let (_dir, store) = setup();
    let window: Window = vec![wp("h1", "pat <N>", 2, Severity::Info, "pat 1")].into_iter().collect();

    let first = build_report(&window, &store, &NO_BASELINE, &request(), ReportFilters::default(), &FixedClock(100)).unwrap();
    assert_eq!(first.report.items.len(), 1);
    assert_eq!(first.report.items[0].tag, Tag::New);
    assert_eq!(first.report.items[0].total_seen, 2);
    assert_eq!(first.alerts.len(), 1);

    let second = build_report(&window, &store, &NO_BASELINE, &request(), ReportFilters::default(), &FixedClock(200)).unwrap();
    assert_eq!(second.report.items[0].tag, Tag::Seen);
    assert_eq!(second.report.items[0].total_seen, 4);
    assert_eq!(second.report.items[0].count_window, 2);
    assert!(second.alerts.is_empty());
}

#[test]
fn store_bookkeeping_across_runs() {
    let (_dir, store) = setup();
    let run1: Window = vec![wp("h1", "pat <N>", 3, Severity::Info, "pat 1")].into_iter().collect();
    build_report(&run1, &store, &NO_BASELINE, &request(), ReportFilters::default(), &FixedClock(100)).unwrap();

    let rec = &store.load().unwrap()["h1"];
    assert_eq!((rec.first_seen, rec.last_seen, rec.total_seen), (100, 100, 3));
    assert_eq!(rec.sample, "pat 1");

    let run2: Window = vec![wp("h1", "pat <N> v2", 1, Severity::Error, "pat 99")].into_iter().collect();
    build_report(&run2, &store, &NO_BASELINE, &request(), ReportFilters::default(), &FixedClock(250)).unwrap();

    let rec = &store.load().unwrap()["h1"];
    assert_eq!(rec.first_seen, 100);
    assert_eq!(rec.last_seen, 250);
    assert_eq!(rec.total_seen, 4);
    assert_eq!(rec.severity, Severity::Error);
    assert_eq!(rec.pattern, "pat <N> v2");
    assert_eq!(rec.sample, "pat 1");
}

#[test]
fn items_sorted_by_window_count_desc() {
    let (_dir, store) = setup();
    let window: Window = vec![
        wp("a", "a", 1, Severity::Info, "a"),
        wp("b", "b", 5, Severity::Info, "b"),
        wp("c", "c", 3, Severity::Info, "c"),
    ]
    .into_iter()
    .collect();
    let out = build_report(&window, &store, &NO_BASELINE, &request(), ReportFilters::default(), &FixedClock(1)).unwrap();
    let counts: Vec<usize> = out.report.items.iter().map(|i| i.count_window).collect();
    assert_eq!(counts, vec![5, 3, 1]);
}

#[test]
fn min_severity_hides_but_still_persists() {
    let (_dir, store) = setup();
    let window: Window = vec![
        wp("h1", "info msg", 1, Severity::Info, "info msg"),
        wp("h2", "error msg", 1, Severity::Error, "error msg"),
    ]
    .into_iter()
    .collect();
    let filters = ReportFilters { min_severity: Severity::Error, new_only: false };
    let out = build_report(&window, &store, &NO_BASELINE, &request(), filters, &FixedClock(1)).unwrap();
    assert_eq!(out.report.items.len(), 1);
    assert_eq!(out.report.items[0].hash, "h2");
    assert_eq!(out.alerts.len(), 1);

    let records = store.load().unwrap();
    assert!(records.contains_key("h1"));
    assert!(records.contains_key("h2"));
}

#[test]
fn new_only_hides_seen_but_counts_accumulate() {
    let (_dir, store) = setup();
    let window: Window = vec![wp("h1", "pat <N>", 1, Severity::Info, "pat 1")].into_iter().collect();
    build_report(&window, &store, &NO_BASELINE, &request(), ReportFilters::default(), &FixedClock(1)).unwrap();

    let filters = ReportFilters { min_severity: Severity::Info, new_only: true };
    let out = build_report(&window, &store, &NO_BASELINE, &request(), filters, &FixedClock(2)).unwrap();
    assert!(out.report.items.is_empty());
    let rec = &store.load().unwrap()["h1"];
    assert_eq!(rec.total_seen, 2);
    assert_eq!(rec.last_seen, 2);
}

#[test]
fn filters_never_change_what_is_persisted() {
    let window = cluster([
        "ERROR db 1 down",
        "user 1 login",
        "user 2 login",
        "warn: slow query 7ms",
    ]);
    let (_d1, plain) = setup();
    let (_d2, filtered) = setup();
    let strict = ReportFilters { min_severity: Severity::Error, new_only: true };
    for (store, filters) in [(&plain, ReportFilters::default()), (&filtered, strict)] {
        build_report(&window, store, &NO_BASELINE, &request(), filters, &FixedClock(10)).unwrap();
        build_report(&window, store, &NO_BASELINE, &request(), filters, &FixedClock(20)).unwrap();
    }
    assert_eq!(plain.load().unwrap(), filtered.load().unwrap());
}

#[test]
fn baseline_suppresses_alerts_not_tags() {
    let (_dir, store) = setup();
    let window: Window = vec![wp("h1", "boom", 1, Severity::Error, "boom")].into_iter().collect();
    let baseline = BaselineState { suppress_until: 1_000 };
    let out = build_report(&window, &store, &baseline, &request(), ReportFilters::default(), &FixedClock(999)).unwrap();
    assert!(out.report.baseline_active);
    assert_eq!(out.report.baseline_until, 1_000);
    assert_eq!(out.report.items[0].tag, Tag::New);
    assert!(out.alerts.is_empty());
}

#[test]
fn baseline_expiry_is_exclusive() {
    let (_dir, store) = setup();
    let window: Window = vec![wp("h1", "boom", 1, Severity::Error, "boom")].into_iter().collect();
    let baseline = BaselineState { suppress_until: 1_000 };
    let out = build_report(&window, &store, &baseline, &request(), ReportFilters::default(), &FixedClock(1_000)).unwrap();
    assert!(!out.report.baseline_active);
    assert_eq!(out.alerts.len(), 1);
}

#[test]
fn report_header_fields() {
    let (_dir, store) = setup();
    let out = build_report(&Window::new(), &store, &NO_BASELINE, &request(), ReportFilters::default(), &FixedClock(77)).unwrap();
    let r = &out.report;
    assert_eq!(r.source, "test");
    assert_eq!(r.since, "1h");
    assert_eq!(r.lines_limit, 100);
    assert_eq!(r.generated_at, 77);
    assert_eq!(r.state_db, store.path().display().to_string());
    assert!(r.items.is_empty());
}

#[test]
fn json_uses_documented_field_names() {
    let (_dir, store) = setup();
    let window: Window = vec![wp("h1", "pat <N>", 2, Severity::Warn, "pat 1")].into_iter().collect();
    let out = build_report(&window, &store, &NO_BASELINE, &request(), ReportFilters::default(), &FixedClock(5)).unwrap();
    let v: serde_json::Value = serde_json::from_str(&to_json(&out.report).unwrap()).unwrap();
    for key in ["source", "since", "lines_limit", "state_db", "baseline_active", "baseline_until", "generated_at", "items"] {
        assert!(v.get(key).is_some(), "missing {}", key);
    }
    let item = &v["items"][0];
    assert_eq!(item["tag"], "NEW");
    assert_eq!(item["count_window"], 2);
    assert_eq!(item["total_seen"], 2);
    assert_eq!(item["severity"], "WARN");
    assert_eq!(item["pattern"], "pat <N>");
    assert_eq!(item["sample"], "pat 1");
    assert_eq!(item["hash"], "h1");
}

#[test]
fn text_report_lines() {
    let (_dir, store) = setup();
    let window: Window = vec![wp("h1", "pat <N>", 2, Severity::Warn, "pat 1")].into_iter().collect();
    let out = build_report(&window, &store, &NO_BASELINE, &request(), ReportFilters::default(), &FixedClock(5)).unwrap();
    let text = render_text(&out.report, true);
    assert!(text.contains("Source: test | since=1h | lines<=100"));
    assert!(text.contains("[NEW][WARN] x2     total=2        pat <N>"));
    assert!(text.contains("  sample: pat 1"));
    assert!(!text.contains("Baseline: ACTIVE"));

    let empty = build_report(&Window::new(), &store, &NO_BASELINE, &request(), ReportFilters::default(), &FixedClock(6)).unwrap();
    assert!(render_text(&empty.report, false).contains("No patterns to show."));
}

#[test]
fn text_report_shows_active_baseline() {
    let (_dir, store) = setup();
    let window: Window = vec![wp("h1", "boom", 1, Severity::Error, "boom")].into_iter().collect();
    let baseline = BaselineState { suppress_until: 1_700_000_000 };
    let out = build_report(&window, &store, &baseline, &request(), ReportFilters::default(), &FixedClock(1_600_000_000)).unwrap();
    let text = render_text(&out.report, false);
    let banner = format!("Baseline: ACTIVE (learning) until {}", fmt_local_ts(1_700_000_000));
    assert!(text.contains(&banner), "{}", text);
    assert!(text.contains("[NEW][ERROR] x1"));
}

#[test]
fn alert_message_truncates() {
    let (_dir, store) = setup();
    let window: Window = (0..12)
        .map(|i| wp(&format!("h{}", i), &format!("pattern {}", i), 12 - i, Severity::Error, &format!("raw {}", i)))
        .collect();
    let out = build_report(&window, &store, &NO_BASELINE, &request(), ReportFilters::default(), &FixedClock(5)).unwrap();
    assert_eq!(out.alerts.len(), 12);
    let msg = format_alert_message(&out.report, &out.alerts, 10);
    assert!(msg.starts_with("logscout ALERT (12 new patterns)\nSource: test | since=1h\n"));
    assert!(msg.contains("[NEW][ERROR] x12  pattern 0\nsample: raw 0\n"));
    assert!(!msg.contains("pattern 10"));
    assert!(msg.ends_with("...and 2 more.\n"));
}
