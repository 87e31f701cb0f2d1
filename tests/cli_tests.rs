use std::fs;
use std::process::Command;

fn logscout() -> Command {
    Command::new(env!("CARGO_BIN_EXE_logscout"))
}

#[test]
fn json_output_stays_parseable_with_baseline_learn() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("app.log");
    fs::write(&log, "ERROR db 1 down\nuser 7 login\n").unwrap();

    let out = logscout()
        .arg("--file")
        .arg(&log)
        .arg("--json")
        .args(["--baseline-learn", "1h"])
        .arg("--state-db")
        .arg(dir.path().join("patterns.db"))
        .arg("--baseline-state")
        .arg(dir.path().join("baseline.json"))
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["baseline_active"], true);
    assert_eq!(report["items"].as_array().unwrap().len(), 2);
    assert!(String::from_utf8_lossy(&out.stderr).contains("Baseline learning enabled until"));
}

#[test]
fn malformed_store_exits_with_three() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("app.log");
    fs::write(&log, "hello\n").unwrap();
    let db = dir.path().join("patterns.db");
    fs::write(&db, "# header\nnot a record\n").unwrap();

    let out = logscout()
        .arg("--file")
        .arg(&log)
        .arg("--state-db")
        .arg(&db)
        .arg("--baseline-state")
        .arg(dir.path().join("baseline.json"))
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(3));
}
