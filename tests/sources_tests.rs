use logscout::sources::{tail_lines, ComposeSource, DockerSource, FileSource, JournalSource, LogSource, SourceError};
use std::fs;

#[test]
fn file_source_keeps_last_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    fs::write(&path, "one\ntwo\nthree\nfour\n").unwrap();
    let src = FileSource { path: path.clone(), limit: 2 };
    assert_eq!(src.read_lines().unwrap(), vec!["three", "four"]);
    assert_eq!(src.describe(), format!("file:{}", path.display()));
}

#[test]
fn file_source_tolerates_invalid_utf8() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bin.log");
    fs::write(&path, b"ok line\n\xff\xfe broken\n").unwrap();
    let lines = FileSource { path, limit: 10 }.read_lines().unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].ends_with(" broken"));
}

#[test]
fn missing_file_is_an_error() {
    let src = FileSource { path: "/definitely/not/here.log".into(), limit: 10 };
    assert!(matches!(src.read_lines(), Err(SourceError::FileNotFound(_))));
}

#[test]
fn descriptors() {
    let since = "1h".to_string();
    assert_eq!(DockerSource { container: "web".into(), since: since.clone(), limit: 1 }.describe(), "docker:web");
    assert_eq!(ComposeSource { service: Some("db".into()), since: since.clone(), limit: 1 }.describe(), "compose:db");
    assert_eq!(ComposeSource { service: None, since: since.clone(), limit: 1 }.describe(), "compose:all");
    assert_eq!(JournalSource { unit: "nginx".into(), since, limit: 1 }.describe(), "journal:nginx");
}

#[test]
fn tail_handles_small_inputs() {
    assert!(tail_lines("", 5).is_empty());
    assert_eq!(tail_lines("a\nb", 5), vec!["a", "b"]);
    assert!(tail_lines("a\nb", 0).is_empty());
}

#[cfg(unix)]
#[test]
fn docker_output_keeps_stdout_and_stderr_interleaved() {
    use std::os::unix::fs::PermissionsExt;

    let bin = tempfile::tempdir().unwrap();
    let fake = bin.path().join("docker");
    fs::write(&fake, "#!/bin/sh\necho 'out 1'\necho 'err 1' >&2\necho 'out 2'\n").unwrap();
    fs::set_permissions(&fake, fs::Permissions::from_mode(0o755)).unwrap();
    let path = std::env::var("PATH").unwrap_or_default();
    std::env::set_var("PATH", format!("{}:{}", bin.path().display(), path));

    let src = DockerSource { container: "web".into(), since: "1h".into(), limit: 2 };
    assert_eq!(src.read_lines().unwrap(), vec!["err 1", "out 2"]);
    let all = DockerSource { container: "web".into(), since: "1h".into(), limit: 10 };
    assert_eq!(all.read_lines().unwrap(), vec!["out 1", "err 1", "out 2"]);
}
