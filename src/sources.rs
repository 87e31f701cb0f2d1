//! Where raw lines come from. Each source yields at most `limit` lines (the
//! most recent ones) plus a short descriptor for the report header.

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("command not found: {0}")]
    CommandNotFound(String),
    #[error("command failed ({code}): {command}\n{stderr}")]
    CommandFailed { command: String, code: i32, stderr: String },
}

pub trait LogSource {
    fn read_lines(&self) -> Result<Vec<String>, SourceError>;
    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct FileSource {
    pub path: PathBuf,
    pub limit: usize,
}

impl LogSource for FileSource {
    fn read_lines(&self) -> Result<Vec<String>, SourceError> {
        if !self.path.exists() {
            return Err(SourceError::FileNotFound(self.path.clone()));
        }
        let bytes = std::fs::read(&self.path).map_err(|e| SourceError::Read {
            path: self.path.display().to_string(),
            source: e,
        })?;
        Ok(tail_lines(&String::from_utf8_lossy(&bytes), self.limit))
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

#[derive(Debug, Clone)]
pub struct DockerSource {
    pub container: String,
    pub since: String,
    pub limit: usize,
}

impl LogSource for DockerSource {
    fn read_lines(&self) -> Result<Vec<String>, SourceError> {
        let out = run_command(&["docker", "logs", "--since", self.since.as_str(), self.container.as_str()], true)?;
        Ok(tail_lines(&out, self.limit))
    }

    fn describe(&self) -> String {
        format!("docker:{}", self.container)
    }
}

/// `docker compose logs` for one service, or every service when `service` is `None`.
#[derive(Debug, Clone)]
pub struct ComposeSource {
    pub service: Option<String>,
    pub since: String,
    pub limit: usize,
}

impl LogSource for ComposeSource {
    fn read_lines(&self) -> Result<Vec<String>, SourceError> {
        let mut args = vec!["docker", "compose", "logs", "--since", self.since.as_str(), "--no-color"];
        if let Some(svc) = &self.service {
            args.push(svc.as_str());
        }
        let out = run_command(&args, true)?;
        Ok(tail_lines(&out, self.limit))
    }

    fn describe(&self) -> String {
        match &self.service {
            Some(svc) => format!("compose:{}", svc),
            None => "compose:all".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JournalSource {
    pub unit: String,
    pub since: String,
    pub limit: usize,
}

impl LogSource for JournalSource {
    fn read_lines(&self) -> Result<Vec<String>, SourceError> {
        let out = run_command(
            &["journalctl", "-u", self.unit.as_str(), "--since", self.since.as_str(), "-o", "cat", "--no-pager"],
            false,
        )?;
        Ok(tail_lines(&out, self.limit))
    }

    fn describe(&self) -> String {
        format!("journal:{}", self.unit)
    }
}

// docker writes container stderr to our stderr, so those sources fold it in.
fn run_command(argv: &[&str], merge_stderr: bool) -> Result<String, SourceError> {
    let (program, args) = match argv.split_first() {
        Some(split) => split,
        None => return Err(SourceError::CommandNotFound(String::new())),
    };
    tracing::debug!(command = %argv.join(" "), merge_stderr, "running source command");
    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::null());
    let spawn_err = |e: io::Error| match e.kind() {
        io::ErrorKind::NotFound => SourceError::CommandNotFound(program.to_string()),
        _ => SourceError::Read { path: program.to_string(), source: e },
    };

    if !merge_stderr {
        let output = cmd.output().map_err(spawn_err)?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            return Err(failed(argv, output.status.code(), &String::from_utf8_lossy(&output.stderr)));
        }
        return Ok(stdout);
    }

    // Both streams share one pipe so lines keep the order they were written in.
    let (mut reader, writer) = os_pipe::pipe().map_err(spawn_err)?;
    let writer_err = writer.try_clone().map_err(spawn_err)?;
    cmd.stdout(writer).stderr(writer_err);
    let mut child = cmd.spawn().map_err(spawn_err)?;
    // The command still owns our copies of the write end; drop them or the read never ends.
    drop(cmd);

    let mut buf = Vec::new();
    let read = reader.read_to_end(&mut buf);
    let status = child.wait().map_err(spawn_err)?;
    read.map_err(|e| SourceError::Read { path: program.to_string(), source: e })?;
    let merged = String::from_utf8_lossy(&buf).into_owned();
    if !status.success() {
        return Err(failed(argv, status.code(), &merged));
    }
    Ok(merged)
}

fn failed(argv: &[&str], code: Option<i32>, output: &str) -> SourceError {
    SourceError::CommandFailed {
        command: argv.join(" "),
        code: code.unwrap_or(-1),
        stderr: output.trim().to_string(),
    }
}

/// Last `limit` lines of `text`.
pub fn tail_lines(text: &str, limit: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(limit);
    lines[start..].iter().map(|s| s.to_string()).collect()
}
