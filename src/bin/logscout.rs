use anyhow::Context;
use clap::{CommandFactory, Parser};
use logscout::baseline::{parse_duration, BaselineFile, DurationError};
use logscout::clock::{fmt_local_ts, SystemClock};
use logscout::notify::{self, Dispatcher, EmailNotifier, Notification, Notifier, NtfyNotifier, SmtpSettings, TelegramNotifier};
use logscout::report::{self, ReportFilters, ReportRequest, DEFAULT_ALERT_ITEMS};
use logscout::sources::{ComposeSource, DockerSource, FileSource, JournalSource, LogSource, SourceError};
use logscout::{cluster, paths, PatternStore, Severity, StoreError};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "logscout", version, about = "Cluster logs into patterns, flag never-seen ones, and optionally notify")]
struct Cli {
    // Sources (exactly one unless --reset)
    /// docker logs --since <since> <container>
    #[arg(long, value_name = "CONTAINER")] docker: Option<String>,
    /// docker compose logs --since <since> <service>
    #[arg(long, value_name = "SERVICE")] compose: Option<String>,
    /// docker compose logs --since <since> (all services)
    #[arg(long = "compose-all", default_value_t = false)] compose_all: bool,
    /// journalctl -u <unit> --since <since>
    #[arg(long, value_name = "UNIT")] service: Option<String>,
    /// Read the last N lines of a file
    #[arg(long, value_name = "PATH")] file: Option<PathBuf>,

    /// Time window passed to the source, e.g. "10m", "1h", "today"
    #[arg(long, default_value = "1h")] since: String,
    /// Max lines to process
    #[arg(long = "lines", default_value_t = 5000)] lines: usize,
    /// Only show never-seen patterns
    #[arg(long = "show-new", default_value_t = false)] show_new: bool,
    /// Hide patterns below this severity: INFO | WARN | ERROR
    #[arg(long = "min-severity", default_value = "INFO")] min_severity: Severity,
    /// Print one raw sample line per pattern
    #[arg(long = "show-samples", default_value_t = false)] show_samples: bool,
    /// Output the report as JSON (the store is still updated)
    #[arg(long, default_value_t = false)] json: bool,

    /// Pattern store path
    #[arg(long = "state-db", env = "LOGSCOUT_STATE_DB")] state_db: Option<PathBuf>,
    /// Baseline state path
    #[arg(long = "baseline-state", env = "LOGSCOUT_BASELINE_STATE")] baseline_state: Option<PathBuf>,
    /// Remove the pattern store and baseline state, then exit
    #[arg(long, default_value_t = false)] reset: bool,
    /// Start baseline learning, e.g. "24h" or "30m" (no alerts until it ends)
    #[arg(long = "baseline-learn", value_name = "DURATION")] baseline_learn: Option<String>,
    /// Give up waiting for another run's lock after this long
    #[arg(long = "lock-timeout", default_value = "10s", env = "LOGSCOUT_LOCK_TIMEOUT")] lock_timeout: String,

    // Notifications
    #[arg(long = "notify-ntfy-topic", env = "LOGSCOUT_NTFY_TOPIC")] ntfy_topic: Option<String>,
    #[arg(long = "notify-ntfy-server", env = "LOGSCOUT_NTFY_SERVER", default_value = "https://ntfy.sh")] ntfy_server: String,
    #[arg(long = "notify-telegram-token", env = "LOGSCOUT_TELEGRAM_TOKEN", hide_env_values = true)] telegram_token: Option<String>,
    #[arg(long = "notify-telegram-chat-id", env = "LOGSCOUT_TELEGRAM_CHAT_ID")] telegram_chat_id: Option<String>,
    #[arg(long = "notify-email-host", env = "LOGSCOUT_SMTP_HOST")] email_host: Option<String>,
    #[arg(long = "notify-email-port", env = "LOGSCOUT_SMTP_PORT", default_value_t = 587)] email_port: u16,
    #[arg(long = "notify-email-user", env = "LOGSCOUT_SMTP_USER")] email_user: Option<String>,
    #[arg(long = "notify-email-pass", env = "LOGSCOUT_SMTP_PASS", hide_env_values = true)] email_pass: Option<String>,
    #[arg(long = "notify-email-from", env = "LOGSCOUT_EMAIL_FROM")] email_from: Option<String>,
    #[arg(long = "notify-email-to", env = "LOGSCOUT_EMAIL_TO")] email_to: Option<String>,
    /// Disable STARTTLS for SMTP
    #[arg(long = "notify-email-no-tls", default_value_t = false)] email_no_tls: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(e: &anyhow::Error) -> u8 {
    if let Some(store) = e.downcast_ref::<StoreError>() {
        return match store {
            StoreError::Malformed { .. } => 3,
            StoreError::LockTimeout { .. } => 75,
            _ => 74,
        };
    }
    if e.downcast_ref::<SourceError>().is_some() || e.downcast_ref::<DurationError>().is_some() {
        return 2;
    }
    1
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let lock_timeout = Duration::from_secs(parse_duration(&cli.lock_timeout)?);
    let db_path = cli.state_db.clone().unwrap_or_else(paths::default_pattern_db);
    let baseline_path = cli.baseline_state.clone().unwrap_or_else(paths::default_baseline_file);
    let store = PatternStore::new(&db_path).with_lock_timeout(lock_timeout);
    let baseline_file = BaselineFile::new(&baseline_path).with_lock_timeout(lock_timeout);

    if cli.reset {
        store.reset()?;
        baseline_file.reset()?;
        println!("Reset: removed {} and {}", db_path.display(), baseline_path.display());
        return Ok(());
    }

    let source = select_source(&cli);

    if let Some(window) = cli.baseline_learn.as_deref() {
        let seconds = parse_duration(window)?;
        let until = baseline_file.enable(seconds, &SystemClock)?;
        let msg = format!("Baseline learning enabled until {}. (No alerts during this period)", fmt_local_ts(until));
        // stdout carries only the JSON document in --json mode
        if cli.json {
            eprintln!("{}", msg);
        } else {
            println!("{}", msg);
        }
    }

    let lines = source.read_lines()?;
    let window = cluster(&lines);
    let baseline = baseline_file.load();

    let request = ReportRequest { source: source.describe(), since: cli.since.clone(), lines_limit: cli.lines };
    let filters = ReportFilters { min_severity: cli.min_severity, new_only: cli.show_new };
    let outcome = report::build_report(&window, &store, &baseline, &request, filters, &SystemClock)?;

    if cli.json {
        println!("{}", report::to_json(&outcome.report).context("failed to encode report")?);
    } else {
        print!("{}", report::render_text(&outcome.report, cli.show_samples));
    }

    if outcome.report.baseline_active || outcome.alerts.is_empty() {
        return Ok(());
    }

    let dispatcher = build_dispatcher(&cli);
    if dispatcher.is_empty() {
        return Ok(());
    }
    let notification = Notification {
        title: "logscout alert: new log patterns detected".to_string(),
        body: report::format_alert_message(&outcome.report, &outcome.alerts, DEFAULT_ALERT_ITEMS),
    };
    let failed = notify::failures(&dispatcher.dispatch(&notification));
    if !failed.is_empty() {
        eprintln!("Notification failures:");
        for f in failed {
            eprintln!(" - {}", f);
        }
    }
    Ok(())
}

fn select_source(cli: &Cli) -> Box<dyn LogSource> {
    let chosen = [
        cli.docker.is_some(),
        cli.compose.is_some(),
        cli.compose_all,
        cli.service.is_some(),
        cli.file.is_some(),
    ]
    .iter()
    .filter(|b| **b)
    .count();
    if chosen != 1 {
        Cli::command()
            .error(
                clap::error::ErrorKind::ArgumentConflict,
                "choose exactly one source: --docker, --compose, --compose-all, --service, or --file",
            )
            .exit();
    }

    let since = cli.since.clone();
    let limit = cli.lines;
    if let Some(container) = &cli.docker {
        Box::new(DockerSource { container: container.clone(), since, limit })
    } else if let Some(service) = &cli.compose {
        Box::new(ComposeSource { service: Some(service.clone()), since, limit })
    } else if cli.compose_all {
        Box::new(ComposeSource { service: None, since, limit })
    } else if let Some(unit) = &cli.service {
        Box::new(JournalSource { unit: unit.clone(), since, limit })
    } else {
        Box::new(FileSource { path: cli.file.clone().unwrap_or_default(), limit })
    }
}

// A channel that cannot even be constructed is reported like a failed send.
fn build_dispatcher(cli: &Cli) -> Dispatcher {
    let mut dispatcher = Dispatcher::default();
    let mut push = |name: &str, built: Result<Box<dyn Notifier>, notify::NotifyError>| match built {
        Ok(n) => dispatcher.add(n),
        Err(e) => eprintln!("Notification setup failed: {}: {}", name, e),
    };

    if let Some(topic) = cli.ntfy_topic.as_deref().filter(|t| !t.is_empty()) {
        push("ntfy", NtfyNotifier::new(&cli.ntfy_server, topic).map(|n| Box::new(n) as Box<dyn Notifier>));
    }
    if let (Some(token), Some(chat)) = (non_empty(&cli.telegram_token), non_empty(&cli.telegram_chat_id)) {
        push("telegram", TelegramNotifier::new(token, chat).map(|n| Box::new(n) as Box<dyn Notifier>));
    }
    if let (Some(host), Some(from), Some(to)) = (non_empty(&cli.email_host), non_empty(&cli.email_from), non_empty(&cli.email_to)) {
        let settings = SmtpSettings {
            host: host.to_string(),
            port: cli.email_port,
            username: cli.email_user.clone().unwrap_or_default(),
            password: cli.email_pass.clone().unwrap_or_default(),
            from: from.to_string(),
            to: to.to_string(),
            starttls: !cli.email_no_tls,
        };
        push("email", EmailNotifier::new(&settings).map(|n| Box::new(n) as Box<dyn Notifier>));
    }
    tracing::debug!(channels = dispatcher.len(), "notification channels configured");
    dispatcher
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}
