//! Rhythm CLI - command-line front end for the Rhythm Threads engine
//!
//! Commands:
//! - login / logout: manage the signed-in identity
//! - checkin / event: record the day's metrics or a life event
//! - show / threads: inspect the ledger and thread levels
//! - settings / reminder / onboard: configuration
//! - insight: replay an analysis response through the insight orchestrator
//! - reset: wipe all stored state
//! - doctor: diagnose the data directory

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use rhythm_threads::analysis::{AnalysisCollaborator, NoAnalysis, ReplayAnalysis};
use rhythm_threads::clock::SystemClock;
use rhythm_threads::config::{ConfigError, EngineConfig};
use rhythm_threads::settings::{CheckInTime, NewReminder, ReminderTarget, SettingsPatch, Theme};
use rhythm_threads::storage::{decode, DirStore, KeyValueStore, StorageError, StorageKey};
use rhythm_threads::threads::ThreadSet;
use rhythm_threads::types::{Activity, AuthUser, DailyLog, DailyMetrics, EventKind, ThreadKind};
use rhythm_threads::{BehaviorEngine, EngineError, InsightApplied, ValidationError, PRODUCER_NAME, VERSION};

/// Rhythm - trace the threads of your days
#[derive(Parser)]
#[command(name = "rhythm")]
#[command(version = VERSION)]
#[command(about = "Record daily rhythms and events, and watch your threads", long_about = None)]
struct Cli {
    /// Directory holding the stored state
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset (e.g. "info", "rhythm_threads=debug")
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with an identity from an external provider, or as a guest
    Login {
        /// Synthesize a local guest identity
        #[arg(long, conflicts_with_all = ["id", "name", "email"])]
        guest: bool,

        /// Provider subject id
        #[arg(long, required_unless_present = "guest")]
        id: Option<String>,

        #[arg(long, required_unless_present = "guest")]
        name: Option<String>,

        #[arg(long, required_unless_present = "guest")]
        email: Option<String>,

        /// Avatar URI
        #[arg(long, default_value = "")]
        avatar: String,
    },

    /// Sign out, keeping recorded data
    Logout,

    /// Record the daily check-in (today unless --date is given)
    Checkin {
        #[arg(long)]
        date: Option<NaiveDate>,

        /// 1 (sad) to 5 (happy)
        #[arg(long)]
        mood: u8,

        #[arg(long, default_value = "0")]
        stress: u8,

        #[arg(long, default_value = "3")]
        energy: u8,

        #[arg(long = "sleep", default_value = "3")]
        sleep_quality: u8,

        #[arg(long, default_value = "0")]
        workload: u8,

        #[arg(long, default_value = "none")]
        activity: ActivityArg,
    },

    /// Record a life event for today
    Event {
        #[arg(long)]
        kind: EventKindArg,

        /// 1 to 5
        #[arg(long)]
        intensity: u8,

        #[arg(long)]
        note: Option<String>,
    },

    /// Show recorded days, newest first
    Show {
        /// Only this date
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Number of days to show
        #[arg(long, default_value = "7")]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Show thread levels and milestones
    Threads {
        #[arg(long)]
        json: bool,
    },

    /// Update settings
    Settings {
        #[arg(long)]
        quiet: Option<bool>,

        /// Preferred check-in time, HH:MM
        #[arg(long)]
        time: Option<CheckInTime>,

        /// Check-in weekdays, 0 = Sunday (comma separated)
        #[arg(long, value_delimiter = ',')]
        days: Option<Vec<u8>>,

        #[arg(long)]
        theme: Option<ThemeArg>,

        /// Raw JSON patch, applied after the flags above
        #[arg(long)]
        patch: Option<String>,
    },

    /// Manage mindfulness reminders
    Reminder {
        #[command(subcommand)]
        action: ReminderAction,
    },

    /// Mark onboarding as completed
    Onboard,

    /// Request a weekly insight
    Insight {
        /// Recorded analysis response to replay
        #[arg(long)]
        response: Option<PathBuf>,
    },

    /// Erase all stored logs and settings
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Diagnose the data directory
    Doctor {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ReminderAction {
    Add {
        label: String,

        /// Event type to listen for, or "any"
        #[arg(long, default_value = "any")]
        target: String,

        /// Create the reminder switched off
        #[arg(long)]
        inactive: bool,
    },
    Remove {
        id: Uuid,
    },
    Toggle {
        id: Uuid,
    },
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum ActivityArg {
    None,
    Light,
    Heavy,
}

impl From<ActivityArg> for Activity {
    fn from(arg: ActivityArg) -> Self {
        match arg {
            ActivityArg::None => Activity::None,
            ActivityArg::Light => Activity::Light,
            ActivityArg::Heavy => Activity::Heavy,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum EventKindArg {
    Argument,
    SmallWin,
    Feedback,
    Unexpected,
}

impl From<EventKindArg> for EventKind {
    fn from(arg: EventKindArg) -> Self {
        match arg {
            EventKindArg::Argument => EventKind::Argument,
            EventKindArg::SmallWin => EventKind::SmallWin,
            EventKindArg::Feedback => EventKind::Feedback,
            EventKindArg::Unexpected => EventKind::Unexpected,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ThemeArg {
    Light,
    Dark,
}

impl From<ThemeArg> for Theme {
    fn from(arg: ThemeArg) -> Self {
        match arg {
            ThemeArg::Light => Theme::Light,
            ThemeArg::Dark => Theme::Dark,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), RhythmCliError> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let data_dir = cli
        .data_dir
        .clone()
        .or_else(|| config.data_dir.clone())
        .unwrap_or_else(|| PathBuf::from(".rhythm"));

    match cli.command {
        Commands::Login {
            guest,
            id,
            name,
            email,
            avatar,
        } => {
            let mut engine = open_engine(&config, &data_dir, Arc::new(NoAnalysis))?;
            let user = if guest {
                engine.sign_in_guest()
            } else {
                let user = AuthUser {
                    id: required(id, "id")?,
                    name: required(name, "name")?,
                    email: required(email, "email")?,
                    picture: avatar,
                };
                engine.sign_in(user.clone());
                user
            };
            println!("Signed in as {} <{}>", user.name, user.email);
            Ok(())
        }

        Commands::Logout => {
            let mut engine = open_engine(&config, &data_dir, Arc::new(NoAnalysis))?;
            engine.sign_out();
            println!("Signed out");
            Ok(())
        }

        Commands::Checkin {
            date,
            mood,
            stress,
            energy,
            sleep_quality,
            workload,
            activity,
        } => {
            let mut engine = open_engine(&config, &data_dir, Arc::new(NoAnalysis))?;
            let metrics = DailyMetrics {
                mood,
                stress,
                energy,
                sleep_quality,
                workload,
                activity: activity.into(),
            };
            let date = date.unwrap_or_else(|| engine.today());
            let outcome = engine.upsert_daily_metrics(date, metrics)?;
            let verb = if outcome.created { "Recorded" } else { "Updated" };
            println!("{verb} check-in for {}", outcome.date);
            print_threads(&outcome.threads);
            Ok(())
        }

        Commands::Event {
            kind,
            intensity,
            note,
        } => {
            let mut engine = open_engine(&config, &data_dir, Arc::new(NoAnalysis))?;
            let outcome = engine.append_event(kind.into(), intensity, note)?;
            println!(
                "Recorded {} (intensity {}) at {}",
                outcome.event.kind,
                outcome.event.intensity,
                outcome.event.timestamp.to_rfc3339()
            );
            for reminder in engine.settings_store().reminders_for(outcome.event.kind) {
                println!("  Reminder: {}", reminder.label);
            }
            print_threads(&outcome.threads);
            Ok(())
        }

        Commands::Show { date, limit, json } => {
            let engine = open_engine(&config, &data_dir, Arc::new(NoAnalysis))?;
            let logs: Vec<&DailyLog> = match date {
                Some(date) => engine.find_by_date(date).into_iter().collect(),
                None => engine.recent(limit).iter().collect(),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&logs)?);
            } else if logs.is_empty() {
                println!("No threads traced yet.");
            } else {
                for log in logs {
                    print_log(log);
                }
            }
            Ok(())
        }

        Commands::Threads { json } => {
            let engine = open_engine(&config, &data_dir, Arc::new(NoAnalysis))?;
            if json {
                println!("{}", serde_json::to_string_pretty(engine.threads())?);
                return Ok(());
            }
            print_threads(engine.threads());
            let store = engine.settings_store();
            println!("\n{} moments of awareness", store.total_awareness());
            if let Some(tier) = store.current_tier() {
                println!("Milestone: {}", tier.label);
            }
            if let Some(next) = store.next_tier() {
                println!("Next: {} at {}", next.label, next.threshold);
            }
            Ok(())
        }

        Commands::Settings {
            quiet,
            time,
            days,
            theme,
            patch,
        } => {
            let mut engine = open_engine(&config, &data_dir, Arc::new(NoAnalysis))?;
            let flags = SettingsPatch {
                preferred_check_in_time: time,
                check_in_days: days.map(|d| d.into_iter().collect::<BTreeSet<u8>>()),
                theme: theme.map(Theme::from),
                quiet_mode: quiet,
                mindfulness_reminders: None,
            };
            if !flags.is_empty() {
                engine.update_settings(flags)?;
            }
            if let Some(raw) = patch {
                engine.update_settings(SettingsPatch::from_json(&raw)?)?;
            }
            println!("{}", serde_json::to_string_pretty(engine.settings())?);
            Ok(())
        }

        Commands::Reminder { action } => {
            let mut engine = open_engine(&config, &data_dir, Arc::new(NoAnalysis))?;
            match action {
                ReminderAction::Add {
                    label,
                    target,
                    inactive,
                } => {
                    let target: ReminderTarget = target.parse()?;
                    let id = engine.add_reminder(NewReminder {
                        label,
                        target,
                        is_active: !inactive,
                    })?;
                    println!("{id}");
                }
                ReminderAction::Remove { id } => {
                    engine.remove_reminder(id)?;
                    println!("Removed {id}");
                }
                ReminderAction::Toggle { id } => {
                    let active = engine.toggle_reminder(id)?;
                    println!("{id} is now {}", if active { "active" } else { "inactive" });
                }
                ReminderAction::List => {
                    let quiet = engine.settings().quiet_mode;
                    for r in &engine.settings().mindfulness_reminders {
                        let state = match (r.is_active, quiet) {
                            (true, false) => "on",
                            (true, true) => "silenced",
                            (false, _) => "off",
                        };
                        println!("{}  [{state}]  {} ({})", r.id, r.label, r.target);
                    }
                }
            }
            Ok(())
        }

        Commands::Onboard => {
            let mut engine = open_engine(&config, &data_dir, Arc::new(NoAnalysis))?;
            engine.complete_onboarding()?;
            println!("Onboarding completed");
            Ok(())
        }

        Commands::Insight { response } => {
            let analysis: Arc<dyn AnalysisCollaborator> = match response {
                Some(path) => Arc::new(ReplayAnalysis::new(read_file(&path)?)),
                None => Arc::new(NoAnalysis),
            };
            let mut engine = open_engine(&config, &data_dir, analysis)?;
            if engine.settings().quiet_mode {
                println!("Quiet mode is on. No analysis today.");
                return Ok(());
            }
            match engine.refresh_insight().await? {
                Some(InsightApplied::Committed) => {
                    if let Some(insight) = engine.latest_insight() {
                        println!("{}", serde_json::to_string_pretty(insight)?);
                    }
                }
                Some(InsightApplied::Stale) => println!("Insight superseded"),
                None => println!(
                    "Trace a few more threads (at least {} logs) to reveal your weekly rhythm.",
                    config.insight.min_logs
                ),
            }
            Ok(())
        }

        Commands::Reset { yes } => {
            if !yes {
                return Err(RhythmCliError::Usage(
                    "reset erases everything; pass --yes to confirm".to_string(),
                ));
            }
            let mut engine = open_engine(&config, &data_dir, Arc::new(NoAnalysis))?;
            engine.reset()?;
            println!("All data reset");
            Ok(())
        }

        Commands::Doctor { json } => cmd_doctor(&data_dir, json),
    }
}

fn open_engine(
    config: &EngineConfig,
    data_dir: &Path,
    analysis: Arc<dyn AnalysisCollaborator>,
) -> Result<BehaviorEngine, RhythmCliError> {
    let store = DirStore::open(data_dir)?;
    let engine = BehaviorEngine::with_config(config, Arc::new(store), analysis, Arc::new(SystemClock));
    for slot in &engine.load_report().corrupt {
        eprintln!("warning: {}", slot.to_error());
    }
    Ok(engine)
}

fn required(value: Option<String>, field: &'static str) -> Result<String, RhythmCliError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ValidationError::EmptyField(field).into()),
    }
}

fn read_file(path: &Path) -> Result<String, RhythmCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::Read::read_to_string(&mut io::stdin(), &mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn print_log(log: &DailyLog) {
    println!(
        "{}  mood {}  stress {}  energy {}  sleep {}  workload {}  activity {:?}",
        log.date, log.mood, log.stress, log.energy, log.sleep_quality, log.workload, log.activity
    );
    for event in &log.events {
        match &event.note {
            Some(note) => println!(
                "    {} {} ({}): {}",
                event.timestamp.format("%H:%M"),
                event.kind,
                event.intensity,
                note
            ),
            None => println!(
                "    {} {} ({})",
                event.timestamp.format("%H:%M"),
                event.kind,
                event.intensity
            ),
        }
    }
}

fn print_threads(threads: &ThreadSet) {
    for kind in ThreadKind::ALL {
        println!(
            "  {:<9} {:>5.2}  {:?}",
            kind.as_str(),
            threads.level(kind),
            threads.band(kind)
        );
    }
}

fn cmd_doctor(data_dir: &Path, json: bool) -> Result<(), RhythmCliError> {
    let mut checks: Vec<DoctorCheck> = vec![DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} {}", PRODUCER_NAME, VERSION),
    }];

    match DirStore::open(data_dir) {
        Ok(store) => {
            checks.push(DoctorCheck {
                name: "data_dir".to_string(),
                status: CheckStatus::Ok,
                message: format!("Using {}", store.root().display()),
            });
            for key in StorageKey::ALL {
                checks.push(check_slot(&store, key));
            }
        }
        Err(e) => checks.push(DoctorCheck {
            name: "data_dir".to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        }),
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (`insight --response -` ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Rhythm Doctor Report");
        println!("====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(RhythmCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_slot(store: &DirStore, key: StorageKey) -> DoctorCheck {
    let bytes = match store.load(key) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            return DoctorCheck {
                name: key.to_string(),
                status: CheckStatus::Warning,
                message: "not present (defaults will be used)".to_string(),
            }
        }
        Err(e) => {
            return DoctorCheck {
                name: key.to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            }
        }
    };

    let decoded = match key {
        StorageKey::Logs => decode::<Vec<DailyLog>>(&bytes).map(|logs| format!("{} days", logs.len())),
        StorageKey::Threads => decode::<ThreadSet>(&bytes).map(|_| "4 threads".to_string()),
        StorageKey::Settings => decode::<rhythm_threads::settings::UserSettings>(&bytes)
            .map(|s| format!("{} moments of awareness", s.milestones.total_awareness)),
        StorageKey::User => decode::<AuthUser>(&bytes).map(|u| format!("signed in as {}", u.email)),
    };

    match decoded {
        Ok(message) => DoctorCheck {
            name: key.to_string(),
            status: CheckStatus::Ok,
            message,
        },
        Err(e) => DoctorCheck {
            name: key.to_string(),
            status: CheckStatus::Error,
            message: format!("corrupt, defaults will be used: {e}"),
        },
    }
}

// Error types

#[derive(Debug)]
enum RhythmCliError {
    Io(io::Error),
    Engine(EngineError),
    Storage(StorageError),
    Config(ConfigError),
    Json(serde_json::Error),
    Usage(String),
    DoctorFailed,
}

impl From<io::Error> for RhythmCliError {
    fn from(e: io::Error) -> Self {
        RhythmCliError::Io(e)
    }
}

impl From<EngineError> for RhythmCliError {
    fn from(e: EngineError) -> Self {
        RhythmCliError::Engine(e)
    }
}

impl From<ValidationError> for RhythmCliError {
    fn from(e: ValidationError) -> Self {
        RhythmCliError::Engine(EngineError::Validation(e))
    }
}

impl From<StorageError> for RhythmCliError {
    fn from(e: StorageError) -> Self {
        RhythmCliError::Storage(e)
    }
}

impl From<ConfigError> for RhythmCliError {
    fn from(e: ConfigError) -> Self {
        RhythmCliError::Config(e)
    }
}

impl From<serde_json::Error> for RhythmCliError {
    fn from(e: serde_json::Error) -> Self {
        RhythmCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<RhythmCliError> for CliError {
    fn from(e: RhythmCliError) -> Self {
        match e {
            RhythmCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            RhythmCliError::Engine(EngineError::NotSignedIn) => CliError {
                code: "NOT_SIGNED_IN".to_string(),
                message: "No signed-in user".to_string(),
                hint: Some("Run 'rhythm login --guest' or sign in with your provider".to_string()),
            },
            RhythmCliError::Engine(EngineError::Validation(e)) => CliError {
                code: "VALIDATION_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Correct the value and retry".to_string()),
            },
            RhythmCliError::Engine(EngineError::AnalysisUnavailable(msg)) => CliError {
                code: "INSIGHT_UNAVAILABLE".to_string(),
                message: msg,
                hint: Some("Try again later".to_string()),
            },
            RhythmCliError::Engine(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            RhythmCliError::Storage(e) => CliError {
                code: "STORAGE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'rhythm doctor' for details".to_string()),
            },
            RhythmCliError::Config(e) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the --config file".to_string()),
            },
            RhythmCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            RhythmCliError::Usage(msg) => CliError {
                code: "USAGE".to_string(),
                message: msg,
                hint: None,
            },
            RhythmCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
