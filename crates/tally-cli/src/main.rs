use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{CommandFactory, Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use tally_core::clock::{SystemClock, UlidGenerator};
use tally_core::config::{
    load_config, resolve_data_dir, resolve_export_dir, resolve_tally_home, TallyConfig,
};
use tally_core::dataset::{export_filename, CONTENT_TYPE, INVALID_FILE_MESSAGE};
use tally_core::state::Session;
use tally_core::store::FileStore;
use tally_core::tracker::{Tracker, TrackerEngine};

mod render;

type AppSession = Session<FileStore, SystemClock, UlidGenerator>;

#[derive(Parser)]
#[command(name = "tally", version, about = "Track progress toward one goal at a time")]
struct Cli {
    /// Tally home directory (defaults to $TALLY_HOME, then ~/.tally)
    #[arg(long, global = true)]
    home: Option<PathBuf>,
    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new active tracker (replaces the current one without archiving it)
    Create {
        /// Goal count; must be a whole number of at least 1
        target: String,
        #[arg(long, default_value = "")]
        label: String,
    },
    /// Add one step to the active tracker
    Inc,
    /// Remove one step from the active tracker
    Dec,
    /// Move the active tracker into the history
    Archive,
    /// Show the active tracker and its log
    Show,
    /// List archived trackers, most recent first
    History,
    /// Delete an archived tracker by id
    Delete { id: String },
    /// Write the whole dataset to a JSON file ("-" for stdout)
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Replace the whole dataset with the contents of an export file
    Import { file: PathBuf },
    /// Print version information
    Version,
}

struct Output {
    json: bool,
}

impl Output {
    fn emit(&self, value: Value, text: impl AsRef<str>) {
        if self.json {
            println!("{}", value);
        } else {
            println!("{}", text.as_ref());
        }
    }

    fn nothing_to_do(&self, reason: &str) {
        self.emit(json!({"ok": true, "changed": false, "reason": reason}), reason);
    }
}

fn init_logging(directive: Option<&str>) {
    let filter = EnvFilter::try_from_env("TALLY_LOG")
        .or_else(|_| EnvFilter::try_new(directive.unwrap_or("warn")))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(ExitCode::SUCCESS);
    };
    if let Command::Version = command {
        println!("tally {}", tally_core::version());
        return Ok(ExitCode::SUCCESS);
    }

    let home = match cli.home {
        Some(home) => home,
        None => resolve_tally_home()?,
    };
    let loaded = load_config(&home);
    let config = loaded.as_ref().ok().cloned().flatten().unwrap_or_default();
    init_logging(config.log.as_deref());
    if let Err(err) = &loaded {
        warn!(home = %home.display(), error = %err, "ignoring unusable config file");
    }

    let data_dir = resolve_data_dir(&home, &config);
    debug!(home = %home.display(), data = %data_dir.display(), "resolved paths");
    let store = FileStore::open(&data_dir)
        .with_context(|| format!("open data directory {}", data_dir.display()))?;
    let mut session = Session::open(store, TrackerEngine::new(SystemClock, UlidGenerator));
    let out = Output { json: cli.json };

    run(command, &mut session, &home, &config, &out)
}

fn run(
    command: Command,
    session: &mut AppSession,
    home: &Path,
    config: &TallyConfig,
    out: &Output,
) -> Result<ExitCode> {
    match command {
        Command::Create { target, label } => {
            let replaced = session.active().map(|t| t.label.clone());
            match session.create(&label, &target) {
                Some(tracker) => {
                    let mut text = format!("Created {}", render::tracker_line(tracker));
                    if let Some(previous) = &replaced {
                        text.push_str(&format!("\nReplaced \"{previous}\" (not archived)"));
                    }
                    out.emit(
                        json!({"ok": true, "changed": true, "tracker": tracker, "replaced": replaced}),
                        text,
                    );
                }
                None => out.nothing_to_do("Target must be a whole number of at least 1."),
            }
        }
        Command::Inc => {
            if let Some(reason) = blocked(session, Tracker::can_increment, "Already at target.") {
                out.nothing_to_do(reason);
            } else if let Some(tracker) = session.increment() {
                let mut text = render::tracker_line(tracker);
                if tracker.is_completed() {
                    text.push_str("\nGoal reached!");
                }
                out.emit(json!({"ok": true, "changed": true, "tracker": tracker}), text);
            }
        }
        Command::Dec => {
            if let Some(reason) = blocked(session, Tracker::can_decrement, "Already at zero.") {
                out.nothing_to_do(reason);
            } else if let Some(tracker) = session.decrement() {
                out.emit(
                    json!({"ok": true, "changed": true, "tracker": tracker}),
                    render::tracker_line(tracker),
                );
            }
        }
        Command::Archive => match session.archive() {
            Some(tracker) => out.emit(
                json!({"ok": true, "changed": true, "tracker": tracker}),
                format!("Archived {}", render::tracker_line(tracker)),
            ),
            None => out.nothing_to_do("No active tracker."),
        },
        Command::Show => {
            let active = session.active();
            let text = active
                .map(render::tracker_detail)
                .unwrap_or_else(|| "No active tracker.".to_string());
            out.emit(json!({"ok": true, "activeTracker": active}), text);
        }
        Command::History => {
            let history = session.history();
            out.emit(
                json!({"ok": true, "history": history}),
                render::history_lines(history),
            );
        }
        Command::Delete { id } => {
            let removed = session.delete_from_history(&id);
            if removed == 0 {
                out.nothing_to_do(&format!("No archived tracker with id {id}."));
            } else {
                out.emit(
                    json!({"ok": true, "changed": true, "removed": removed}),
                    format!("Deleted {id}."),
                );
            }
        }
        Command::Export { out: target } => {
            let body = session
                .export_document()
                .to_json_pretty()
                .context("serialize export document")?;
            if target.as_deref() == Some(Path::new("-")) {
                println!("{body}");
                return Ok(ExitCode::SUCCESS);
            }
            let path = match target {
                Some(path) => path,
                None => resolve_export_dir(home, config)
                    .join(export_filename(Local::now().date_naive())),
            };
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create export directory {}", parent.display()))?;
            }
            fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
            out.emit(
                json!({"ok": true, "path": path.display().to_string(), "contentType": CONTENT_TYPE}),
                format!("Exported to {}", path.display()),
            );
        }
        Command::Import { file } => {
            let raw = match fs::read(&file) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(path = %file.display(), error = %err, "could not read import file");
                    return Ok(fail(out, INVALID_FILE_MESSAGE));
                }
            };
            match session.import(&raw) {
                Ok(summary) => out.emit(
                    json!({
                        "ok": true,
                        "changed": true,
                        "hasActiveTracker": summary.has_active,
                        "historyCount": summary.history_len,
                    }),
                    format!(
                        "Imported {} archived tracker(s){}.",
                        summary.history_len,
                        if summary.has_active {
                            " and an active tracker"
                        } else {
                            ""
                        }
                    ),
                ),
                Err(err) => return Ok(fail(out, err.user_message())),
            }
        }
        Command::Version => println!("tally {}", tally_core::version()),
    }
    Ok(ExitCode::SUCCESS)
}

/// The guard a UI applies before enabling a step button.
fn blocked(
    session: &AppSession,
    allowed: fn(&Tracker) -> bool,
    reason: &'static str,
) -> Option<&'static str> {
    match session.active() {
        None => Some("No active tracker."),
        Some(tracker) if !allowed(tracker) => Some(reason),
        Some(_) => None,
    }
}

fn fail(out: &Output, message: &str) -> ExitCode {
    if out.json {
        println!("{}", json!({"ok": false, "error": message}));
    } else {
        eprintln!("{message}");
    }
    ExitCode::FAILURE
}
