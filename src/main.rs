//! Hookrack: a supervisor and TUI for pre-commit hook runs.
//!
//! This is the entry point of the application. It parses command-line arguments,
//! loads settings, and drives either a one-shot headless command or the
//! interactive event loop around a single [`Supervisor`].

mod ansi;
mod app;
mod classify;
mod config;
mod error;
mod events;
mod host;
mod output;
mod state;
mod supervisor;
mod tui;

use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::{Parser, Subcommand};
use crossterm::event::KeyEventKind;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app::{App, AppAction};
use crate::classify::ReportClassifier;
use crate::config::ConflictPolicy;
use crate::error::SupervisorError;
use crate::events::{Event, RunId};
use crate::host::{ConsoleHost, Host, SystemProbe, TuiHost};
use crate::output::sanitize_text;
use crate::state::RunStatus;
use crate::supervisor::{RunKind, RunRequest, Supervisor, SupervisorSettings};

const SETTINGS_FILE: &str = "hookrack.toml";
const HOOK_CONFIG_FILE: &str = ".pre-commit-config.yaml";
const EVENT_CAPACITY: usize = 256;
const TICK_RATE: Duration = Duration::from_millis(150);
const INTERRUPTED: u8 = 130;

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "hookrack",
    version,
    about = "Run and watch pre-commit hooks",
    styles = help_styles(),
    color = clap::ColorChoice::Always
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Path to hookrack.toml configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Ignore any hookrack.toml in the current directory.
    #[arg(long, global = true)]
    no_config: bool,
    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Hook tool executable.
    #[arg(long, global = true)]
    executable: Option<String>,
    /// Hook configuration file name at the project root.
    #[arg(long, global = true)]
    hook_config: Option<String>,
    /// What to do when a run is requested while one is active.
    #[arg(long, value_enum, global = true)]
    on_conflict: Option<ConflictPolicy>,
    /// Regex for failed-hook report lines; group 1 is the hook id.
    #[arg(long, global = true)]
    failure_pattern: Option<String>,
    /// Keep the output pane where it is when a run fails.
    #[arg(long)]
    no_raise: bool,
    /// Use ASCII instead of Unicode symbols.
    #[arg(long)]
    no_symbols: bool,
    /// Write TUI logs to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run hooks once and print their output.
    Run {
        /// Check every file instead of the staged ones.
        #[arg(long)]
        all_files: bool,
        /// Only run this hook.
        #[arg(long)]
        hook: Option<String>,
        /// Extra arguments passed to the tool.
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// List hook ids from the hook configuration.
    Hooks {
        /// Print as a JSON array.
        #[arg(long)]
        json: bool,
    },
    /// Install the git hook script.
    Install,
    /// Update hook revisions.
    Autoupdate,
    /// Exit 0 when hooks can be run here, 1 otherwise.
    Check,
}

/// Runtime configuration derived from CLI arguments and the config file.
#[derive(Debug, Clone)]
struct RunSettings {
    supervisor: SupervisorSettings,
    hook_config: String,
    on_conflict: ConflictPolicy,
    failure_pattern: Option<String>,
    use_symbols: bool,
    log_file: Option<PathBuf>,
}

impl RunSettings {
    fn from_cli(cli: &Cli, config: config::Config) -> Result<Self> {
        let extra_args = match config.args.as_deref() {
            Some(raw) => shell_words::split(raw)
                .with_context(|| format!("failed to parse args {:?}", raw))?,
            None => Vec::new(),
        };
        let executable = cli
            .executable
            .clone()
            .or(config.executable)
            .unwrap_or_else(|| SupervisorSettings::default().executable);
        let raise_on_failure = !cli.no_raise && config.raise_on_failure.unwrap_or(true);
        Ok(Self {
            supervisor: SupervisorSettings {
                executable,
                extra_args,
                raise_on_failure,
            },
            hook_config: cli
                .hook_config
                .clone()
                .or(config.config_file)
                .unwrap_or_else(|| HOOK_CONFIG_FILE.to_string()),
            on_conflict: cli.on_conflict.or(config.on_conflict).unwrap_or_default(),
            failure_pattern: cli.failure_pattern.clone().or(config.failure_pattern),
            use_symbols: !cli.no_symbols && config.symbols.unwrap_or(true),
            log_file: cli.log_file.clone().or(config.log_file),
        })
    }

    fn probe(&self) -> Result<SystemProbe> {
        let cwd = std::env::current_dir()
            .context("failed to get current directory (was it deleted?)")?;
        Ok(SystemProbe::new(cwd, self.hook_config.clone()))
    }

    fn supervisor<H: Host>(&self, host: H, event_tx: mpsc::Sender<Event>) -> Supervisor<H> {
        let supervisor = Supervisor::new(self.supervisor.clone(), host, event_tx);
        match self.failure_pattern.as_deref() {
            Some(pattern) => {
                supervisor.with_classifier(Box::new(ReportClassifier::with_pattern(pattern)))
            }
            None => supervisor,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_settings_file(&cli)?;
    let settings = RunSettings::from_cli(&cli, config)?;

    let Some(command) = cli.command else {
        init_file_logging(cli.verbose, settings.log_file.as_deref())?;
        return run_tui(&settings).await;
    };
    init_stderr_logging(cli.verbose);

    match command {
        Commands::Run {
            all_files,
            hook,
            args,
        } => {
            run_headless(&settings, |supervisor| match (hook, all_files) {
                (Some(id), true) if args.is_empty() => supervisor.start_single_hook(&id),
                (None, true) if args.is_empty() => supervisor.start_all(),
                (hook, all_files) => {
                    let mut request_args = Vec::with_capacity(args.len() + 1);
                    if all_files {
                        request_args.push("--all-files".to_string());
                    }
                    request_args.extend(args);
                    supervisor.start(RunRequest::hooks(request_args, hook))
                }
            })
            .await
        }
        Commands::Install => run_headless(&settings, Supervisor::install).await,
        Commands::Autoupdate => run_headless(&settings, Supervisor::autoupdate).await,
        Commands::Hooks { json } => list_hooks(&settings, json),
        Commands::Check => check(&settings),
    }
}

fn load_settings_file(cli: &Cli) -> Result<config::Config> {
    if cli.no_config {
        return Ok(config::Config::default());
    }
    let path = cli
        .config
        .clone()
        .or_else(|| Some(PathBuf::from(SETTINGS_FILE)).filter(|path| path.exists()));
    match path {
        Some(path) => config::load_config(&path),
        None => Ok(config::Config::default()),
    }
}

fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "hookrack=info",
        1 => "hookrack=debug",
        _ => "hookrack=trace",
    }
}

fn init_stderr_logging(verbose: u8) {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// The alternate screen owns the terminal, so the TUI only logs to a file.
fn init_file_logging(verbose: u8, path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose))
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .init();
    Ok(())
}

/// Starts one run and streams it to stdout until it exits or Ctrl-C arrives.
async fn run_headless<F>(settings: &RunSettings, start: F) -> Result<ExitCode>
where
    F: FnOnce(&mut Supervisor<ConsoleHost>) -> Result<RunId, SupervisorError>,
{
    let (event_tx, mut event_rx) = mpsc::channel(EVENT_CAPACITY);
    let host = ConsoleHost::new(settings.probe()?, settings.on_conflict);
    let mut supervisor = settings.supervisor(host, event_tx);

    let run = match start(&mut supervisor) {
        Ok(run) => run,
        Err(err) => {
            eprintln!("hookrack: {}", err);
            return Ok(ExitCode::FAILURE);
        }
    };
    let kind = supervisor.active_kind();

    let mut stdout = std::io::stdout();
    let colored = stdout.is_terminal();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let exit_code = loop {
        tokio::select! {
            Some(event) = event_rx.recv() => match event {
                Event::RunOutput { run, chunk } => {
                    if let Some(text) = supervisor.on_output(run, &chunk) {
                        let text = if colored { text } else { sanitize_text(&text) };
                        stdout.write_all(text.as_bytes())?;
                        stdout.flush()?;
                    }
                }
                Event::RunExited { run: exited, code } => {
                    supervisor.on_termination(exited, code);
                    if exited == run {
                        break code;
                    }
                }
                Event::Key(_) | Event::Resize => {}
            },
            _ = &mut ctrl_c => {
                info!(%run, "interrupted");
                if let Err(err) = supervisor.kill() {
                    debug!(error = %err, "nothing to kill on interrupt");
                }
                return Ok(ExitCode::from(INTERRUPTED));
            }
        }
    };

    if kind == Some(RunKind::Hooks) {
        let state = supervisor.current_state();
        if state.status() == RunStatus::Succeeded {
            return Ok(ExitCode::SUCCESS);
        }
        if !state.failed_hooks().is_empty() {
            eprintln!("hookrack: failed hooks: {}", state.failed_hooks().join(", "));
        }
        return Ok(ExitCode::FAILURE);
    }
    Ok(if exit_code == Some(0) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn list_hooks(settings: &RunSettings, json: bool) -> Result<ExitCode> {
    let (event_tx, _event_rx) = mpsc::channel(1);
    let host = ConsoleHost::new(settings.probe()?, settings.on_conflict);
    let supervisor = settings.supervisor(host, event_tx);
    let ids = supervisor.hook_ids();
    if json {
        println!("{}", serde_json::to_string_pretty(&ids)?);
    } else {
        for id in ids {
            println!("{}", id);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn check(settings: &RunSettings) -> Result<ExitCode> {
    let (event_tx, _event_rx) = mpsc::channel(1);
    let host = ConsoleHost::new(settings.probe()?, settings.on_conflict);
    let supervisor = settings.supervisor(host, event_tx);
    match supervisor.unavailable_reason() {
        None => {
            println!("`{}` is ready", supervisor.settings().executable);
            Ok(ExitCode::SUCCESS)
        }
        Some(reason) => {
            eprintln!("hookrack: {}", reason);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_tui(settings: &RunSettings) -> Result<ExitCode> {
    let (event_tx, mut event_rx) = mpsc::channel(EVENT_CAPACITY);
    let host = TuiHost::new(settings.probe()?, settings.on_conflict);
    let mut supervisor = settings.supervisor(host, event_tx.clone());
    let mut app = App::new(settings.use_symbols);
    if let Some(reason) = supervisor.unavailable_reason() {
        app.set_status_warning(reason);
    }

    let mut terminal = tui::init_terminal()?;
    tui::set_title(&mut terminal, supervisor.state().status())?;
    spawn_input_listener(event_tx);

    let mut ticker = tokio::time::interval(TICK_RATE);
    let mut result = Ok(());
    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => match event {
                Event::RunOutput { run, chunk } => {
                    supervisor.on_output(run, &chunk);
                }
                Event::RunExited { run, code } => supervisor.on_termination(run, code),
                Event::Key(key) => {
                    let action = app.handle_key(key);
                    dispatch(action, &mut app, &mut supervisor);
                }
                Event::Resize => {
                    if let Err(err) = terminal.autoresize() {
                        result = Err(err.into());
                        break;
                    }
                }
            },
            _ = ticker.tick() => {}
        }

        for notice in supervisor.host_mut().drain_notices() {
            app.on_notice(&notice);
        }
        if supervisor.host_mut().take_changed() {
            if let Err(err) = tui::set_title(&mut terminal, supervisor.state().status()) {
                result = Err(err.into());
                break;
            }
        }
        if let Err(err) = tui::draw(&mut app, &supervisor, &mut terminal) {
            result = Err(err.into());
            break;
        }
        if app.should_quit {
            break;
        }
    }

    if supervisor.is_active() {
        if let Err(err) = supervisor.kill() {
            warn!(error = %err, "failed to stop run on exit");
        }
    }
    tui::restore_terminal(terminal)?;
    result.map(|()| ExitCode::SUCCESS)
}

fn dispatch(action: AppAction, app: &mut App, supervisor: &mut Supervisor<TuiHost>) {
    match action {
        AppAction::None | AppAction::Quit => {}
        AppAction::Start(request) => {
            let ask = supervisor.host().policy() == ConflictPolicy::Ask;
            if let (true, Some(kind)) = (ask, supervisor.active_kind()) {
                let message = format!("The {} is still running. Kill it and start the {}?", kind, request.kind);
                app.ask_confirm(request, message);
                return;
            }
            start_run(app, supervisor, request);
        }
        AppAction::ConfirmStart(request) => {
            if supervisor.is_active() {
                supervisor.host_mut().answer_next(true);
            }
            start_run(app, supervisor, request);
        }
        AppAction::Kill => {
            if let Err(err) = supervisor.kill() {
                app.set_status_warning(err.to_string());
            }
        }
        AppAction::OpenHookPicker => {
            let hooks = supervisor.hook_ids();
            if hooks.is_empty() {
                app.set_status_message("no hook ids found, type one");
            }
            app.open_hook_picker(hooks);
        }
    }
}

fn start_run(app: &mut App, supervisor: &mut Supervisor<TuiHost>, request: RunRequest) {
    let kind = request.kind;
    match supervisor.start(request) {
        Ok(run) => {
            debug!(%run, "{} started from the TUI", kind);
            app.on_run_started();
            app.set_status_message(format!("{} started", kind));
        }
        Err(err) => app.set_status_warning(err.to_string()),
    }
}

fn spawn_input_listener(tx: mpsc::Sender<Event>) {
    std::thread::spawn(move || loop {
        if crossterm::event::poll(Duration::from_millis(100)).unwrap_or(false) {
            let sent = match crossterm::event::read() {
                Ok(crossterm::event::Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    tx.blocking_send(Event::Key(key))
                }
                Ok(crossterm::event::Event::Resize(_, _)) => tx.blocking_send(Event::Resize),
                _ => Ok(()),
            };
            if sent.is_err() {
                break;
            }
        }
    });
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::Magenta.into())))
        .valid(Style::new().fg_color(Some(AnsiColor::Green.into())))
        .invalid(
            Style::new()
                .fg_color(Some(AnsiColor::Red.into()))
                .effects(Effects::BOLD),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_subcommand_collects_trailing_args() {
        let cli = Cli::parse_from([
            "hookrack",
            "run",
            "--all-files",
            "--hook",
            "black",
            "--",
            "--show-diff-on-failure",
        ]);
        match cli.command {
            Some(Commands::Run {
                all_files,
                hook,
                args,
            }) => {
                assert!(all_files);
                assert_eq!(hook.as_deref(), Some("black"));
                assert_eq!(args, vec!["--show-diff-on-failure"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn cli_flags_override_settings_file() {
        let cli = Cli::parse_from([
            "hookrack",
            "--executable",
            "/opt/pre-commit",
            "--on-conflict",
            "abort",
            "--no-raise",
            "check",
        ]);
        let config: config::Config = toml::from_str(
            r#"
executable = "pre-commit"
args = "--hook-stage 'manual push'"
on_conflict = "kill"
symbols = false
"#,
        )
        .unwrap();
        let settings = RunSettings::from_cli(&cli, config).unwrap();
        assert_eq!(settings.supervisor.executable, "/opt/pre-commit");
        assert_eq!(settings.supervisor.extra_args, vec!["--hook-stage", "manual push"]);
        assert!(!settings.supervisor.raise_on_failure);
        assert_eq!(settings.on_conflict, ConflictPolicy::Abort);
        assert!(!settings.use_symbols);
        assert_eq!(settings.hook_config, HOOK_CONFIG_FILE);
    }

    #[test]
    fn unbalanced_args_are_rejected() {
        let cli = Cli::parse_from(["hookrack"]);
        let config = config::Config {
            args: Some("--hook-stage 'manual".to_string()),
            ..Default::default()
        };
        assert!(RunSettings::from_cli(&cli, config).is_err());
    }
}
