//! Typeout application binary - composition root.
//!
//! 1. Load configuration and persisted settings from TOML
//! 2. Start the typing engine (child process or built-in dry run)
//! 3. Wire engine events through the event hub into the session controller
//! 4. Read triggers from stdin and render the session view to stdout

mod input;
mod render;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use typeout_core::config::{expand_home, ConfigSource, EngineMode};
use typeout_core::settings::run_persistence;
use typeout_core::{
    AppConfig, EngineEvent, EngineLink, Settings, SettingsPatch, SettingsStore,
};
use typeout_engine::{DryRunEngine, DryRunOptions, ProcessEngine};
use typeout_session::{EventBridge, EventHub, Outcome, SessionController, SessionSnapshot, Stage};

use crate::input::{parse_line, UserCommand, HELP};
use crate::render::{describe_ignored, describe_settings, Renderer};

/// stage text and have it typed into the focused window on a hotkey
#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
struct Cli {
    /// config file (defaults to $TYPEOUT_CONFIG or ~/.typeout/config.toml)
    #[clap(short = 'c', long)]
    config: Option<PathBuf>,

    /// typing engine to drive, overriding the config file
    #[clap(short = 'e', long, value_enum)]
    engine: Option<EngineArg>,

    /// executable for the process engine, overriding the config file
    #[clap(long)]
    engine_command: Option<String>,

    /// stage the contents of this file; '-' reads the text from stdin and
    /// runs once without interactive commands
    #[clap(short = 'f', long)]
    text_file: Option<PathBuf>,

    /// stage this text
    #[clap(short = 't', long, conflicts_with = "text_file")]
    text: Option<String>,

    /// arm the engine immediately instead of waiting for 'start'
    #[clap(long)]
    start: bool,

    /// exit once the first run finishes or is aborted
    #[clap(long)]
    once: bool,

    /// minimum delay between keystrokes in milliseconds (persisted)
    #[clap(long)]
    lower_delay: Option<u64>,

    /// maximum delay between keystrokes in milliseconds (persisted)
    #[clap(long)]
    upper_delay: Option<u64>,

    /// write the effective config (file plus overrides) to the config path and exit
    #[clap(long)]
    init_config: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum EngineArg {
    DryRun,
    Process,
}

impl From<EngineArg> for EngineMode {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::DryRun => EngineMode::DryRun,
            EngineArg::Process => EngineMode::Process,
        }
    }
}

impl Cli {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(engine) = self.engine {
            config.engine.mode = engine.into();
        }
        if let Some(command) = &self.engine_command {
            config.engine.command = command.clone();
        }
    }

    fn settings_patch(&self) -> SettingsPatch {
        SettingsPatch {
            lower_delay_bound: self.lower_delay,
            upper_delay_bound: self.upper_delay,
            ..Default::default()
        }
    }

    fn text_from_stdin(&self) -> bool {
        self.text_file.as_deref() == Some(Path::new("-"))
    }
}

/// Resolve the config file path (TYPEOUT_CONFIG env, or ~/.typeout/config.toml).
fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("TYPEOUT_CONFIG") {
        return PathBuf::from(p);
    }
    let default = expand_home("~/.typeout/config.toml");
    if default.is_absolute() {
        default
    } else {
        PathBuf::from("config.toml")
    }
}

/// Install the stderr subscriber before anything else logs.
///
/// The filter comes from `RUST_LOG`, else `info`. When `RUST_LOG` is unset the
/// returned handle swaps in the configured level once the config is read.
fn init_tracing() -> Option<reload::Handle<EnvFilter, Registry>> {
    let from_env = EnvFilter::try_from_default_env().ok();
    let env_set = from_env.is_some();
    let (filter, handle) =
        reload::Layer::new(from_env.unwrap_or_else(|| EnvFilter::new("info")));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    (!env_set).then_some(handle)
}

/// The running engine, kept so it can be stopped on exit.
enum EngineHandle {
    DryRun(JoinHandle<()>),
    Process(ProcessEngine),
}

impl EngineHandle {
    async fn shutdown(self) {
        match self {
            EngineHandle::DryRun(task) => task.abort(),
            EngineHandle::Process(engine) => engine.shutdown().await,
        }
    }
}

fn start_engine(
    config: &AppConfig,
    events: mpsc::UnboundedSender<EngineEvent>,
) -> typeout_core::Result<(Arc<dyn EngineLink>, EngineHandle)> {
    match config.engine.mode {
        EngineMode::DryRun => {
            let options = DryRunOptions {
                start_wait: Duration::from_millis(config.engine.dry_run_start_wait_ms),
            };
            let (dry_run, task) = DryRunEngine::spawn(options, events);
            let link: Arc<dyn EngineLink> = dry_run;
            tracing::info!(
                start_wait_ms = config.engine.dry_run_start_wait_ms,
                "Dry-run engine started, no keystrokes will be injected"
            );
            Ok((link, EngineHandle::DryRun(task)))
        }
        EngineMode::Process => {
            let engine = ProcessEngine::spawn(&config.engine.command, &config.engine.args, events)?;
            tracing::info!(command = %config.engine.command, "Engine process started");
            let link: Arc<dyn EngineLink> = engine.link();
            Ok((link, EngineHandle::Process(engine)))
        }
    }
}

/// Options for the event loop that do not come from the controller.
struct LoopOptions {
    interactive: bool,
    once: bool,
}

enum Flow {
    Continue,
    Quit,
}

async fn handle_command(command: UserCommand, controller: &SessionController) -> Flow {
    match command {
        UserCommand::Start => match controller.start() {
            Ok(Outcome::Ignored(reason)) => println!("start ignored: {}", describe_ignored(reason)),
            Ok(_) => {}
            Err(e) => println!("could not reach the typing engine: {}", e),
        },
        UserCommand::Cancel => {
            if let Outcome::Ignored(reason) = controller.cancel() {
                println!("cancel ignored: {}", describe_ignored(reason));
            }
        }
        UserCommand::Text(text) => report_edit(controller.set_text(text)),
        UserCommand::Load(path) => match tokio::fs::read_to_string(expand_home(&path)).await {
            Ok(text) => report_edit(controller.set_text(text)),
            Err(e) => println!("could not read {}: {}", path, e),
        },
        UserCommand::Clear => report_edit(controller.clear_text()),
        UserCommand::Reset => {
            if let Outcome::Ignored(reason) = controller.reset() {
                println!("reset ignored: {}", describe_ignored(reason));
            }
        }
        UserCommand::Settings => println!("{}", describe_settings(&controller.settings().get())),
        UserCommand::Set(patch) => match controller.update_settings(patch) {
            Outcome::Ignored(reason) => println!("settings unchanged: {}", describe_ignored(reason)),
            _ => println!("{}", describe_settings(&controller.settings().get())),
        },
        UserCommand::Status => {
            let snapshot = controller.snapshot();
            println!(
                "{} ({} characters staged{})",
                snapshot.stage,
                snapshot.text.chars().count(),
                if snapshot.locked() { ", locked" } else { "" }
            );
        }
        UserCommand::Help => println!("{}", HELP),
        UserCommand::Quit => return Flow::Quit,
    }
    Flow::Continue
}

fn report_edit(outcome: Outcome) {
    if let Outcome::Ignored(reason) = outcome {
        println!("text unchanged: {}", describe_ignored(reason));
    }
}

/// Front-end reaction to a published snapshot: a finished run clears the
/// staged text when the user asked for it. Returns whether the text was cleared.
fn after_snapshot(controller: &SessionController, snapshot: &SessionSnapshot) -> bool {
    if snapshot.stage != Stage::Finished
        || !controller.settings().get().delete_text_after_completion
    {
        return false;
    }
    let cleared = !controller.clear_text().is_ignored();
    if cleared {
        tracing::debug!("Staged text cleared after completion");
    }
    cleared
}

/// Single event loop: engine events, snapshot changes, stdin and ctrl-c.
async fn run_loop(
    controller: &SessionController,
    hub: &EventHub,
    mut events: mpsc::UnboundedReceiver<EngineEvent>,
    mut renderer: Renderer,
    options: LoopOptions,
) {
    let mut snapshots = controller.subscribe();
    renderer.render(&controller.snapshot());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = options.interactive;
    let mut events_open = true;

    loop {
        tokio::select! {
            event = events.recv(), if events_open => match event {
                Some(event) => {
                    let delivered = hub.emit(&event);
                    tracing::debug!(kind = %event.kind(), delivered, "Engine event");
                }
                None => {
                    tracing::warn!("Engine event stream closed");
                    events_open = false;
                }
            },
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                renderer.render(&snapshot);

                after_snapshot(controller, &snapshot);
                if options.once && snapshot.stage.is_terminal() {
                    break;
                }
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_line(&line) {
                    Ok(Some(command)) => {
                        if let Flow::Quit = handle_command(command, controller).await {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => println!("{}", e),
                },
                Ok(None) => {
                    stdin_open = false;
                    if !options.once {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read stdin");
                    stdin_open = false;
                    if !options.once {
                        break;
                    }
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    if controller.locked() {
        controller.cancel();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_reload = init_tracing();
    tracing::info!("Starting Typeout v{}", env!("CARGO_PKG_VERSION"));

    let config_file = cli.config.clone().unwrap_or_else(config_path);
    let (mut config, source) = AppConfig::resolve(&config_file);
    match &source {
        ConfigSource::File => {}
        ConfigSource::Missing => {
            tracing::info!(path = %config_file.display(), "No config file, using defaults")
        }
        ConfigSource::Invalid(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Config file unreadable, using defaults"
        ),
    }
    cli.apply_overrides(&mut config);

    if let Some(handle) = log_reload {
        match EnvFilter::try_new(&config.general.log_level) {
            Ok(filter) => {
                if let Err(e) = handle.reload(filter) {
                    tracing::warn!(error = %e, "Failed to apply configured log level");
                }
            }
            Err(e) => tracing::warn!(
                level = %config.general.log_level,
                error = %e,
                "Invalid log level in config, keeping info"
            ),
        }
    }
    tracing::info!(mode = ?config.engine.mode, source = ?source, "Engine mode selected");

    if cli.init_config {
        config.save(&config_file)?;
        println!("wrote {}", config_file.display());
        return Ok(());
    }

    // Settings, persisted in the background.
    let settings_path = config.general.resolved_settings_path();
    let (persist_tx, persist_rx) = mpsc::unbounded_channel::<Settings>();
    let persistence = tokio::spawn(run_persistence(persist_rx, settings_path.clone()));
    let settings = SettingsStore::with_persistence(Settings::load_or_default(&settings_path), persist_tx);

    // Text staged up front.
    let staged = if cli.text_from_stdin() {
        let mut text = String::new();
        tokio::io::stdin().read_to_string(&mut text).await?;
        Some(text)
    } else if let Some(path) = &cli.text_file {
        Some(tokio::fs::read_to_string(path).await?)
    } else {
        cli.text.clone()
    };

    // Engine.
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (link, engine) = start_engine(&config, events_tx)?;

    let controller = SessionController::new(link, settings);
    let hub = EventHub::new();
    let bridge = EventBridge::attach(&hub, &controller);

    let patch = cli.settings_patch();
    if !patch.is_empty() {
        controller.update_settings(patch);
    }
    if let Some(text) = staged {
        controller.set_text(text);
    }

    let interactive = !cli.text_from_stdin();
    if interactive {
        println!("type 'help' for commands");
    }
    if cli.start || !interactive {
        match controller.start() {
            Ok(Outcome::Ignored(reason)) => println!("start ignored: {}", describe_ignored(reason)),
            Ok(_) => {}
            Err(e) => println!("could not reach the typing engine: {}", e),
        }
    }

    let options = LoopOptions {
        interactive,
        once: cli.once || !interactive,
    };
    // Nothing will ever start in a non-interactive session whose start was refused.
    if options.interactive || controller.locked() {
        let renderer = Renderer::new(
            config.engine.start_key_label.clone(),
            config.engine.cancel_key_label.clone(),
        );
        run_loop(&controller, &hub, events_rx, renderer, options).await;
    }

    // Shutdown.
    bridge.detach();
    engine.shutdown().await;
    drop(controller);
    if tokio::time::timeout(Duration::from_secs(2), persistence).await.is_err() {
        tracing::warn!("Timed out flushing settings");
    }

    tracing::info!("Typeout stopped");
    Ok(())
}
