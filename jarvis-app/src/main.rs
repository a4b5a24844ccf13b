//! `jarvis` console assistant entry point.
//!
//! ## Threads
//!
//! - main: polls the engine for the wake word, records and answers commands
//! - control: reads console lines (`/mic off`, typed commands, ...)
//! - status-log: writes engine status events to the log
//!
//! The engine itself is only reached through `AssistantContext`, which holds
//! it under a mutex.

mod commands;
mod control;
mod settings;
mod state;
mod system;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::Receiver;
use jarvis_core::{
    audio::{device::format_device_line, AudioBackend},
    BuiltinLoader, CpalBackend, EngineConfig, EngineStatusEvent,
};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use commands::{CommandHandler, InputSource};
use settings::{default_settings_path, load_settings, save_settings, AppSettings};
use state::{AssistantContext, AssistantMode, ControlCommand};
use system::SystemController;

/// Jarvis - wake-word voice assistant
#[derive(Parser, Debug)]
#[command(name = "jarvis", version, about)]
struct Cli {
    /// Text-only mode (microphone disabled)
    #[arg(long, conflicts_with = "hybrid")]
    text_only: bool,

    /// Hybrid voice/text mode: typed replies are also spoken
    #[arg(long)]
    hybrid: bool,

    /// Input device index (see --list-devices)
    #[arg(long)]
    mic_index: Option<usize>,

    /// Settings file (default: user data directory)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Command table (YAML)
    #[arg(long, default_value = "commands.yaml")]
    commands: PathBuf,

    /// Log file, appended to
    #[arg(long, default_value = "assistant.log")]
    log_file: PathBuf,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Wake-word engine access key
    #[arg(long, env = "JARVIS_ACCESS_KEY", hide_env_values = true)]
    access_key: Option<String>,

    /// Save every recorded command window as WAV into this directory
    #[arg(long)]
    save_commands: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli) {
        eprintln!("failed to initialise logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default_filter = if cli.verbose {
        "jarvis=debug,jarvis_core=debug"
    } else {
        "jarvis=info,jarvis_core=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cli.log_file)
        .with_context(|| format!("opening log file {}", cli.log_file.display()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(log_file)),
        )
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(())
}

fn initial_mode(cli: &Cli, settings: &AppSettings) -> AssistantMode {
    let mic_device_index = cli.mic_index.or(settings.preferred_mic_index);
    if cli.hybrid {
        AssistantMode {
            mic_enabled: true,
            text_mode: true,
            hybrid_mode: true,
            mic_device_index,
        }
    } else if cli.text_only {
        AssistantMode {
            mic_enabled: false,
            text_mode: true,
            hybrid_mode: false,
            mic_device_index,
        }
    } else {
        AssistantMode {
            mic_enabled: true,
            text_mode: false,
            hybrid_mode: false,
            mic_device_index,
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    info!("starting Jarvis");
    let backend = Arc::new(CpalBackend);

    if cli.list_devices {
        let devices = backend.input_devices();
        if devices.is_empty() {
            println!("No audio input devices found");
        }
        for device in devices {
            println!("{}", format_device_line(&device));
        }
        return Ok(());
    }

    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let settings = load_settings(&settings_path);
    if !settings_path.exists() {
        match save_settings(&settings_path, &settings) {
            Ok(()) => info!(path = %settings_path.display(), "wrote default settings"),
            Err(e) => warn!(
                path = %settings_path.display(),
                "could not write default settings: {e}"
            ),
        }
    }
    info!(
        settings_path = %settings_path.display(),
        keywords = ?settings.wake_keywords,
        record_seconds = settings.record_seconds,
        match_threshold = settings.match_threshold,
        "settings loaded"
    );

    let table = commands::load_or_default(&cli.commands);
    let handler = Arc::new(
        CommandHandler::new(table, Box::new(SystemController::new()))
            .with_threshold(settings.match_threshold),
    );

    let loader = Arc::new(BuiltinLoader::new(
        settings.model_config(cli.access_key.clone()),
    ));
    let config = EngineConfig {
        command_dump_dir: cli.save_commands.clone(),
        ..EngineConfig::default()
    };

    let mode = initial_mode(&cli, &settings);
    let (ctx, control_rx) =
        AssistantContext::new(mode, config, backend, loader, settings.output_device_index);
    let ctx = Arc::new(ctx);

    spawn_status_logger(ctx.subscribe_status()).context("spawning status logger")?;

    if mode.mic_enabled {
        if let Err(e) = ctx.start_engine() {
            error!("microphone unavailable, continuing with console input: {e}");
        }
    }
    info!(
        mic = mode.mic_enabled,
        device = ?mode.mic_device_index,
        text = mode.text_mode,
        hybrid = mode.hybrid_mode,
        "initial mode"
    );

    control::spawn_control_thread(Arc::clone(&ctx), Arc::clone(&handler))
        .context("spawning control thread")?;

    run_main_loop(&ctx, &handler, &control_rx, &settings);

    info!("cleaning up resources");
    ctx.shutdown();
    info!("assistant shutdown complete");
    Ok(())
}

/// Poll for activation until a shutdown directive arrives.
fn run_main_loop(
    ctx: &AssistantContext,
    handler: &CommandHandler,
    control_rx: &Receiver<ControlCommand>,
    settings: &AppSettings,
) {
    loop {
        if let Ok(ControlCommand::Shutdown) = control_rx.try_recv() {
            info!("shutdown command processed");
            break;
        }
        if ctx.is_shutdown() {
            break;
        }

        if ctx.mode().mic_enabled {
            poll_voice(ctx, handler, settings);
        }

        thread::sleep(settings.poll_interval());
    }
}

/// Check every queued frame for the wake word; on activation prompt, record,
/// dispatch and answer. Returns the recognised command, if any.
fn poll_voice(
    ctx: &AssistantContext,
    handler: &CommandHandler,
    settings: &AppSettings,
) -> Option<String> {
    let output_device = ctx.output_device();
    ctx.with_engine(|engine| {
        if !engine.is_active() {
            return None;
        }

        let mut activated = false;
        while engine.pending_frames() > 0 {
            if engine.check_activation() {
                activated = true;
                break;
            }
        }
        if !activated {
            return None;
        }

        info!("voice activation detected");
        engine.speak(&settings.activation_prompt, output_device);

        let command = engine.record_command(settings.record_duration());
        if command.is_empty() {
            info!("no command heard");
            return None;
        }
        info!(command = command.as_str(), "voice command");

        let response = handler.handle(&command, InputSource::Voice);
        if !response.is_empty() {
            engine.speak(&response, output_device);
        }
        Some(command)
    })
    .flatten()
}

/// Forward engine status events to the log.
fn spawn_status_logger(
    mut rx: broadcast::Receiver<EngineStatusEvent>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("status-log".into())
        .spawn(move || loop {
            match rx.blocking_recv() {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => info!(target: "jarvis::status", "{json}"),
                    Err(e) => warn!("failed to serialize status event: {e}"),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("status receiver lagged by {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        })
}
