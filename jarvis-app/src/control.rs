//! Console control surface.
//!
//! Lines starting with `/` are control commands; any other non-empty line is
//! a text utterance answered on stdout (and spoken in hybrid mode).

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::thread::JoinHandle;

use jarvis_core::audio::device::format_device_line;
use tracing::{error, info};

use crate::commands::{CommandHandler, InputSource};
use crate::state::AssistantContext;

pub const HELP_TEXT: &str = "\
Control commands (prefix with '/'):
  /mic on|off       enable or disable the microphone
  /text on|off      text mode
  /hybrid on|off    speak replies to typed commands
  /devices          list audio input devices
  /set_mic <index>  switch input device
  /help             show this help
  /exit             quit
Any other line is handled as a typed command.";

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlInput {
    Mic(bool),
    Text(bool),
    Hybrid(bool),
    Devices,
    SetMic(usize),
    Help,
    Exit,
    /// Known command with bad arguments; carries the usage line.
    Usage(&'static str),
    Unknown(String),
    Utterance(String),
    Empty,
}

/// What the control loop should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub fn parse_control_line(line: &str) -> ControlInput {
    let line = line.trim();
    if line.is_empty() {
        return ControlInput::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ControlInput::Utterance(line.to_string());
    };

    let lowered = command.to_lowercase();
    let mut parts = lowered.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();

    match name {
        "exit" | "quit" => ControlInput::Exit,
        "help" => ControlInput::Help,
        "devices" => ControlInput::Devices,
        "mic" => on_off(arg).map_or(ControlInput::Usage("Usage: /mic on|off"), ControlInput::Mic),
        "text" => {
            on_off(arg).map_or(ControlInput::Usage("Usage: /text on|off"), ControlInput::Text)
        }
        "hybrid" => on_off(arg).map_or(
            ControlInput::Usage("Usage: /hybrid on|off"),
            ControlInput::Hybrid,
        ),
        "set_mic" => arg
            .and_then(|a| a.parse::<usize>().ok())
            .map_or(
                ControlInput::Usage("Usage: /set_mic <device_index>"),
                ControlInput::SetMic,
            ),
        _ => ControlInput::Unknown(command.trim().to_string()),
    }
}

fn on_off(arg: Option<&str>) -> Option<bool> {
    match arg {
        Some("on") => Some(true),
        Some("off") => Some(false),
        _ => None,
    }
}

/// Act on one parsed line, writing user-facing output to `out`.
pub fn apply_control<W: Write>(
    ctx: &AssistantContext,
    handler: &CommandHandler,
    input: ControlInput,
    out: &mut W,
) -> std::io::Result<Flow> {
    match input {
        ControlInput::Empty => {}
        ControlInput::Exit => {
            info!("shutdown command received");
            ctx.request_shutdown();
            return Ok(Flow::Exit);
        }
        ControlInput::Help => writeln!(out, "{HELP_TEXT}")?,
        ControlInput::Usage(usage) => writeln!(out, "{usage}")?,
        ControlInput::Unknown(cmd) => writeln!(
            out,
            "Unknown command: /{cmd}. Type /help for available commands"
        )?,
        ControlInput::Mic(enabled) => match ctx.set_mic_enabled(enabled) {
            Ok(()) => {
                let word = if enabled { "enabled" } else { "disabled" };
                info!("microphone {word}");
                writeln!(out, "Microphone {word}")?;
            }
            Err(e) => {
                error!("failed to switch microphone: {e}");
                writeln!(out, "Microphone error: {e}")?;
            }
        },
        ControlInput::Text(enabled) => {
            ctx.set_text_mode(enabled);
            info!(enabled, "text mode changed");
            writeln!(out, "Text mode {}", if enabled { "on" } else { "off" })?;
        }
        ControlInput::Hybrid(enabled) => {
            ctx.set_hybrid_mode(enabled);
            info!(enabled, "hybrid mode changed");
            writeln!(out, "Hybrid mode {}", if enabled { "on" } else { "off" })?;
        }
        ControlInput::Devices => {
            writeln!(out, "Available audio devices:")?;
            for device in ctx.list_devices() {
                writeln!(out, "{}", format_device_line(&device))?;
            }
        }
        ControlInput::SetMic(index) => match ctx.set_mic(index) {
            Ok(()) => writeln!(out, "Microphone device set to index {index}")?,
            Err(e) => {
                error!(index, "failed to switch microphone device: {e}");
                writeln!(out, "Could not use device {index}: {e}")?;
            }
        },
        ControlInput::Utterance(text) => {
            let response = handler.handle(&text, InputSource::Text);
            writeln!(out, "Assistant: {response}")?;
            if ctx.mode().hybrid_mode {
                let device = ctx.output_device();
                ctx.with_engine(|engine| {
                    if engine.is_active() {
                        engine.speak(&response, device);
                    }
                });
            }
        }
    }
    Ok(Flow::Continue)
}

/// Read control lines from `input` until `/exit` or end of input.
pub fn run_control_loop<R: BufRead, W: Write>(
    ctx: &AssistantContext,
    handler: &CommandHandler,
    input: R,
    out: &mut W,
) {
    let _ = writeln!(out, "{HELP_TEXT}");
    let _ = write!(out, "\nControl> ");
    let _ = out.flush();

    for line in input.lines() {
        if ctx.is_shutdown() {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("control input error: {e}");
                break;
            }
        };
        match apply_control(ctx, handler, parse_control_line(&line), out) {
            Ok(Flow::Exit) => return,
            Ok(Flow::Continue) => {}
            Err(e) => error!("control output error: {e}"),
        }
        let _ = write!(out, "\nControl> ");
        let _ = out.flush();
    }
    info!("control input closed");
}

/// Spawn the console control thread reading stdin.
pub fn spawn_control_thread(
    ctx: Arc<AssistantContext>,
    handler: Arc<CommandHandler>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("control".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            let mut stdout = std::io::stdout();
            run_control_loop(&ctx, &handler, stdin.lock(), &mut stdout);
        })
}
