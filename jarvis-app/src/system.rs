//! OS actions behind matched commands.
//!
//! Every action resolves to a [`LaunchPlan`] first (which program, which
//! arguments, what to tell the user) and only then spawns the process.
//! Planning is pure, so the per-OS choices are unit tested on any host.
//! Spawned processes are waited on from a short-lived reaper thread so
//! finished launchers never linger as zombies.

use std::io;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use crate::commands::ActionExecutor;

const BROWSERS: &[&str] = &["firefox", "chrome", "chromium", "microsoft-edge"];
const LINUX_TERMINALS: &[&str] = &["gnome-terminal", "konsole", "xterm"];
const LINUX_CALCULATORS: &[&str] = &["gnome-calculator", "kcalc", "xcalc"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Windows,
    MacOs,
    Linux,
}

impl HostOs {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            HostOs::Windows
        } else if cfg!(target_os = "macos") {
            HostOs::MacOs
        } else {
            HostOs::Linux
        }
    }
}

/// A process to spawn and the reply to give once it is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchPlan {
    Spawn {
        program: String,
        args: Vec<String>,
        reply: String,
    },
    /// Nothing suitable is installed.
    Unavailable(String),
    Unknown(String),
}

impl LaunchPlan {
    fn spawn(program: &str, args: &[&str], reply: impl Into<String>) -> Self {
        LaunchPlan::Spawn {
            program: program.to_string(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            reply: reply.into(),
        }
    }
}

type ProgramLookup = Box<dyn Fn(&str) -> bool + Send + Sync>;

pub struct SystemController {
    os: HostOs,
    browser: String,
    is_installed: ProgramLookup,
}

impl Default for SystemController {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemController {
    /// Controller for this machine, resolving programs on `PATH`.
    pub fn new() -> Self {
        Self::with_lookup(
            HostOs::current(),
            Box::new(|name: &str| which::which(name).is_ok()),
        )
    }

    pub fn with_lookup(os: HostOs, is_installed: ProgramLookup) -> Self {
        let browser = BROWSERS
            .iter()
            .copied()
            .find(|b| is_installed(*b))
            .unwrap_or("firefox")
            .to_string();
        info!(os = ?os, browser = browser.as_str(), "system controller ready");
        Self {
            os,
            browser,
            is_installed,
        }
    }

    pub fn browser(&self) -> &str {
        &self.browser
    }

    pub fn plan(&self, action: &str) -> LaunchPlan {
        match action {
            "open_browser" | "new_tab" => self.open_url("about:blank"),
            "open_youtube" => self.open_url("https://youtube.com"),
            "open_google" => self.open_url("https://google.com"),
            "close_browser" => self.close_browser(),
            "open_terminal" => self.open_terminal(),
            "open_calculator" => self.open_calculator(),
            other => LaunchPlan::Unknown(format!("Command '{other}' is not implemented")),
        }
    }

    fn open_url(&self, url: &str) -> LaunchPlan {
        let reply = format!("Opening {url}");
        match self.os {
            HostOs::Windows => LaunchPlan::spawn("cmd", &["/C", "start", "", url], reply),
            HostOs::MacOs => LaunchPlan::spawn("open", &[url], reply),
            HostOs::Linux => LaunchPlan::spawn("xdg-open", &[url], reply),
        }
    }

    fn close_browser(&self) -> LaunchPlan {
        let reply = "Closing the browser";
        match self.os {
            HostOs::Windows => {
                let image = format!("{}.exe", self.browser);
                LaunchPlan::spawn("taskkill", &["/f", "/im", image.as_str()], reply)
            }
            HostOs::MacOs => {
                let script = format!("tell application \"{}\" to quit", self.browser);
                LaunchPlan::spawn("osascript", &["-e", script.as_str()], reply)
            }
            HostOs::Linux => LaunchPlan::spawn("pkill", &[self.browser.as_str()], reply),
        }
    }

    fn open_terminal(&self) -> LaunchPlan {
        let reply = "Opening a terminal";
        match self.os {
            HostOs::Windows => LaunchPlan::spawn("cmd", &["/C", "start", "cmd"], reply),
            HostOs::MacOs => LaunchPlan::spawn("open", &["-a", "Terminal"], reply),
            HostOs::Linux => self
                .first_installed(LINUX_TERMINALS)
                .map(|term| LaunchPlan::spawn(term, &[], reply))
                .unwrap_or_else(|| LaunchPlan::Unavailable("Terminal not found".into())),
        }
    }

    fn open_calculator(&self) -> LaunchPlan {
        let reply = "Opening the calculator";
        match self.os {
            HostOs::Windows => LaunchPlan::spawn("calc.exe", &[], reply),
            HostOs::MacOs => LaunchPlan::spawn("open", &["-a", "Calculator"], reply),
            HostOs::Linux => self
                .first_installed(LINUX_CALCULATORS)
                .map(|calc| LaunchPlan::spawn(calc, &[], reply))
                .unwrap_or_else(|| LaunchPlan::Unavailable("Calculator not found".into())),
        }
    }

    fn first_installed<'a>(&self, candidates: &[&'a str]) -> Option<&'a str> {
        candidates.iter().copied().find(|c| (self.is_installed)(*c))
    }
}

impl ActionExecutor for SystemController {
    fn execute(&self, action: &str, _raw_text: &str) -> String {
        match self.plan(action) {
            LaunchPlan::Spawn {
                program,
                args,
                reply,
            } => {
                info!(action, program = program.as_str(), "launching");
                match launch(&program, &args) {
                    Ok(_reaper) => reply,
                    Err(e) => {
                        error!(action, program = program.as_str(), "launch failed: {e}");
                        "Failed to execute the command".into()
                    }
                }
            }
            LaunchPlan::Unavailable(reply) | LaunchPlan::Unknown(reply) => reply,
        }
    }
}

/// Spawn `program` with null stdio and wait for it on a reaper thread.
///
/// The returned handle finishes once the process has exited and been
/// reaped; callers are free to drop it.
pub fn launch(program: &str, args: &[String]) -> io::Result<JoinHandle<()>> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    let name = program.to_string();
    let reaper = thread::Builder::new()
        .name("action-reaper".into())
        .spawn(move || match child.wait() {
            Ok(status) => debug!(program = name.as_str(), %status, "action process exited"),
            Err(e) => warn!(program = name.as_str(), "waiting for action process: {e}"),
        });

    match reaper {
        Ok(handle) => Ok(handle),
        Err(e) => {
            warn!(program, "could not start reaper thread: {e}");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(os: HostOs, installed: &'static [&'static str]) -> SystemController {
        SystemController::with_lookup(os, Box::new(move |name: &str| installed.contains(&name)))
    }

    #[test]
    fn browser_detection_follows_preference_order() {
        assert_eq!(controller(HostOs::Linux, &["chromium", "chrome"]).browser(), "chrome");
        assert_eq!(controller(HostOs::Linux, &[]).browser(), "firefox");
    }

    #[test]
    fn linux_plans() {
        let sys = controller(HostOs::Linux, &["chromium", "konsole"]);
        assert_eq!(
            sys.plan("close_browser"),
            LaunchPlan::spawn("pkill", &["chromium"], "Closing the browser")
        );
        assert_eq!(
            sys.plan("open_terminal"),
            LaunchPlan::spawn("konsole", &[], "Opening a terminal")
        );
        assert_eq!(
            sys.plan("open_calculator"),
            LaunchPlan::Unavailable("Calculator not found".into())
        );
        assert_eq!(
            sys.plan("open_youtube"),
            LaunchPlan::spawn("xdg-open", &["https://youtube.com"], "Opening https://youtube.com")
        );
    }

    #[test]
    fn windows_and_macos_plans() {
        let win = controller(HostOs::Windows, &["chrome"]);
        assert_eq!(
            win.plan("close_browser"),
            LaunchPlan::spawn("taskkill", &["/f", "/im", "chrome.exe"], "Closing the browser")
        );
        assert_eq!(
            win.plan("open_calculator"),
            LaunchPlan::spawn("calc.exe", &[], "Opening the calculator")
        );

        let mac = controller(HostOs::MacOs, &[]);
        assert_eq!(
            mac.plan("close_browser"),
            LaunchPlan::spawn(
                "osascript",
                &["-e", "tell application \"firefox\" to quit"],
                "Closing the browser"
            )
        );
        assert_eq!(
            mac.plan("new_tab"),
            LaunchPlan::spawn("open", &["about:blank"], "Opening about:blank")
        );
    }

    #[test]
    fn missing_program_fails_to_launch() {
        assert!(launch("jarvis-no-such-program", &[]).is_err());
    }

    /// Children of this process currently in the zombie state.
    #[cfg(target_os = "linux")]
    fn zombie_children() -> usize {
        let me = std::process::id().to_string();
        std::fs::read_dir("/proc")
            .expect("read /proc")
            .filter_map(|entry| std::fs::read_to_string(entry.ok()?.path().join("stat")).ok())
            .filter(|stat| {
                // Fields after the parenthesised command name: state, ppid, ...
                let Some((_, rest)) = stat.rsplit_once(')') else {
                    return false;
                };
                let mut fields = rest.split_whitespace();
                let state = fields.next();
                let ppid = fields.next();
                state == Some("Z") && ppid == Some(me.as_str())
            })
            .count()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn launched_processes_are_reaped() {
        let reapers: Vec<_> = (0..3)
            .map(|_| launch("true", &[]).expect("spawn true"))
            .collect();
        for reaper in reapers {
            reaper.join().expect("reaper thread");
        }
        assert_eq!(zombie_children(), 0);
    }

    #[test]
    fn unknown_action_is_reported_without_spawning() {
        let sys = controller(HostOs::Linux, &[]);
        assert_eq!(
            sys.execute("make_coffee", "make me a coffee"),
            "Command 'make_coffee' is not implemented"
        );
    }
}
