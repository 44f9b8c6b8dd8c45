//! Text delivery to the focused application
//!
//! Two methods: copy to the clipboard, or "type", which also routes through
//! the clipboard and then synthesizes a paste keystroke (direct synthetic
//! typing is unreliable across toolkits). Terminals get Ctrl+Shift+V,
//! everything else Ctrl+V.

use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;
use thiserror::Error;

/// Clipboard ownership needs a moment to settle before the paste keystroke.
const PASTE_DELAY: Duration = Duration::from_millis(10);

/// App ids treated as terminal emulators (matched as lowercase substrings).
const TERMINAL_APPS: &[&str] = &["kitty", "alacritty", "foot", "wezterm"];

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write to {tool}: {source}")]
    Write {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {tool}: {source}")]
    Wait {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}")]
    Exited {
        tool: &'static str,
        status: std::process::ExitStatus,
    },
}

pub trait OutputMethod {
    fn deliver(&self, text: &str) -> Result<(), OutputError>;
}

/// Is the focused application a known terminal emulator?
pub fn is_terminal_app(app: &str) -> bool {
    let app = app.to_lowercase();
    !app.is_empty() && TERMINAL_APPS.iter().any(|t| app.contains(t))
}

/// Select the delivery method named by the request.
pub fn make_output(method: &str, is_terminal: bool) -> Box<dyn OutputMethod> {
    if method == "type" {
        Box::new(TypeOutput { terminal: is_terminal })
    } else {
        Box::new(ClipboardOutput)
    }
}

/// Pipe the text into `wl-copy`.
pub struct ClipboardOutput;

impl OutputMethod for ClipboardOutput {
    fn deliver(&self, text: &str) -> Result<(), OutputError> {
        const TOOL: &str = "wl-copy";

        let mut child = Command::new(TOOL)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| OutputError::Spawn { tool: TOOL, source })?;

        if let Some(mut stdin) = child.stdin.take() {
            // write_all restarts on EINTR; dropping stdin closes the pipe so
            // the tool sees EOF.
            stdin
                .write_all(text.as_bytes())
                .map_err(|source| OutputError::Write { tool: TOOL, source })?;
        }

        let status = child
            .wait()
            .map_err(|source| OutputError::Wait { tool: TOOL, source })?;

        if !status.success() {
            return Err(OutputError::Exited { tool: TOOL, status });
        }
        Ok(())
    }
}

/// Clipboard copy followed by a synthesized paste keystroke.
pub struct TypeOutput {
    terminal: bool,
}

impl TypeOutput {
    pub fn new(terminal: bool) -> Self {
        Self { terminal }
    }
}

impl OutputMethod for TypeOutput {
    fn deliver(&self, text: &str) -> Result<(), OutputError> {
        const TOOL: &str = "wtype";

        ClipboardOutput.deliver(text)?;
        std::thread::sleep(PASTE_DELAY);

        let mut command = Command::new(TOOL);
        command.args(["-M", "ctrl"]);
        if self.terminal {
            command.args(["-M", "shift"]);
        }
        command.args(["-k", "v"]);

        let status = command
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| OutputError::Spawn { tool: TOOL, source })?;

        if !status.success() {
            return Err(OutputError::Exited { tool: TOOL, status });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(is_terminal_app("kitty"));
        assert!(is_terminal_app("Alacritty"));
        assert!(is_terminal_app("org.wezfurlong.wezterm"));
        assert!(is_terminal_app("footclient"));
        assert!(!is_terminal_app("firefox"));
        assert!(!is_terminal_app(""));
    }

    #[test]
    fn test_spawn_failure_is_typed() {
        let spawn_err = Command::new("speak-anywhere-no-such-tool")
            .stdin(Stdio::piped())
            .spawn()
            .expect_err("tool must not exist");
        let err = OutputError::Spawn {
            tool: "wl-copy",
            source: spawn_err,
        };
        assert!(err.to_string().contains("wl-copy"));
    }
}
