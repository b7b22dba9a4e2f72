//! Subprocess plumbing shared by the host capability adapters

use crate::{Error, Result};
use std::io::Write;
use std::process::{Command, Output, Stdio};

/// Output from a command execution
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run a command and capture output
pub fn run(cmd: &str, args: &[&str]) -> Result<CommandOutput> {
    let output = Command::new(cmd)
        .args(args)
        .output()
        .map_err(|e| spawn_error(cmd, args, e))?;
    Ok(parse_output(output))
}

/// Run a command, feeding `stdin` to the child, and capture output
pub fn run_with_stdin(cmd: &str, args: &[&str], stdin: &str) -> Result<CommandOutput> {
    let mut child = Command::new(cmd)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(cmd, args, e))?;
    if let Some(handle) = child.stdin.as_mut() {
        handle.write_all(stdin.as_bytes())?;
    }
    let output = child.wait_with_output()?;
    Ok(parse_output(output))
}

/// Error for a command that ran but exited non-zero, carrying the captured
/// stderr for the log
pub fn failure(display: &str, output: &CommandOutput) -> Error {
    let detail = output.stderr.trim();
    Error::Command {
        cmd: display.to_string(),
        message: if detail.is_empty() {
            format!("exit code {}", output.exit_code)
        } else {
            detail.to_string()
        },
    }
}

fn spawn_error(cmd: &str, args: &[&str], e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::CommandNotFound(cmd.to_string())
    } else {
        Error::Command {
            cmd: format!("{} {}", cmd, args.join(" ")),
            message: e.to_string(),
        }
    }
}

fn parse_output(output: Output) -> CommandOutput {
    CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
}
