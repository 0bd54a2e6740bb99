//! Command execution primitives with consistent error handling.

use std::process::{Command, Output};

use crate::error::{CommandFailedDetails, Error, Result};

/// Run a command and return trimmed stdout on success.
///
/// `display` is what appears in errors and logs; pass a redacted form when
/// the arguments carry secrets.
pub fn run(program: &str, args: &[&str], display: &str) -> Result<String> {
    run_with_env(program, args, &[], display)
}

/// Run a command with extra environment variables.
///
/// Secrets passed this way stay out of the process argument list.
pub fn run_with_env(
    program: &str,
    args: &[&str],
    env: &[(&str, &str)],
    display: &str,
) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .envs(env.iter().copied())
        .output()
        .map_err(|e| spawn_error(display, e))?;
    check(output, display)
}

/// Run a command in a specific directory.
pub fn run_in(dir: &str, program: &str, args: &[&str], display: &str) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| spawn_error(display, e))?;
    check(output, display)
}

/// Run a shell command line through `sh -c`.
pub fn run_shell(dir: &str, command: &str) -> Result<String> {
    run_in(dir, "sh", &["-c", command], command)
}

/// Run a command in a directory, returning None on failure instead of error.
///
/// Useful when command failure is expected/acceptable (e.g., checking for optional tags).
pub fn run_in_optional(dir: &str, program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        None
    } else {
        Some(stdout)
    }
}

fn check(output: Output, display: &str) -> Result<String> {
    if !output.status.success() {
        return Err(Error::command_failed(
            display,
            CommandFailedDetails {
                command: display.to_string(),
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            },
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn spawn_error(display: &str, err: std::io::Error) -> Error {
    Error::command_failed(
        display,
        CommandFailedDetails {
            command: display.to_string(),
            exit_code: -1,
            stdout: String::new(),
            stderr: format!("failed to start: {}", err),
        },
    )
}
