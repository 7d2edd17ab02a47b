//! Child process execution.

use std::io::Read;
use std::process::{Command, Stdio};

/// Runs a shell command with stderr folded into stdout. When `output` is
/// given, the captured text and any failure diagnostics go there; otherwise
/// they go straight to stderr. Returns whether the command exited zero.
pub fn execute_command(command: &str, mut output: Option<&mut String>) -> bool {
    let raw_command = format!("{command} 2>&1");

    let child = Command::new("sh")
        .arg("-c")
        .arg(&raw_command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn();

    let mut child = match child {
        Ok(child) => child,
        Err(error) => {
            emit(
                &mut output,
                &format!("Unknown error executing: {command}: {error}\n"),
            );
            return false;
        }
    };

    let mut captured = String::new();
    if let Some(stdout) = child.stdout.as_mut() {
        // Read to EOF before waiting so the child never blocks on a full
        // pipe.
        let _ = stdout.read_to_string(&mut captured);
    }

    match child.wait() {
        Ok(status) if status.success() => true,
        _ => {
            emit(&mut output, &format!("Error executing: {command}\n"));
            if !captured.is_empty() {
                emit(&mut output, &captured);
                if !captured.ends_with('\n') {
                    emit(&mut output, "\n");
                }
            }
            false
        }
    }
}

/// Runs a command with the terminal attached, for `run` commands and
/// verbose mode. Returns whether it exited zero.
pub fn execute_command_passthrough(command: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(command)
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn emit(output: &mut Option<&mut String>, text: &str) {
    match output {
        Some(buffer) => buffer.push_str(text),
        None => eprint!("{text}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successful_command_captures_nothing() {
        let mut output = String::new();
        assert!(execute_command("true", Some(&mut output)));
        assert!(output.is_empty());
    }

    #[test]
    fn test_failing_command_captures_its_output() {
        let mut output = String::new();
        assert!(!execute_command("echo broken-build; exit 3", Some(&mut output)));
        assert!(output.contains("broken-build"));
        assert!(output.contains("Error executing"));
    }

    #[test]
    fn test_stderr_is_folded_into_the_capture() {
        let mut output = String::new();
        assert!(!execute_command(
            "(echo to-stderr >&2; false)",
            Some(&mut output)
        ));
        assert!(output.contains("to-stderr"));
    }

    #[test]
    fn test_passthrough_reports_exit_status() {
        assert!(execute_command_passthrough("true"));
        assert!(!execute_command_passthrough("false"));
    }
}
