//! Subprocess execution for vibe's CLI-wrapping backends and for `git`
//! operations the git handle doesn't perform natively (push, stash).
//!
//! Every external invocation takes a bounded timeout and, on failure or
//! timeout, returns the combined stdout+stderr in the error message
//! (truncated — spec §7, "Subprocess invocation" — so a failing CI-log
//! fetch can't blow up an error message).

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Output of a subprocess invocation with timeout bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code, or `-1` when the process was killed before exiting.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }

    /// Combined stdout+stderr, truncated to `limit` bytes, for embedding
    /// in an error message without leaking an unbounded log.
    pub fn combined_truncated(&self, limit: usize) -> String {
        let mut combined = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&self.stderr);
        }
        truncate(&combined, limit)
    }
}

fn truncate(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        s.to_string()
    } else {
        let mut end = limit;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} bytes total)", &s[..end], s.len())
    }
}

/// Byte limit applied to subprocess output embedded in error messages.
pub const OUTPUT_TRUNCATION_LIMIT: usize = 4096;

/// Run `program` with `args` in `working_dir`, killing it if it exceeds
/// `timeout`. A `None` timeout runs to completion with no deadline.
pub fn run_command_with_timeout(
    program: &str,
    args: &[&str],
    working_dir: &std::path::Path,
    timeout: Option<Duration>,
) -> Result<CommandOutput> {
    run_with_stdin(program, args, working_dir, None, timeout)
}

/// As [`run_command_with_timeout`], but pipes `stdin` into the child
/// rather than passing it as an argument — used when a body is longer
/// than 200 characters or contains a newline, to dodge argv limits and
/// shell-quoting issues (spec §4.1, "Subprocess backend").
pub fn run_with_stdin(
    program: &str,
    args: &[&str],
    working_dir: &std::path::Path,
    stdin: Option<&str>,
    timeout: Option<Duration>,
) -> Result<CommandOutput> {
    let start = Instant::now();

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(working_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if stdin.is_some() {
        command.stdin(Stdio::piped());
    } else {
        command.stdin(Stdio::null());
    }

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to spawn command: {program}"))?;

    if let Some(body) = stdin {
        write_stdin(&mut child, body);
    }

    match timeout {
        None => {
            let output = child
                .wait_with_output()
                .with_context(|| format!("failed to wait on command: {program}"))?;
            Ok(CommandOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                timed_out: false,
                duration: start.elapsed(),
            })
        }
        Some(timeout_dur) => poll_until_done(child, program, start, timeout_dur),
    }
}

fn write_stdin(child: &mut Child, body: &str) {
    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(body.as_bytes());
    }
}

fn poll_until_done(
    mut child: Child,
    program: &str,
    start: Instant,
    timeout_dur: Duration,
) -> Result<CommandOutput> {
    let deadline = Instant::now() + timeout_dur;
    loop {
        match child
            .try_wait()
            .with_context(|| format!("failed to poll command: {program}"))?
        {
            Some(status) => {
                return Ok(CommandOutput {
                    exit_code: status.code().unwrap_or(-1),
                    stdout: read_pipe(child.stdout.take()),
                    stderr: read_pipe(child.stderr.take()),
                    timed_out: false,
                    duration: start.elapsed(),
                });
            }
            None => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();

                    let mut stderr = read_pipe(child.stderr.take());
                    stderr.push_str(&format!(
                        "\n{} timed out after {}",
                        program,
                        humantime::format_duration(timeout_dur)
                    ));

                    return Ok(CommandOutput {
                        exit_code: -1,
                        stdout: read_pipe(child.stdout.take()),
                        stderr,
                        timed_out: true,
                        duration: start.elapsed(),
                    });
                }

                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }
}

fn read_pipe<R: Read>(stream: Option<R>) -> String {
    let mut buffer = Vec::new();
    if let Some(mut s) = stream {
        let _ = s.read_to_end(&mut buffer);
    }
    String::from_utf8_lossy(&buffer).to_string()
}

/// Whether a body should be piped via stdin rather than passed as an
/// argv element (spec §4.1): longer than 200 characters, or containing
/// a newline.
pub fn needs_stdin(body: &str) -> bool {
    body.len() > 200 || body.contains('\n')
}

/// Check if a command exists in `PATH` — used by the `auto` backend
/// probe (spec §4.1, "Selection policy").
pub fn command_exists(program: &str) -> bool {
    which::which(program).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_command_captures_stdout() {
        let dir = std::env::current_dir().unwrap();
        let result = run_command_with_timeout("echo", &["hello"], &dir, None).unwrap();
        assert!(result.success());
        assert!(result.stdout.contains("hello"));
    }

    #[test]
    fn run_command_reports_nonzero_exit() {
        let dir = std::env::current_dir().unwrap();
        let result = run_command_with_timeout("sh", &["-c", "exit 3"], &dir, None).unwrap();
        assert!(!result.success());
        assert_eq!(result.exit_code, 3);
    }

    #[test]
    fn timeout_kills_long_running_command() {
        let dir = std::env::current_dir().unwrap();
        let result = run_command_with_timeout(
            "sleep",
            &["5"],
            &dir,
            Some(Duration::from_millis(200)),
        )
        .unwrap();
        assert!(result.timed_out);
        assert!(!result.success());
        assert!(result.stderr.contains("timed out"));
    }

    #[test]
    fn stdin_body_reaches_child() {
        let dir = std::env::current_dir().unwrap();
        let result = run_with_stdin("cat", &[], &dir, Some("piped body"), None).unwrap();
        assert!(result.stdout.contains("piped body"));
    }

    #[test]
    fn needs_stdin_for_long_or_multiline_bodies() {
        assert!(!needs_stdin("short one-liner"));
        assert!(needs_stdin("line one\nline two"));
        assert!(needs_stdin(&"x".repeat(201)));
    }

    #[test]
    fn combined_truncated_respects_limit() {
        let output = CommandOutput {
            exit_code: 1,
            stdout: "a".repeat(100),
            stderr: "b".repeat(100),
            timed_out: false,
            duration: Duration::ZERO,
        };
        let combined = output.combined_truncated(50);
        assert!(combined.len() < 100);
        assert!(combined.contains("truncated"));
    }

    #[test]
    fn command_exists_for_known_binary() {
        assert!(command_exists("sh"));
        assert!(!command_exists("this-command-does-not-exist-xyz123"));
    }
}
