//! Streaming subprocess runner for pipeline stages.
//!
//! Runs one external command, feeds an affirmative answer into its stdin so
//! cloud CLI "Continue? (Y/n)" prompts never stall a run, and forwards every
//! non-empty output line (stdout and stderr interleaved in arrival order) to
//! the caller while the process is still running.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::LauncherError;

/// How many trailing output lines are retained as failure context.
pub const OUTPUT_TAIL_LINES: usize = 40;

/// Pre-fed stdin content answering the first confirmation prompt.
const AFFIRMATIVE_INPUT: &[u8] = b"Y\n";

/// What to run and where.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Human-readable form for log lines.
    pub fn display(&self) -> String {
        let mut s = self.program.clone();
        for arg in &self.args {
            s.push(' ');
            s.push_str(arg);
        }
        s
    }
}

/// Terminal state of one streamed subprocess.
#[derive(Debug)]
pub struct ProcessOutput {
    pub success: bool,
    pub cancelled: bool,
    tail: VecDeque<String>,
}

impl ProcessOutput {
    /// The retained trailing output, one line per entry.
    pub fn tail(&self) -> impl Iterator<Item = &str> {
        self.tail.iter().map(String::as_str)
    }

    /// The retained trailing output joined for error reporting.
    pub fn tail_text(&self) -> String {
        let lines: Vec<&str> = self.tail.iter().map(String::as_str).collect();
        lines.join("\n")
    }
}

/// Run `spec` in `dir` with `envs` added to the inherited environment,
/// streaming each non-empty trimmed output line into `on_line`.
///
/// Color output is requested from the child (`FORCE_COLOR=1`) because the
/// dashboard renders ANSI; URL capture strips it again downstream. The child
/// is killed if `cancel` fires or the returned future is dropped.
///
/// An `Err` is returned only when the process cannot be spawned or its pipes
/// fail; a process that runs and exits non-zero is an `Ok` with
/// `success == false`.
pub async fn run_streamed(
    spec: &CommandSpec,
    dir: &Path,
    envs: &[(&str, &str)],
    mut on_line: impl FnMut(&str),
    cancel: &CancellationToken,
) -> Result<ProcessOutput, LauncherError> {
    debug!("Spawning `{}` in {}", spec.display(), dir.display());

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(dir)
        .env("FORCE_COLOR", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in envs {
        command.env(key, value);
    }

    let mut child = command.spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        // Best effort: a child that closes stdin immediately is fine.
        if let Err(e) = stdin.write_all(AFFIRMATIVE_INPUT).await {
            debug!("Could not pre-feed confirmation input: {}", e);
        }
        drop(stdin);
    }

    let stdout = child.stdout.take().ok_or_else(|| {
        LauncherError::Internal("Child process stdout was not captured".to_string())
    })?;
    let stderr = child.stderr.take().ok_or_else(|| {
        LauncherError::Internal("Child process stderr was not captured".to_string())
    })?;

    let mut stdout_lines = BufReader::new(stdout).lines();
    let mut stderr_lines = BufReader::new(stderr).lines();
    let mut stdout_done = false;
    let mut stderr_done = false;

    let mut tail: VecDeque<String> = VecDeque::with_capacity(OUTPUT_TAIL_LINES);
    let mut push_line = |line: String, tail: &mut VecDeque<String>, on_line: &mut dyn FnMut(&str)| {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }
        if tail.len() == OUTPUT_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(trimmed.to_string());
        on_line(trimmed);
    };

    while !(stdout_done && stderr_done) {
        tokio::select! {
            _ = cancel.cancelled() => {
                return finish_cancelled(&mut child, tail).await;
            }
            line = stdout_lines.next_line(), if !stdout_done => match line? {
                Some(line) => push_line(line, &mut tail, &mut on_line),
                None => stdout_done = true,
            },
            line = stderr_lines.next_line(), if !stderr_done => match line? {
                Some(line) => push_line(line, &mut tail, &mut on_line),
                None => stderr_done = true,
            },
        }
    }

    let status = tokio::select! {
        _ = cancel.cancelled() => {
            return finish_cancelled(&mut child, tail).await;
        }
        status = child.wait() => status?,
    };

    Ok(ProcessOutput {
        success: status.success(),
        cancelled: false,
        tail,
    })
}

async fn finish_cancelled(
    child: &mut tokio::process::Child,
    tail: VecDeque<String>,
) -> Result<ProcessOutput, LauncherError> {
    warn!("Cancelling running subprocess");
    if let Err(e) = child.start_kill() {
        warn!("Failed to kill subprocess: {}", e);
    }
    let _ = child.wait().await;

    Ok(ProcessOutput {
        success: false,
        cancelled: true,
        tail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", &["-c", script])
    }

    #[tokio::test]
    async fn test_streams_stdout_and_stderr_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut lines = Vec::new();

        let output = run_streamed(
            &sh("echo one; echo two >&2; echo three"),
            dir.path(),
            &[],
            |line| lines.push(line.to_string()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(output.success);
        assert!(!output.cancelled);
        assert!(lines.contains(&"one".to_string()));
        assert!(lines.contains(&"two".to_string()));
        assert!(lines.contains(&"three".to_string()));
    }

    #[tokio::test]
    async fn test_empty_lines_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut lines = Vec::new();

        run_streamed(
            &sh("echo start; echo; echo '   '; echo end"),
            dir.path(),
            &[],
            |line| lines.push(line.to_string()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(lines, vec!["start".to_string(), "end".to_string()]);
    }

    #[tokio::test]
    async fn test_env_overrides_reach_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let mut lines = Vec::new();

        run_streamed(
            &sh("echo \"project=$PROJECT_ID\""),
            dir.path(),
            &[("PROJECT_ID", "demo-project-123")],
            |line| lines.push(line.to_string()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(lines, vec!["project=demo-project-123".to_string()]);
    }

    #[tokio::test]
    async fn test_prompt_is_answered_from_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let mut lines = Vec::new();

        let output = run_streamed(
            &sh("read answer && echo \"got $answer\""),
            dir.path(),
            &[],
            |line| lines.push(line.to_string()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(output.success);
        assert_eq!(lines, vec!["got Y".to_string()]);
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_failure_with_tail() {
        let dir = tempfile::tempdir().unwrap();

        let output = run_streamed(
            &sh("echo before; echo 'boom: permission denied' >&2; exit 3"),
            dir.path(),
            &[],
            |_| {},
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(!output.success);
        assert!(output.tail_text().contains("permission denied"));
    }

    #[tokio::test]
    async fn test_tail_is_bounded() {
        let dir = tempfile::tempdir().unwrap();

        let output = run_streamed(
            &sh("i=0; while [ $i -lt 100 ]; do echo line-$i; i=$((i+1)); done"),
            dir.path(),
            &[],
            |_| {},
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(output.tail().count(), OUTPUT_TAIL_LINES);
        assert!(output.tail_text().ends_with("line-99"));
    }

    #[tokio::test]
    async fn test_cancellation_kills_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let output = run_streamed(&sh("sleep 30"), dir.path(), &[], |_| {}, &cancel)
            .await
            .unwrap();

        assert!(output.cancelled);
        assert!(!output.success);
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let dir = tempfile::tempdir().unwrap();

        let result = run_streamed(
            &CommandSpec::new("definitely-not-a-real-binary", &[]),
            dir.path(),
            &[],
            |_| {},
            &CancellationToken::new(),
        )
        .await;

        assert!(result.is_err());
    }
}
