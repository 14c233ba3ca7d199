//! External program invocation for content filters.

use std::{
    io::{self, ErrorKind},
    path::Path,
    process::Stdio,
    string::FromUtf8Error,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::debug;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("i/o error while running command: {0}")]
    Io(#[from] io::Error),
    #[error("command exited with status {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },
    #[error("command did not finish within {0:?}")]
    Timeout(Duration),
    #[error("command produced non-UTF-8 output: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),
}

impl CommandError {
    /// Short machine-readable tag for structured logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => "spawn",
            Self::Io(_) => "io",
            Self::Exit { .. } => "exit",
            Self::Timeout(_) => "timeout",
            Self::InvalidUtf8(_) => "invalid_utf8",
        }
    }
}

/// Runs `program` with `args`, feeding `input` on stdin and returning stdout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &Path, args: &[String], input: &str)
    -> Result<String, CommandError>;
}

/// [`CommandRunner`] backed by real child processes with a wall-clock limit.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        input: &str,
    ) -> Result<String, CommandError> {
        let started_at = Instant::now();

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.display().to_string(),
                source,
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("child stdin was not captured"))?;
        let payload = input.as_bytes().to_vec();
        // Fed concurrently with output collection.
        let writer = tokio::spawn(async move {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await
        });

        // On timeout the child is dropped and killed.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| CommandError::Timeout(self.timeout))??;

        debug!(
            target = "scribe::application::render::command",
            program = %program.display(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            exit_code = output.status.code().map(i64::from).unwrap_or(-1),
            stdout_bytes = output.stdout.len(),
            "external command finished"
        );

        if !output.status.success() {
            return Err(CommandError::Exit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        match writer.await {
            Ok(Ok(())) => {}
            // The child may legitimately exit without reading all of its input.
            Ok(Err(err)) if err.kind() == ErrorKind::BrokenPipe => {}
            Ok(Err(err)) => return Err(CommandError::Io(err)),
            Err(join) => return Err(CommandError::Io(io::Error::other(join))),
        }

        Ok(String::from_utf8(output.stdout)?)
    }
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;
    use std::{
        fs,
        os::unix::fs::PermissionsExt,
        path::{Path, PathBuf},
    };
    use tempfile::TempDir;

    /// Write an executable shell script named `name` into `dir`.
    pub(crate) fn fake_program(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        let mut perms = fs::metadata(&path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("set perms");
        path
    }

    fn runner() -> ProcessRunner {
        ProcessRunner::new(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn pipes_input_and_arguments() {
        let dir = TempDir::new().expect("temp dir");
        let program = fake_program(dir.path(), "echoer", r#"printf '%s|' "$@"; cat"#);

        let output = runner()
            .run(&program, &["-l".to_string(), "rust".to_string()], "fn main() {}")
            .await
            .expect("command succeeds");

        assert_eq!(output, "-l|rust|fn main() {}");
    }

    #[tokio::test]
    async fn reports_non_zero_exit_with_stderr() {
        let dir = TempDir::new().expect("temp dir");
        let program = fake_program(dir.path(), "failing", "echo boom >&2\nexit 42");

        let err = runner()
            .run(&program, &[], "input")
            .await
            .expect_err("command fails");

        match err {
            CommandError::Exit { code, stderr } => {
                assert_eq!(code, Some(42));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[tokio::test]
    async fn reports_missing_program() {
        let dir = TempDir::new().expect("temp dir");
        let err = runner()
            .run(&dir.path().join("absent"), &[], "")
            .await
            .expect_err("spawn fails");
        assert!(matches!(err, CommandError::Spawn { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn enforces_timeout() {
        let dir = TempDir::new().expect("temp dir");
        let program = fake_program(dir.path(), "sleepy", "sleep 5");

        let err = ProcessRunner::new(Duration::from_millis(100))
            .run(&program, &[], "")
            .await
            .expect_err("command times out");
        assert!(matches!(err, CommandError::Timeout(_)), "{err:?}");
    }

    #[tokio::test]
    async fn rejects_non_utf8_output() {
        let dir = TempDir::new().expect("temp dir");
        let program = fake_program(dir.path(), "binary", r"printf '\377\376'");

        let err = runner()
            .run(&program, &[], "")
            .await
            .expect_err("invalid output");
        assert!(matches!(err, CommandError::InvalidUtf8(_)), "{err:?}");
    }

    #[tokio::test]
    async fn tolerates_child_ignoring_stdin() {
        let dir = TempDir::new().expect("temp dir");
        let program = fake_program(dir.path(), "ignorer", "echo done");
        let input = "x".repeat(1 << 20);

        let output = runner()
            .run(&program, &[], &input)
            .await
            .expect("command succeeds");
        assert_eq!(output, "done\n");
    }
}
