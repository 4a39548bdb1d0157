//! External process runner and FFmpeg command builder.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, trace, warn};

use crate::error::{MediaError, MediaResult};

/// Lines kept per output stream; older lines are dropped.
pub const MAX_CAPTURED_LINES: usize = 1000;

/// Captured result of an external process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code (`None` when killed by a signal)
    pub exit_code: Option<i32>,
    /// Last captured stdout lines
    pub stdout: Vec<String>,
    /// Last captured stderr lines
    pub stderr: Vec<String>,
}

impl ProcessOutput {
    /// Whether the process exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Last non-empty stderr line, usually the tool's error summary.
    pub fn last_error_line(&self) -> Option<&str> {
        self.stderr
            .iter()
            .rev()
            .map(|l| l.trim())
            .find(|l| !l.is_empty())
    }
}

/// The single entry point for launching external tools.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `program` with `args` to completion, capturing its output.
    ///
    /// A non-zero exit is not an error at this level; callers inspect
    /// [`ProcessOutput::exit_code`].
    async fn run(&self, program: &Path, args: &[String]) -> MediaResult<ProcessOutput>;
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner {
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl TokioProcessRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self { timeout_secs: None }
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Wait for child process with optional timeout.
    async fn wait_for_completion(&self, program: &Path, child: &mut Child) -> MediaResult<ExitStatus> {
        let Some(timeout_secs) = self.timeout_secs else {
            return Ok(child.wait().await?);
        };

        match tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => {
                warn!(
                    "{} timed out after {} seconds, killing process",
                    program.display(),
                    timeout_secs
                );
                let _ = child.kill().await;
                Err(MediaError::Timeout(timeout_secs))
            }
        }
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, program: &Path, args: &[String]) -> MediaResult<ProcessOutput> {
        let resolved = which::which(program)
            .map_err(|_| MediaError::tool_not_found(program.display().to_string()))?;

        debug!("Running: {} {}", program.display(), args.join(" "));

        let mut child = Command::new(&resolved)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("stderr not captured"))?;

        let stdout_task = tokio::spawn(collect_lines(stdout, MAX_CAPTURED_LINES));
        let stderr_task = tokio::spawn(collect_lines(stderr, MAX_CAPTURED_LINES));

        let status = self.wait_for_completion(program, &mut child).await?;

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        Ok(ProcessOutput {
            exit_code: status.code(),
            stdout,
            stderr,
        })
    }
}

/// Drain `reader`, keeping only its last `limit` lines.
async fn collect_lines<R>(reader: R, limit: usize) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut tail = VecDeque::with_capacity(limit.min(64));
    while let Ok(Some(line)) = lines.next_line().await {
        trace!("{}", line);
        if tail.len() == limit {
            tail.pop_front();
        }
        if limit > 0 {
            tail.push_back(line);
        }
    }
    tail.into()
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Output arguments (after -i)
    output_args: Vec<String>,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
        }
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Keep every stream of the first input.
    pub fn map_all(self) -> Self {
        self.output_arg("-map").output_arg("0")
    }

    /// Copy streams without re-encoding.
    pub fn stream_copy(self) -> Self {
        self.output_arg("-codec").output_arg("copy")
    }

    /// Set a container-level metadata tag.
    pub fn metadata(self, key: &str, value: &str) -> Self {
        self.output_arg("-metadata").output_arg(format!("{}={}", key, value))
    }

    /// Attach a file as a new attachment stream.
    pub fn attach(self, path: impl AsRef<Path>) -> Self {
        self.output_arg("-attach")
            .output_arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Set a metadata tag on a specific stream (e.g. `s:t:0`).
    pub fn stream_metadata(self, stream: &str, key: &str, value: &str) -> Self {
        self.output_arg(format!("-metadata:{}", stream))
            .output_arg(format!("{}={}", key, value))
    }

    /// Force the output container format.
    pub fn format(self, format: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(format)
    }

    /// Build the command arguments. Output is always overwritten.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["-y".to_string(), "-v".to_string(), "error".to_string()];

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("input.mkv", "output.mkv")
            .map_all()
            .stream_copy()
            .metadata("title", "Some Title")
            .format("matroska");

        let args = cmd.build_args();
        assert_eq!(args[0], "-y");
        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input_pos + 1], "input.mkv");
        assert!(args.contains(&"title=Some Title".to_string()));
        assert_eq!(args.last().unwrap(), "output.mkv");
    }

    #[test]
    fn test_attach_args() {
        let args = FfmpegCommand::new("in.mkv", "out.mkv")
            .attach("cover.jpg")
            .stream_metadata("s:t:0", "mimetype", "image/jpeg")
            .build_args();

        let attach_pos = args.iter().position(|a| a == "-attach").unwrap();
        assert_eq!(args[attach_pos + 1], "cover.jpg");
        assert!(args.contains(&"-metadata:s:t:0".to_string()));
        assert!(args.contains(&"mimetype=image/jpeg".to_string()));
    }

    #[test]
    fn test_last_error_line() {
        let output = ProcessOutput {
            exit_code: Some(1),
            stdout: vec![],
            stderr: vec!["WARNING: x".into(), "ERROR: boom".into(), "  ".into()],
        };
        assert!(!output.success());
        assert_eq!(output.last_error_line(), Some("ERROR: boom"));
    }

    #[tokio::test]
    async fn test_collect_lines_keeps_tail() {
        let text: String = (0..1500).map(|i| format!("line {}\n", i)).collect();
        let lines = collect_lines(text.as_bytes(), MAX_CAPTURED_LINES).await;

        assert_eq!(lines.len(), MAX_CAPTURED_LINES);
        assert_eq!(lines.first().unwrap(), "line 500");
        assert_eq!(lines.last().unwrap(), "line 1499");
    }

    #[tokio::test]
    async fn test_collect_lines_short_output_is_complete() {
        let lines = collect_lines(&b"a\nb"[..], MAX_CAPTURED_LINES).await;
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_missing_tool() {
        let runner = TokioProcessRunner::new();
        let result = runner
            .run(Path::new("definitely-not-a-real-tool-vodvault"), &[])
            .await;
        assert!(matches!(result, Err(MediaError::ToolNotFound(_))));
    }
}
