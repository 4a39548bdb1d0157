//! Stream-copy remuxing through FFmpeg.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::command::{FfmpegCommand, ProcessRunner};
use crate::error::{MediaError, MediaResult};

/// Output container for every remux.
const OUTPUT_FORMAT: &str = "matroska";

/// A file attached to the output as an extra stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub path: PathBuf,
    pub mimetype: String,
    pub filename: String,
}

impl Attachment {
    /// JPEG cover image, tagged the way players look for it.
    pub fn cover_jpeg(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mimetype: "image/jpeg".to_string(),
            filename: "cover.jpg".to_string(),
        }
    }
}

/// A stream-copy remux of `input` into `output`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemuxRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Container-level metadata tags, in order
    pub metadata: Vec<(String, String)>,
    /// Files to attach as new streams
    pub attachments: Vec<Attachment>,
}

impl RemuxRequest {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// FFmpeg invocation for this request.
    pub fn to_command(&self) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(&self.input, &self.output)
            .stream_copy()
            .map_all();

        for (key, value) in &self.metadata {
            cmd = cmd.metadata(key, value);
        }

        for (idx, attachment) in self.attachments.iter().enumerate() {
            let stream = format!("s:t:{}", idx);
            cmd = cmd
                .attach(&attachment.path)
                .stream_metadata(&stream, "mimetype", &attachment.mimetype)
                .stream_metadata(&stream, "filename", &attachment.filename);
        }

        cmd.format(OUTPUT_FORMAT)
    }
}

/// Remux/convert collaborator.
#[async_trait]
pub trait Remuxer: Send + Sync {
    /// Stream-copy `request.input` into `request.output`.
    async fn remux(&self, request: &RemuxRequest) -> MediaResult<()>;

    /// Convert a still image; the target format follows the output extension.
    async fn convert_image(&self, input: &Path, output: &Path) -> MediaResult<()>;
}

/// [`Remuxer`] that shells out to FFmpeg.
#[derive(Clone)]
pub struct FfmpegRemuxer {
    ffmpeg: PathBuf,
    runner: Arc<dyn ProcessRunner>,
}

impl FfmpegRemuxer {
    pub fn new(ffmpeg: impl Into<PathBuf>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            runner,
        }
    }

    async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let args = cmd.build_args();
        debug!("FFmpeg arguments: {}", args.join(" "));

        let output = self.runner.run(&self.ffmpeg, &args).await?;
        if output.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(output.stderr.join("\n")),
                output.exit_code,
            ))
        }
    }
}

#[async_trait]
impl Remuxer for FfmpegRemuxer {
    async fn remux(&self, request: &RemuxRequest) -> MediaResult<()> {
        if !request.input.exists() {
            return Err(MediaError::FileNotFound(request.input.clone()));
        }
        self.run(&request.to_command()).await
    }

    async fn convert_image(&self, input: &Path, output: &Path) -> MediaResult<()> {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
        self.run(&FfmpegCommand::new(input, output)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ProcessOutput;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<Vec<String>>>,
        exit_code: i32,
    }

    #[async_trait]
    impl ProcessRunner for RecordingRunner {
        async fn run(&self, _program: &Path, args: &[String]) -> MediaResult<ProcessOutput> {
            self.calls.lock().unwrap().push(args.to_vec());
            Ok(ProcessOutput {
                exit_code: Some(self.exit_code),
                stdout: vec![],
                stderr: vec!["boom".to_string()],
            })
        }
    }

    #[test]
    fn test_metadata_request_args() {
        let args = RemuxRequest::new("in.mkv", "out.mkv")
            .with_metadata("title", "A \"quoted\" title")
            .with_metadata("artist", "Someone")
            .to_command()
            .build_args();

        assert!(args.contains(&"title=A \"quoted\" title".to_string()));
        assert!(args.contains(&"artist=Someone".to_string()));
        let f_pos = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f_pos + 1], "matroska");
        assert!(!args.contains(&"-attach".to_string()));
    }

    #[test]
    fn test_cover_attachment_args() {
        let args = RemuxRequest::new("in.mkv", "out.mkv")
            .with_attachment(Attachment::cover_jpeg("in.jpg"))
            .to_command()
            .build_args();

        assert!(args.contains(&"in.jpg".to_string()));
        assert!(args.contains(&"mimetype=image/jpeg".to_string()));
        assert!(args.contains(&"filename=cover.jpg".to_string()));
    }

    #[tokio::test]
    async fn test_remux_failure_maps_exit_code() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("in.mkv");
        tokio::fs::write(&input, b"x").await.unwrap();

        let runner = Arc::new(RecordingRunner {
            exit_code: 1,
            ..Default::default()
        });
        let remuxer = FfmpegRemuxer::new("ffmpeg", runner.clone());

        let err = remuxer
            .remux(&RemuxRequest::new(&input, dir.path().join("out.mkv")))
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::FfmpegFailed { exit_code: Some(1), .. }));
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remux_missing_input() {
        let runner = Arc::new(RecordingRunner::default());
        let remuxer = FfmpegRemuxer::new("ffmpeg", runner.clone());

        let err = remuxer
            .remux(&RemuxRequest::new("/nonexistent/in.mkv", "/nonexistent/out.mkv"))
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::FileNotFound(_)));
        assert!(runner.calls.lock().unwrap().is_empty());
    }
}
