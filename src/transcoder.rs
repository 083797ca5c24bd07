//! External transcoder invocation.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::config::TranscodeConfig;

/// Longest stderr tail kept for diagnostics.
const MAX_DIAGNOSTIC_BYTES: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum TranscodeFailure {
    #[error("transcoder exited with status {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },
    #[error("transcoder timed out after {0:?}")]
    TimedOut(Duration),
    #[error("failed to launch transcoder: {0}")]
    Spawn(#[source] std::io::Error),
}

impl TranscodeFailure {
    /// Captured diagnostic output, or a description when the tool never produced any.
    pub fn diagnostics(&self) -> String {
        match self {
            TranscodeFailure::Exit { stderr, .. } => stderr.clone(),
            other => other.to_string(),
        }
    }
}

/// Renders `input` to `output` with `overlay_text` burned in top-left and
/// `watermark_text` top-right. Blocks until the output file is complete.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        overlay_text: &str,
        watermark_text: &str,
    ) -> Result<(), TranscodeFailure>;
}

/// Escape `:` for the drawtext filter. Colons that are already escaped are
/// left alone, so applying this twice yields the same string.
pub fn escape_drawtext(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 4);
    let mut prev_backslash = false;
    for c in text.chars() {
        if c == ':' && !prev_backslash {
            escaped.push('\\');
        }
        escaped.push(c);
        prev_backslash = c == '\\' && !prev_backslash;
    }
    escaped
}

/// Build the `-vf` filter graph for the two overlays.
pub fn overlay_filter(font_file: &str, overlay_text: &str, watermark_text: &str) -> String {
    let font = escape_drawtext(font_file);
    format!(
        "drawtext=text='{}':fontfile={font}:fontsize=24:fontcolor=white:x=10:y=10,\
         drawtext=text='{}':fontfile={font}:fontsize=24:fontcolor=white:x=w-tw-10:y=10",
        escape_drawtext(overlay_text),
        escape_drawtext(watermark_text),
    )
}

/// ffmpeg-backed transcoder: H.264 video, AAC audio, moov atom at the front.
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    font_file: String,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(config: &TranscodeConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            font_file: config.font_file.clone(),
            timeout: config.timeout,
        }
    }

    fn args(
        &self,
        input: &Path,
        output: &Path,
        overlay_text: &str,
        watermark_text: &str,
    ) -> Vec<String> {
        vec![
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vf".to_string(),
            overlay_filter(&self.font_file, overlay_text, watermark_text),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-y".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    #[tracing::instrument(skip_all, fields(input = %input.display()))]
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        overlay_text: &str,
        watermark_text: &str,
    ) -> Result<(), TranscodeFailure> {
        let args = self.args(input, output, overlay_text, watermark_text);
        tracing::info!(
            command = %format!("{} {}", self.ffmpeg_path, args.join(" ")),
            "Executing transcoder"
        );

        let child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        // Dropping the output future on timeout kills the child
        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| TranscodeFailure::TimedOut(self.timeout))?
            .map_err(TranscodeFailure::Spawn)?;

        if !output.status.success() {
            return Err(TranscodeFailure::Exit {
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        Ok(())
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(MAX_DIAGNOSTIC_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}
