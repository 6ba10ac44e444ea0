//! Media Assembly
//!
//! Boundary between the pipeline and local media composition. The trait
//! takes ordered per-scene segments and produces one output file; the
//! ffmpeg implementation muxes each segment's narration onto its video,
//! then concatenates the segments in order.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::AssemblerConfig;
use crate::error::{ForgeError, ForgeResult};

/// One scene's generated artifacts, ready for assembly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedSegment {
    /// Animated scene clip
    pub video_path: PathBuf,
    /// Narration track, absent for scenes without voiceover
    pub audio_path: Option<PathBuf>,
    /// Planned duration in seconds
    pub duration: f64,
}

impl GeneratedSegment {
    /// Creates a segment without narration
    pub fn new(video_path: impl Into<PathBuf>) -> Self {
        Self {
            video_path: video_path.into(),
            audio_path: None,
            duration: 0.0,
        }
    }

    /// Attaches a narration track
    pub fn with_audio(mut self, audio_path: impl Into<PathBuf>) -> Self {
        self.audio_path = Some(audio_path.into());
        self
    }

    /// Sets the planned duration
    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }
}

/// Contract for assembling ordered segments into one video file
#[async_trait]
pub trait MediaAssembler: Send + Sync {
    /// Concatenates segments in the given order, muxing per-segment audio,
    /// and returns the output path. An empty segment list is an error.
    async fn assemble(&self, segments: &[GeneratedSegment], output: &Path)
        -> ForgeResult<PathBuf>;
}

// ============================================================================
// FfmpegAssembler
// ============================================================================

/// Assembler shelling out to ffmpeg
///
/// Intermediate files (`muxed_{i}.mp4`, the concat list) are written next
/// to the segment videos and retained on failure.
pub struct FfmpegAssembler {
    ffmpeg_path: String,
    timeout: Duration,
}

impl Default for FfmpegAssembler {
    fn default() -> Self {
        Self::from_config(&AssemblerConfig::default())
    }
}

impl FfmpegAssembler {
    /// Creates an assembler from config
    pub fn from_config(config: &AssemblerConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Runs one ffmpeg invocation under the configured timeout
    async fn run_ffmpeg(&self, args: &[String]) -> ForgeResult<()> {
        debug!(ffmpeg = %self.ffmpeg_path, ?args, "running ffmpeg");

        let mut command = Command::new(&self.ffmpeg_path);
        command.args(args).stdin(Stdio::null()).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(|e| {
                ForgeError::AssemblyFailed(format!(
                    "failed to launch '{}': {}",
                    self.ffmpeg_path, e
                ))
            })?,
            Err(_) => {
                return Err(ForgeError::AssemblyFailed(format!(
                    "ffmpeg timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ForgeError::AssemblyFailed(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                tail(stderr.trim(), 500)
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl MediaAssembler for FfmpegAssembler {
    async fn assemble(
        &self,
        segments: &[GeneratedSegment],
        output: &Path,
    ) -> ForgeResult<PathBuf> {
        if segments.is_empty() {
            return Err(ForgeError::AssemblyFailed(
                "no segments to assemble".to_string(),
            ));
        }

        let work_dir = segments[0]
            .video_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let inputs = planned_inputs(segments, &work_dir);
        for (i, segment) in segments.iter().enumerate() {
            if let Some(audio) = &segment.audio_path {
                self.run_ffmpeg(&mux_args(&segment.video_path, audio, &inputs[i]))
                    .await?;
            }
        }

        let list_path = work_dir.join("concat_list.txt");
        tokio::fs::write(&list_path, concat_list(&inputs)).await?;

        self.run_ffmpeg(&concat_args(&list_path, output)).await?;

        info!(
            segments = segments.len(),
            output = %output.display(),
            "assembly complete"
        );
        Ok(output.to_path_buf())
    }
}

/// The concat input for each segment: the muxed file when narration is
/// present, the original clip otherwise
fn planned_inputs(segments: &[GeneratedSegment], work_dir: &Path) -> Vec<PathBuf> {
    segments
        .iter()
        .enumerate()
        .map(|(i, segment)| match segment.audio_path {
            Some(_) => work_dir.join(format!("muxed_{}.mp4", i)),
            None => segment.video_path.clone(),
        })
        .collect()
}

/// Arguments muxing one narration track onto one clip
fn mux_args(video: &Path, audio: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-i".to_string(),
        video.display().to_string(),
        "-i".to_string(),
        audio.display().to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-shortest".to_string(),
        output.display().to_string(),
    ]
}

/// Arguments concatenating the listed inputs without re-encoding
fn concat_args(list: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list.display().to_string(),
        "-c".to_string(),
        "copy".to_string(),
        output.display().to_string(),
    ]
}

/// Concat demuxer list content; single quotes in paths are escaped
fn concat_list(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| {
            format!(
                "file '{}'\n",
                p.display().to_string().replace('\'', r"'\''")
            )
        })
        .collect()
}

/// Last `max_chars` characters of a diagnostic string
fn tail(s: &str, max_chars: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    let start = chars.len().saturating_sub(max_chars);
    chars[start..].iter().collect()
}

// ============================================================================
// Mock Assembler
// ============================================================================

/// Mock assembler for testing; records calls and writes a placeholder output
pub struct MockAssembler {
    fail: bool,
    calls: Mutex<Vec<(usize, PathBuf)>>,
    segments: Mutex<Vec<GeneratedSegment>>,
}

impl MockAssembler {
    /// Creates a mock that succeeds
    pub fn new() -> Self {
        Self {
            fail: false,
            calls: Mutex::new(Vec::new()),
            segments: Mutex::new(Vec::new()),
        }
    }

    /// Creates a mock that fails every call
    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: Mutex::new(Vec::new()),
            segments: Mutex::new(Vec::new()),
        }
    }

    /// Number of assemble calls
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Segment count and output path of the most recent call
    pub fn last_call(&self) -> Option<(usize, PathBuf)> {
        self.calls.lock().unwrap().last().cloned()
    }

    /// Segments passed to the most recent call, in the order received
    pub fn last_segments(&self) -> Vec<GeneratedSegment> {
        self.segments.lock().unwrap().clone()
    }
}

impl Default for MockAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaAssembler for MockAssembler {
    async fn assemble(
        &self,
        segments: &[GeneratedSegment],
        output: &Path,
    ) -> ForgeResult<PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .push((segments.len(), output.to_path_buf()));
        *self.segments.lock().unwrap() = segments.to_vec();

        if self.fail {
            return Err(ForgeError::AssemblyFailed(
                "mock assembler failure".to_string(),
            ));
        }
        if segments.is_empty() {
            return Err(ForgeError::AssemblyFailed(
                "no segments to assemble".to_string(),
            ));
        }

        tokio::fs::write(output, b"mock assembled video").await?;
        Ok(output.to_path_buf())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Argument Construction Tests
    // ========================================================================

    #[test]
    fn test_mux_args() {
        let args = mux_args(
            Path::new("/run/scene_0.mp4"),
            Path::new("/run/voice_0.mp3"),
            Path::new("/run/muxed_0.mp4"),
        );
        assert_eq!(
            args,
            vec![
                "-y",
                "-i",
                "/run/scene_0.mp4",
                "-i",
                "/run/voice_0.mp3",
                "-c:v",
                "copy",
                "-c:a",
                "aac",
                "-shortest",
                "/run/muxed_0.mp4",
            ]
        );
    }

    #[test]
    fn test_concat_args() {
        let args = concat_args(Path::new("/run/concat_list.txt"), Path::new("/run/out.mp4"));
        assert_eq!(
            args,
            vec![
                "-y",
                "-f",
                "concat",
                "-safe",
                "0",
                "-i",
                "/run/concat_list.txt",
                "-c",
                "copy",
                "/run/out.mp4",
            ]
        );
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&[
            PathBuf::from("/run/scene_0.mp4"),
            PathBuf::from("/run/it's here.mp4"),
        ]);
        assert_eq!(
            list,
            "file '/run/scene_0.mp4'\nfile '/run/it'\\''s here.mp4'\n"
        );
    }

    #[test]
    fn test_planned_inputs_mixed_audio() {
        let segments = vec![
            GeneratedSegment::new("/run/scene_0.mp4").with_audio("/run/voice_0.mp3"),
            GeneratedSegment::new("/run/scene_1.mp4"),
            GeneratedSegment::new("/run/scene_2.mp4").with_audio("/run/voice_2.mp3"),
        ];
        let inputs = planned_inputs(&segments, Path::new("/run"));

        assert_eq!(inputs[0], PathBuf::from("/run/muxed_0.mp4"));
        assert_eq!(inputs[1], PathBuf::from("/run/scene_1.mp4"));
        assert_eq!(inputs[2], PathBuf::from("/run/muxed_2.mp4"));
    }

    #[test]
    fn test_tail_truncation() {
        assert_eq!(tail("short", 500), "short");
        let long = "x".repeat(600) + "error here";
        let tailed = tail(&long, 500);
        assert_eq!(tailed.chars().count(), 500);
        assert!(tailed.ends_with("error here"));
    }

    // ========================================================================
    // Assembler Tests
    // ========================================================================

    #[tokio::test]
    async fn test_ffmpeg_rejects_empty_segments() {
        let assembler = FfmpegAssembler::default();
        let err = assembler
            .assemble(&[], Path::new("/tmp/out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::AssemblyFailed(_)));
    }

    #[test]
    fn test_from_config() {
        let config = AssemblerConfig {
            ffmpeg_path: "/usr/local/bin/ffmpeg".to_string(),
            timeout_secs: 60,
        };
        let assembler = FfmpegAssembler::from_config(&config);
        assert_eq!(assembler.ffmpeg_path, "/usr/local/bin/ffmpeg");
        assert_eq!(assembler.timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_mock_assembler_records_and_writes() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let assembler = MockAssembler::new();

        let segments = vec![GeneratedSegment::new(dir.path().join("scene_0.mp4"))];
        let result = assembler.assemble(&segments, &output).await.unwrap();

        assert_eq!(result, output);
        assert!(output.exists());
        assert_eq!(assembler.call_count(), 1);
        assert_eq!(assembler.last_call().unwrap().0, 1);
    }

    #[tokio::test]
    async fn test_mock_assembler_failing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let assembler = MockAssembler::failing();

        let segments = vec![GeneratedSegment::new(dir.path().join("scene_0.mp4"))];
        let err = assembler.assemble(&segments, &output).await.unwrap_err();

        assert!(matches!(err, ForgeError::AssemblyFailed(_)));
        assert!(!output.exists());
        assert_eq!(assembler.call_count(), 1);
    }
}
