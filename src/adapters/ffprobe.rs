use crate::ports::downloader::{IntegrityChecker, IntegrityError};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Anything smaller is an error page or an empty container, not media.
pub const MIN_MEDIA_BYTES: u64 = 1024;

/// Whether an `ffmpeg` binary can be run, which decides if separate video and
/// audio tracks can be muxed.
pub async fn ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
struct ProbeJson {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: Option<String>,
}

fn has_media_track(json: &[u8]) -> Result<bool, IntegrityError> {
    let probe: ProbeJson =
        serde_json::from_slice(json).map_err(|e| IntegrityError::Probe(e.to_string()))?;
    Ok(probe
        .streams
        .iter()
        .any(|s| matches!(s.codec_type.as_deref(), Some("audio") | Some("video"))))
}

/// Verifies downloads with a size floor and an `ffprobe` stream listing.
#[derive(Debug, Clone)]
pub struct FfprobeChecker {
    binary: PathBuf,
}

impl Default for FfprobeChecker {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffprobe"),
        }
    }
}

impl FfprobeChecker {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl IntegrityChecker for FfprobeChecker {
    async fn verify(&self, path: &Path) -> Result<(), IntegrityError> {
        let size = tokio::fs::metadata(path).await?.len();
        if size < MIN_MEDIA_BYTES {
            return Err(IntegrityError::TooSmall(size));
        }

        let output = Command::new(&self.binary)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("stream=codec_type")
            .arg("-of")
            .arg("json")
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await?;
        if !output.status.success() {
            return Err(IntegrityError::Probe(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        if !has_media_track(&output.stdout)? {
            return Err(IntegrityError::NoMediaTracks);
        }
        debug!(path = %path.display(), size, "File verified");
        Ok(())
    }
}
