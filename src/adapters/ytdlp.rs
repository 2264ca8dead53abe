//! yt-dlp backed video source and download engine.
//!
//! Listing uses `--flat-playlist` with a `--playlist-items` window per page;
//! the page token is the 1-based index of the first item of the next page.

use crate::domain::{SourceVideo, StreamDescriptor, StreamSelection};
use crate::ports::downloader::{DownloadError, DownloadedFile, Downloader};
use crate::ports::source::{SourceError, SourcePage, VideoSource};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info};

const CHANNEL_URL: &str = "https://www.youtube.com/channel";
const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
    cookies: Option<PathBuf>,
    page_size: usize,
}

impl YtDlp {
    pub fn new(page_size: usize) -> Self {
        Self {
            binary: PathBuf::from("yt-dlp"),
            cookies: None,
            page_size: page_size.max(1),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Pass a Netscape cookie file to every invocation.
    pub fn with_cookies(mut self, cookies: Option<PathBuf>) -> Self {
        self.cookies = cookies;
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command.arg("--no-warnings").arg("--no-progress");
        if let Some(cookies) = &self.cookies {
            command.arg("--cookies").arg(cookies);
        }
        command.kill_on_drop(true);
        command
    }
}

fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().rev().take(3).collect();
    lines.into_iter().rev().collect::<Vec<_>>().join(" | ")
}

#[derive(Debug, Deserialize)]
struct PlaylistJson {
    #[serde(default)]
    entries: Vec<EntryJson>,
}

#[derive(Debug, Deserialize)]
struct EntryJson {
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    upload_date: Option<String>,
    #[serde(default)]
    view_count: Option<u64>,
    #[serde(default)]
    thumbnails: Vec<ThumbnailJson>,
}

#[derive(Debug, Deserialize)]
struct ThumbnailJson {
    url: String,
}

#[derive(Debug, Deserialize)]
struct InfoJson {
    #[serde(default)]
    formats: Vec<FormatJson>,
}

#[derive(Debug, Deserialize)]
struct FormatJson {
    format_id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    /// Kbit/s
    #[serde(default)]
    tbr: Option<f64>,
    #[serde(default)]
    filesize: Option<u64>,
    #[serde(default)]
    filesize_approx: Option<u64>,
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    acodec: Option<String>,
    #[serde(default)]
    fps: Option<f32>,
    #[serde(default)]
    format_note: Option<String>,
    #[serde(default)]
    quality: Option<f64>,
}

/// Parse one `--flat-playlist --dump-single-json` window.
fn parse_page(json: &[u8], start: usize, page_size: usize) -> Result<SourcePage, SourceError> {
    let playlist: PlaylistJson =
        serde_json::from_slice(json).map_err(|e| SourceError::Malformed(e.to_string()))?;
    let listed = playlist.entries.len();
    let videos = playlist
        .entries
        .into_iter()
        .filter_map(|entry| {
            let id = entry.id.filter(|id| !id.is_empty())?;
            Some(SourceVideo {
                title: entry.title.unwrap_or_default(),
                description: entry.description.unwrap_or_default(),
                duration: entry.duration.map(|secs| secs.round() as u64),
                upload_date: entry.upload_date,
                thumbnail: entry.thumbnails.into_iter().last().map(|t| t.url),
                view_count: entry.view_count,
                id,
            })
        })
        .collect();
    // A short window means the listing is exhausted.
    let next_page_token = (listed >= page_size).then(|| (start + page_size).to_string());
    Ok(SourcePage {
        videos,
        next_page_token,
    })
}

/// `none` is yt-dlp's marker for an absent track.
fn codec(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|c| !c.is_empty() && *c != "none")
}

fn descriptor(format: FormatJson) -> Option<StreamDescriptor> {
    let vcodec = codec(&format.vcodec);
    let acodec = codec(&format.acodec);
    let ext = format.ext.as_deref().unwrap_or("mp4");
    let mime_type = match (vcodec, acodec) {
        (Some(v), Some(a)) => format!(r#"video/{ext}; codecs="{v}, {a}""#),
        (Some(v), None) => format!(r#"video/{ext}; codecs="{v}""#),
        (None, Some(a)) => format!(r#"audio/{ext}; codecs="{a}""#),
        // Storyboards and other non-media formats
        (None, None) => return None,
    };
    Some(StreamDescriptor {
        url: format.url.unwrap_or_default(),
        width: format.width,
        height: format.height,
        bitrate: format.tbr.map(|kbps| (kbps * 1000.0).round() as u64),
        content_length: format.filesize.or(format.filesize_approx),
        quality: format.quality.map(|q| q.to_string()),
        quality_label: format.format_note.filter(|_| vcodec.is_some()),
        audio_quality: acodec.map(str::to_string),
        fps: format.fps,
        mime_type,
        format_id: format.format_id,
    })
}

fn parse_formats(json: &[u8]) -> Result<Vec<StreamDescriptor>, SourceError> {
    let info: InfoJson =
        serde_json::from_slice(json).map_err(|e| SourceError::Malformed(e.to_string()))?;
    Ok(info.formats.into_iter().filter_map(descriptor).collect())
}

#[async_trait]
impl VideoSource for YtDlp {
    async fn list_page(
        &self,
        source_id: &str,
        page_token: Option<String>,
    ) -> Result<SourcePage, SourceError> {
        let start = match page_token.as_deref() {
            None => 1,
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| SourceError::Malformed(format!("bad page token {token:?}")))?,
        };
        let end = start + self.page_size - 1;
        debug!(source_id, start, end, "Listing channel page");

        let output = self
            .command()
            .arg("--flat-playlist")
            .arg("--dump-single-json")
            .arg("--playlist-items")
            .arg(format!("{start}:{end}"))
            .arg(format!("{CHANNEL_URL}/{source_id}/videos"))
            .output()
            .await?;
        if !output.status.success() {
            return Err(SourceError::Unavailable(stderr_tail(&output)));
        }
        parse_page(&output.stdout, start, self.page_size)
    }

    async fn resolve_streams(&self, video_id: &str) -> Result<Vec<StreamDescriptor>, SourceError> {
        let output = self
            .command()
            .arg("--dump-single-json")
            .arg("--skip-download")
            .arg(format!("{WATCH_URL}{video_id}"))
            .output()
            .await?;
        if !output.status.success() {
            return Err(SourceError::Unavailable(stderr_tail(&output)));
        }
        parse_formats(&output.stdout)
    }
}

/// First regular file in `dir` whose stem is the video id.
async fn find_output(dir: &Path, video_id: &str) -> Result<DownloadedFile, DownloadError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_partial = path
            .extension()
            .is_some_and(|ext| ext == "part" || ext == "ytdl");
        let stem_matches = path.file_stem().is_some_and(|stem| stem == video_id);
        if stem_matches && !is_partial {
            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                return Ok(DownloadedFile {
                    path,
                    size: metadata.len(),
                });
            }
        }
    }
    Err(DownloadError::MissingOutput)
}

#[async_trait]
impl Downloader for YtDlp {
    async fn download(
        &self,
        video_id: &str,
        selection: &StreamSelection,
        work_dir: &Path,
    ) -> Result<DownloadedFile, DownloadError> {
        let template = work_dir.join(format!("{video_id}.%(ext)s"));
        let mut command = self.command();
        command
            .arg("--format")
            .arg(selection.format_spec())
            .arg("--output")
            .arg(&template)
            .arg("--no-part")
            .arg("--force-overwrites");
        if selection.needs_muxer() {
            command.arg("--merge-output-format").arg("mp4");
        }
        command.arg(format!("{WATCH_URL}{video_id}"));

        info!(video_id, format = %selection.format_spec(), "Starting download");
        let output = command.output().await?;
        if !output.status.success() {
            return Err(DownloadError::Engine(stderr_tail(&output)));
        }
        find_output(work_dir, video_id).await
    }
}
