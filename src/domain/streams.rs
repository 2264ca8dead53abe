//! Stream descriptors returned by the video source and the policy a worker
//! uses to pick what to download.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Codec prefixes that only ever carry audio.
const AUDIO_CODECS: &[&str] = &["mp4a", "opus", "vorbis", "ac-3", "ec-3", "flac", "mp3", "aac"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub format_id: String,
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Bits per second
    pub bitrate: Option<u64>,
    pub content_length: Option<u64>,
    pub quality: Option<String>,
    pub quality_label: Option<String>,
    /// e.g. `video/mp4; codecs="avc1.64001F, mp4a.40.2"`
    pub mime_type: String,
    pub fps: Option<f32>,
    pub audio_quality: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    VideoOnly,
    AudioOnly,
    Combined,
}

fn mime_regex() -> &'static Regex {
    static MIME: OnceLock<Regex> = OnceLock::new();
    MIME.get_or_init(|| {
        Regex::new(r#"^\s*(?P<kind>video|audio)/[\w.+-]+\s*(?:;\s*codecs\s*=\s*"?(?P<codecs>[^"]*)"?)?"#)
            .expect("mime type pattern is valid")
    })
}

impl StreamDescriptor {
    /// Classify from the mime type and its codec list. Streams with an
    /// unrecognised mime type are not classified.
    pub fn kind(&self) -> Option<StreamKind> {
        let captures = mime_regex().captures(&self.mime_type)?;
        if &captures["kind"] == "audio" {
            return Some(StreamKind::AudioOnly);
        }

        let codecs: Vec<&str> = captures
            .name("codecs")
            .map(|m| m.as_str().split(',').map(str::trim).filter(|c| !c.is_empty()).collect())
            .unwrap_or_default();

        let (audio, video): (Vec<&str>, Vec<&str>) = codecs
            .iter()
            .partition(|codec| AUDIO_CODECS.iter().any(|prefix| codec.starts_with(prefix)));

        match (video.is_empty(), audio.is_empty()) {
            (false, false) => Some(StreamKind::Combined),
            (true, false) => Some(StreamKind::AudioOnly),
            // No codec list: fall back to the audio quality hint
            _ if codecs.is_empty() && self.audio_quality.is_some() => Some(StreamKind::Combined),
            _ => Some(StreamKind::VideoOnly),
        }
    }

    fn height_or_zero(&self) -> u32 {
        self.height.unwrap_or(0)
    }

    fn bitrate_or_zero(&self) -> u64 {
        self.bitrate.unwrap_or(0)
    }
}

/// What the download engine should fetch for one video.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSelection {
    /// An already-muxed stream, downloadable as-is
    Combined(StreamDescriptor),
    /// Separate tracks that need a muxer
    Separate {
        video: StreamDescriptor,
        audio: StreamDescriptor,
    },
}

impl StreamSelection {
    /// Format expression understood by yt-dlp style engines.
    pub fn format_spec(&self) -> String {
        match self {
            StreamSelection::Combined(stream) => stream.format_id.clone(),
            StreamSelection::Separate { video, audio } => {
                format!("{}+{}", video.format_id, audio.format_id)
            }
        }
    }

    pub fn needs_muxer(&self) -> bool {
        matches!(self, StreamSelection::Separate { .. })
    }

    pub fn height(&self) -> Option<u32> {
        match self {
            StreamSelection::Combined(stream) => stream.height,
            StreamSelection::Separate { video, .. } => video.height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("no streams resolved")]
    NoStreams,
    #[error("no combined stream available and no muxer installed")]
    NoCombinedStream,
    #[error("no usable video and audio streams")]
    NoUsableStreams,
}

/// Quality policy. Without a muxer the worker is limited to already-muxed
/// streams, capped at `max_combined_height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionPolicy {
    pub muxer_available: bool,
    pub max_combined_height: u32,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            muxer_available: true,
            max_combined_height: 720,
        }
    }
}

impl SelectionPolicy {
    pub fn select(&self, streams: &[StreamDescriptor]) -> Result<StreamSelection, SelectionError> {
        if streams.is_empty() {
            return Err(SelectionError::NoStreams);
        }

        let of_kind = |kind: StreamKind| streams.iter().filter(move |s| s.kind() == Some(kind));
        let best_by_height =
            |s: &&StreamDescriptor| (s.height_or_zero(), s.bitrate_or_zero());

        let combined = of_kind(StreamKind::Combined).max_by_key(best_by_height);

        if !self.muxer_available {
            let capped = of_kind(StreamKind::Combined)
                .filter(|s| s.height_or_zero() <= self.max_combined_height)
                .max_by_key(best_by_height);
            return capped
                .or_else(|| of_kind(StreamKind::Combined).min_by_key(best_by_height))
                .cloned()
                .map(StreamSelection::Combined)
                .ok_or(SelectionError::NoCombinedStream);
        }

        let video = of_kind(StreamKind::VideoOnly).max_by_key(best_by_height);
        let audio = of_kind(StreamKind::AudioOnly).max_by_key(|s| s.bitrate_or_zero());

        match (video, audio, combined) {
            (Some(video), Some(audio), combined)
                if combined.map_or(true, |c| video.height_or_zero() > c.height_or_zero()) =>
            {
                Ok(StreamSelection::Separate {
                    video: video.clone(),
                    audio: audio.clone(),
                })
            }
            (_, _, Some(combined)) => Ok(StreamSelection::Combined(combined.clone())),
            _ => Err(SelectionError::NoUsableStreams),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(format_id: &str, mime: &str, height: Option<u32>, bitrate: u64) -> StreamDescriptor {
        StreamDescriptor {
            format_id: format_id.into(),
            mime_type: mime.into(),
            height,
            bitrate: Some(bitrate),
            ..StreamDescriptor::default()
        }
    }

    fn catalog() -> Vec<StreamDescriptor> {
        vec![
            stream("18", r#"video/mp4; codecs="avc1.42001E, mp4a.40.2""#, Some(360), 500_000),
            stream("22", r#"video/mp4; codecs="avc1.64001F, mp4a.40.2""#, Some(720), 1_500_000),
            stream("137", r#"video/mp4; codecs="avc1.640028""#, Some(1080), 4_000_000),
            stream("313", r#"video/webm; codecs="vp9""#, Some(2160), 12_000_000),
            stream("140", r#"audio/mp4; codecs="mp4a.40.2""#, None, 128_000),
            stream("251", r#"audio/webm; codecs="opus""#, None, 160_000),
        ]
    }

    #[test]
    fn classifies_by_codecs() {
        let streams = catalog();
        assert_eq!(streams[0].kind(), Some(StreamKind::Combined));
        assert_eq!(streams[2].kind(), Some(StreamKind::VideoOnly));
        assert_eq!(streams[3].kind(), Some(StreamKind::VideoOnly));
        assert_eq!(streams[5].kind(), Some(StreamKind::AudioOnly));
        assert_eq!(stream("x", "text/html", None, 0).kind(), None);
    }

    #[test]
    fn audio_quality_hint_without_codecs() {
        let mut s = stream("x", "video/mp4", Some(360), 1);
        assert_eq!(s.kind(), Some(StreamKind::VideoOnly));
        s.audio_quality = Some("AUDIO_QUALITY_LOW".into());
        assert_eq!(s.kind(), Some(StreamKind::Combined));
    }

    #[test]
    fn with_muxer_prefers_best_separate_tracks() {
        let selection = SelectionPolicy::default().select(&catalog()).unwrap();
        assert_eq!(selection.format_spec(), "313+251");
        assert!(selection.needs_muxer());
        assert_eq!(selection.height(), Some(2160));
    }

    #[test]
    fn without_muxer_caps_combined_height() {
        let policy = SelectionPolicy {
            muxer_available: false,
            max_combined_height: 480,
        };
        let selection = policy.select(&catalog()).unwrap();
        assert_eq!(selection.format_spec(), "18");
        assert!(!selection.needs_muxer());
    }

    #[test]
    fn without_muxer_falls_back_to_smallest_combined() {
        let policy = SelectionPolicy {
            muxer_available: false,
            max_combined_height: 144,
        };
        assert_eq!(policy.select(&catalog()).unwrap().format_spec(), "18");
    }

    #[test]
    fn without_muxer_and_no_combined_stream_fails() {
        let policy = SelectionPolicy {
            muxer_available: false,
            max_combined_height: 720,
        };
        let only_separate = catalog().into_iter().skip(2).collect::<Vec<_>>();
        assert_eq!(
            policy.select(&only_separate),
            Err(SelectionError::NoCombinedStream)
        );
    }

    #[test]
    fn empty_catalog_is_an_error() {
        assert_eq!(
            SelectionPolicy::default().select(&[]),
            Err(SelectionError::NoStreams)
        );
    }
}
