use std::fmt;
use std::str::FromStr;

/// Unit of work on the unified download queue, encoded as
/// `channelID:videoID`. Neither id may contain `:`; see [`is_valid_id`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueItem {
    pub channel_id: String,
    pub video_id: String,
}

impl QueueItem {
    pub fn new(channel_id: impl Into<String>, video_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            video_id: video_id.into(),
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Both ids survive an encode/parse round trip.
    pub fn is_valid(&self) -> bool {
        is_valid_id(&self.channel_id) && is_valid_id(&self.video_id)
    }
}

/// Channel and video ids appear in queue items and store keys, both of which
/// use `:` as a separator.
pub fn is_valid_id(id: &str) -> bool {
    !id.trim().is_empty() && !id.contains(':')
}

impl fmt::Display for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel_id, self.video_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed queue item {0:?}, expected channelID:videoID")]
pub struct MalformedQueueItem(pub String);

impl FromStr for QueueItem {
    type Err = MalformedQueueItem;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = || MalformedQueueItem(raw.to_string());
        let (channel_id, video_id) = raw.split_once(':').ok_or_else(malformed)?;
        let (channel_id, video_id) = (channel_id.trim(), video_id.trim());
        if channel_id.is_empty() || video_id.is_empty() || video_id.contains(':') {
            return Err(malformed());
        }
        Ok(QueueItem::new(channel_id, video_id))
    }
}
