use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a tracked channel as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Pending,
    Syncing,
    Synced,
    Error,
}

/// A tracked external channel.
///
/// Records are owned by the management layer; the scheduler only moves
/// `status` (and the timestamps that go with it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    /// Must not contain `:`, the queue item and key separator
    pub id: String,
    /// Identifier of the channel on the external video source
    pub source_id: String,
    #[serde(default)]
    pub name: String,
    pub status: ChannelStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    pub fn new(id: impl Into<String>, source_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            source_id: source_id.into(),
            name: name.into(),
            status: ChannelStatus::Pending,
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: ChannelStatus) {
        let now = Utc::now();
        self.status = status;
        self.updated_at = now;
        if status == ChannelStatus::Synced {
            self.last_synced_at = Some(now);
        }
    }
}
