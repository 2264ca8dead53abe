//! Domain layer - Records and rules shared by the scheduler and workers.

pub mod channel;
pub mod episodes;
pub mod queue_item;
pub mod streams;
pub mod sync_job;
pub mod video;

pub use channel::{Channel, ChannelStatus};
pub use episodes::EpisodePlan;
pub use queue_item::{is_valid_id, MalformedQueueItem, QueueItem};
pub use streams::{SelectionError, SelectionPolicy, StreamDescriptor, StreamKind, StreamSelection};
pub use sync_job::{ChannelProgress, SyncJob, SyncJobStatus, TransitionError};
pub use video::{SourceVideo, StatusUpdate, Video, VideoStatus};
