//! Two-phase streaming discovery and dispatch.
//!
//! Phase 1 pages through the whole channel without writing anything, only to
//! learn which videos are new, because oldest-first episode numbers cannot be
//! fixed before the number of new videos is known. Phase 2 pages through the
//! channel again and saves and dispatches page by page, so workers start on
//! the first page while later pages are still being listed.

use super::repository::Repository;
use crate::domain::{Channel, EpisodePlan, QueueItem, Video, VideoStatus};
use crate::ports::source::{SourceError, SourcePage, VideoSource};
use crate::ports::store::StoreError;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one discovery pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryOutcome {
    /// New video records written
    pub new_videos: usize,
    /// Known pending/error videos pushed again
    pub requeued: usize,
    /// Queue pushes, `new_videos + requeued`
    pub dispatched: usize,
    /// The source failed and known videos were dispatched instead
    pub degraded: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("store error during discovery: {0}")]
    Store(#[from] StoreError),
    #[error("video source failed and channel {channel_id} has no known videos: {source}")]
    NoKnownVideos {
        channel_id: String,
        #[source]
        source: SourceError,
    },
}

/// Errors inside a phase; source failures trigger the fallback, store
/// failures abort discovery.
#[derive(Debug, thiserror::Error)]
enum PhaseError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of the count phase.
#[derive(Debug, Default)]
struct Census {
    /// New video ids in listing order, newest first
    new_ids: Vec<String>,
    requeue: usize,
    pages: usize,
}

#[derive(Clone)]
pub struct DiscoveryService {
    repo: Repository,
    source: Arc<dyn VideoSource>,
}

impl fmt::Debug for DiscoveryService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryService").finish_non_exhaustive()
    }
}

impl DiscoveryService {
    pub fn new(repo: Repository, source: Arc<dyn VideoSource>) -> Self {
        Self { repo, source }
    }

    pub async fn discover_and_dispatch(
        &self,
        channel: &Channel,
    ) -> Result<DiscoveryOutcome, DiscoveryError> {
        let mut outcome = DiscoveryOutcome::default();
        let mut dispatched = HashSet::new();

        let census = match self.count_phase(channel).await {
            Ok(census) => census,
            Err(PhaseError::Store(e)) => return Err(e.into()),
            Err(PhaseError::Source(e)) => {
                self.dispatch_known(channel, &mut dispatched, &mut outcome, e)
                    .await?;
                return Ok(outcome);
            }
        };
        info!(
            channel_id = %channel.id,
            new = census.new_ids.len(),
            requeue = census.requeue,
            pages = census.pages,
            "Count phase finished"
        );

        if census.new_ids.is_empty() && census.requeue == 0 {
            return Ok(outcome);
        }

        let existing = self.repo.max_episode_number(&channel.id).await?;
        let plan = EpisodePlan::assign(existing, &census.new_ids);

        match self
            .dispatch_phase(channel, &plan, &mut dispatched, &mut outcome)
            .await
        {
            Ok(()) => Ok(outcome),
            Err(PhaseError::Store(e)) => Err(e.into()),
            Err(PhaseError::Source(e)) => {
                self.dispatch_known(channel, &mut dispatched, &mut outcome, e)
                    .await?;
                Ok(outcome)
            }
        }
    }

    async fn next_page(
        &self,
        channel: &Channel,
        token: Option<String>,
    ) -> Result<SourcePage, SourceError> {
        let mut page = self.source.list_page(&channel.source_id, token).await?;
        if page.next_page_token.as_deref() == Some("") {
            page.next_page_token = None;
        }
        Ok(page)
    }

    /// Phase 1: classify every listed video. No writes.
    async fn count_phase(&self, channel: &Channel) -> Result<Census, PhaseError> {
        let mut census = Census::default();
        let mut seen = HashSet::new();
        let mut token = None;

        loop {
            let page = self.next_page(channel, token).await?;
            census.pages += 1;

            for meta in &page.videos {
                if !seen.insert(meta.id.clone()) {
                    continue;
                }
                match self.repo.video(&channel.id, &meta.id).await? {
                    None => census.new_ids.push(meta.id.clone()),
                    Some(existing) if existing.status.is_requeue_eligible() => census.requeue += 1,
                    Some(_) => {}
                }
            }

            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(census)
    }

    /// Phase 2: re-list from the first page, save new records and push each
    /// page's batch before asking for the next page.
    async fn dispatch_phase(
        &self,
        channel: &Channel,
        plan: &EpisodePlan,
        dispatched: &mut HashSet<String>,
        outcome: &mut DiscoveryOutcome,
    ) -> Result<(), PhaseError> {
        let mut seen = HashSet::new();
        let mut token = None;
        let mut page_number = 0usize;

        loop {
            let page = self.next_page(channel, token).await?;
            page_number += 1;
            let mut batch = Vec::new();

            for meta in &page.videos {
                if !seen.insert(meta.id.clone()) {
                    continue;
                }
                match self.repo.video(&channel.id, &meta.id).await? {
                    None => match plan.number_for(&meta.id) {
                        Some(episode) => {
                            let video = Video::discovered(&channel.id, meta, episode);
                            self.repo.save_video(&video).await?;
                            outcome.new_videos += 1;
                            batch.push(video.id);
                        }
                        None => debug!(
                            channel_id = %channel.id,
                            video_id = %meta.id,
                            "Video appeared after the count phase, leaving it for the next sync"
                        ),
                    },
                    Some(mut existing) if existing.status.is_requeue_eligible() => {
                        if existing.status != VideoStatus::Pending {
                            existing.reset_for_requeue();
                            self.repo.save_video(&existing).await?;
                        }
                        outcome.requeued += 1;
                        batch.push(existing.id);
                    }
                    Some(_) => {}
                }
            }

            self.push_batch(&channel.id, batch, dispatched, outcome)
                .await?;
            debug!(
                channel_id = %channel.id,
                page = page_number,
                dispatched = outcome.dispatched,
                "Page dispatched"
            );

            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(())
    }

    async fn push_batch(
        &self,
        channel_id: &str,
        batch: Vec<String>,
        dispatched: &mut HashSet<String>,
        outcome: &mut DiscoveryOutcome,
    ) -> Result<(), StoreError> {
        for video_id in batch {
            if dispatched.contains(&video_id) {
                continue;
            }
            self.repo
                .enqueue(&QueueItem::new(channel_id, video_id.as_str()))
                .await?;
            dispatched.insert(video_id);
            outcome.dispatched += 1;
        }
        Ok(())
    }

    /// Degraded mode: the source is unavailable, so dispatch the channel's
    /// known pending/error videos, oldest first. Nothing is renumbered and no
    /// metadata is refreshed.
    async fn dispatch_known(
        &self,
        channel: &Channel,
        dispatched: &mut HashSet<String>,
        outcome: &mut DiscoveryOutcome,
        cause: SourceError,
    ) -> Result<(), DiscoveryError> {
        warn!(
            channel_id = %channel.id,
            error = %cause,
            "Video source failed, falling back to known videos"
        );
        let mut known = self.repo.channel_videos(&channel.id).await?;
        if known.is_empty() && outcome.dispatched == 0 {
            return Err(DiscoveryError::NoKnownVideos {
                channel_id: channel.id.clone(),
                source: cause,
            });
        }
        outcome.degraded = true;

        known.sort_by_key(|video| video.episode_number);
        let mut batch = Vec::new();
        for mut video in known {
            if !video.status.is_requeue_eligible() || dispatched.contains(&video.id) {
                continue;
            }
            if video.status != VideoStatus::Pending {
                video.reset_for_requeue();
                self.repo.save_video(&video).await?;
            }
            outcome.requeued += 1;
            batch.push(video.id);
        }
        self.push_batch(&channel.id, batch, dispatched, outcome)
            .await?;
        Ok(())
    }
}
