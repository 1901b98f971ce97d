//! Background task that drains the queue into the player.
//!
//! One track plays at a time. After starting a track the loop waits a short
//! grace period (players take a moment to open the device), then polls the
//! player until it reports the track finished. When the queue runs dry after
//! being consumed from, the summary is cleared.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::events::{EventEmitter, PlaybackEvent, QueueEvent};
use crate::media::Player;
use crate::queue::{Entry, TrackQueue};
use crate::state::PlaybackStatus;
use crate::utils::now_millis;

/// Outcome of waiting on one track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackOutcome {
    Finished,
    Cancelled,
}

/// Drives the player from the shared [`TrackQueue`].
pub struct PlaybackLoop {
    queue: Arc<TrackQueue>,
    status: Arc<PlaybackStatus>,
    player: Arc<dyn Player>,
    emitter: Arc<dyn EventEmitter>,
    poll: Duration,
    grace: Duration,
}

impl PlaybackLoop {
    pub fn new(
        queue: Arc<TrackQueue>,
        status: Arc<PlaybackStatus>,
        player: Arc<dyn Player>,
        emitter: Arc<dyn EventEmitter>,
        poll: Duration,
        grace: Duration,
    ) -> Self {
        Self {
            queue,
            status,
            player,
            emitter,
            poll,
            grace,
        }
    }

    /// Runs until `cancel` fires. Returns within one poll interval of that.
    pub async fn run(&self, cancel: CancellationToken) {
        log::info!(
            "[Playback] Loop started (poll {:?}, grace {:?})",
            self.poll,
            self.grace
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            // Playing is flagged under the queue lock so a concurrent enqueue
            // never sees the head gone while playback still reads as idle.
            let taken = self.queue.take_next(|_| self.status.set_playing(true));
            match taken {
                Some(entry) => {
                    if self.play_entry(entry, &cancel).await == TrackOutcome::Cancelled {
                        break;
                    }
                }
                None => {
                    if self.queue.reset_if_drained() {
                        log::info!("[Playback] Queue drained");
                        self.emitter.emit_queue(QueueEvent::Drained {
                            timestamp: now_millis(),
                        });
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.poll) => {}
                    }
                }
            }
        }

        self.status.set_playing(false);
        log::info!("[Playback] Loop stopped");
    }

    async fn play_entry(&self, entry: Entry, cancel: &CancellationToken) -> TrackOutcome {
        if !file_exists(&entry.path).await {
            self.skip(&entry, format!("{} no longer exists", entry.path.display()));
            return TrackOutcome::Finished;
        }

        if let Err(e) = self.player.play(&entry.path).await {
            self.skip(&entry, e.to_string());
            return TrackOutcome::Finished;
        }

        log::info!("[Playback] Playing '{}' by {}", entry.track, entry.artist);
        self.emitter.emit_playback(PlaybackEvent::TrackStarted {
            track: entry.track.clone(),
            artist: entry.artist.clone(),
            path: entry.path.display().to_string(),
            timestamp: now_millis(),
        });

        let outcome = self.wait_for_track(cancel).await;
        self.status.set_playing(false);

        if outcome == TrackOutcome::Finished {
            log::debug!("[Playback] Finished '{}'", entry.track);
            self.emitter.emit_playback(PlaybackEvent::TrackFinished {
                track: entry.track,
                timestamp: now_millis(),
            });
        }
        outcome
    }

    async fn wait_for_track(&self, cancel: &CancellationToken) -> TrackOutcome {
        tokio::select! {
            _ = cancel.cancelled() => return TrackOutcome::Cancelled,
            _ = tokio::time::sleep(self.grace) => {}
        }

        loop {
            if !self.player.is_playing().await {
                return TrackOutcome::Finished;
            }
            tokio::select! {
                _ = cancel.cancelled() => return TrackOutcome::Cancelled,
                _ = tokio::time::sleep(self.poll) => {}
            }
        }
    }

    fn skip(&self, entry: &Entry, reason: String) {
        log::warn!("[Playback] Skipping '{}': {}", entry.track, reason);
        self.status.set_playing(false);
        self.emitter.emit_playback(PlaybackEvent::TrackSkipped {
            track: entry.track.clone(),
            reason,
            timestamp: now_millis(),
        });
    }
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
