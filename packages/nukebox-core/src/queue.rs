//! Shared playback queue with a derived "now playing / up next" summary.
//!
//! [`TrackQueue`] owns a plain FIFO of [`Entry`] values plus the summary pair
//! clients see when they query the server. Every mutation and every read of
//! the summary goes through one lock, so a reader never observes a summary
//! that mixes the before and after state of a single enqueue or dequeue.
//!
//! # Summary state table
//!
//! On enqueue, by resulting queue length:
//!
//! | length | condition                    | effect                         |
//! |--------|------------------------------|--------------------------------|
//! | > 2    |                              | none                           |
//! | 2      | dequeued since last reset    | none                           |
//! | 2      | otherwise                    | `next = second entry`          |
//! | 1      | playing                      | `next = entry`                 |
//! | 1      | not playing                  | `current = entry`, `next = ∅`  |
//!
//! On dequeue: `current = removed`, `next = new head or ∅`, and the
//! "dequeued since empty" flag is set. The flag keeps a second enqueued item
//! from overwriting a `next` the draining consumer already established.

use std::collections::VecDeque;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::QueueError;

/// Cover art attached to a queue entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ArtRef {
    /// A URL clients can fetch (local art service or remote).
    Url(String),
    /// No art is known for this track.
    #[default]
    Absent,
}

impl ArtRef {
    /// Returns the value shown to clients: the URL, or an empty string.
    #[must_use]
    pub fn display_url(&self) -> &str {
        match self {
            ArtRef::Url(url) => url,
            ArtRef::Absent => "",
        }
    }
}

/// A pending or playing track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub track: String,
    pub artist: String,
    pub album: String,
    pub art: ArtRef,
    /// Where the file lives in the library.
    pub path: PathBuf,
    /// Size the uploader declared, in bytes.
    pub size: u64,
    /// Container type, e.g. `"mp3"`.
    pub filetype: String,
}

impl Entry {
    /// Projects the entry onto its client-facing summary.
    #[must_use]
    pub fn summary(&self) -> Summary {
        Summary {
            track: self.track.clone(),
            artist: self.artist.clone(),
            art: self.art.display_url().to_string(),
        }
    }
}

/// Client-facing view of a queue entry. All fields blank means "nothing".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub track: String,
    pub artist: String,
    pub art: String,
}

impl Summary {
    /// Returns `true` if this is the blank summary.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.track.is_empty() && self.artist.is_empty() && self.art.is_empty()
    }
}

/// Consistent copy of the summary pair, taken under the queue lock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub current: Summary,
    pub next: Summary,
}

/// Everything guarded by the queue lock.
#[derive(Debug, Default)]
struct QueueState {
    entries: VecDeque<Entry>,
    current: Summary,
    next: Summary,
    dequeued_since_empty: bool,
}

impl QueueState {
    fn reset(&mut self) {
        self.current = Summary::default();
        self.next = Summary::default();
        self.dequeued_since_empty = false;
    }
}

/// FIFO of pending tracks plus the derived current/next summary.
///
/// Shared by connection handlers (query), ingest workers (enqueue) and the
/// playback loop (dequeue/reset). Cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct TrackQueue {
    state: Mutex<QueueState>,
}

impl TrackQueue {
    /// Creates an empty queue with a blank summary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry and updates the summary.
    ///
    /// `playing` tells the queue whether something is already audible, which
    /// decides whether a lone entry becomes `current` or `next`.
    ///
    /// Returns the queue length after insertion, i.e. the entry's position.
    pub fn enqueue(&self, entry: Entry, playing: bool) -> usize {
        self.enqueue_with(entry, || playing)
    }

    /// Like [`enqueue`](Self::enqueue), but asks `playing` under the queue
    /// lock.
    ///
    /// Pair with [`take_next`](Self::take_next) so the playing flag and the
    /// queue contents are always observed together.
    pub fn enqueue_with(&self, entry: Entry, playing: impl FnOnce() -> bool) -> usize {
        let mut state = self.state.lock();
        let playing = playing();
        let summary = entry.summary();
        state.entries.push_back(entry);
        let len = state.entries.len();

        match len {
            1 if playing => {
                state.next = summary;
            }
            1 => {
                state.current = summary;
                state.next = Summary::default();
            }
            2 if !state.dequeued_since_empty => {
                let second = state.entries[1].summary();
                state.next = second;
            }
            _ => {}
        }

        log::debug!(
            "[Queue] Enqueued '{}' (length {}, playing {})",
            state.entries[len - 1].track,
            len,
            playing
        );
        len
    }

    /// Removes and returns the head of the queue.
    ///
    /// On an empty queue the summary is reset and [`QueueError::Empty`] is
    /// returned; calling it repeatedly is harmless.
    pub fn dequeue(&self) -> Result<Entry, QueueError> {
        let mut state = self.state.lock();
        if state.entries.is_empty() {
            state.reset();
            return Err(QueueError::Empty);
        }
        Self::pop_head(&mut state).ok_or(QueueError::Empty)
    }

    /// Removes the head if there is one, running `on_take` before the lock
    /// is released.
    ///
    /// Unlike [`dequeue`](Self::dequeue), an empty queue is left alone so
    /// [`reset_if_drained`](Self::reset_if_drained) still sees the
    /// "dequeued since empty" flag.
    pub fn take_next(&self, on_take: impl FnOnce(&Entry)) -> Option<Entry> {
        let mut state = self.state.lock();
        let entry = Self::pop_head(&mut state)?;
        on_take(&entry);
        Some(entry)
    }

    fn pop_head(state: &mut QueueState) -> Option<Entry> {
        let entry = state.entries.pop_front()?;
        let next = state
            .entries
            .front()
            .map(Entry::summary)
            .unwrap_or_default();
        state.dequeued_since_empty = true;
        state.current = entry.summary();
        state.next = next;

        log::debug!(
            "[Queue] Dequeued '{}' ({} remaining)",
            entry.track,
            state.entries.len()
        );
        Some(entry)
    }

    /// Clears the summary and the "dequeued since empty" flag.
    ///
    /// Pending entries are left untouched.
    pub fn reset(&self) {
        self.state.lock().reset();
        log::debug!("[Queue] Summary reset");
    }

    /// Returns a consistent copy of the current/next summary.
    #[must_use]
    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock();
        QueueSnapshot {
            current: state.current.clone(),
            next: state.next.clone(),
        }
    }

    /// Returns the number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Returns whether an entry has been dequeued since the last reset.
    #[must_use]
    pub fn has_dequeued_since_empty(&self) -> bool {
        self.state.lock().dequeued_since_empty
    }

    /// Resets the summary only if the queue is drained and was consumed from.
    ///
    /// Check and reset happen under one lock so an enqueue racing with the
    /// playback loop cannot be wiped out. Returns `true` if a reset happened.
    pub fn reset_if_drained(&self) -> bool {
        let mut state = self.state.lock();
        if state.entries.is_empty() && state.dequeued_since_empty {
            state.reset();
            log::debug!("[Queue] Drained, summary reset");
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Builds an entry whose fields are derived from `name`.
    pub fn entry(name: &str) -> Entry {
        Entry {
            track: format!("Song {name}"),
            artist: format!("Artist {name}"),
            album: format!("Album {name}"),
            art: ArtRef::Url(format!("http://art/{name}")),
            path: PathBuf::from(format!("/library/{name}.mp3")),
            size: 1000,
            filetype: "mp3".to_string(),
        }
    }
}
