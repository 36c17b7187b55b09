//! The per-guild play queue.

use std::collections::VecDeque;

use hydrolink_protocol::Track;

/// What happens to a track when it finishes naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Advance through the queue and stop at the end.
    #[default]
    None,
    /// Replay the finished track.
    Song,
    /// Append the finished track to the back of the queue.
    Queue,
}

/// A guild's queue: the loaded track, what plays next, and what already
/// played.
///
/// `current` is the track the backend has loaded right now; it is not
/// part of `pending`. History grows every time a current track is
/// retired, newest last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackQueue {
    pub current: Option<Track>,
    pending: VecDeque<Track>,
    history: Vec<Track>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a track to the back of the queue.
    pub fn push(&mut self, track: Track) {
        self.pending.push_back(track);
    }

    /// Puts a track at the front of the queue, to play next.
    pub fn push_front(&mut self, track: Track) {
        self.pending.push_front(track);
    }

    /// Takes the next queued track.
    pub fn pop_front(&mut self) -> Option<Track> {
        self.pending.pop_front()
    }

    /// Number of queued tracks, not counting `current`.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Queued tracks plus the current one, if any.
    pub fn total_size(&self) -> usize {
        self.pending.len() + usize::from(self.current.is_some())
    }

    /// Drops the queue and the current track. History is kept.
    pub fn clear(&mut self) {
        self.current = None;
        self.pending.clear();
    }

    pub fn pending(&self) -> impl Iterator<Item = &Track> {
        self.pending.iter()
    }

    /// Everything that already played, oldest first.
    pub fn history(&self) -> &[Track] {
        &self.history
    }

    /// Records a retired track in history.
    pub fn remember(&mut self, track: Track) {
        self.history.push(track);
    }

    /// Takes the most recently played track back out of history.
    pub fn pop_history(&mut self) -> Option<Track> {
        self.history.pop()
    }
}

// =========================================================================
// Tests
// =========================================================================
