//! Feed playback state machine.
//!
//! One controller owns every slot currently materialized in the feed. The
//! rendering surface forwards taps, control presses, media events and
//! visibility changes; the controller drives each slot's `MediaHandle` and
//! keeps at most one slot playing.

use crate::error::PlaybackError;
use crate::models::{Chapter, Video};

/// Visible fraction below which an active slot is stopped.
pub const VISIBILITY_THRESHOLD: f64 = 0.5;

/// Externally observable state of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Poster only; no playback claim.
    Dormant,
    ActivePlaying,
    ActivePaused,
    /// Playing with the overlay collapsed.
    ActiveMinimized,
}

impl SlotState {
    pub fn is_active(self) -> bool {
        !matches!(self, SlotState::Dormant)
    }

    pub fn is_playing(self) -> bool {
        matches!(self, SlotState::ActivePlaying | SlotState::ActiveMinimized)
    }
}

/// The media element behind a slot.
pub trait MediaHandle {
    /// Starts or resumes playback. Rejections come back as `PlaybackError`.
    fn play(&mut self) -> Result<(), PlaybackError>;
    fn pause(&mut self);
    fn seek(&mut self, position: f64);
    fn position(&self) -> f64;
    /// `None` until the element knows its length.
    fn duration(&self) -> Option<f64>;
}

/// Receives visible-fraction updates for feed slots, decoupled from
/// whatever surface measures them.
pub trait VisibilityObserver {
    fn on_visibility_change(&mut self, slot: usize, visible_fraction: f64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Dormant,
    Playing,
    Paused,
}

struct Slot<M> {
    video: Video,
    media: M,
    phase: Phase,
    minimized: bool,
}

impl<M> Slot<M> {
    fn state(&self) -> SlotState {
        match (self.phase, self.minimized) {
            (Phase::Dormant, _) => SlotState::Dormant,
            (Phase::Paused, _) => SlotState::ActivePaused,
            (Phase::Playing, true) => SlotState::ActiveMinimized,
            (Phase::Playing, false) => SlotState::ActivePlaying,
        }
    }

    /// Media duration, falling back to the end of the last chapter.
    fn duration(&self) -> Option<f64>
    where
        M: MediaHandle,
    {
        self.media
            .duration()
            .filter(|duration| duration.is_finite() && *duration > 0.0)
            .or_else(|| self.video.chapters.last().map(|chapter| chapter.end_time))
    }
}

/// Snapshot of the active slot's timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackProgress {
    pub slot: usize,
    pub video_id: String,
    pub position: f64,
    pub duration: Option<f64>,
    pub chapter: Option<Chapter>,
}

pub struct FeedPlaybackController<M: MediaHandle> {
    slots: Vec<Slot<M>>,
    /// Slot allowed to start again on its own when it becomes visible.
    resume_slot: Option<usize>,
    chapter_selector: Option<usize>,
}

impl<M: MediaHandle> FeedPlaybackController<M> {
    pub fn new(entries: impl IntoIterator<Item = (Video, M)>) -> Self {
        let slots = entries
            .into_iter()
            .map(|(video, media)| Slot {
                video,
                media,
                phase: Phase::Dormant,
                minimized: false,
            })
            .collect();
        Self {
            slots,
            resume_slot: None,
            chapter_selector: None,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn state(&self, slot: usize) -> Option<SlotState> {
        self.slots.get(slot).map(Slot::state)
    }

    pub fn video(&self, slot: usize) -> Option<&Video> {
        self.slots.get(slot).map(|entry| &entry.video)
    }

    pub fn media(&self, slot: usize) -> Option<&M> {
        self.slots.get(slot).map(|entry| &entry.media)
    }

    /// Index of the slot holding the playback claim, if any.
    pub fn active_slot(&self) -> Option<usize> {
        self.slots.iter().position(|entry| entry.phase != Phase::Dormant)
    }

    pub fn resume_slot(&self) -> Option<usize> {
        self.resume_slot
    }

    pub fn chapter_selector(&self) -> Option<usize> {
        self.chapter_selector
    }

    /// Tap on the media area.
    pub fn tap(&mut self, slot: usize) -> Option<SlotState> {
        let entry = self.slots.get_mut(slot)?;
        match entry.phase {
            Phase::Playing => {
                entry.minimized = !entry.minimized;
                Some(entry.state())
            }
            Phase::Dormant | Phase::Paused => Some(self.start(slot, false)),
        }
    }

    /// Explicit play/pause control. Keeps the minimized flag.
    pub fn toggle_play_pause(&mut self, slot: usize) -> Option<SlotState> {
        let entry = self.slots.get_mut(slot)?;
        match entry.phase {
            Phase::Playing => {
                entry.media.pause();
                entry.phase = Phase::Paused;
                let state = entry.state();
                // A paused slot only restarts on user input.
                if self.resume_slot == Some(slot) {
                    self.resume_slot = None;
                }
                Some(state)
            }
            Phase::Paused => {
                let minimized = entry.minimized;
                Some(self.start(slot, minimized))
            }
            Phase::Dormant => Some(self.start(slot, false)),
        }
    }

    pub fn on_ended(&mut self, slot: usize) -> Option<SlotState> {
        self.slots.get(slot)?;
        tracing::debug!(slot, "media ended");
        self.park(slot);
        self.state(slot)
    }

    pub fn on_error(&mut self, slot: usize, error: &PlaybackError) -> Option<SlotState> {
        self.slots.get(slot)?;
        tracing::warn!(slot, %error, "media element failed");
        self.park(slot);
        self.state(slot)
    }

    pub fn open_chapter_selector(&mut self, slot: usize) -> bool {
        if slot >= self.slots.len() {
            return false;
        }
        self.chapter_selector = Some(slot);
        true
    }

    pub fn close_chapter_selector(&mut self) {
        self.chapter_selector = None;
    }

    /// Seeks the selector's slot to the start of `chapter_id` and plays it,
    /// whatever state the slot was in. The selector closes either way.
    pub fn select_chapter(&mut self, chapter_id: &str) -> Option<SlotState> {
        let slot = self.chapter_selector.take()?;
        let entry = self.slots.get_mut(slot)?;
        let Some(start_time) = entry.video.chapter(chapter_id).map(|chapter| chapter.start_time)
        else {
            tracing::debug!(slot, chapter_id, "unknown chapter selected");
            return None;
        };
        entry.media.seek(start_time);
        Some(self.start(slot, false))
    }

    /// Moves `slot` to `fraction` of its timeline without touching its state.
    pub fn scrub(&mut self, slot: usize, fraction: f64) -> Option<f64> {
        let entry = self.slots.get_mut(slot)?;
        let duration = entry.duration()?;
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        let position = fraction * duration;
        entry.media.seek(position);
        Some(position)
    }

    pub fn progress(&self) -> Option<PlaybackProgress> {
        let slot = self.active_slot()?;
        let entry = &self.slots[slot];
        let position = entry.media.position();
        Some(PlaybackProgress {
            slot,
            video_id: entry.video.id.clone(),
            position,
            duration: entry.duration(),
            chapter: entry.video.chapter_at(position).cloned(),
        })
    }

    /// Marks the slot showing `video_id` as the one to resume once it is on
    /// screen. Does not start playback.
    pub fn focus_video(&mut self, video_id: &str) -> Option<usize> {
        let slot = self
            .slots
            .iter()
            .position(|entry| entry.video.id == video_id)?;
        self.resume_slot = Some(slot);
        Some(slot)
    }

    /// Pauses every other slot, then asks `slot` to play. A refused play is
    /// logged and leaves the slot dormant.
    fn start(&mut self, slot: usize, minimized: bool) -> SlotState {
        for (index, other) in self.slots.iter_mut().enumerate() {
            if index == slot {
                continue;
            }
            other.media.pause();
            if other.phase != Phase::Dormant {
                other.phase = Phase::Dormant;
                other.minimized = false;
            }
        }

        self.resume_slot = Some(slot);
        let entry = &mut self.slots[slot];
        match entry.media.play() {
            Ok(()) => {
                entry.phase = Phase::Playing;
                entry.minimized = minimized;
            }
            Err(err) => {
                match &err {
                    PlaybackError::Interrupted => {
                        tracing::debug!(slot, "play was interrupted")
                    }
                    PlaybackError::NotAllowed => {
                        tracing::info!(slot, "play was not allowed (user interaction required)")
                    }
                    PlaybackError::Media(message) => {
                        tracing::warn!(slot, message = message.as_str(), "play failed")
                    }
                }
                entry.phase = Phase::Dormant;
                entry.minimized = false;
                self.resume_slot = None;
            }
        }
        self.slots[slot].state()
    }

    fn park(&mut self, slot: usize) {
        let Some(entry) = self.slots.get_mut(slot) else {
            return;
        };
        if entry.phase == Phase::Playing {
            entry.media.pause();
        }
        entry.phase = Phase::Dormant;
        entry.minimized = false;
        if self.resume_slot == Some(slot) {
            self.resume_slot = None;
        }
    }
}

impl<M: MediaHandle> VisibilityObserver for FeedPlaybackController<M> {
    fn on_visibility_change(&mut self, slot: usize, visible_fraction: f64) {
        let Some(entry) = self.slots.get(slot) else {
            return;
        };
        if visible_fraction.is_nan() || visible_fraction < VISIBILITY_THRESHOLD {
            if entry.phase != Phase::Dormant {
                tracing::debug!(slot, visible_fraction, "slot scrolled out of view");
                self.park(slot);
            }
        } else if self.resume_slot == Some(slot) && entry.phase == Phase::Dormant {
            self.start(slot, false);
        }
    }
}
