//! Media state derived from status messages.
//!
//! The reader task is the only writer; any caller may take a snapshot. The
//! playback position is extrapolated: between two status samples, playback
//! is assumed to progress at real-time rate. That is an approximation, not
//! an authoritative position: the device does not push status while
//! playback merely progresses, and stalls or pauses since the last sample
//! are not accounted for.

use std::time::Instant;

use crate::{
    events::MediaEvent,
    protocol::messages::{MediaStatusEntry, PlayerState},
};

/// Last known media status of the device.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MediaStatus {
    /// `None` until the first status arrives.
    pub player_state: Option<PlayerState>,
    pub idle_reason: Option<String>,

    /// Targets play, pause, stop and track commands.
    pub media_session_id: Option<u64>,

    pub active_track_ids: Vec<u32>,

    /// Position in seconds at `sampled_at`.
    pub current_time: f64,
    pub sampled_at: Option<Instant>,

    /// Content uuid threaded through custom data at load time.
    pub uuid: Option<String>,
}

impl MediaStatus {
    /// Applies the authoritative status entry of a `MEDIA_STATUS` message
    /// and returns the event to notify observers with.
    pub fn apply(&mut self, entry: &MediaStatusEntry, now: Instant) -> MediaEvent {
        if let Some(id) = entry.media_session_id {
            self.media_session_id = Some(id);
        }
        if let Some(ids) = &entry.active_track_ids {
            self.active_track_ids.clone_from(ids);
        }
        if let Some(state) = &entry.player_state {
            self.player_state = Some(state.clone());
        }
        self.idle_reason.clone_from(&entry.idle_reason);

        self.current_time = entry.current_time.unwrap_or_default();
        self.sampled_at = Some(now);

        // Report the uuid that was playing when the player goes idle, then
        // forget it.
        let mut uuid = self.uuid.clone();
        let idle = entry.player_state == Some(PlayerState::Idle);
        if idle {
            self.uuid = None;
        } else if let Some(loaded) = entry.uuid() {
            self.uuid = Some(loaded.to_owned());
            uuid = self.uuid.clone();
        }

        MediaEvent {
            player_state: entry.player_state.clone(),
            idle_reason: entry.idle_reason.clone(),
            uuid,
        }
    }

    /// Extrapolated playback position in seconds.
    #[must_use]
    pub fn position(&self, now: Instant) -> f64 {
        match self.sampled_at {
            Some(sampled_at) if self.current_time > 0.0 => {
                self.current_time + now.saturating_duration_since(sampled_at).as_secs_f64()
            }
            _ => 0.0,
        }
    }

    /// Whether any text track is active.
    #[must_use]
    pub fn has_subtitles(&self) -> bool {
        !self.active_track_ids.is_empty()
    }
}
