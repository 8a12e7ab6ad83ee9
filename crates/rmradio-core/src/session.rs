//! The station session as a plain state machine: no audio, no channels.
//!
//! [`RadioSession`] owns the snapshot observers see plus the host-segment
//! schedule and the cached chart-topper. Every mutating call bumps `rev`.
//! Applying the result to an audio output is the job of
//! [`crate::store::SessionStore`].

use std::ops::RangeInclusive;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::model::{Interstitial, PlaylistItem, Track};
use crate::playlist::{build_playlist_in, DEFAULT_CADENCE};
use crate::policy::{HostSchedule, HostState, Step, DEFAULT_HOST_INTERVAL_SECS};
use crate::protocol::SessionState;
use crate::shuffle::shuffle;

/// Timing knobs for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub host_interval: Duration,
    pub cadence: RangeInclusive<usize>,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            host_interval: Duration::seconds(DEFAULT_HOST_INTERVAL_SECS),
            cadence: DEFAULT_CADENCE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RadioSession {
    state: SessionState,
    host: HostSchedule,
    cadence: RangeInclusive<usize>,
    chart_topper: Option<Track>,
    /// The output has confirmed the item on air is open.
    source_loaded: bool,
}

impl RadioSession {
    pub fn new(schedule: &Schedule, started_at: DateTime<Utc>) -> Self {
        Self {
            state: SessionState::default(),
            host: HostSchedule::new(schedule.host_interval, started_at),
            cadence: schedule.cadence.clone(),
            chart_topper: None,
            source_loaded: false,
        }
    }

    /// Start from a previously saved volume level.
    pub fn with_volume(mut self, volume: f32, muted: bool) -> Self {
        self.state.volume = volume.clamp(0.0, 1.0);
        self.state.is_muted = muted;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn host_state(&self) -> HostState {
        self.host.state()
    }

    pub fn host_schedule(&self) -> &HostSchedule {
        &self.host
    }

    pub fn chart_topper(&self) -> Option<&Track> {
        self.chart_topper.as_ref()
    }

    pub fn set_chart_topper(&mut self, track: Option<Track>) {
        self.chart_topper = track;
    }

    pub fn has_playlist(&self) -> bool {
        !self.state.playlist.is_empty()
    }

    /// Build the playlist once.  Returns `false` (and changes nothing) when a
    /// playlist already exists or there are no tracks.
    pub fn initialize<R: Rng + ?Sized>(
        &mut self,
        tracks: &[Track],
        interstitials: &[Interstitial],
        rng: &mut R,
    ) -> bool {
        if self.has_playlist() || tracks.is_empty() {
            return false;
        }
        let playlist = build_playlist_in(tracks, interstitials, self.cadence.clone(), rng);
        let first = playlist.first().cloned();
        self.state.playlist = playlist;
        self.put_on_air(0, first);
        true
    }

    /// Move to the next item, letting the host-segment policy interrupt.
    ///
    /// Host segment and chart-topper slots leave `current_index` alone, so
    /// rotation resumes where it was.  Returns `None` when there is nothing
    /// to play.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Option<&PlaylistItem> {
        if !self.has_playlist() {
            return None;
        }

        let current_is_host = self
            .state
            .current_item
            .as_ref()
            .is_some_and(PlaylistItem::is_host_segment);
        let step = self
            .host
            .next_step(now, current_is_host, self.chart_topper.as_ref());

        let index = self.state.current_index;
        match step {
            Step::HostSegment => self.put_on_air(index, Some(PlaylistItem::HostSegment)),
            Step::ChartTopper(track) => {
                self.put_on_air(index, Some(PlaylistItem::ChartTopper(track)))
            }
            Step::Advance => {
                let next = (index + 1) % self.state.playlist.len();
                let item = self.state.playlist[next].clone();
                self.put_on_air(next, Some(item));
            }
        }
        self.state.current_item.as_ref()
    }

    /// Re-permute the current playlist and restart from the top.
    pub fn reshuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<&PlaylistItem> {
        if !self.has_playlist() {
            return None;
        }
        self.state.playlist = shuffle(&self.state.playlist, rng);
        self.host.reset();
        let first = self.state.playlist.first().cloned();
        self.put_on_air(0, first);
        self.state.current_item.as_ref()
    }

    pub fn set_playing(&mut self, playing: bool) {
        if self.state.is_playing != playing {
            self.state.is_playing = playing;
            self.touch();
        }
    }

    /// Store a new volume level; zero means muted.  Returns the level to
    /// apply to the output.
    pub fn set_volume(&mut self, volume: f32) -> f32 {
        let volume = volume.clamp(0.0, 1.0);
        self.state.volume = volume;
        self.state.is_muted = volume == 0.0;
        self.touch();
        self.state.effective_volume()
    }

    /// Returns the level to apply to the output: zero, or the stored volume.
    pub fn set_muted(&mut self, muted: bool) -> f32 {
        self.state.is_muted = muted;
        self.touch();
        self.state.effective_volume()
    }

    pub fn set_timeline(&mut self, time_pos_secs: Option<f64>, duration_secs: Option<f64>) {
        self.state.time_pos_secs = time_pos_secs;
        self.state.duration_secs = duration_secs;
        self.touch();
    }

    /// The output opened the item on air.
    pub fn mark_loaded(&mut self) {
        self.source_loaded = true;
    }

    pub fn source_loaded(&self) -> bool {
        self.source_loaded
    }

    /// Timeline report from the output.  Dropped (returns `false`) until the
    /// item on air is loaded, so a late report from the previous file cannot
    /// stick to the new one.
    pub fn observe_timeline(
        &mut self,
        time_pos_secs: Option<f64>,
        duration_secs: Option<f64>,
    ) -> bool {
        if !self.source_loaded {
            return false;
        }
        self.set_timeline(time_pos_secs, duration_secs);
        true
    }

    fn put_on_air(&mut self, index: usize, item: Option<PlaylistItem>) {
        self.source_loaded = false;
        self.state.current_index = index;
        self.state.current_item = item;
        self.state.time_pos_secs = None;
        self.state.duration_secs = None;
        self.touch();
    }

    fn touch(&mut self) {
        self.state.rev += 1;
    }
}
