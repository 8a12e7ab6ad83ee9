//! `SessionStore`: the station session bound to one audio output.
//!
//! The store is the only writer of the session.  After every action it
//! replaces the shared snapshot wholesale and sends `StateUpdated` on the
//! broadcast channel, so readers (socket clients, HTTP handlers) never see a
//! half-applied change.  Driver failures are logged and published as
//! [`StationEvent`]s; none of them are returned to the caller.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::driver::{DriverError, DriverEvent, PlaybackDriver};
use crate::model::{Interstitial, PlaylistItem, Track};
use crate::protocol::{Command, SessionState, StationEvent};
use crate::session::RadioSession;

/// What survives a daemon restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentState {
    pub volume: f32,
    #[serde(default)]
    pub muted: bool,
}

impl Default for PersistentState {
    fn default() -> Self {
        Self {
            volume: 0.5,
            muted: false,
        }
    }
}

impl PersistentState {
    pub fn load(state_file: &std::path::Path) -> Option<Self> {
        let content = std::fs::read_to_string(state_file).ok()?;
        serde_json::from_str(&content).ok()
    }
}

pub struct SessionStore<D> {
    session: RadioSession,
    driver: D,
    snapshot: Arc<RwLock<SessionState>>,
    events: broadcast::Sender<StationEvent>,
    host_clip: String,
    rng: StdRng,
    state_file: Option<PathBuf>,
    /// Back-to-back playback errors since the last clean end-of-track.
    consecutive_failures: usize,
}

impl<D: PlaybackDriver> SessionStore<D> {
    pub fn new(
        session: RadioSession,
        driver: D,
        host_clip: impl Into<String>,
        events: broadcast::Sender<StationEvent>,
    ) -> Self {
        let snapshot = Arc::new(RwLock::new(session.state().clone()));
        Self {
            session,
            driver,
            snapshot,
            events,
            host_clip: host_clip.into(),
            rng: StdRng::from_entropy(),
            state_file: None,
            consecutive_failures: 0,
        }
    }

    /// Persist volume and mute to `path` whenever they change.
    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        self.state_file = Some(path);
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Shared read-only view, replaced after every action.
    pub fn snapshot(&self) -> Arc<RwLock<SessionState>> {
        Arc::clone(&self.snapshot)
    }

    pub fn state(&self) -> &SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &RadioSession {
        &self.session
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StationEvent> {
        self.events.subscribe()
    }

    // ── actions ───────────────────────────────────────────────────────────────

    /// Build the playlist and cue the first item.  Does nothing when a
    /// playlist already exists or `tracks` is empty.
    pub async fn initialize(&mut self, tracks: &[Track], interstitials: &[Interstitial]) {
        if self.session.has_playlist() {
            debug!("store: initialize ignored, playlist already present");
            self.emit(StationEvent::DuplicateInitialize);
            return;
        }
        if !self
            .session
            .initialize(tracks, interstitials, &mut self.rng)
        {
            debug!("store: initialize ignored, no tracks");
            return;
        }
        info!(
            "store: playlist ready ({} items from {} tracks, {} interstitials)",
            self.state().playlist.len(),
            tracks.len(),
            interstitials.len()
        );
        let volume = self.state().effective_volume();
        if let Err(e) = self.driver.set_volume(volume).await {
            warn!("store: failed to apply volume: {}", e);
        }
        self.cue_on_air(Utc::now()).await;
        self.publish().await;
    }

    pub async fn toggle_play(&mut self) {
        if self.state().is_playing {
            if let Err(e) = self.driver.pause().await {
                warn!("store: pause failed: {}", e);
            }
            self.session.set_playing(false);
        } else if self.state().current_item.is_some() {
            match self.driver.play().await {
                Ok(()) => {
                    self.consecutive_failures = 0;
                    self.session.set_playing(true);
                }
                Err(e) => {
                    warn!("store: could not start playback: {}", e);
                    self.emit(StationEvent::PlayStartFailed {
                        reason: e.to_string(),
                    });
                }
            }
        } else {
            debug!("store: toggle_play with nothing cued");
        }
        self.publish().await;
    }

    /// Next item, as of now.
    pub async fn advance(&mut self) {
        self.advance_at(Utc::now()).await;
    }

    /// Next item, evaluating the host-segment timer at `now`.
    pub async fn advance_at(&mut self, now: DateTime<Utc>) {
        if !self.step(now) {
            return;
        }
        self.cue_on_air(now).await;
        self.publish().await;
    }

    /// Move the session on and announce what went on air.
    fn step(&mut self, now: DateTime<Utc>) -> bool {
        let Some(item) = self.session.advance(now).cloned() else {
            return false;
        };
        match &item {
            PlaylistItem::HostSegment => {
                info!("store: host segment");
                self.emit(StationEvent::HostSegmentStarted);
            }
            PlaylistItem::ChartTopper(track) => {
                info!("store: chart-topper {}", track.id);
                self.emit(StationEvent::ChartTopperStarted {
                    track_id: track.id.clone(),
                });
            }
            other => debug!("store: now on air {}", other.label()),
        }
        true
    }

    /// User-requested skip.  Clears the failure streak.
    pub async fn skip(&mut self) {
        self.consecutive_failures = 0;
        self.advance().await;
    }

    pub async fn reshuffle(&mut self) {
        if self.session.reshuffle(&mut self.rng).is_none() {
            return;
        }
        self.consecutive_failures = 0;
        info!("store: playlist reshuffled");
        self.cue_on_air(Utc::now()).await;
        self.publish().await;
    }

    pub async fn set_volume(&mut self, volume: f32) {
        let applied = self.session.set_volume(volume);
        if let Err(e) = self.driver.set_volume(applied).await {
            warn!("store: failed to apply volume: {}", e);
        }
        self.save().await;
        self.publish().await;
    }

    pub async fn set_muted(&mut self, muted: bool) {
        let applied = self.session.set_muted(muted);
        if let Err(e) = self.driver.set_volume(applied).await {
            warn!("store: failed to apply volume: {}", e);
        }
        self.save().await;
        self.publish().await;
    }

    pub async fn seek(&mut self, position_secs: f64) {
        if self.state().current_item.is_none() {
            return;
        }
        let position_secs = position_secs.max(0.0);
        if let Err(e) = self.driver.seek(position_secs).await {
            warn!("store: seek failed: {}", e);
            return;
        }
        let duration = self.state().duration_secs;
        self.session.set_timeline(Some(position_secs), duration);
        self.publish().await;
    }

    /// Replace the cached chart-topper played after each host segment.
    pub fn set_chart_topper(&mut self, track: Option<Track>) {
        self.session.set_chart_topper(track);
    }

    pub async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::TogglePlay => self.toggle_play().await,
            Command::Skip => self.skip().await,
            Command::Reshuffle => self.reshuffle().await,
            Command::Volume { value } => self.set_volume(value).await,
            Command::Mute { muted } => self.set_muted(muted).await,
            Command::Seek { seconds } => self.seek(seconds).await,
            Command::GetState => self.publish().await,
        }
    }

    /// React to the audio output.  End-of-track and decode errors both move
    /// the station on; only a full pass of back-to-back errors stops it.
    pub async fn on_driver_event(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::Loaded => self.session.mark_loaded(),
            DriverEvent::Ended => {
                self.consecutive_failures = 0;
                self.advance().await;
            }
            DriverEvent::Errored { reason } => {
                let item = self
                    .state()
                    .current_item
                    .as_ref()
                    .map(PlaylistItem::label)
                    .unwrap_or_default();
                warn!("store: playback error on {:?}: {}", item, reason);
                self.emit(StationEvent::PlaybackError { item, reason });

                if self.count_failure() {
                    self.stall().await;
                } else {
                    self.advance().await;
                }
            }
            DriverEvent::Position(pos) => {
                let duration = self.state().duration_secs;
                if self.session.observe_timeline(pos, duration) {
                    self.publish().await;
                }
            }
            DriverEvent::Duration(duration) => {
                let pos = self.state().time_pos_secs;
                if self.session.observe_timeline(pos, duration) {
                    self.publish().await;
                }
            }
        }
    }

    // ── internals ─────────────────────────────────────────────────────────────

    /// Every playlist slot plus the host and chart-topper slots.
    fn stall_threshold(&self) -> usize {
        self.state().playlist.len() + 2
    }

    /// Add one to the error streak; `true` once it reaches the threshold.
    fn count_failure(&mut self) -> bool {
        self.consecutive_failures += 1;
        self.consecutive_failures >= self.stall_threshold()
    }

    async fn stall(&mut self) {
        let failures = self.consecutive_failures;
        warn!(
            "store: {} playback errors in a row, pausing auto-advance",
            failures
        );
        if let Err(e) = self.driver.pause().await {
            warn!("store: pause failed: {}", e);
        }
        self.session.set_playing(false);
        self.consecutive_failures = 0;
        self.emit(StationEvent::Stalled { failures });
        self.publish().await;
    }

    /// Point the output at the item on air, and start it if the station is
    /// playing.  An item the output refuses to load counts as a playback
    /// error and the next one is tried.  An output that cannot be reached at
    /// all takes the station off air.
    async fn cue_on_air(&mut self, now: DateTime<Utc>) {
        loop {
            let Some(item) = self.state().current_item.clone() else {
                return;
            };
            let url = item.audio_url(&self.host_clip).to_string();
            let Err(e) = self.driver.load(&url).await else {
                break;
            };
            warn!("store: failed to load {}: {}", url, e);
            self.emit(StationEvent::PlaybackError {
                item: item.label(),
                reason: e.to_string(),
            });
            if matches!(e, DriverError::Unavailable(_)) {
                self.session.set_playing(false);
                return;
            }
            if self.count_failure() {
                self.stall().await;
                return;
            }
            if !self.step(now) {
                return;
            }
        }
        if self.state().is_playing {
            if let Err(e) = self.driver.play().await {
                warn!("store: could not start playback: {}", e);
                self.session.set_playing(false);
                self.emit(StationEvent::PlayStartFailed {
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn publish(&self) {
        let state = self.session.state().clone();
        let rev = state.rev;
        *self.snapshot.write().await = state;
        self.emit(StationEvent::StateUpdated { rev });
    }

    fn emit(&self, event: StationEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn save(&self) {
        let Some(path) = &self.state_file else {
            return;
        };
        if let Err(e) = self.write_state_file(path).await {
            warn!("store: failed to save {:?}: {}", path, e);
        }
    }

    async fn write_state_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let persistent = PersistentState {
            volume: self.state().volume,
            muted: self.state().is_muted,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&persistent)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}
