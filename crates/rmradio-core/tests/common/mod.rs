#![allow(dead_code)]

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rmradio_core::driver::{self, DriverError, PlaybackDriver};
use rmradio_core::model::{Interstitial, InterstitialKind, Track};
use rmradio_core::protocol::StationEvent;
use rmradio_core::session::{RadioSession, Schedule};
use rmradio_core::store::SessionStore;
use tokio::sync::broadcast;

pub const HOST_CLIP: &str = "assets/radio-host.mp3";

/// Every call the store made on the audio output, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Load(String),
    Play,
    Pause,
    Volume(f32),
    Seek(f64),
}

#[derive(Debug, Default)]
pub struct RecordingDriver {
    pub calls: Vec<Call>,
    /// Make `play` fail, like a blocked autoplay.
    pub refuse_play: bool,
    /// Sources the output rejects on `load`.
    pub broken_urls: HashSet<String>,
    /// Every `load` fails as if the player could not be started.
    pub unavailable: bool,
}

impl RecordingDriver {
    pub fn loads(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Load(url) => Some(url.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn last(&self) -> Option<&Call> {
        self.calls.last()
    }
}

#[async_trait]
impl PlaybackDriver for RecordingDriver {
    async fn load(&mut self, url: &str) -> driver::Result<()> {
        self.calls.push(Call::Load(url.to_string()));
        if self.unavailable {
            return Err(DriverError::Unavailable("mpv binary not found".into()));
        }
        if self.broken_urls.contains(url) {
            return Err(DriverError::Refused(format!("cannot open {}", url)));
        }
        Ok(())
    }

    async fn play(&mut self) -> driver::Result<()> {
        if self.refuse_play {
            return Err(DriverError::Refused("autoplay blocked".into()));
        }
        self.calls.push(Call::Play);
        Ok(())
    }

    async fn pause(&mut self) -> driver::Result<()> {
        self.calls.push(Call::Pause);
        Ok(())
    }

    async fn set_volume(&mut self, volume: f32) -> driver::Result<()> {
        self.calls.push(Call::Volume(volume));
        Ok(())
    }

    async fn seek(&mut self, position_secs: f64) -> driver::Result<()> {
        self.calls.push(Call::Seek(position_secs));
        Ok(())
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 12, 21, 0, 0).unwrap()
}

pub fn track(id: &str) -> Track {
    Track {
        id: id.to_string(),
        title: format!("Song {}", id),
        audio_url: format!("https://cdn.example/songs/{}.mp3", id),
        artist: "The Amps".to_string(),
        genre: Some("rock".to_string()),
    }
}

pub fn tracks(ids: &[&str]) -> Vec<Track> {
    ids.iter().map(|id| track(id)).collect()
}

pub fn jingle(id: &str) -> Interstitial {
    Interstitial {
        id: id.to_string(),
        kind: InterstitialKind::Jingle,
        audio_url: format!("https://cdn.example/content/{}.mp3", id),
        title: format!("Jingle {}", id),
        brand: None,
    }
}

pub struct Harness {
    pub store: SessionStore<RecordingDriver>,
    pub events: broadcast::Receiver<StationEvent>,
}

impl Harness {
    /// A store whose host timer started at `started_at`.
    pub fn started_at(started_at: DateTime<Utc>, schedule: Schedule) -> Self {
        let (tx, events) = broadcast::channel(1024);
        let session = RadioSession::new(&schedule, started_at);
        let store = SessionStore::new(session, RecordingDriver::default(), HOST_CLIP, tx)
            .with_rng(StdRng::seed_from_u64(17));
        Self { store, events }
    }

    /// A store on the real clock, so `advance()` never hits the host timer
    /// during a test.
    pub fn live() -> Self {
        Self::started_at(Utc::now(), Schedule::default())
    }

    /// Drain pending events, skipping `StateUpdated` noise.
    pub fn diagnostics(&mut self) -> Vec<StationEvent> {
        let mut out = Vec::new();
        while let Ok(evt) = self.events.try_recv() {
            if !matches!(evt, StationEvent::StateUpdated { .. }) {
                out.push(evt);
            }
        }
        out
    }

    pub fn driver(&self) -> &RecordingDriver {
        self.store.driver()
    }

    pub fn driver_mut(&mut self) -> &mut RecordingDriver {
        self.store.driver_mut()
    }

    /// Source URL of playlist slot `index`.
    pub fn url_at(&self, index: usize) -> String {
        self.store.state().playlist[index]
            .audio_url(HOST_CLIP)
            .to_string()
    }
}
