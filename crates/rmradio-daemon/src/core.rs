//! StationCore: single-owner event loop for the station session.
//!
//! All inputs (client commands from the socket and HTTP API, mpv events,
//! heartbeat ticks) arrive as `CoreEvent`s on one mpsc channel.  StationCore
//! owns the `SessionStore` and with it the mpv output; no other task
//! touches them, so actions are applied strictly in arrival order.
//!
//! A user command racing a natural end-of-track is not cancelled: whichever
//! event arrives first is applied, and the second one acts on the result.
use std::sync::Arc;

use async_trait::async_trait;
use rmradio_core::catalog;
use rmradio_core::config::Config;
use rmradio_core::driver::{DriverEvent, PlaybackDriver};
use rmradio_core::protocol::{Command, SessionState, StationEvent};
use rmradio_core::session::RadioSession;
use rmradio_core::store::{PersistentState, SessionStore};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{error, info, warn};

use crate::mpv::MpvPlayback;

const HEARTBEAT_SECS: u64 = 10;

/// All inputs into the StationCore loop.
#[derive(Debug)]
pub enum CoreEvent {
    /// A command from a socket client or the HTTP API.
    Command(Command),
    /// Something happened on the audio output.
    Driver(DriverEvent),
    /// Heartbeat: check mpv liveness.
    HeartbeatTick,
    /// Ctrl-C / SIGTERM.
    Shutdown,
}

/// An audio output the core can supervise, on top of driving it.
#[async_trait]
pub trait AudioOutput: PlaybackDriver {
    /// `false` when the output was running and has died since.
    fn check_alive(&mut self) -> bool;

    async fn shutdown(&mut self);
}

pub struct StationCore<D> {
    store: SessionStore<D>,
    core_tx: mpsc::Sender<CoreEvent>,
}

impl StationCore<MpvPlayback> {
    /// Build the session, load the catalog and cue the first item.
    pub async fn new(
        config: &Config,
        events: broadcast::Sender<StationEvent>,
        core_tx: mpsc::Sender<CoreEvent>,
    ) -> anyhow::Result<Self> {
        let persistent = PersistentState::load(&config.daemon.state_file).unwrap_or(PersistentState {
            volume: config.mpv.default_volume,
            muted: false,
        });

        let session = RadioSession::new(&config.schedule.schedule(), chrono::Utc::now())
            .with_volume(persistent.volume, persistent.muted);
        let driver = MpvPlayback::new(core_tx.clone(), session.state().effective_volume());
        let mut store = SessionStore::new(
            session,
            driver,
            config.schedule.host_clip.clone(),
            events.clone(),
        )
        .with_state_file(config.daemon.state_file.clone());

        let catalog = catalog::load_or_empty(&config.catalog, &events).await;
        store.set_chart_topper(catalog.chart_topper.clone());
        store.initialize(&catalog.tracks, &catalog.interstitials).await;
        if catalog.is_empty() {
            warn!("StationCore: no playable tracks, station is silent");
        }

        Ok(Self::from_store(store, core_tx))
    }
}

impl<D: AudioOutput> StationCore<D> {
    pub fn from_store(store: SessionStore<D>, core_tx: mpsc::Sender<CoreEvent>) -> Self {
        Self { store, core_tx }
    }

    /// Shared snapshot for readers (socket clients, HTTP handlers).
    pub fn snapshot(&self) -> Arc<RwLock<SessionState>> {
        self.store.snapshot()
    }

    /// Run the core event loop.  Returns when a `Shutdown` event is received
    /// or every sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<CoreEvent>) -> anyhow::Result<()> {
        info!("StationCore: starting event loop");

        let heartbeat_tx = self.core_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(HEARTBEAT_SECS)).await;
                if heartbeat_tx.send(CoreEvent::HeartbeatTick).await.is_err() {
                    break;
                }
            }
        });

        loop {
            match event_rx.recv().await {
                None => {
                    info!("StationCore: event channel closed, shutting down");
                    break;
                }
                Some(CoreEvent::Shutdown) => {
                    info!("StationCore: shutdown requested");
                    break;
                }
                Some(CoreEvent::Command(cmd)) => {
                    info!("StationCore: command {:?}", cmd);
                    self.store.handle_command(cmd).await;
                }
                Some(CoreEvent::Driver(evt)) => {
                    self.store.on_driver_event(evt).await;
                }
                Some(CoreEvent::HeartbeatTick) => self.heartbeat().await,
            }
        }

        self.store.driver_mut().shutdown().await;
        Ok(())
    }

    /// A dead output mid-song counts as a playback error, so the station
    /// moves on (and respawns mpv) instead of going quiet.
    async fn heartbeat(&mut self) {
        if self.store.driver_mut().check_alive() {
            return;
        }
        if self.store.state().is_playing {
            error!("StationCore: audio output died while on air");
            self.store
                .on_driver_event(DriverEvent::Errored {
                    reason: "audio output died".to_string(),
                })
                .await;
        }
    }
}

/// Turn Ctrl-C (and SIGTERM on unix) into `CoreEvent::Shutdown`, so the loop
/// exits through its cleanup path.
pub fn spawn_signal_watcher(core_tx: mpsc::Sender<CoreEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("StationCore: signal received, shutting down");
        let _ = core_tx.send(CoreEvent::Shutdown).await;
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("StationCore: cannot watch SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
