use crate::core::CoreEvent;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use rmradio_core::protocol::{Command, SessionState};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    snapshot: Arc<RwLock<SessionState>>,
    core_tx: mpsc::Sender<CoreEvent>,
}

/// Compact "now playing" view; the full snapshot is on `/api/state`.
#[derive(Serialize)]
struct NowPlaying {
    rev: u64,
    is_playing: bool,
    title: Option<String>,
    current_index: usize,
    playlist_len: usize,
    volume: u8,
    is_muted: bool,
    time_pos_secs: Option<f64>,
    duration_secs: Option<f64>,
}

impl From<&SessionState> for NowPlaying {
    fn from(state: &SessionState) -> Self {
        Self {
            rev: state.rev,
            is_playing: state.is_playing,
            title: state.current_item.as_ref().map(|i| i.label()),
            current_index: state.current_index,
            playlist_len: state.playlist.len(),
            volume: (state.volume * 100.0).round() as u8,
            is_muted: state.is_muted,
            time_pos_secs: state.time_pos_secs,
            duration_secs: state.duration_secs,
        }
    }
}

fn router(app_state: HttpState) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/now", get(now_playing))
        .route("/api/toggle", post(toggle))
        .route("/api/skip", post(skip))
        .route("/api/reshuffle", post(reshuffle))
        .route("/api/volume/:volume", post(set_volume))
        .route("/api/mute/:muted", post(set_muted))
        .route("/api/seek/:seconds", post(seek))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    snapshot: Arc<RwLock<SessionState>>,
    core_tx: mpsc::Sender<CoreEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(HttpState { snapshot, core_tx });

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_state(State(state): State<HttpState>) -> Json<SessionState> {
    Json(state.snapshot.read().await.clone())
}

async fn now_playing(State(state): State<HttpState>) -> Json<NowPlaying> {
    Json(NowPlaying::from(&*state.snapshot.read().await))
}

async fn dispatch(state: &HttpState, cmd: Command) -> StatusCode {
    info!("HTTP API: {:?}", cmd);
    if state.core_tx.send(CoreEvent::Command(cmd)).await.is_err() {
        error!("HTTP API: station core is gone");
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::ACCEPTED
}

async fn toggle(State(state): State<HttpState>) -> StatusCode {
    dispatch(&state, Command::TogglePlay).await
}

async fn skip(State(state): State<HttpState>) -> StatusCode {
    dispatch(&state, Command::Skip).await
}

async fn reshuffle(State(state): State<HttpState>) -> StatusCode {
    dispatch(&state, Command::Reshuffle).await
}

/// `volume` is a percentage, 0..=100.
async fn set_volume(State(state): State<HttpState>, Path(volume): Path<u8>) -> StatusCode {
    if volume > 100 {
        return StatusCode::BAD_REQUEST;
    }
    let value = f32::from(volume) / 100.0;
    dispatch(&state, Command::Volume { value }).await
}

async fn set_muted(State(state): State<HttpState>, Path(muted): Path<bool>) -> StatusCode {
    dispatch(&state, Command::Mute { muted }).await
}

async fn seek(State(state): State<HttpState>, Path(seconds): Path<f64>) -> StatusCode {
    if !seconds.is_finite() || seconds < 0.0 {
        return StatusCode::BAD_REQUEST;
    }
    dispatch(&state, Command::Seek { seconds }).await
}
