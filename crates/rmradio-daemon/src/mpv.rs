//! mpv IPC driver with separated reader/writer tasks.
//!
//! Architecture:
//!
//! ```text
//!   MpvProcess::spawn_and_connect()
//!         │
//!         ├── writer_task   ← receives MpvRequest via mpsc, serialises → socket
//!         └── reader_task   ← reads JSON lines from socket
//!                                ├── response (has request_id) → matched oneshot::Sender
//!                                └── event / property-change   → event_tx channel
//! ```
//!
//! `MpvPlayback` wraps the process and a live `MpvHandle` behind the
//! `PlaybackDriver` trait: the station's one shared audio output.  mpv is
//! spawned lazily on first use and respawned after it dies.
//!
//! Platform notes:
//! - Unix:   Unix domain sockets
//! - Windows: Named pipes  \\.\pipe\<name>
use async_trait::async_trait;
use rmradio_core::driver::{self, DriverError, DriverEvent, PlaybackDriver};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

use crate::core::{AudioOutput, CoreEvent};

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

/// Fixed observe_property IDs.  We match on these in property-change events.
pub const OBS_TIME_POS: u64 = 1;
pub const OBS_DURATION: u64 = 2;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An mpv event / property-change that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// Returns `Some((obs_id, data))` if this is a property-change event.
    pub fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.raw.get("event")?.as_str()? == "property-change" {
            let id = self.raw.get("id")?.as_u64()?;
            let data = self.raw.get("data").unwrap_or(&Value::Null);
            Some((id, data))
        } else {
            None
        }
    }

    /// Returns the event name, e.g. "end-file", "start-file", "file-loaded".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }

    /// What this means for the station, if anything.
    ///
    /// `end-file` with `eof` is a natural end; `error` / `network` are decode
    /// or fetch failures.  `stop` fires whenever we load over a playing file
    /// and is ignored.  `file-loaded` opens the timeline for the new file.
    pub fn to_driver_event(&self) -> Option<DriverEvent> {
        if let Some((obs_id, data)) = self.as_property_change() {
            let val = if data.is_null() { None } else { data.as_f64() };
            return match obs_id {
                OBS_TIME_POS => Some(DriverEvent::Position(val)),
                OBS_DURATION => Some(DriverEvent::Duration(val)),
                _ => None,
            };
        }

        match self.event_name()? {
            "file-loaded" => return Some(DriverEvent::Loaded),
            "end-file" => {}
            _ => return None,
        }
        let reason = self.raw.get("reason").and_then(|v| v.as_str()).unwrap_or("unknown");
        match reason {
            "eof" => Some(DriverEvent::Ended),
            "error" | "network" => {
                let detail = self
                    .raw
                    .get("file_error")
                    .and_then(|v| v.as_str())
                    .unwrap_or(reason);
                Some(DriverEvent::Errored {
                    reason: detail.to_string(),
                })
            }
            _ => None,
        }
    }
}

/// Cloneable handle to the mpv writer task.  Use `send()` to fire a command
/// and await the response.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(tokio::time::Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    /// Register observe_property for the timeline.  Must be called after
    /// every fresh connection.
    pub async fn observe_timeline(&self) {
        for (id, name) in [(OBS_TIME_POS, "time-pos"), (OBS_DURATION, "duration")] {
            match self.send(json!(["observe_property", id, name])).await {
                Ok(_) => debug!("mpv: observe_property id={} name={}", id, name),
                Err(e) => warn!("mpv: observe_property {} failed: {}", name, e),
            }
        }
    }
}

/// Owns the mpv child process and the IPC connection to it.
pub struct MpvProcess {
    socket_name: String,
    process: Option<tokio::process::Child>,
}

impl MpvProcess {
    pub fn new() -> Self {
        Self {
            socket_name: rmradio_core::platform::mpv_socket_name(),
            process: None,
        }
    }

    /// `true` once a spawned mpv has exited.  Nothing spawned yet is not a
    /// death.
    pub fn has_exited(&mut self) -> bool {
        match self.process {
            Some(ref mut child) => !matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    pub async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    fn spawn_process(&mut self, volume: f32) -> anyhow::Result<()> {
        let mpv_binary = rmradio_core::platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        info!("mpv: spawning {:?}", mpv_binary);
        let child = tokio::process::Command::new(mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg("--pause=yes")
            .arg(rmradio_core::platform::mpv_socket_arg())
            .arg("--quiet")
            .arg(format!("--volume={}", volume_pct(volume).round() as i64))
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        self.process = Some(child);
        Ok(())
    }

    #[cfg(unix)]
    pub async fn spawn_and_connect(
        &mut self,
        volume: f32,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;

        self.spawn_process(volume)?;

        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        let (read_half, write_half) = stream.into_split();
        Ok(start_io_tasks(BufReader::new(read_half), write_half, event_tx))
    }

    #[cfg(windows)]
    pub async fn spawn_and_connect(
        &mut self,
        volume: f32,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;
        self.spawn_process(volume)?;

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv: connected to named pipe");
                let (read_half, write_half) = tokio::io::split(client);
                return Ok(start_io_tasks(BufReader::new(read_half), write_half, event_tx));
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

fn start_io_tasks<R, W>(
    reader: BufReader<R>,
    writer: W,
    event_tx: mpsc::Sender<MpvEvent>,
) -> MpvHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    // req_id → reply channel.  Writer inserts, reader resolves.
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(writer, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(reader, pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap, event_tx: mpsc::Sender<MpvEvent>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_all(&pending, "mpv IPC connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let result = if val["error"].as_str() == Some("success") {
                            Ok(val)
                        } else {
                            let err = val["error"].as_str().unwrap_or("unknown error").to_string();
                            debug!("mpv reader: response req={} err={}", req_id, err);
                            Err(anyhow::anyhow!("mpv error: {}", err))
                        };
                        let _ = tx.send(result);
                    } else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                    }
                } else {
                    let _ = event_tx.send(MpvEvent { raw: val }).await;
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_all(&pending, &format!("mpv IPC read error: {}", e)).await;
                break;
            }
        }
    }
}

async fn fail_all(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("{}", reason)));
    }
}

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register reply channel before writing so reader can match it
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

fn volume_pct(volume: f32) -> f32 {
    (volume * 100.0).clamp(0.0, 100.0)
}

// ── PlaybackDriver ────────────────────────────────────────────────────────────

/// The station's audio output, backed by one mpv process.
pub struct MpvPlayback {
    process: MpvProcess,
    handle: Option<MpvHandle>,
    core_tx: mpsc::Sender<CoreEvent>,
    /// Re-applied whenever mpv is (re)spawned.
    volume: f32,
    /// Last URI handed to `load`, reloaded into a respawned mpv.
    source: Option<String>,
}

impl MpvPlayback {
    pub fn new(core_tx: mpsc::Sender<CoreEvent>, volume: f32) -> Self {
        Self {
            process: MpvProcess::new(),
            handle: None,
            core_tx,
            volume,
            source: None,
        }
    }

    async fn ensure_handle(&mut self) -> driver::Result<MpvHandle> {
        self.check_alive();
        if let Some(h) = &self.handle {
            return Ok(h.clone());
        }

        let event_tx = self.spawn_event_forwarder();
        let handle = self
            .process
            .spawn_and_connect(self.volume, event_tx)
            .await
            .map_err(|e| DriverError::Unavailable(e.to_string()))?;
        self.attach(handle.clone()).await;
        Ok(handle)
    }

    /// One forwarder per connection: mpv events → station events.
    fn spawn_event_forwarder(&self) -> mpsc::Sender<MpvEvent> {
        let (event_tx, mut event_rx) = mpsc::channel::<MpvEvent>(64);
        let core_tx = self.core_tx.clone();
        tokio::spawn(async move {
            while let Some(evt) = event_rx.recv().await {
                debug!("mpv event: {}", evt.raw);
                if let Some(driver_evt) = evt.to_driver_event() {
                    if core_tx.send(CoreEvent::Driver(driver_evt)).await.is_err() {
                        break;
                    }
                }
            }
        });
        event_tx
    }

    /// Bring a fresh connection up to date: timeline observers, then the
    /// source that was on air (mpv starts paused, so it stays paused).
    async fn attach(&mut self, handle: MpvHandle) {
        handle.observe_timeline().await;
        if let Some(url) = &self.source {
            info!("mpv: reloading {} after reconnect", url);
            if let Err(e) = handle.send(json!(["loadfile", url, "replace"])).await {
                warn!("mpv: reload of {} failed: {}", url, e);
            }
        }
        self.handle = Some(handle);
    }

    async fn command(&mut self, command: Value) -> driver::Result<Value> {
        let handle = self.ensure_handle().await?;
        handle.send(command).await.map_err(|e| {
            if e.to_string().contains("timeout") {
                DriverError::Timeout(e.to_string())
            } else {
                DriverError::Other(e)
            }
        })
    }
}

#[async_trait]
impl PlaybackDriver for MpvPlayback {
    async fn load(&mut self, url: &str) -> driver::Result<()> {
        self.source = Some(url.to_string());
        // Load paused; `play` decides when it is heard.
        self.command(json!(["set_property", "pause", true])).await?;
        self.command(json!(["loadfile", url, "replace"])).await?;
        Ok(())
    }

    async fn play(&mut self) -> driver::Result<()> {
        self.command(json!(["set_property", "pause", false]))
            .await
            .map_err(|e| match e {
                DriverError::Other(inner) => DriverError::Refused(inner.to_string()),
                other => other,
            })?;
        Ok(())
    }

    async fn pause(&mut self) -> driver::Result<()> {
        if self.handle.is_none() {
            return Ok(());
        }
        self.command(json!(["set_property", "pause", true])).await?;
        Ok(())
    }

    async fn set_volume(&mut self, volume: f32) -> driver::Result<()> {
        self.volume = volume;
        if self.handle.is_none() {
            return Ok(());
        }
        self.command(json!(["set_property", "volume", volume_pct(volume)]))
            .await?;
        Ok(())
    }

    async fn seek(&mut self, position_secs: f64) -> driver::Result<()> {
        self.command(json!(["seek", position_secs, "absolute"])).await?;
        Ok(())
    }
}

#[async_trait]
impl AudioOutput for MpvPlayback {
    /// Returns `false` if mpv had a live handle and has since died; the
    /// handle is dropped so the next command respawns it.
    fn check_alive(&mut self) -> bool {
        if self.handle.is_some() && self.process.has_exited() {
            warn!("mpv: process died, dropping handle");
            self.handle = None;
            return false;
        }
        true
    }

    async fn shutdown(&mut self) {
        if let Some(h) = self.handle.take() {
            let _ = h.send(json!(["quit"])).await;
        }
        self.process.kill().await;
    }
}
