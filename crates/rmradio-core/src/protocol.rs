use serde::{Deserialize, Serialize};

use crate::model::PlaylistItem;

/// Current protocol version.  Bump this when the wire format changes in a
/// breaking way.  Clients check this on connect and can refuse to talk to an
/// incompatible daemon.
pub const PROTOCOL_VERSION: u32 = 1;

/// Messages sent from a client to the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    TogglePlay,
    /// Move to the next item (host-segment policy applies).
    Skip,
    Reshuffle,
    Volume { value: f32 },
    Mute { muted: bool },
    Seek { seconds: f64 },
    GetState,
}

/// Messages sent from the daemon to clients (broadcasts)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum Broadcast {
    /// Sent immediately on connect: protocol version + full state snapshot.
    Hello {
        protocol_version: u32,
        rev: u64,
        state: SessionState,
    },
    State {
        data: SessionState,
    },
    Diagnostic {
        event: StationEvent,
    },
    Log {
        message: String,
    },
}

/// Things the station wants observers to know about, besides the state
/// snapshot itself.  Failures never stop the station; they surface here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StationEvent {
    /// The state snapshot was replaced; `rev` is the new revision.
    StateUpdated { rev: u64 },
    HostSegmentStarted,
    ChartTopperStarted { track_id: String },
    /// The item on air failed to decode or load and was skipped.
    PlaybackError { item: String, reason: String },
    /// Starting playback failed; the station stays paused.
    PlayStartFailed { reason: String },
    /// A catalog query failed and was treated as an empty result.
    FetchFailed { source: String, reason: String },
    /// `initialize` was called while a playlist already existed.
    DuplicateInitialize,
    /// Every item in a full pass failed back to back; auto-advance paused.
    Stalled { failures: usize },
}

/// The station session as observers see it.  `rev` is a monotonically
/// increasing counter bumped on every change; clients use it to spot missed
/// updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub rev: u64,
    pub is_playing: bool,
    pub current_item: Option<PlaylistItem>,
    pub playlist: Vec<PlaylistItem>,
    pub current_index: usize,
    /// Stored volume level in `[0, 1]`, kept while muted.
    pub volume: f32,
    pub is_muted: bool,
    #[serde(default)]
    pub time_pos_secs: Option<f64>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            rev: 0,
            is_playing: false,
            current_item: None,
            playlist: Vec::new(),
            current_index: 0,
            volume: 0.5,
            is_muted: false,
            time_pos_secs: None,
            duration_secs: None,
        }
    }
}

impl SessionState {
    /// Volume actually applied to the output: zero while muted.
    pub fn effective_volume(&self) -> f32 {
        if self.is_muted {
            0.0
        } else {
            self.volume
        }
    }
}

/// Wrapper for socket communication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Command(Command),
    Broadcast(Broadcast),
}

impl Message {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = json.len() as u32;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        if data.len() < 4 {
            anyhow::bail!("Insufficient data for length header");
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() < 4 + len {
            anyhow::bail!("Insufficient data for message");
        }
        let msg: Self = serde_json::from_slice(&data[4..4 + len])?;
        Ok((msg, 4 + len))
    }
}
