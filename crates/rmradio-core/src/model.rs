//! Playable things: catalog tracks, interstitial clips, and the items a
//! station playlist is made of.

use serde::{Deserialize, Serialize};

/// A song from the catalog. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub audio_url: String,
    /// Band or artist name shown next to the title.
    pub artist: String,
    #[serde(default)]
    pub genre: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterstitialKind {
    Jingle,
    Advert,
}

impl InterstitialKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "jingle" => Some(Self::Jingle),
            "advert" | "ad" => Some(Self::Advert),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Jingle => "jingle",
            Self::Advert => "advert",
        }
    }
}

/// A short non-song clip (jingle or advert) dropped between songs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interstitial {
    pub id: String,
    pub kind: InterstitialKind,
    pub audio_url: String,
    pub title: String,
    #[serde(default)]
    pub brand: Option<String>,
}

/// One slot in the station rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaylistItem {
    Song(Track),
    Content(Interstitial),
    /// The fixed pre-recorded host clip.
    HostSegment,
    ChartTopper(Track),
}

impl PlaylistItem {
    /// Audio location to hand the playback driver. The host segment has no
    /// URL of its own; it resolves to the station's static host clip.
    pub fn audio_url<'a>(&'a self, host_clip: &'a str) -> &'a str {
        match self {
            Self::Song(t) | Self::ChartTopper(t) => &t.audio_url,
            Self::Content(c) => &c.audio_url,
            Self::HostSegment => host_clip,
        }
    }

    pub fn is_host_segment(&self) -> bool {
        matches!(self, Self::HostSegment)
    }

    pub fn is_song(&self) -> bool {
        matches!(self, Self::Song(_))
    }

    /// Short human label, e.g. for logs and "now playing" lines.
    pub fn label(&self) -> String {
        match self {
            Self::Song(t) => format!("{} - {}", t.artist, t.title),
            Self::ChartTopper(t) => format!("#1 {} - {}", t.artist, t.title),
            Self::Content(c) => match &c.brand {
                Some(brand) => format!("[{}] {} ({})", c.kind.label(), c.title, brand),
                None => format!("[{}] {}", c.kind.label(), c.title),
            },
            Self::HostSegment => "[host]".to_string(),
        }
    }
}
