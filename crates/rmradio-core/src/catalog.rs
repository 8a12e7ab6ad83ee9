//! Catalog loading: the song and content rows the station plays from.
//!
//! Rows come from a local TOML file or an HTTP JSON endpoint with the same
//! shape.  Only songs whose audio generation has completed and content rows
//! marked active make it into the catalog.  The optional `chart_leader`
//! names the song currently topping the charts.
//!
//! ```toml
//! chart_leader = "s2"
//!
//! [[song]]
//! id = "s1"
//! title = "Garage Anthem"
//! band_name = "The Amps"
//! audio_url = "https://cdn.example/s1.mp3"
//! audio_status = "completed"
//!
//! [[content]]
//! id = "c1"
//! content_type = "jingle"
//! title = "Station ID"
//! audio_url = "https://cdn.example/c1.mp3"
//! is_active = true
//! ```

use std::path::Path;

use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::CatalogConfig;
use crate::model::{Interstitial, InterstitialKind, Track};
use crate::protocol::StationEvent;

const AUDIO_STATUS_COMPLETED: &str = "completed";

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid catalog TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no catalog source configured")]
    NotConfigured,
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Song row as stored upstream.
#[derive(Debug, Clone, Deserialize)]
pub struct SongRow {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub band_name: String,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub audio_status: String,
}

impl SongRow {
    /// A playable track, or `None` while audio generation is unfinished.
    pub fn to_track(&self) -> Option<Track> {
        if !self.audio_status.eq_ignore_ascii_case(AUDIO_STATUS_COMPLETED) {
            return None;
        }
        let url = self.audio_url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
        Some(Track {
            id: self.id.clone(),
            title: self.title.clone(),
            audio_url: url.to_string(),
            artist: self.band_name.clone(),
            genre: self.genre.clone().filter(|g| !g.is_empty()),
        })
    }
}

/// Jingle / advert row as stored upstream.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentRow {
    pub id: String,
    pub content_type: String,
    pub audio_url: String,
    pub title: String,
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

impl ContentRow {
    pub fn to_interstitial(&self) -> Option<Interstitial> {
        if !self.is_active || self.audio_url.trim().is_empty() {
            return None;
        }
        let kind = InterstitialKind::parse(&self.content_type)?;
        Some(Interstitial {
            id: self.id.clone(),
            kind,
            audio_url: self.audio_url.trim().to_string(),
            title: self.title.clone(),
            brand: self.brand_name.clone().filter(|b| !b.is_empty()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, alias = "songs")]
    song: Vec<SongRow>,
    #[serde(default)]
    content: Vec<ContentRow>,
    #[serde(default)]
    chart_leader: Option<String>,
}

/// Everything the station needs to start: tracks, interstitials and the
/// resolved chart-topper.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub tracks: Vec<Track>,
    pub interstitials: Vec<Interstitial>,
    pub chart_topper: Option<Track>,
}

impl Catalog {
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl From<CatalogFile> for Catalog {
    fn from(file: CatalogFile) -> Self {
        let tracks: Vec<Track> = file.song.iter().filter_map(SongRow::to_track).collect();
        let interstitials = file
            .content
            .iter()
            .filter_map(ContentRow::to_interstitial)
            .collect();
        let chart_topper = file
            .chart_leader
            .as_deref()
            .and_then(|id| tracks.iter().find(|t| t.id == id).cloned());
        if let (Some(id), None) = (&file.chart_leader, &chart_topper) {
            debug!("catalog: chart leader {} has no playable track", id);
        }
        Catalog {
            tracks,
            interstitials,
            chart_topper,
        }
    }
}

pub fn parse_catalog_toml_str(content: &str) -> Result<Catalog> {
    let file: CatalogFile = toml::from_str(content)?;
    Ok(file.into())
}

pub fn parse_catalog_json_str(content: &str) -> Result<Catalog> {
    let file: CatalogFile = serde_json::from_str(content)?;
    Ok(file.into())
}

pub fn load_catalog_from_toml(path: &Path) -> Result<Catalog> {
    let content = std::fs::read_to_string(path)?;
    parse_catalog_toml_str(&content)
}

pub async fn fetch_catalog(url: &str) -> Result<Catalog> {
    let body = reqwest::get(url).await?.error_for_status()?.text().await?;
    parse_catalog_json_str(&body)
}

/// Load the catalog from the configured sources: the TOML file when it
/// exists, otherwise the URL.
pub async fn load_catalog(config: &CatalogConfig) -> Result<Catalog> {
    if config.catalog_toml.exists() {
        info!("catalog: loading {:?}", config.catalog_toml);
        return load_catalog_from_toml(&config.catalog_toml);
    }
    if config.catalog_url.is_empty() {
        return Err(CatalogError::NotConfigured);
    }
    info!("catalog: fetching {}", config.catalog_url);
    if let Some(path) = config.catalog_url.strip_prefix("file://") {
        let content = std::fs::read_to_string(path)?;
        return parse_catalog_json_str(&content);
    }
    fetch_catalog(&config.catalog_url).await
}

/// Like [`load_catalog`], but a failure becomes an empty catalog plus a
/// `FetchFailed` event.  The station starts silent rather than not at all.
pub async fn load_or_empty(
    config: &CatalogConfig,
    events: &broadcast::Sender<StationEvent>,
) -> Catalog {
    match load_catalog(config).await {
        Ok(catalog) => {
            info!(
                "catalog: {} tracks, {} interstitials, chart-topper {:?}",
                catalog.tracks.len(),
                catalog.interstitials.len(),
                catalog.chart_topper.as_ref().map(|t| &t.id)
            );
            catalog
        }
        Err(e) => {
            warn!("catalog: load failed, starting empty: {}", e);
            let source = if config.catalog_toml.exists() {
                config.catalog_toml.display().to_string()
            } else {
                config.catalog_url.clone()
            };
            let _ = events.send(StationEvent::FetchFailed {
                source,
                reason: e.to_string(),
            });
            Catalog::default()
        }
    }
}
