//! Station playlist construction: shuffled songs with interstitials
//! dropped in at a fixed, randomly chosen cadence.

use std::ops::RangeInclusive;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::model::{Interstitial, PlaylistItem, Track};
use crate::shuffle::shuffle;

/// Songs between interstitials, picked once per build.
pub const DEFAULT_CADENCE: RangeInclusive<usize> = 3..=5;

/// Build a playlist with a cadence drawn from [`DEFAULT_CADENCE`].
pub fn build_playlist<R: Rng + ?Sized>(
    tracks: &[Track],
    interstitials: &[Interstitial],
    rng: &mut R,
) -> Vec<PlaylistItem> {
    build_playlist_in(tracks, interstitials, DEFAULT_CADENCE, rng)
}

/// Build a playlist with a cadence drawn uniformly from `cadence`.
pub fn build_playlist_in<R: Rng + ?Sized>(
    tracks: &[Track],
    interstitials: &[Interstitial],
    cadence: RangeInclusive<usize>,
    rng: &mut R,
) -> Vec<PlaylistItem> {
    let (lo, hi) = (*cadence.start(), *cadence.end());
    let k = if lo >= hi {
        lo.max(1)
    } else {
        rng.gen_range(lo.max(1)..=hi)
    };
    build_playlist_with_cadence(tracks, interstitials, k, rng)
}

/// Build a playlist with one interstitial after every `k`-th song.
///
/// Interstitials are drawn with replacement, so the same jingle may show up
/// several times. No interstitials means a songs-only playlist; no tracks
/// means an empty one.
pub fn build_playlist_with_cadence<R: Rng + ?Sized>(
    tracks: &[Track],
    interstitials: &[Interstitial],
    k: usize,
    rng: &mut R,
) -> Vec<PlaylistItem> {
    if tracks.is_empty() {
        return Vec::new();
    }
    let k = k.max(1);

    let shuffled = shuffle(tracks, rng);
    let mut items = Vec::with_capacity(shuffled.len() + shuffled.len() / k);

    for (n, track) in shuffled.into_iter().enumerate() {
        items.push(PlaylistItem::Song(track));
        if (n + 1) % k == 0 {
            if let Some(clip) = interstitials.choose(rng) {
                items.push(PlaylistItem::Content(clip.clone()));
            }
        }
    }
    items
}
