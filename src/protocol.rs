//! Wire types for the catalog API.
//!
//! The catalog returns songs in a handful of envelope shapes; the payload
//! object is the same everywhere. Image and download URLs come as lists
//! ordered from lowest to highest quality; the last entry is the one the
//! player uses. A song without any usable download URL is not playable and
//! is dropped during conversion rather than failing the whole batch.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::{
    error::Result,
    track::{Track, TrackId},
};

/// Parses a JSON body, logging the outcome.
///
/// Successful parses are logged at TRACE with the endpoint name; failures
/// are logged at ERROR together with the offending body so protocol drift
/// can be diagnosed from the logs alone.
pub fn json<T>(body: &str, endpoint: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    match serde_json::from_str::<T>(body) {
        Ok(parsed) => {
            trace!("{endpoint}: ok");
            Ok(parsed)
        }
        Err(e) => {
            error!("{endpoint}: {e}: {body}");
            Err(e.into())
        }
    }
}

/// Envelope for endpoints that return `{ "data": ... }`.
#[derive(Clone, Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Envelope<T> {
    #[serde(default)]
    pub data: Option<T>,
}

/// Search results: `{ "data": { "results": [...] } }`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub results: Vec<Song>,
}

/// Playlist payload: `{ "data": { "name": ..., "songs": [...] } }`.
#[derive(Clone, Debug, Deserialize)]
pub struct Playlist {
    pub name: String,

    #[serde(default)]
    pub image: Vec<Link>,

    #[serde(default)]
    pub songs: Vec<Song>,
}

/// One quality variant of an image or media URL.
#[derive(Clone, Debug, Deserialize)]
pub struct Link {
    pub url: String,
}

/// Primary artist credit.
#[derive(Clone, Debug, Deserialize)]
pub struct Artist {
    pub name: String,
}

/// Artist credits; only the primary list is used for display.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Artists {
    #[serde(default)]
    pub primary: Vec<Artist>,
}

/// One song as returned by the catalog.
#[derive(Clone, Debug, Deserialize)]
pub struct Song {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub duration: Option<u64>,

    #[serde(default)]
    pub artists: Artists,

    #[serde(default)]
    pub image: Vec<Link>,

    #[serde(default, rename = "downloadUrl")]
    pub download_url: Vec<Link>,
}

impl Song {
    /// The display artist: primary credits joined with `", "`.
    #[must_use]
    pub fn display_artist(&self) -> String {
        self.artists
            .primary
            .iter()
            .map(|artist| artist.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Converts the wire song into a playable [`Track`].
    ///
    /// Returns `None` when no download URL parses; such songs cannot be
    /// bound to the audio element and are silently skipped.
    #[must_use]
    pub fn into_track(self) -> Option<Track> {
        let media_url = self
            .download_url
            .last()
            .and_then(|link| Url::parse(&link.url).ok())?;

        let artwork_url = self
            .image
            .last()
            .and_then(|link| Url::parse(&link.url).ok());

        let artist = self.display_artist();
        let duration = Duration::from_secs(self.duration.unwrap_or_default());

        Some(Track::new(
            TrackId::from_catalog(&self.id),
            self.name,
            artist,
            artwork_url,
            media_url,
            duration,
        ))
    }
}

/// Converts a batch of wire songs, dropping the unplayable ones.
#[must_use]
pub fn into_tracks(songs: Vec<Song>) -> Vec<Track> {
    songs
        .into_iter()
        .filter_map(|song| {
            let id = song.id.clone();
            let track = song.into_track();
            if track.is_none() {
                debug!("dropping song {id} without streamable url");
            }
            track
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SONG: &str = r#"{
        "id": "abc123",
        "name": "Night Drive",
        "duration": 247,
        "artists": { "primary": [{ "name": "Asha" }, { "name": "Kiran" }] },
        "image": [
            { "quality": "50x50", "url": "https://img.example/50.jpg" },
            { "quality": "500x500", "url": "https://img.example/500.jpg" }
        ],
        "downloadUrl": [
            { "quality": "96kbps", "url": "https://cdn.example/lo.mp4" },
            { "quality": "320kbps", "url": "https://cdn.example/hi.mp4" }
        ]
    }"#;

    #[test]
    fn song_maps_to_track() {
        let song: Song = serde_json::from_str(SONG).expect("song should parse");
        let track = song.into_track().expect("song has a media url");

        assert_eq!(track.id().as_str(), "jio-abc123");
        assert_eq!(track.title(), "Night Drive");
        assert_eq!(track.artist(), "Asha, Kiran");
        assert_eq!(track.duration(), Duration::from_secs(247));

        // Highest quality is the last list entry.
        assert_eq!(track.media_url().as_str(), "https://cdn.example/hi.mp4");
        assert_eq!(
            track.artwork_url().map(Url::as_str),
            Some("https://img.example/500.jpg")
        );
    }

    #[test]
    fn song_without_media_url_is_dropped() {
        let song: Song = serde_json::from_str(
            r#"{ "id": "x", "name": "Silence", "downloadUrl": [] }"#,
        )
        .expect("song should parse");
        assert!(song.into_track().is_none());

        let kept: Song = serde_json::from_str(SONG).expect("song should parse");
        let dropped: Song =
            serde_json::from_str(r#"{ "id": "x", "name": "Silence" }"#).expect("song should parse");
        let tracks = into_tracks(vec![kept, dropped]);
        assert_eq!(tracks.len(), 1);
    }

    #[test]
    fn search_envelope_parses() {
        let body = format!(r#"{{ "data": {{ "results": [{SONG}] }} }}"#);
        let parsed: Envelope<SearchResults> = json(&body, "search").expect("envelope parses");
        assert_eq!(parsed.data.unwrap_or_default().results.len(), 1);
    }

    #[test]
    fn missing_data_is_none() {
        let parsed: Envelope<SearchResults> = json("{}", "search").expect("envelope parses");
        assert!(parsed.data.is_none());
    }
}
