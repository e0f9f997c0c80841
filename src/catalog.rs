//! Catalog gateway: search, song, album and continuation lookups.
//!
//! Thin client over the public catalog HTTP API. Every method maps
//! transport or parse failures to an `Err`; callers on the playback path
//! must treat those identically to "no data" and never surface them.

use async_trait::async_trait;
use url::Url;

use crate::{
    config::Config,
    error::{Error, Result},
    http::Client as HttpClient,
    player::ContinuationProvider,
    protocol::{self, Envelope, Playlist, SearchResults, Song},
    track::{Track, TrackId},
};

/// Identifier prefix for albums minted from catalog playlists.
pub const PLAYLIST_PREFIX: &str = "jio-playlist-";

/// An album or featured playlist with its resolved track list.
#[derive(Clone, Debug)]
pub struct Album {
    pub id: String,
    pub title: String,
    pub artwork_url: Option<Url>,
    pub tracks: Vec<Track>,
}

/// Client for the catalog API.
pub struct Catalog {
    http_client: HttpClient,
    base_url: Url,
}

impl Catalog {
    /// Creates a new catalog client from the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the HTTP client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http_client: HttpClient::new(config)?,
            base_url: config.catalog_url.clone(),
        })
    }

    /// The underlying `reqwest` client, without rate limiting.
    ///
    /// Media streaming and blob downloads go through this directly; they
    /// are long-lived transfers, not API calls.
    #[must_use]
    pub fn http_client(&self) -> reqwest::Client {
        self.http_client.unlimited.clone()
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(Into::into)
    }

    async fn fetch<T>(&self, url: Url, endpoint: &str) -> Result<T>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let request = self.http_client.get(url);
        let response = self.http_client.execute(request).await?;
        let body = response.text().await?;
        protocol::json(&body, endpoint)
    }

    /// Searches the catalog for songs matching `query`.
    ///
    /// # Errors
    ///
    /// Returns `Err` on transport or parse failure. An empty result list is
    /// not an error.
    pub async fn search_tracks(&self, query: &str) -> Result<Vec<Track>> {
        let mut url = self.endpoint("api/search/songs")?;
        url.query_pairs_mut().append_pair("query", query);

        let response: Envelope<SearchResults> = self.fetch(url, "search/songs").await?;
        let results = response.data.unwrap_or_default().results;
        Ok(protocol::into_tracks(results))
    }

    /// Resolves a single track by identifier.
    ///
    /// # Errors
    ///
    /// Returns `Err` on transport or parse failure, or when the catalog
    /// does not know the identifier.
    pub async fn track(&self, id: &TrackId) -> Result<Track> {
        let url = self.endpoint(&format!("api/songs/{}", id.catalog_id()))?;

        let response: Envelope<Vec<Song>> = self.fetch(url, "songs/id").await?;
        response
            .data
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(Song::into_track)
            .ok_or_else(|| Error::not_found(format!("track {id} not found in catalog")))
    }

    /// Resolves an album (featured playlist) and its track list.
    ///
    /// # Errors
    ///
    /// Returns `Err` on transport or parse failure, or when the playlist
    /// does not exist.
    pub async fn album(&self, id: &str) -> Result<Album> {
        let raw = id.strip_prefix(PLAYLIST_PREFIX).unwrap_or(id);
        let mut url = self.endpoint("api/playlists")?;
        url.query_pairs_mut().append_pair("id", raw);

        let response: Envelope<Playlist> = self.fetch(url, "playlists").await?;
        let playlist = response
            .data
            .ok_or_else(|| Error::not_found(format!("playlist {raw} not found in catalog")))?;

        let artwork_url = playlist
            .image
            .last()
            .and_then(|link| Url::parse(&link.url).ok());

        Ok(Album {
            id: format!("{PLAYLIST_PREFIX}{raw}"),
            title: playlist.name,
            artwork_url,
            tracks: protocol::into_tracks(playlist.songs),
        })
    }
}

/// Continuations come from the suggestions endpoint, keyed by the track
/// that just finished.
#[async_trait]
impl ContinuationProvider for Catalog {
    async fn continuations(&self, id: &TrackId) -> Result<Vec<Track>> {
        let url = self.endpoint(&format!("api/songs/{}/suggestions", id.catalog_id()))?;

        let response: Envelope<Vec<Song>> = self.fetch(url, "songs/suggestions").await?;
        Ok(protocol::into_tracks(response.data.unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        let config = Config::default();
        Catalog::new(&config).expect("catalog client should build")
    }

    #[test]
    fn endpoints_join_against_base() {
        let catalog = catalog();
        let url = catalog
            .endpoint("api/songs/abc/suggestions")
            .expect("endpoint should join");
        assert!(url.as_str().ends_with("/api/songs/abc/suggestions"));

        let mut url = catalog.endpoint("api/search/songs").expect("endpoint joins");
        url.query_pairs_mut().append_pair("query", "night drive");
        assert!(url.as_str().contains("query=night+drive"));
    }
}
