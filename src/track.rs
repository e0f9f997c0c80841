//! Track metadata and identity.
//!
//! A [`Track`] is one playable item: identity, display metadata, a
//! streamable media URL and an optional artwork URL. Tracks are immutable
//! once constructed; queues own them and never mutate them in place.

use std::{fmt, time::SystemTime};

use url::Url;

/// Opaque track identifier, unique within a session.
///
/// Identifiers carry the catalog scheme prefix (e.g. `jio-1A2b3C`) so that
/// tracks from different sources can never collide. Equality on the
/// identifier is what "same track" means everywhere in the player.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TrackId(String);

impl TrackId {
    /// Prefix applied to identifiers minted from the catalog gateway.
    pub const CATALOG_PREFIX: &'static str = "jio-";

    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Wraps a raw catalog identifier in the session-unique form.
    #[must_use]
    pub fn from_catalog(raw: &str) -> Self {
        Self(format!("{}{raw}", Self::CATALOG_PREFIX))
    }

    /// The raw catalog identifier, with the scheme prefix stripped.
    ///
    /// Identifiers that did not come from the catalog are returned as-is;
    /// the gateway will simply not find them.
    #[must_use]
    pub fn catalog_id(&self) -> &str {
        self.0.strip_prefix(Self::CATALOG_PREFIX).unwrap_or(&self.0)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One playable song with metadata and a media URL.
#[derive(Clone, Debug)]
pub struct Track {
    id: TrackId,
    title: String,
    artist: String,
    artwork_url: Option<Url>,
    media_url: Url,
    duration: std::time::Duration,
    created_at: SystemTime,
}

impl Track {
    #[must_use]
    pub fn new(
        id: TrackId,
        title: impl Into<String>,
        artist: impl Into<String>,
        artwork_url: Option<Url>,
        media_url: Url,
        duration: std::time::Duration,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            artist: artist.into(),
            artwork_url,
            media_url,
            duration,
            created_at: SystemTime::now(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &TrackId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn artist(&self) -> &str {
        &self.artist
    }

    #[must_use]
    pub fn artwork_url(&self) -> Option<&Url> {
        self.artwork_url.as_ref()
    }

    #[must_use]
    pub fn media_url(&self) -> &Url {
        &self.media_url
    }

    #[must_use]
    pub fn duration(&self) -> std::time::Duration {
        self.duration
    }

    #[must_use]
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: \"{} - {}\"", self.id, self.artist, self.title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_id_round_trip() {
        let id = TrackId::from_catalog("x1Y2z3");
        assert_eq!(id.as_str(), "jio-x1Y2z3");
        assert_eq!(id.catalog_id(), "x1Y2z3");
    }

    #[test]
    fn foreign_id_passes_through() {
        let id = TrackId::new("local-42");
        assert_eq!(id.catalog_id(), "local-42");
    }
}
