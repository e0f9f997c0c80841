//! Media binding: keeps one audio output in sync with the player.
//!
//! The binding owns the process's single rodio output and mirrors two
//! pieces of player state onto it: the current track (rebinding the sink
//! whenever the track identity changes) and the playing flag (play/pause).
//! It also reports natural end-of-track back to the driver loop so the
//! queue engine can advance.
//!
//! Source resolution is local-cache-first: a blob stored under the
//! track's media key plays from memory; otherwise the remote URL is
//! streamed through a temp-file-backed download that supports seeking.
//! A failure to bind a source leaves the binding idle — a track that
//! failed to load is never confused with a track that finished.

use std::io::{BufReader, Cursor, Read, Seek};

use stream_download::{
    http::HttpStream, storage::temp::TempStorageProvider, Settings, StreamDownload,
};

use crate::{
    cache::{self, Store},
    error::Result,
    player::Player,
    track::{Track, TrackId},
};

/// Combined Read and Seek bound for decodable sources.
pub trait ReadSeek: Read + Seek + Send + Sync {}

impl<T: Read + Seek + Send + Sync> ReadSeek for T {}

/// Bytes to prefetch from a remote source before the decoder may read.
///
/// Matches roughly one second of audio at typical catalog bitrates;
/// enough to survive jittery connections without a long start delay.
const PREFETCH_BYTES: u64 = 60 * 1024;

/// Buffer size for decoder reads (32 KiB), matching the decoder's
/// sequential read pattern.
const BUFFER_LEN: usize = 32 * 1024;

/// Binds the player's current track to the audio output.
pub struct Binding {
    /// Keeps the audio device open; playback dies with it.
    _stream: rodio::OutputStream,
    handle: rodio::OutputStreamHandle,
    sink: Option<rodio::Sink>,
    current: Option<TrackId>,
    client: reqwest::Client,
    store: Store,
}

impl Binding {
    /// Opens the default audio output.
    ///
    /// # Errors
    ///
    /// Returns `Err` when no output device is available.
    pub fn new(client: reqwest::Client, store: Store) -> Result<Self> {
        let (stream, handle) = rodio::OutputStream::try_default()?;
        Ok(Self {
            _stream: stream,
            handle,
            sink: None,
            current: None,
            client,
            store,
        })
    }

    /// Reconciles the audio output with the player state.
    ///
    /// Called by the driver after every player mutation. Rebinds on track
    /// identity change, otherwise only toggles play/pause. Never returns
    /// an error: bind failures are logged and leave the output idle.
    pub async fn sync(&mut self, player: &Player) {
        if let Some(track) = player.current_track() {
            if self.current.as_ref() != Some(track.id()) {
                let track = track.clone();
                self.rebind(&track, player.is_playing()).await;
                return;
            }
        }

        let Some(sink) = &self.sink else { return };
        if player.is_playing() {
            sink.play();
        } else {
            sink.pause();
        }
    }

    /// Whether the bound track has played to its natural end.
    #[must_use]
    pub fn finished(&self) -> bool {
        self.current.is_some()
            && self
                .sink
                .as_ref()
                .is_some_and(|sink| sink.empty() && !sink.is_paused())
    }

    /// Binds a new track, committing the replacement before releasing the
    /// previous sink so a source still in use is never revoked early.
    async fn rebind(&mut self, track: &Track, playing: bool) {
        // Playback position resets to zero by construction: a fresh sink.
        let replacement = match self.bind_sink(track, playing).await {
            Ok(sink) => Some(sink),
            Err(e) => {
                // Load failure is not track completion: stay idle, do not
                // advance, do not retry.
                error!("failed to bind track {track}: {e}");
                None
            }
        };

        if let Some(old) = self.sink.take() {
            old.stop();
        }
        self.sink = replacement;
        self.current = Some(track.id().clone());
    }

    async fn bind_sink(&self, track: &Track, playing: bool) -> Result<rodio::Sink> {
        let source = self.resolve_source(track).await?;
        let decoder = rodio::Decoder::new(BufReader::with_capacity(BUFFER_LEN, source))?;

        let sink = rodio::Sink::try_new(&self.handle)?;
        sink.append(decoder);
        if playing {
            sink.play();
        } else {
            sink.pause();
        }
        Ok(sink)
    }

    /// Resolves the playable source with local-cache-first policy.
    ///
    /// A store read failure falls back to the remote URL; only a remote
    /// failure surfaces as `Err`.
    async fn resolve_source(&self, track: &Track) -> Result<Box<dyn ReadSeek>> {
        match self.store.get(&cache::media_key(track.id())).await {
            Ok(Some(bytes)) => {
                debug!("playing track {track} from local cache");
                return Ok(Box::new(Cursor::new(bytes)));
            }
            Ok(None) => {}
            Err(e) => warn!("cache read for track {track} failed: {e}"),
        }

        debug!("streaming track {track} from {}", track.media_url());
        let stream = HttpStream::new(self.client.clone(), track.media_url().clone()).await?;
        let download = StreamDownload::from_stream(
            stream,
            TempStorageProvider::default(),
            Settings::default().prefetch_bytes(PREFETCH_BYTES),
        )
        .await?;

        Ok(Box::new(download))
    }
}
