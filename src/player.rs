//! Playback queue engine.
//!
//! [`Player`] is the sole owner and mutator of playback state: the queue,
//! the un-shuffled snapshot of it, the current position and the
//! shuffle/repeat/autoplay flags. Every other component either reads state
//! through the accessors or requests a mutation through one of the
//! operations here; nothing reaches in and writes fields directly.
//!
//! All operations complete synchronously except [`Player::advance_to_next`],
//! which consults the injected [`ContinuationProvider`] when the queue is
//! exhausted. A continuation fetch raced by a newer user intent is
//! discarded through a generation counter: every state transition bumps
//! the generation, and a fetched continuation is only applied when the
//! generation still matches the one captured at dispatch.
//!
//! Failure semantics: no operation returns an error for ordinary inputs.
//! Malformed input (empty list, out-of-range start index) is a logged
//! no-op, and an upstream continuation failure degrades to "stop playback".

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    error::Result,
    events::Event,
    presence::{Activity, Notifier},
    track::{Track, TrackId},
};

/// Source of "up next" candidates for a finished track.
///
/// The engine depends on this abstraction only; the catalog-backed
/// implementation is wired in at the composition root. Implementations
/// may fail; the engine treats `Err` and an empty list identically.
#[async_trait]
pub trait ContinuationProvider {
    /// Candidate tracks to continue playback after `id`.
    async fn continuations(&self, id: &TrackId) -> Result<Vec<Track>>;
}

/// Outcome of applying a fetched continuation batch.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Extension {
    /// The queue was extended and playback moved onto the first new track.
    Advanced,

    /// A newer transition happened after the fetch was dispatched; the
    /// result was discarded and state left untouched.
    Superseded,

    /// The batch was empty; the queue remains exhausted.
    Exhausted,
}

/// The playback queue engine.
pub struct Player {
    /// The ordered working playlist.
    queue: Vec<Track>,

    /// Snapshot of the queue as of the last explicit "play this list"
    /// operation. Un-shuffling restores exactly this order. Autoplay
    /// continuations are never part of it.
    original_order: Vec<Track>,

    /// Position of the current track within `queue`; `None` when empty.
    current_index: Option<usize>,

    playing: bool,
    shuffled: bool,
    repeating: bool,
    auto_play_next: bool,

    /// Bumped on every transition that changes the queue or the current
    /// track. Guards in-flight continuation fetches against clobbering a
    /// newer state.
    generation: u64,

    continuations: Arc<dyn ContinuationProvider + Send + Sync>,
    notifier: Notifier,
    events: Option<mpsc::UnboundedSender<Event>>,
}

impl Player {
    /// Upper bound on one continuation fetch; expiry is treated the same
    /// as an empty result.
    const CONTINUATION_TIMEOUT: Duration = Duration::from_secs(10);

    #[must_use]
    pub fn new(
        continuations: Arc<dyn ContinuationProvider + Send + Sync>,
        notifier: Notifier,
    ) -> Self {
        Self {
            queue: Vec::new(),
            original_order: Vec::new(),
            current_index: None,
            playing: false,
            shuffled: false,
            repeating: false,
            auto_play_next: true,
            generation: 0,
            continuations,
            notifier,
            events: None,
        }
    }

    /// Registers the channel on which player events are emitted.
    pub fn register(&mut self, events: mpsc::UnboundedSender<Event>) {
        self.events = Some(events);
    }

    #[must_use]
    pub fn current_track(&self) -> Option<&Track> {
        self.current_index.and_then(|index| self.queue.get(index))
    }

    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    #[must_use]
    pub fn queue(&self) -> &[Track] {
        &self.queue
    }

    #[must_use]
    pub fn original_order(&self) -> &[Track] {
        &self.original_order
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    #[must_use]
    pub fn is_shuffled(&self) -> bool {
        self.shuffled
    }

    #[must_use]
    pub fn is_repeating(&self) -> bool {
        self.repeating
    }

    #[must_use]
    pub fn auto_play_next(&self) -> bool {
        self.auto_play_next
    }

    /// Adopts a passive listing before the user has chosen to play.
    ///
    /// Used when a browse page becomes available: the queue is seeded and
    /// the first track becomes current without starting playback. A no-op
    /// when `tracks` is empty or when a session is already in progress;
    /// seeding must never clobber an active queue.
    pub fn seed_queue(&mut self, tracks: Vec<Track>) {
        if tracks.is_empty() {
            return;
        }
        if self.current_index.is_some() {
            debug!("ignoring seed while a session is in progress");
            return;
        }

        self.queue = tracks;
        self.original_order = self.queue.clone();
        self.current_index = Some(0);
        self.generation += 1;
        // No event: nothing was played, so observers (history above all)
        // must not react to a passive seed.
    }

    /// Starts playing `tracks` at `start_index`.
    ///
    /// Replaces the queue and its un-shuffled snapshot wholesale and
    /// always resets shuffle: starting a fresh list plays in list order.
    /// An empty list or out-of-range index is a logged no-op.
    pub fn play_from(&mut self, tracks: Vec<Track>, start_index: usize) {
        if tracks.is_empty() {
            return;
        }
        let Some(track) = tracks.get(start_index) else {
            warn!(
                "start index {start_index} out of range for {} tracks",
                tracks.len()
            );
            return;
        };

        self.notify_playing(track);

        self.queue = tracks;
        self.original_order = self.queue.clone();
        self.current_index = Some(start_index);
        self.playing = true;
        self.shuffled = false;
        self.generation += 1;

        self.emit(Event::TrackChanged);
        self.emit(Event::Play);
    }

    /// Plays one specific track now, independent of any listing.
    ///
    /// A track already in the queue is played in place, preserving what
    /// comes after it. An unrelated track starts a new minimal session:
    /// the queue becomes just that track. The asymmetry is deliberate.
    pub fn select_track(&mut self, track: Track) {
        self.notify_playing(&track);

        match self.queue.iter().position(|t| t.id() == track.id()) {
            Some(index) => {
                self.current_index = Some(index);
            }
            None => {
                self.queue = vec![track];
                self.original_order = self.queue.clone();
                self.current_index = Some(0);
            }
        }

        self.playing = true;
        self.generation += 1;
        self.emit(Event::TrackChanged);
        self.emit(Event::Play);
    }

    /// Flips between playing and paused.
    pub fn toggle_play_pause(&mut self) {
        let will_play = !self.playing;

        match (will_play, self.current_track()) {
            (true, Some(track)) => {
                let activity = Activity::Playing {
                    title: track.title().to_string(),
                    artist: track.artist().to_string(),
                };
                self.notifier.update(activity);
            }
            _ => self.notifier.update(Activity::Idle),
        }

        self.playing = will_play;
        self.emit(if will_play { Event::Play } else { Event::Pause });
    }

    /// Toggles shuffle, symmetric around the current track.
    ///
    /// Turning on keeps the current track first and permutes the rest
    /// uniformly; the un-shuffled snapshot is untouched. Turning off
    /// restores the snapshot verbatim and relocates the current track in
    /// it by identity, falling back to the head when it is not found
    /// (continuation tracks are not part of the snapshot).
    pub fn toggle_shuffle(&mut self) {
        let before = self.current_track().map(|t| t.id().clone());

        if self.shuffled {
            self.queue = self.original_order.clone();
            self.current_index = Some(
                before
                    .as_ref()
                    .and_then(|id| self.queue.iter().position(|t| t.id() == id))
                    .unwrap_or(0),
            );
            self.shuffled = false;
        } else {
            if let Some(current) = self.current_track().cloned() {
                let mut rest: Vec<Track> = self
                    .queue
                    .drain(..)
                    .filter(|t| t.id() != current.id())
                    .collect();
                shuffle(&mut rest);

                self.queue = Vec::with_capacity(rest.len() + 1);
                self.queue.push(current);
                self.queue.append(&mut rest);
                self.current_index = Some(0);
            }
            self.shuffled = true;
        }

        self.generation += 1;
        if self.current_track().map(|t| t.id().clone()) != before {
            self.emit(Event::TrackChanged);
        }
    }

    /// Advances to the next track.
    ///
    /// Within the queue this is synchronous. At the end of the queue, when
    /// repeat is on, playback wraps to the head (whole-queue repeat; the
    /// flag never loops a single track). Otherwise, with autoplay on and a
    /// current track, continuation candidates are fetched and appended to
    /// the queue — not to the un-shuffled snapshot — before advancing onto
    /// them. Any fetch failure, timeout or empty result stops playback;
    /// nothing is propagated to the caller.
    pub async fn advance_to_next(&mut self) {
        let next_index = self.current_index.map_or(0, |index| index + 1);

        if next_index < self.queue.len() {
            self.move_to(next_index);
            return;
        }

        if self.repeating && !self.queue.is_empty() {
            self.move_to(0);
            return;
        }

        let Some(current) = self.current_track() else {
            self.halt();
            return;
        };
        let id = current.id().clone();
        if !self.auto_play_next {
            self.halt();
            return;
        }

        let generation = self.generation;
        let provider = Arc::clone(&self.continuations);

        let fetched =
            tokio::time::timeout(Self::CONTINUATION_TIMEOUT, provider.continuations(&id)).await;

        let tracks = match fetched {
            Ok(Ok(tracks)) => tracks,
            Ok(Err(e)) => {
                warn!("continuation fetch for {id} failed: {e}");
                Vec::new()
            }
            Err(_) => {
                warn!("continuation fetch for {id} timed out");
                Vec::new()
            }
        };

        match self.extend_queue(generation, tracks) {
            Extension::Advanced | Extension::Superseded => {}
            Extension::Exhausted => self.halt(),
        }
    }

    /// Applies a continuation batch fetched under `generation`.
    ///
    /// When any transition has happened since the fetch was dispatched,
    /// the later, synchronous intent takes precedence and the stale batch
    /// is dropped without touching state.
    fn extend_queue(&mut self, generation: u64, tracks: Vec<Track>) -> Extension {
        if generation != self.generation {
            debug!("discarding stale continuation batch");
            return Extension::Superseded;
        }
        if tracks.is_empty() {
            return Extension::Exhausted;
        }

        let next_index = self.current_index.map_or(0, |index| index + 1);
        self.queue.extend(tracks);
        self.move_to(next_index);
        Extension::Advanced
    }

    /// Moves to the previous track.
    ///
    /// There is no wraparound at the head of the queue and no restart of
    /// the current track; retreating from the first track stops playback.
    pub fn retreat_to_previous(&mut self) {
        match self.current_index {
            Some(index) if index > 0 => self.move_to(index - 1),
            _ => self.halt(),
        }
    }

    /// Flips whether an exhausted queue fetches continuations.
    pub fn toggle_auto_play(&mut self) {
        self.auto_play_next = !self.auto_play_next;
    }

    /// Flips whole-queue repeat.
    pub fn toggle_repeat(&mut self) {
        self.repeating = !self.repeating;
    }

    /// Reacts to the natural end of the current track.
    ///
    /// Branches solely on the autoplay flag: with autoplay on the queue
    /// advances (including the repeat wrap and continuation fetch); with
    /// autoplay off playback stops in place, regardless of position in
    /// the queue.
    pub async fn handle_track_end(&mut self) {
        if self.auto_play_next {
            self.advance_to_next().await;
        } else {
            self.mark_ended();
        }
    }

    /// Records that the current track finished with nothing to follow it.
    ///
    /// Called when a track ends naturally and autoplay is off. Stops
    /// playback without a presence update.
    pub fn mark_ended(&mut self) {
        self.playing = false;
        self.emit(Event::Pause);
    }

    fn move_to(&mut self, index: usize) {
        debug_assert!(index < self.queue.len());

        self.current_index = Some(index);
        self.playing = true;
        self.generation += 1;

        if let Some(track) = self.queue.get(index) {
            let activity = Activity::Playing {
                title: track.title().to_string(),
                artist: track.artist().to_string(),
            };
            self.notifier.update(activity);
        }

        self.emit(Event::TrackChanged);
        self.emit(Event::Play);
    }

    fn halt(&mut self) {
        self.playing = false;
        self.notifier.update(Activity::Idle);
        self.emit(Event::Pause);
    }

    fn notify_playing(&self, track: &Track) {
        self.notifier.update(Activity::Playing {
            title: track.title().to_string(),
            artist: track.artist().to_string(),
        });
    }

    fn emit(&self, event: Event) {
        if let Some(events) = &self.events {
            // A dropped observer is not the player's problem.
            let _ = events.send(event);
        }
    }
}

/// Unbiased Fisher-Yates shuffle.
fn shuffle(tracks: &mut [Track]) {
    for i in (1..tracks.len()).rev() {
        let j = fastrand::usize(..=i);
        tracks.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use url::Url;

    struct Fixed(Vec<Track>);

    #[async_trait]
    impl ContinuationProvider for Fixed {
        async fn continuations(&self, _id: &TrackId) -> Result<Vec<Track>> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl ContinuationProvider for Failing {
        async fn continuations(&self, _id: &TrackId) -> Result<Vec<Track>> {
            Err(Error::unavailable("suggestions endpoint down"))
        }
    }

    fn track(id: &str) -> Track {
        let media = Url::parse(&format!("https://cdn.example/{id}.mp3")).unwrap();
        Track::new(
            TrackId::new(id),
            format!("Title {id}"),
            format!("Artist {id}"),
            None,
            media,
            Duration::from_secs(180),
        )
    }

    fn tracks(ids: &[&str]) -> Vec<Track> {
        ids.iter().map(|id| track(id)).collect()
    }

    fn player(provider: impl ContinuationProvider + Send + Sync + 'static) -> Player {
        Player::new(Arc::new(provider), Notifier::disconnected())
    }

    fn ids(queue: &[Track]) -> Vec<&str> {
        queue.iter().map(|t| t.id().as_str()).collect()
    }

    /// The index invariant: whenever a current track exists, it is the
    /// queue entry at the current index.
    fn assert_index_invariant(player: &Player) {
        if let (Some(current), Some(index)) = (player.current_track(), player.current_index()) {
            assert_eq!(player.queue()[index].id(), current.id());
        }
    }

    #[test]
    fn cold_start_seed_selects_head_without_playing() {
        let mut player = player(Fixed(Vec::new()));
        player.seed_queue(tracks(&["a", "b"]));

        assert_eq!(player.current_index(), Some(0));
        assert_eq!(player.current_track().unwrap().id().as_str(), "a");
        assert!(!player.is_playing());
        assert_index_invariant(&player);
    }

    #[test]
    fn seed_does_not_clobber_active_session() {
        let mut player = player(Fixed(Vec::new()));
        player.play_from(tracks(&["a", "b", "c"]), 1);

        player.seed_queue(tracks(&["x", "y", "z"]));

        assert_eq!(ids(player.queue()), ["a", "b", "c"]);
        assert_eq!(player.current_index(), Some(1));
        assert_eq!(player.current_track().unwrap().id().as_str(), "b");
    }

    #[test]
    fn empty_seed_is_a_no_op() {
        let mut player = player(Fixed(Vec::new()));
        player.seed_queue(Vec::new());
        assert!(player.queue().is_empty());
        assert_eq!(player.current_index(), None);
    }

    #[test]
    fn play_from_starts_at_index_and_resets_shuffle() {
        let mut player = player(Fixed(Vec::new()));
        player.play_from(tracks(&["a", "b", "c"]), 0);
        player.toggle_shuffle();
        assert!(player.is_shuffled());

        player.play_from(tracks(&["a", "b", "c"]), 1);

        assert!(!player.is_shuffled());
        assert_eq!(player.current_index(), Some(1));
        assert_eq!(player.current_track().unwrap().id().as_str(), "b");
        assert!(player.is_playing());
        assert_index_invariant(&player);
    }

    #[test]
    fn play_from_guards_bad_input() {
        let mut player = player(Fixed(Vec::new()));
        player.play_from(Vec::new(), 0);
        assert!(player.queue().is_empty());

        player.play_from(tracks(&["a"]), 5);
        assert!(player.queue().is_empty());
        assert!(!player.is_playing());
    }

    #[test]
    fn select_track_in_queue_preserves_upcoming_tracks() {
        let mut player = player(Fixed(Vec::new()));
        player.play_from(tracks(&["a", "b", "c"]), 0);

        player.select_track(track("b"));

        assert_eq!(ids(player.queue()), ["a", "b", "c"]);
        assert_eq!(player.current_index(), Some(1));
        assert!(player.is_playing());
        assert_index_invariant(&player);
    }

    #[test]
    fn select_track_out_of_queue_starts_minimal_session() {
        let mut player = player(Fixed(Vec::new()));
        player.play_from(tracks(&["a", "b", "c"]), 0);

        player.select_track(track("z"));

        assert_eq!(ids(player.queue()), ["z"]);
        assert_eq!(player.current_index(), Some(0));
        assert!(player.is_playing());
        assert_index_invariant(&player);
    }

    #[test]
    fn shuffle_keeps_current_first_and_reverses_exactly() {
        fastrand::seed(7);

        let mut player = player(Fixed(Vec::new()));
        player.play_from(tracks(&["a", "b", "c", "d", "e"]), 2);

        player.toggle_shuffle();
        assert!(player.is_shuffled());
        assert_eq!(player.current_index(), Some(0));
        assert_eq!(player.current_track().unwrap().id().as_str(), "c");
        assert_eq!(player.queue().len(), 5);
        assert_index_invariant(&player);

        player.toggle_shuffle();
        assert!(!player.is_shuffled());
        assert_eq!(ids(player.queue()), ["a", "b", "c", "d", "e"]);
        assert_eq!(player.current_index(), Some(2));
        assert_eq!(player.current_track().unwrap().id().as_str(), "c");
        assert_index_invariant(&player);
    }

    #[test]
    fn unshuffle_falls_back_to_head_for_unknown_current() {
        let mut player = player(Fixed(Vec::new()));
        player.play_from(tracks(&["a", "b"]), 0);
        player.toggle_shuffle();

        // A continuation-style track that is not part of the snapshot.
        player.queue.push(track("d"));
        player.current_index = Some(player.queue.len() - 1);

        player.toggle_shuffle();
        assert_eq!(ids(player.queue()), ["a", "b"]);
        assert_eq!(player.current_index(), Some(0));
    }

    #[tokio::test]
    async fn advance_within_queue_is_synchronous() {
        let mut player = player(Failing);
        player.play_from(tracks(&["a", "b"]), 0);

        player.advance_to_next().await;

        assert_eq!(player.current_index(), Some(1));
        assert_eq!(player.current_track().unwrap().id().as_str(), "b");
        assert!(player.is_playing());
        assert_index_invariant(&player);
    }

    #[tokio::test]
    async fn autoplay_extends_queue_without_touching_snapshot() {
        let mut player = player(Fixed(tracks(&["d", "e"])));
        player.play_from(tracks(&["a", "b"]), 1);

        player.advance_to_next().await;

        assert_eq!(ids(player.queue()), ["a", "b", "d", "e"]);
        assert_eq!(ids(player.original_order()), ["a", "b"]);
        assert_eq!(player.current_index(), Some(2));
        assert_eq!(player.current_track().unwrap().id().as_str(), "d");
        assert!(player.is_playing());
        assert_index_invariant(&player);
    }

    #[tokio::test]
    async fn autoplay_with_empty_result_stops_playback() {
        let mut player = player(Fixed(Vec::new()));
        player.play_from(tracks(&["a", "b"]), 1);

        player.advance_to_next().await;

        assert!(!player.is_playing());
        assert_eq!(ids(player.queue()), ["a", "b"]);
        assert_eq!(player.current_index(), Some(1));
    }

    #[tokio::test]
    async fn autoplay_failure_degrades_to_stop() {
        let mut player = player(Failing);
        player.play_from(tracks(&["a", "b"]), 1);

        player.advance_to_next().await;

        assert!(!player.is_playing());
        assert_eq!(ids(player.queue()), ["a", "b"]);
        assert_eq!(player.current_index(), Some(1));
    }

    #[tokio::test]
    async fn autoplay_disabled_stops_at_queue_end() {
        let mut player = player(Fixed(tracks(&["d"])));
        player.play_from(tracks(&["a"]), 0);
        player.toggle_auto_play();

        player.advance_to_next().await;

        assert!(!player.is_playing());
        assert_eq!(ids(player.queue()), ["a"]);
    }

    #[tokio::test]
    async fn repeat_wraps_the_whole_queue() {
        let mut player = player(Failing);
        player.play_from(tracks(&["a", "b"]), 1);
        player.toggle_repeat();

        player.advance_to_next().await;

        assert_eq!(player.current_index(), Some(0));
        assert_eq!(player.current_track().unwrap().id().as_str(), "a");
        assert!(player.is_playing());
        assert_index_invariant(&player);
    }

    #[test]
    fn stale_continuation_batch_is_discarded() {
        let mut player = player(Fixed(Vec::new()));
        player.play_from(tracks(&["a", "b"]), 1);
        let generation = player.generation;

        // A newer intent lands while the fetch is in flight.
        player.select_track(track("z"));

        let applied = player.extend_queue(generation, tracks(&["d", "e"]));
        assert_eq!(applied, Extension::Superseded);
        assert_eq!(ids(player.queue()), ["z"]);
        assert_eq!(player.current_index(), Some(0));
        assert!(player.is_playing());
    }

    #[test]
    fn retreat_has_no_wraparound() {
        let mut player = player(Fixed(Vec::new()));
        player.play_from(tracks(&["a", "b"]), 0);

        player.retreat_to_previous();

        assert!(!player.is_playing());
        assert_eq!(player.current_index(), Some(0));
    }

    #[test]
    fn retreat_moves_back_within_queue() {
        let mut player = player(Fixed(Vec::new()));
        player.play_from(tracks(&["a", "b"]), 1);

        player.retreat_to_previous();

        assert_eq!(player.current_index(), Some(0));
        assert!(player.is_playing());
        assert_index_invariant(&player);
    }

    #[test]
    fn toggle_play_pause_flips_state() {
        let mut player = player(Fixed(Vec::new()));
        player.play_from(tracks(&["a"]), 0);
        assert!(player.is_playing());

        player.toggle_play_pause();
        assert!(!player.is_playing());

        player.toggle_play_pause();
        assert!(player.is_playing());
    }

    #[tokio::test]
    async fn natural_end_with_autoplay_off_stops_in_place() {
        let mut player = player(Fixed(tracks(&["d"])));
        player.play_from(tracks(&["a", "b"]), 0);
        player.toggle_auto_play();

        // Track "a" ends naturally mid-queue: no advance onto "b".
        player.handle_track_end().await;

        assert!(!player.is_playing());
        assert_eq!(player.current_index(), Some(0));
        assert_eq!(player.current_track().unwrap().id().as_str(), "a");
    }

    #[tokio::test]
    async fn natural_end_with_autoplay_on_advances() {
        let mut player = player(Fixed(Vec::new()));
        player.play_from(tracks(&["a", "b"]), 0);

        player.handle_track_end().await;

        assert_eq!(player.current_index(), Some(1));
        assert_eq!(player.current_track().unwrap().id().as_str(), "b");
        assert!(player.is_playing());
        assert_index_invariant(&player);
    }

    #[test]
    fn seeding_emits_no_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut player = player(Fixed(Vec::new()));
        player.register(tx);

        player.seed_queue(tracks(&["a", "b"]));

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn events_are_emitted_for_transitions() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut player = player(Fixed(Vec::new()));
        player.register(tx);

        player.play_from(tracks(&["a", "b"]), 0);
        assert_eq!(rx.try_recv(), Ok(Event::TrackChanged));
        assert_eq!(rx.try_recv(), Ok(Event::Play));

        player.toggle_play_pause();
        assert_eq!(rx.try_recv(), Ok(Event::Pause));
    }
}
