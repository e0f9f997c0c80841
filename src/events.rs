//! Events emitted by the player for observers.
//!
//! The queue engine owns all playback state; components that need to react
//! to it (the audio binding, the play-history hook) subscribe to these
//! events instead of polling. Events describe transitions, not state: the
//! current state is always read back from the player itself.

/// Events that can be emitted by the player.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// Playback has started or resumed.
    Play,

    /// Playback has paused or stopped.
    Pause,

    /// The current track changed.
    ///
    /// Emitted on manual selection, automatic progression, and autoplay
    /// continuation alike. The play-history hook records on this event.
    TrackChanged,
}
