//! Best-effort "now playing" broadcast.
//!
//! Other sessions of the same account see a one-line activity string
//! ("Playing Night Drive by Asha" or "Idle"). Delivery is fire-and-forget
//! over a websocket: the channel may be unconfigured, disconnected or
//! half-dead, and none of that may ever block or fail playback. The
//! [`Notifier`] handle the queue engine holds therefore never returns a
//! value the caller depends on.

use std::fmt;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{protocol::frame::Frame, Message as WebsocketMessage};
use url::Url;

use crate::error::{Error, Result};

/// Human-readable activity state for one session.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Activity {
    /// A track is playing.
    Playing { title: String, artist: String },

    /// Nothing is playing.
    Idle,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Playing { title, artist } => write!(f, "Playing {title} by {artist}"),
            Self::Idle => write!(f, "Idle"),
        }
    }
}

/// Handle through which the queue engine publishes activity updates.
///
/// Cheap to clone. A notifier constructed with [`Notifier::disconnected`]
/// is a silent no-op, which is the normal state when no presence channel
/// is configured.
#[derive(Clone, Debug, Default)]
pub struct Notifier {
    tx: Option<mpsc::UnboundedSender<Activity>>,
}

impl Notifier {
    /// A notifier without a channel behind it; every update is dropped.
    #[must_use]
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    /// A notifier feeding the given channel.
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<Activity>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Publishes an activity update.
    ///
    /// Never fails: a missing or closed channel drops the update with a
    /// debug log.
    pub fn update(&self, activity: Activity) {
        let Some(tx) = &self.tx else { return };
        if tx.send(activity).is_err() {
            debug!("presence channel closed; dropping activity update");
        }
    }
}

/// Wire form of one activity update.
#[derive(Debug, Serialize)]
struct ActivityUpdate<'a> {
    event: &'static str,
    user_id: &'a str,
    activity: String,
}

/// Outbound websocket connection carrying activity updates.
pub struct Channel {
    url: Url,
    user_id: String,
    rx: mpsc::UnboundedReceiver<Activity>,
}

impl Channel {
    /// Creates a channel that will deliver updates received on `rx`.
    #[must_use]
    pub fn new(url: Url, user_id: impl Into<String>, rx: mpsc::UnboundedReceiver<Activity>) -> Self {
        Self {
            url,
            user_id: user_id.into(),
            rx,
        }
    }

    /// Connects and forwards updates until the channel or socket closes.
    ///
    /// Intended to be spawned as its own task; the caller should log the
    /// returned error and move on. Playback never depends on the outcome.
    ///
    /// # Errors
    ///
    /// Returns `Err` when the connection cannot be established or dies.
    pub async fn run(mut self) -> Result<()> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        info!("presence channel connected");

        loop {
            tokio::select! {
                activity = self.rx.recv() => {
                    let Some(activity) = activity else {
                        // All notifiers are gone; nothing left to forward.
                        return Ok(());
                    };

                    let update = ActivityUpdate {
                        event: "update_activity",
                        user_id: &self.user_id,
                        activity: activity.to_string(),
                    };
                    let text = serde_json::to_string(&update)?;
                    ws_tx.send(WebsocketMessage::text(text)).await?;
                }

                Some(message) = ws_rx.next() => {
                    match message? {
                        WebsocketMessage::Ping(payload) => {
                            trace!("ping -> pong");
                            let pong = Frame::pong(payload);
                            ws_tx.send(WebsocketMessage::Frame(pong)).await?;
                        }
                        WebsocketMessage::Close(payload) => {
                            return Err(Error::cancelled(format!(
                                "presence channel closed by server: {payload:?}"
                            )));
                        }
                        // Inbound presence of other users is not consumed here.
                        _ => trace!("ignoring inbound presence message"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_strings_match_wire_format() {
        let playing = Activity::Playing {
            title: "Night Drive".to_string(),
            artist: "Asha".to_string(),
        };
        assert_eq!(playing.to_string(), "Playing Night Drive by Asha");
        assert_eq!(Activity::Idle.to_string(), "Idle");
    }

    #[test]
    fn disconnected_notifier_is_a_no_op() {
        let notifier = Notifier::disconnected();
        notifier.update(Activity::Idle);
    }

    #[test]
    fn dropped_receiver_does_not_fail_updates() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let notifier = Notifier::new(tx);
        notifier.update(Activity::Idle);
    }

    #[tokio::test]
    async fn updates_reach_the_channel_receiver() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = Notifier::new(tx);

        notifier.update(Activity::Playing {
            title: "Night Drive".to_string(),
            artist: "Asha".to_string(),
        });
        notifier.update(Activity::Idle);

        assert!(matches!(rx.recv().await, Some(Activity::Playing { .. })));
        assert!(matches!(rx.recv().await, Some(Activity::Idle)));
    }
}
