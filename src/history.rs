//! Fire-and-forget play-history hook.
//!
//! After every track change the composition root asks the recorder to
//! persist a history entry. Delivery is best-effort: failures are logged
//! at debug and never reach the playback path, and an unconfigured
//! persistence endpoint makes the recorder a silent no-op.

use serde::Serialize;
use url::Url;

use crate::track::TrackId;

#[derive(Debug, Serialize)]
struct PlayRecord<'a> {
    song_id: &'a str,
}

/// Records played tracks against the persistence service.
#[derive(Clone, Debug, Default)]
pub struct Recorder {
    client: reqwest::Client,
    endpoint: Option<Url>,
}

impl Recorder {
    /// A recorder posting to `<persistence_url>/api/history`, or a no-op
    /// when no persistence URL is configured.
    #[must_use]
    pub fn new(client: reqwest::Client, persistence_url: Option<&Url>) -> Self {
        let endpoint = persistence_url.and_then(|url| url.join("api/history").ok());
        Self { client, endpoint }
    }

    /// Records a play of `id`. Returns immediately; the request runs in
    /// the background and its outcome is only ever logged.
    pub fn record_play(&self, id: &TrackId) {
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };

        let body = match serde_json::to_value(PlayRecord {
            song_id: id.as_str(),
        }) {
            Ok(body) => body,
            Err(e) => {
                debug!("history record for {id} not serializable: {e}");
                return;
            }
        };

        let client = self.client.clone();
        let id = id.clone();
        tokio::spawn(async move {
            match client.post(endpoint).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    trace!("recorded play of {id}");
                }
                Ok(response) => debug!("history record for {id}: status {}", response.status()),
                Err(e) => debug!("history record for {id} failed: {e}"),
            }
        });
    }
}
