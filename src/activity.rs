use crate::Bearer;
use crate::Error;
use crate::PlayoutClient;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A listened track. `mbid` is the user-independent recording identifier; the
/// server dedupes events on (user, kind, date).
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TrackEvent {
    #[serde(rename = "MBID", default)]
    pub mbid: String,
    #[serde(rename = "Date", default)]
    pub date: String,
}

impl TrackEvent {
    /// A track event for `mbid` stamped with the current UTC time.
    pub fn now(mbid: impl Into<String>) -> Self {
        Self {
            mbid: mbid.into(),
            date: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// A watched movie, identified by its external movie identifier.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct MovieEvent {
    #[serde(rename = "IMID", default)]
    pub imid: String,
    #[serde(rename = "Date", default)]
    pub date: String,
}

/// A played podcast episode, identified by its external episode identifier.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct EpisodeEvent {
    #[serde(rename = "EMID", default)]
    pub emid: String,
    #[serde(rename = "Date", default)]
    pub date: String,
}

/// Batch of listening activity for `POST /api/activity`.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Events {
    #[serde(rename = "TrackEvents", default, skip_serializing_if = "Vec::is_empty")]
    pub track_events: Vec<TrackEvent>,
    #[serde(rename = "MovieEvents", default, skip_serializing_if = "Vec::is_empty")]
    pub movie_events: Vec<MovieEvent>,
    #[serde(
        rename = "EpisodeEvents",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub episode_events: Vec<EpisodeEvent>,
}

impl Events {
    /// Events carrying a single track event.
    pub fn track(event: TrackEvent) -> Self {
        Self {
            track_events: vec![event],
            ..Self::default()
        }
    }
}

impl PlayoutClient {
    /// Report listening activity.
    ///
    /// The server response is empty; duplicate submissions are deduplicated
    /// server-side by timestamp.
    pub async fn activity(&self, events: &Events) -> Result<(), Error> {
        let body = serde_json::to_value(events)?;
        let _: Value = self.post("/api/activity", Bearer::Access, body).await?;
        Ok(())
    }
}
