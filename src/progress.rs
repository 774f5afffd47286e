use crate::Bearer;
use crate::Error;
use crate::PlayoutClient;
use serde::{Deserialize, Serialize};

/// A user-scoped resumable playback position.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Offset {
    /// Opaque identifier of the item the offset belongs to
    #[serde(rename = "ETag", default)]
    pub etag: String,
    /// Playback offset in seconds
    #[serde(rename = "Offset", default)]
    pub offset: f64,
    /// Item duration in seconds; zero when unknown
    #[serde(rename = "Duration", default)]
    pub duration: f64,
    #[serde(rename = "Date", default)]
    pub date: String,
}

impl Offset {
    /// An offset is usable only when fully populated and within the item.
    pub fn is_valid(&self) -> bool {
        !self.etag.is_empty()
            && !self.date.is_empty()
            && self.offset >= 0.0
            && (self.duration == 0.0 || self.offset <= self.duration)
    }
}

/// Response of `GET /api/progress`.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProgressView {
    #[serde(rename = "Offsets", default)]
    pub offsets: Vec<Offset>,
}

impl PlayoutClient {
    /// Get the user's resumable playback positions.
    pub async fn progress(&self) -> Result<ProgressView, Error> {
        self.get("/api/progress", Bearer::Access).await
    }
}
