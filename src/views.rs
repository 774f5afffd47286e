use crate::Bearer;
use crate::Error;
use crate::PlayoutClient;
use serde::{Deserialize, Serialize};

/// A release shown on the home view.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Release {
    #[serde(rename = "Artist", default)]
    pub artist: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Image", default)]
    pub image: String,
    #[serde(rename = "Date", default)]
    pub date: String,
}

/// The server-curated home view.
///
/// The client treats this as an opaque typed payload; the server decides what
/// is recently added and what is newly released.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct HomeView {
    #[serde(rename = "AddedReleases", default)]
    pub added_releases: Vec<Release>,
    #[serde(rename = "NewReleases", default)]
    pub new_releases: Vec<Release>,
}

/// One radio station entry.
///
/// `ref_` points at the server path whose PATCH or GET yields the station's
/// playlist.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Station {
    #[serde(rename = "ID", default)]
    pub id: i64,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Ref", default)]
    pub station_ref: String,
}

/// Server-curated radio stations, grouped the way the server presents them.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RadioView {
    #[serde(rename = "Genre", default)]
    pub genre: Vec<Station>,
    #[serde(rename = "Similar", default)]
    pub similar: Vec<Station>,
    #[serde(rename = "Period", default)]
    pub period: Vec<Station>,
    #[serde(rename = "Series", default)]
    pub series: Vec<Station>,
    #[serde(rename = "Other", default)]
    pub other: Vec<Station>,
    #[serde(rename = "Stream", default)]
    pub stream: Vec<Station>,
}

impl PlayoutClient {
    /// Get the server-curated home view.
    pub async fn home(&self) -> Result<HomeView, Error> {
        self.get("/api/home", Bearer::Access).await
    }

    /// Get the server-curated radio stations.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn example(client: playoutrs::PlayoutClient) -> Result<(), playoutrs::Error> {
    /// let radio = client.radio().await?;
    /// for station in &radio.stream {
    ///     println!("{}", station.name);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn radio(&self) -> Result<RadioView, Error> {
        self.get("/api/radio", Bearer::Access).await
    }
}
