use crate::Bearer;
use crate::Error;
use crate::PlayoutClient;
use crate::patch;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};

/// The kind of content a playlist carries.
///
/// Streams are played directly from their location URL and carry ICY inline
/// metadata; all other kinds resolve their locations through the media
/// locate endpoint.
#[derive(
    Debug, Serialize, Deserialize, Default, EnumString, AsRefStr, Display, PartialEq, Eq, Clone, Copy,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PlaylistKind {
    #[default]
    Music,
    Video,
    Podcast,
    Stream,
}

/// The server's playlist container (a "spiff").
///
/// The root object carries the current entry index (`-1` when the playlist is
/// empty), the playback position in seconds, and the kind tag; the header
/// carries the playlist metadata and the ordered entries.
///
/// # Example
///
/// ```no_run
/// # async fn example(client: playoutrs::PlayoutClient) -> Result<(), playoutrs::Error> {
/// let spiff = client.playlist().await?;
/// println!("{} ({} entries)", spiff.playlist.title, spiff.playlist.entries.len());
/// # Ok(())
/// # }
/// ```
#[derive(Default, Debug, Serialize, Deserialize, Clone)]
pub struct Spiff {
    pub playlist: Playlist,
    /// Index of the current entry; `-1` when the playlist is empty
    #[serde(default)]
    pub index: i32,
    /// Playback position within the current entry, in seconds
    #[serde(default)]
    pub position: f64,
    /// Kind tag for every entry in this playlist
    #[serde(rename = "type", default)]
    pub kind: PlaylistKind,
}

impl Spiff {
    /// Number of entries.
    pub fn len(&self) -> usize {
        self.playlist.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playlist.entries.is_empty()
    }

    /// Whether this playlist carries Internet radio streams.
    pub fn is_stream(&self) -> bool {
        self.kind == PlaylistKind::Stream
    }

    /// The entry at `index`, if in range.
    pub fn entry(&self, index: usize) -> Option<&Entry> {
        self.playlist.entries.get(index)
    }
}

/// Playlist header: metadata plus the ordered entries.
#[derive(Default, Debug, Serialize, Deserialize, Clone)]
pub struct Playlist {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub date: String,
    #[serde(rename = "track", default)]
    pub entries: Vec<Entry>,
}

/// One playable item.
///
/// For server-resolved media the first location is a server path to be
/// resolved through [`PlayoutClient::locate`]; for streams it is a direct
/// stream URL. `$ref` carries an unresolved server-relative locator that the
/// server expands on PATCH.
#[derive(Default, Debug, Serialize, Deserialize, Clone)]
pub struct Entry {
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub location: Vec<String>,
    #[serde(default)]
    pub identifier: Vec<String>,
    #[serde(default)]
    pub size: Vec<i64>,
    #[serde(default)]
    pub date: String,
    #[serde(rename = "$ref", default, skip_serializing_if = "Option::is_none")]
    pub entry_ref: Option<String>,
}

impl PlayoutClient {
    /// Get the user's current playlist.
    pub async fn playlist(&self) -> Result<Spiff, Error> {
        self.get("/api/playlist", Bearer::Access).await
    }

    /// Update the stored index and position of the current playlist.
    ///
    /// The server response is discarded; callers that need the updated
    /// playlist should fetch it again.
    pub async fn position(&self, index: usize, position: f64) -> Result<(), Error> {
        let body = serde_json::to_value(patch::position(index, position))?;
        let _: Value = self.patch("/api/playlist", Bearer::Access, body).await?;
        Ok(())
    }

    /// Replace the playlist contents with a single unresolved reference.
    ///
    /// The server expands the reference into entries and returns the new
    /// playlist with index 0 and position 0.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use playoutrs::PlaylistKind;
    /// # async fn example(client: playoutrs::PlayoutClient) -> Result<(), playoutrs::Error> {
    /// let spiff = client
    ///     .replace("/music/releases/42/tracks", PlaylistKind::Music, "Artist", "Album")
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn replace(
        &self,
        entry_ref: &str,
        kind: PlaylistKind,
        creator: &str,
        title: &str,
    ) -> Result<Spiff, Error> {
        let body = serde_json::to_value(patch::replace(entry_ref, kind, creator, title))?;
        self.patch("/api/playlist", Bearer::Access, body).await
    }

    /// Replace the playlist with the results of a search query.
    ///
    /// `shuffle` asks the server for radio ordering and `best` for a
    /// best-match restriction; both are passed through on the query string.
    pub async fn search_replace(
        &self,
        query: &str,
        shuffle: bool,
        best: bool,
    ) -> Result<Spiff, Error> {
        let escaped: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let mut entry_ref = format!("/music/search?q={escaped}");
        if shuffle {
            entry_ref.push_str("&radio=1");
        }
        if best {
            entry_ref.push_str("&m=1");
        }
        self.replace(&entry_ref, PlaylistKind::Music, "", "").await
    }
}
