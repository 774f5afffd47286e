//! Listening-activity reporting.
//!
//! [`Reporter`] observes the player's callbacks and translates them into
//! server calls (position updates, activity events) and notifications to an
//! optional third-party [`Scrobbler`]. Everything it emits is fire-and-forget
//! on the async runtime: reporting failures are logged and never block or
//! stop playback.

use crate::activity::{Events, TrackEvent};
use crate::player::{NowPlaying, PauseInfo, Player};
use crate::playlist::PlaylistKind;
use crate::PlayoutClient;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Track details handed to a scrobbling service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrobbleTrack {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    /// Duration in seconds, when known
    pub duration: Option<u64>,
}

/// A third-party scrobbling collaborator.
///
/// Implementations wrap whatever service the embedding application uses;
/// errors they return are logged and dropped.
#[async_trait]
pub trait Scrobbler: Send + Sync {
    /// Update the "now playing" status.
    async fn now_playing(&self, track: &ScrobbleTrack) -> anyhow::Result<()>;

    /// Submit a scrobble with a unix timestamp.
    async fn scrobble(&self, track: &ScrobbleTrack, timestamp: i64) -> anyhow::Result<()>;
}

/// Translates player callbacks into server and scrobbler calls.
///
/// # Example
///
/// ```no_run
/// # async fn example(client: std::sync::Arc<playoutrs::PlayoutClient>, spiff: playoutrs::Spiff) {
/// use playoutrs::{Player, Reporter};
/// use tokio::runtime::Handle;
///
/// let player = Player::new(client.clone(), spiff);
/// let player = Reporter::new(client, Handle::current()).attach(player);
/// # }
/// ```
pub struct Reporter {
    client: Arc<PlayoutClient>,
    handle: Handle,
    scrobbler: Option<Arc<dyn Scrobbler>>,
    record_listens: bool,
}

impl Reporter {
    pub fn new(client: Arc<PlayoutClient>, handle: Handle) -> Self {
        Self {
            client,
            handle,
            scrobbler: None,
            record_listens: true,
        }
    }

    /// Forward now-playing and listened notifications to a scrobbler.
    pub fn with_scrobbler(mut self, scrobbler: Arc<dyn Scrobbler>) -> Self {
        self.scrobbler = Some(scrobbler);
        self
    }

    /// Whether listens are recorded as server activity events (default true).
    pub fn with_record_listens(mut self, record: bool) -> Self {
        self.record_listens = record;
        self
    }

    /// Wire this reporter into a player's callbacks.
    pub fn attach(self, player: Player) -> Player {
        let reporter = Arc::new(self);
        let on_track = reporter.clone();
        let on_pause = reporter.clone();
        let on_listen = reporter;
        player
            .with_on_track(move |_, now| on_track.track_changed(now))
            .with_on_pause(move |_, info| on_pause.paused(info))
            .with_on_listen(move |_, now| on_listen.listened(now))
    }

    fn track_changed(&self, now: &NowPlaying) {
        // streams have no stored position
        if now.kind != PlaylistKind::Stream {
            self.report_position(now.index, 0.0);
        }
        if let Some(scrobbler) = &self.scrobbler {
            let scrobbler = scrobbler.clone();
            let track = scrobble_track(now);
            self.handle.spawn(async move {
                if let Err(e) = scrobbler.now_playing(&track).await {
                    log::debug!("now playing notification failed: {}", e);
                }
            });
        }
    }

    fn paused(&self, info: &PauseInfo) {
        if info.kind != PlaylistKind::Stream {
            self.report_position(info.index, info.position);
        }
    }

    fn listened(&self, now: &NowPlaying) {
        if self.record_listens && now.kind != PlaylistKind::Stream {
            if let Some(identifier) = now.entry.identifier.first() {
                let client = self.client.clone();
                let events = Events::track(TrackEvent::now(identifier));
                self.handle.spawn(async move {
                    if let Err(e) = client.activity(&events).await {
                        log::debug!("activity report failed: {}", e);
                    }
                });
            }
        }
        if let Some(scrobbler) = &self.scrobbler {
            let scrobbler = scrobbler.clone();
            let track = scrobble_track(now);
            let timestamp = Utc::now().timestamp();
            self.handle.spawn(async move {
                if let Err(e) = scrobbler.scrobble(&track, timestamp).await {
                    log::debug!("scrobble failed: {}", e);
                }
            });
        }
    }

    fn report_position(&self, index: usize, position: f64) {
        let client = self.client.clone();
        self.handle.spawn(async move {
            if let Err(e) = client.position(index, position).await {
                log::debug!("position report failed: {}", e);
            }
        });
    }
}

// For streams the inline metadata title is the real now-playing; entry
// metadata covers everything else.
fn scrobble_track(now: &NowPlaying) -> ScrobbleTrack {
    if now.kind == PlaylistKind::Stream {
        if let Some(title) = now
            .icy_metadata
            .as_ref()
            .and_then(|m| m.stream_title.clone())
        {
            return ScrobbleTrack {
                title,
                artist: now.entry.creator.clone(),
                album: None,
                duration: None,
            };
        }
    }
    ScrobbleTrack {
        title: now.entry.title.clone(),
        artist: now.entry.creator.clone(),
        album: (!now.entry.album.is_empty()).then(|| now.entry.album.clone()),
        duration: now.duration.map(|d| d.as_secs()),
    }
}
