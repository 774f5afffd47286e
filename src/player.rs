//! Playback engine.
//!
//! A single-threaded cooperative event loop drives the playlist: it resolves
//! each entry to a media URL, opens and decodes the body, hands the samples
//! to the audio output, and reacts to control commands, per-track errors,
//! stream metadata, and mid-track listen events. All engine state changes and
//! callback deliveries happen on the thread running [`Player::run`]; the
//! audio callback thread only pulls samples and posts completion back through
//! the event channel.

use crate::decode::{self, AudioFormat, Codec, NoSeek};
use crate::icy::{IcyHeaders, IcyMetadata, IcyReader};
use crate::notify::ListenSource;
use crate::playlist::{Entry, PlaylistKind, Spiff};
use crate::{Error, PlayoutClient};
use rodio::source::EmptyCallback;
use rodio::{OutputStream, OutputStreamBuilder, Sink, Source};
use std::io;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stream_download::http::HttpStream;
use stream_download::storage::bounded::BoundedStorageProvider;
use stream_download::storage::memory::MemoryStorageProvider;
use stream_download::{Settings, StreamDownload};
use tokio::runtime::Handle;
use url::Url;

// Rolling buffer for endless radio bodies.
const STREAM_BUFFER_BYTES: usize = 8 * 1024 * 1024;

/// A control command for the engine. Sending one never blocks on playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Jump to the next entry, wrapping to the first at the end
    SkipForward,
    /// Jump to the previous entry, clamping at the first
    SkipBackward,
    /// Advance: consume a pending skip target or move to index + 1
    Next,
    /// Stop playback and end the engine loop
    Stop,
    /// Toggle pause and report the current position
    Pause,
}

enum Event {
    Command(Command),
    TrackError(Error),
    Metadata(IcyMetadata),
    Listened,
}

// State shared with control handles and the audio sentinel.
struct Shared {
    skip: Mutex<Option<usize>>,
    index: AtomicUsize,
    len: AtomicUsize,
}

/// What the engine is currently playing, as seen by callbacks.
#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub index: usize,
    pub entry: Entry,
    pub kind: PlaylistKind,
    pub format: AudioFormat,
    /// Track duration when the decoder knows it; `None` for live streams
    pub duration: Option<Duration>,
    pub icy_headers: Option<IcyHeaders>,
    pub icy_metadata: Option<IcyMetadata>,
}

/// Position report delivered with the on-pause callback.
#[derive(Debug, Clone)]
pub struct PauseInfo {
    pub index: usize,
    pub kind: PlaylistKind,
    /// Playback position in seconds at the time of the toggle
    pub position: f64,
    /// Whether the toggle left the sink paused
    pub paused: bool,
}

/// Callback invoked when a track starts or its stream metadata changes.
pub type TrackCallback = Arc<dyn Fn(&Controls, &NowPlaying) + Send + Sync>;
/// Callback invoked when playback is paused or resumed.
pub type PauseCallback = Arc<dyn Fn(&Controls, &PauseInfo) + Send + Sync>;
/// Callback invoked once per track when playback passes the midpoint.
pub type ListenCallback = Arc<dyn Fn(&Controls, &NowPlaying) + Send + Sync>;
/// Callback invoked on a per-track error. The default logs and advances.
pub type ErrorCallback = Arc<dyn Fn(&Controls, &Error) + Send + Sync>;

/// Clonable, non-blocking control handle for a running [`Player`].
#[derive(Clone)]
pub struct Controls {
    events: Sender<Event>,
    shared: Arc<Shared>,
}

impl Controls {
    pub fn skip_forward(&self) {
        self.send(Command::SkipForward);
    }

    pub fn skip_backward(&self) {
        self.send(Command::SkipBackward);
    }

    pub fn next(&self) {
        self.send(Command::Next);
    }

    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    pub fn pause(&self) {
        self.send(Command::Pause);
    }

    /// Index of the entry the engine is (or will be) playing.
    pub fn index(&self) -> usize {
        self.shared.index.load(Ordering::SeqCst)
    }

    fn send(&self, command: Command) {
        let _ = self.events.send(Event::Command(command));
    }
}

fn clamp_index(index: usize, len: usize) -> usize {
    if index >= len { 0 } else { index }
}

fn forward_target(index: usize, len: usize) -> usize {
    if index + 1 >= len { 0 } else { index + 1 }
}

fn backward_target(index: usize) -> usize {
    index.saturating_sub(1)
}

fn has_next(pending_skip: bool, index: usize, len: usize) -> bool {
    pending_skip || index + 1 < len
}

/// Drives a playlist through the audio output.
///
/// Configure with the builder methods, take a [`Controls`] handle, then hand
/// the player a blocking thread:
///
/// ```no_run
/// use playoutrs::{MemoryTokenStore, Player, PlayoutClient};
/// use std::sync::Arc;
/// use tokio::runtime::Handle;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Arc::new(MemoryTokenStore::new("https://music.example.com", "playoutrs/0.1"));
/// let client = Arc::new(PlayoutClient::new(store));
/// let spiff = client.playlist().await?;
///
/// let player = Player::new(client, spiff)
///     .with_on_track(|_, now| println!("{} — {}", now.entry.creator, now.entry.title));
/// let controls = player.controls();
///
/// let handle = Handle::current();
/// let engine = tokio::task::spawn_blocking(move || player.run(handle));
///
/// controls.skip_forward();
/// engine.await??;
/// # Ok(())
/// # }
/// ```
pub struct Player {
    client: Arc<PlayoutClient>,
    media: reqwest::Client,
    icy_media: reqwest::Client,
    spiff: Spiff,
    repeat: bool,
    buffer: Duration,
    on_track: Option<TrackCallback>,
    on_pause: Option<PauseCallback>,
    on_listen: Option<ListenCallback>,
    on_error: Option<ErrorCallback>,
    shared: Arc<Shared>,
    events: Sender<Event>,
    events_rx: Receiver<Event>,
}

impl Player {
    /// Create a player over a playlist. Playback begins at the playlist's
    /// stored index when [`Player::run`] is called.
    pub fn new(client: Arc<PlayoutClient>, spiff: Spiff) -> Self {
        let media = reqwest::Client::builder()
            .user_agent(client.user_agent())
            .build()
            .unwrap_or_default();

        // Stream requests opt into inline metadata
        let mut icy_headers = reqwest::header::HeaderMap::new();
        icy_headers.insert(
            "Icy-MetaData",
            reqwest::header::HeaderValue::from_static("1"),
        );
        let icy_media = reqwest::Client::builder()
            .user_agent(client.user_agent())
            .default_headers(icy_headers)
            .build()
            .unwrap_or_default();

        let start = if spiff.index < 0 { 0 } else { spiff.index as usize };
        let shared = Arc::new(Shared {
            skip: Mutex::new(None),
            index: AtomicUsize::new(start),
            len: AtomicUsize::new(spiff.len()),
        });
        let (events, events_rx) = channel();
        Self {
            client,
            media,
            icy_media,
            spiff,
            repeat: false,
            buffer: Duration::from_secs(1),
            on_track: None,
            on_pause: None,
            on_listen: None,
            on_error: None,
            shared,
            events,
            events_rx,
        }
    }

    /// Restart from the first entry after the last finishes.
    pub fn with_repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    /// Audio output buffer duration (default one second).
    pub fn with_buffer(mut self, buffer: Duration) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn with_on_track<F>(mut self, f: F) -> Self
    where
        F: Fn(&Controls, &NowPlaying) + Send + Sync + 'static,
    {
        self.on_track = Some(Arc::new(f));
        self
    }

    pub fn with_on_pause<F>(mut self, f: F) -> Self
    where
        F: Fn(&Controls, &PauseInfo) + Send + Sync + 'static,
    {
        self.on_pause = Some(Arc::new(f));
        self
    }

    pub fn with_on_listen<F>(mut self, f: F) -> Self
    where
        F: Fn(&Controls, &NowPlaying) + Send + Sync + 'static,
    {
        self.on_listen = Some(Arc::new(f));
        self
    }

    pub fn with_on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Controls, &Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// A control handle usable from any thread.
    pub fn controls(&self) -> Controls {
        Controls {
            events: self.events.clone(),
            shared: self.shared.clone(),
        }
    }

    /// The playlist this player was created over.
    pub fn spiff(&self) -> &Spiff {
        &self.spiff
    }

    /// Run the engine loop until stopped.
    ///
    /// Blocks the calling thread; run it under `tokio::task::spawn_blocking`
    /// or a dedicated thread. `handle` is the runtime the engine uses for its
    /// own HTTP calls.
    pub fn run(self, handle: Handle) -> Result<(), Error> {
        Engine {
            player: self,
            handle,
            playing: None,
        }
        .run()
    }
}

// The active track. Dropping this stops the audio output. The output stream
// is not Send, so it lives here rather than in Player: the engine state is
// created on the thread that runs the loop and never leaves it.
struct Playing {
    format: AudioFormat,
    duration: Option<Duration>,
    headers: Option<IcyHeaders>,
    metadata: Option<IcyMetadata>,
    sink: Sink,
    _output: OutputStream,
}

struct Engine {
    player: Player,
    handle: Handle,
    playing: Option<Playing>,
}

impl Engine {
    fn run(&mut self) -> Result<(), Error> {
        let controls = self.player.controls();

        let start = self.player.shared.index.load(Ordering::SeqCst);
        if let Err(e) = self.play(start) {
            let _ = self.player.events.send(Event::TrackError(e));
        }

        loop {
            let event = match self.player.events_rx.recv() {
                Ok(event) => event,
                Err(_) => break,
            };
            match event {
                Event::Command(Command::Next) => {
                    let target = self.player.shared.skip.lock().unwrap().take();
                    let next = target
                        .unwrap_or_else(|| self.player.shared.index.load(Ordering::SeqCst) + 1);
                    if let Err(e) = self.play(next) {
                        let _ = self.player.events.send(Event::TrackError(e));
                    }
                }
                Event::Command(Command::Stop) => {
                    self.playing = None;
                    break;
                }
                Event::Command(Command::SkipForward) => self.skip(true),
                Event::Command(Command::SkipBackward) => self.skip(false),
                Event::Command(Command::Pause) => self.toggle_pause(&controls),
                Event::TrackError(e) => match &self.player.on_error {
                    Some(callback) => callback(&controls, &e),
                    None => {
                        log::error!("playback error: {}", e);
                        controls.next();
                    }
                },
                Event::Metadata(metadata) => {
                    if let Some(playing) = self.playing.as_mut() {
                        playing.metadata = Some(metadata);
                    }
                    self.fire_on_track(&controls);
                }
                Event::Listened => {
                    if let (Some(callback), Some(now)) =
                        (&self.player.on_listen, self.now_playing())
                    {
                        callback(&controls, &now);
                    }
                }
            }
        }
        Ok(())
    }

    // Open and start the entry at `index`. Any error here is a per-track
    // error: the caller posts it to the event loop and the default handler
    // advances.
    fn play(&mut self, index: usize) -> Result<(), Error> {
        self.playing = None;

        let len = self.player.spiff.len();
        self.player.shared.len.store(len, Ordering::SeqCst);
        if len == 0 {
            self.player.shared.index.store(0, Ordering::SeqCst);
            return Ok(());
        }

        let index = clamp_index(index, len);
        self.player.shared.index.store(index, Ordering::SeqCst);

        let entry = self
            .player
            .spiff
            .entry(index)
            .cloned()
            .ok_or(Error::NoLocation)?;
        let location = entry.location.first().ok_or(Error::NoLocation)?.clone();

        if self.player.spiff.is_stream() {
            let url = Url::parse(&location)?;
            self.play_stream(entry, url)
        } else {
            let url = self.handle.block_on(self.player.client.locate(&location))?;
            self.play_track(entry, url)
        }
    }

    // Server-resolved media: a presigned URL read through a seekable
    // download buffer.
    fn play_track(&mut self, entry: Entry, url: Url) -> Result<(), Error> {
        let stream = self
            .handle
            .block_on(HttpStream::new(self.player.media.clone(), url.clone()))
            .map_err(|e| Error::StreamInitialization(e.to_string()))?;
        let content_type = stream
            .content_type()
            .as_ref()
            .map(|ct| format!("{}/{}", ct.r#type, ct.subtype));
        let codec = Codec::select(content_type.as_deref(), url.path())?;

        let reader = self
            .handle
            .block_on(StreamDownload::from_stream(
                stream,
                MemoryStorageProvider,
                Settings::default(),
            ))
            .map_err(|e| Error::StreamInitialization(e.to_string()))?;

        self.start(entry, codec, reader, None)
    }

    // Internet radio: the location plays directly, with ICY metadata
    // requested and stripped back out of the body.
    fn play_stream(&mut self, entry: Entry, url: Url) -> Result<(), Error> {
        let stream = self
            .handle
            .block_on(HttpStream::new(self.player.icy_media.clone(), url.clone()))
            .map_err(|e| Error::StreamInitialization(e.to_string()))?;
        let content_type = stream
            .content_type()
            .as_ref()
            .map(|ct| format!("{}/{}", ct.r#type, ct.subtype));
        let headers = IcyHeaders::parse(stream.headers())?;
        let codec = Codec::select(content_type.as_deref(), url.path())?;

        // radio runs forever; keep a rolling window instead of the whole body
        let storage = BoundedStorageProvider::new(
            MemoryStorageProvider,
            NonZeroUsize::new(STREAM_BUFFER_BYTES).expect("nonzero buffer size"),
        );
        let reader = self
            .handle
            .block_on(StreamDownload::from_stream(
                stream,
                storage,
                Settings::default(),
            ))
            .map_err(|e| Error::StreamInitialization(e.to_string()))?;

        match headers {
            Some(headers) => {
                let events = self.player.events.clone();
                let icy = IcyReader::new(reader, headers.interval, move |metadata| {
                    let _ = events.send(Event::Metadata(metadata));
                })?;
                self.start(entry, codec, NoSeek::new(icy), Some(headers))
            }
            None => self.start(entry, codec, NoSeek::new(reader), None),
        }
    }

    fn start<R>(
        &mut self,
        entry: Entry,
        codec: Codec,
        reader: R,
        headers: Option<IcyHeaders>,
    ) -> Result<(), Error>
    where
        R: io::Read + io::Seek + Send + Sync + 'static,
    {
        let decoder = decode::open(reader)?;
        let format = AudioFormat::of(&decoder);
        let duration = decoder.total_duration();
        log::debug!(
            "playing {} ({:?}, {} Hz, {} ch)",
            entry.title,
            codec,
            format.sample_rate,
            format.channels
        );

        let frames = (format.sample_rate as f64 * self.player.buffer.as_secs_f64()) as u32;
        let output = OutputStreamBuilder::from_default_device()
            .map_err(|e| Error::StreamInitialization(e.to_string()))?
            .with_sample_rate(format.sample_rate)
            .with_buffer_size(rodio::cpal::BufferSize::Fixed(frames.max(1)))
            .open_stream()
            .map_err(|e| Error::StreamInitialization(e.to_string()))?;
        let sink = Sink::connect_new(output.mixer());

        match &self.player.on_listen {
            Some(_) => {
                let events = self.player.events.clone();
                sink.append(ListenSource::new(decoder, move || {
                    let _ = events.send(Event::Listened);
                }));
            }
            None => sink.append(decoder),
        }

        // The sentinel runs on the audio thread once the track drains; it
        // must do nothing beyond posting the next command.
        let events = self.player.events.clone();
        let shared = self.player.shared.clone();
        let repeat = self.player.repeat;
        sink.append(EmptyCallback::new(Box::new(move || {
            let pending = shared.skip.lock().map(|s| s.is_some()).unwrap_or(false);
            let index = shared.index.load(Ordering::SeqCst);
            let len = shared.len.load(Ordering::SeqCst);
            let command = if has_next(pending, index, len) || repeat {
                Command::Next
            } else {
                Command::Stop
            };
            let _ = events.send(Event::Command(command));
        })));

        self.playing = Some(Playing {
            format,
            duration,
            headers,
            metadata: None,
            sink,
            _output: output,
        });

        self.fire_on_track(&self.player.controls());
        Ok(())
    }

    // Record the skip target, then drain the current source so the sentinel
    // fires Next. The skip never blocks on the audio output.
    fn skip(&mut self, forward: bool) {
        let len = self.player.shared.len.load(Ordering::SeqCst);
        if len == 0 {
            return;
        }
        let index = self.player.shared.index.load(Ordering::SeqCst);
        let target = if forward {
            forward_target(index, len)
        } else {
            backward_target(index)
        };
        *self.player.shared.skip.lock().unwrap() = Some(target);

        match &self.playing {
            Some(playing) => {
                // a paused sink would never reach the sentinel
                playing.sink.play();
                playing.sink.skip_one();
            }
            None => {
                let _ = self.player.events.send(Event::Command(Command::Next));
            }
        }
    }

    fn toggle_pause(&self, controls: &Controls) {
        let Some(playing) = &self.playing else {
            return;
        };
        if playing.sink.is_paused() {
            playing.sink.play();
        } else {
            playing.sink.pause();
        }
        if let Some(callback) = &self.player.on_pause {
            let info = PauseInfo {
                index: self.player.shared.index.load(Ordering::SeqCst),
                kind: self.player.spiff.kind,
                position: playing.sink.get_pos().as_secs_f64(),
                paused: playing.sink.is_paused(),
            };
            callback(controls, &info);
        }
    }

    fn now_playing(&self) -> Option<NowPlaying> {
        let playing = self.playing.as_ref()?;
        let index = self.player.shared.index.load(Ordering::SeqCst);
        let entry = self.player.spiff.entry(index)?.clone();
        Some(NowPlaying {
            index,
            entry,
            kind: self.player.spiff.kind,
            format: playing.format,
            duration: playing.duration,
            icy_headers: playing.headers.clone(),
            icy_metadata: playing.metadata.clone(),
        })
    }

    fn fire_on_track(&self, controls: &Controls) {
        if let (Some(callback), Some(now)) = (&self.player.on_track, self.now_playing()) {
            callback(controls, &now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryTokenStore, PlayoutClient};

    #[test]
    fn index_clamps_and_wraps() {
        assert_eq!(clamp_index(0, 3), 0);
        assert_eq!(clamp_index(2, 3), 2);
        assert_eq!(clamp_index(3, 3), 0);
        assert_eq!(clamp_index(7, 3), 0);
    }

    #[test]
    fn skip_forward_wraps_at_the_end() {
        assert_eq!(forward_target(0, 3), 1);
        assert_eq!(forward_target(1, 3), 2);
        assert_eq!(forward_target(2, 3), 0);
    }

    #[test]
    fn skip_backward_clamps_at_the_start() {
        assert_eq!(backward_target(2), 1);
        assert_eq!(backward_target(0), 0);
    }

    #[test]
    fn has_next_honors_pending_skips() {
        assert!(has_next(false, 0, 2));
        assert!(!has_next(false, 1, 2));
        // a pending skip means the sentinel advances even from the last entry
        assert!(has_next(true, 1, 2));
    }

    #[test]
    fn empty_playlist_does_not_start_playback() {
        let store = Arc::new(MemoryTokenStore::new("http://localhost", "playoutrs-test"));
        let client = Arc::new(PlayoutClient::new(store));
        let player = Player::new(client, Spiff::default());

        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut engine = Engine {
            player,
            handle: rt.handle().clone(),
            playing: None,
        };
        engine.play(7).unwrap();

        assert!(engine.playing.is_none());
        assert_eq!(engine.player.shared.index.load(Ordering::SeqCst), 0);
    }
}
