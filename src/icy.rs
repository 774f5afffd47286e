//! ICY (Icecast/Shoutcast) stream support.
//!
//! Streaming-audio servers interleave textual metadata inside an otherwise
//! opaque audio body: every `Icy-MetaInt` bytes of audio are followed by one
//! length byte `L` and a metadata block of `16·L` bytes (`L = 0` means the
//! metadata is unchanged). [`IcyReader`] strips the blocks out of the byte
//! stream so the decoder only ever sees audio.

use crate::Error;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::HeaderMap;
use std::io::{self, Read};

/// Largest metadata interval a stream may advertise.
pub const MAX_INTERVAL: usize = 4 * 1024 * 1024;

/// Largest metadata block a stream may carry.
pub const MAX_METADATA_LEN: usize = 1024;

static FRAGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^(\w+)=["'](.+)["']$"#).unwrap());

/// Static stream metadata extracted from the initial HTTP response headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IcyHeaders {
    /// Advertised bitrate in kbit/s (`icy-br`)
    pub bitrate: Option<u32>,
    pub description: String,
    pub genre: String,
    /// Bytes of audio between metadata blocks (`Icy-MetaInt`)
    pub interval: usize,
    pub name: String,
    pub public: bool,
    pub url: String,
}

impl IcyHeaders {
    /// Extract ICY headers from an HTTP response.
    ///
    /// Returns `None` when the response carries no `Icy-MetaInt` header (the
    /// body is then plain audio), and [`Error::InvalidIntervalLength`] when
    /// the advertised interval exceeds [`MAX_INTERVAL`] — checked up front so
    /// a bogus stream is rejected before any audio is consumed.
    pub fn parse(headers: &HeaderMap) -> Result<Option<Self>, Error> {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };

        let interval = match headers
            .get("icy-metaint")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            Some(interval) if interval > 0 => interval,
            _ => return Ok(None),
        };
        if interval > MAX_INTERVAL {
            return Err(Error::InvalidIntervalLength(interval));
        }

        Ok(Some(Self {
            bitrate: headers
                .get("icy-br")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok()),
            description: text("icy-description"),
            genre: text("icy-genre"),
            interval,
            name: text("icy-name"),
            public: text("icy-pub").trim() == "1",
            url: text("icy-url"),
        }))
    }
}

/// Dynamic metadata parsed out of one inline block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IcyMetadata {
    pub stream_title: Option<String>,
    pub stream_url: Option<String>,
}

impl IcyMetadata {
    // Blocks look like `StreamTitle='…';StreamUrl='…';` padded with NULs.
    fn parse(block: &[u8]) -> Self {
        let block = String::from_utf8_lossy(block);
        let block = block.trim_end_matches('\0');

        let mut metadata = Self::default();
        for fragment in block.split(';') {
            if fragment.is_empty() {
                continue;
            }
            let Some(captures) = FRAGMENT.captures(fragment) else {
                continue;
            };
            let key = &captures[1];
            let value = captures[2].to_string();
            if key.eq_ignore_ascii_case("StreamTitle") {
                metadata.stream_title = Some(value);
            } else if key.eq_ignore_ascii_case("StreamUrl") {
                metadata.stream_url = Some(value);
            }
        }
        metadata
    }
}

/// Wraps an ICY byte stream so the caller reads pure audio.
///
/// Every completed interval, the reader consumes the length byte and metadata
/// block from the underlying stream, parses it, and hands the result to the
/// callback. The caller never sees metadata bytes, so the audio accounting
/// holds: audio returned plus `1 + 16·L` per block equals bytes consumed from
/// the source.
pub struct IcyReader<R> {
    inner: R,
    interval: usize,
    offset: usize,
    meta: Vec<u8>,
    // Sync so the reader can feed decoders that require Sync sources
    callback: Box<dyn FnMut(IcyMetadata) + Send + Sync>,
}

impl<R> std::fmt::Debug for IcyReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcyReader")
            .field("interval", &self.interval)
            .field("offset", &self.offset)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl<R: Read> IcyReader<R> {
    /// Wrap `inner`, whose audio is interrupted every `interval` bytes.
    pub fn new(
        inner: R,
        interval: usize,
        callback: impl FnMut(IcyMetadata) + Send + Sync + 'static,
    ) -> Result<Self, Error> {
        if interval == 0 || interval > MAX_INTERVAL {
            return Err(Error::InvalidIntervalLength(interval));
        }
        Ok(Self {
            inner,
            interval,
            offset: 0,
            meta: Vec::new(),
            callback: Box::new(callback),
        })
    }

    // Consume one length byte and metadata block. Returns false on a clean
    // EOF at the block boundary.
    fn read_metadata(&mut self) -> io::Result<bool> {
        let mut len_byte = [0u8; 1];
        if self.inner.read(&mut len_byte)? == 0 {
            return Ok(false);
        }

        let len = len_byte[0] as usize * 16;
        if len > MAX_METADATA_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                Error::InvalidMetadataLength(len),
            ));
        }
        if len == 0 {
            // metadata unchanged
            return Ok(true);
        }

        self.meta.resize(len, 0);
        self.inner.read_exact(&mut self.meta)?;
        let metadata = IcyMetadata::parse(&self.meta);
        log::debug!("stream metadata: {:?}", metadata);
        (self.callback)(metadata);
        Ok(true)
    }
}

impl<R: Read> Read for IcyReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.offset == self.interval {
            if !self.read_metadata()? {
                return Ok(0);
            }
            self.offset = 0;
        }

        // Never read past the next metadata block
        let remaining = self.interval - self.offset;
        let take = remaining.min(buf.len());
        let n = self.inner.read(&mut buf[..take])?;
        self.offset += n;
        Ok(n)
    }
}
