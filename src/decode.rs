//! Decoder selection for the four media formats the service serves.

use crate::Error;
use rodio::{Decoder, Source};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// The compressed audio containers the player can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Flac,
    Mp3,
    Vorbis,
    Wav,
}

impl Codec {
    /// Match a MIME type, ignoring parameters and case.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        if essence.eq_ignore_ascii_case("audio/flac") || essence.eq_ignore_ascii_case("audio/x-flac")
        {
            Some(Self::Flac)
        } else if essence.eq_ignore_ascii_case("audio/mp3")
            || essence.eq_ignore_ascii_case("audio/mpeg")
        {
            Some(Self::Mp3)
        } else if essence.eq_ignore_ascii_case("audio/ogg") {
            Some(Self::Vorbis)
        } else if essence.eq_ignore_ascii_case("audio/wav") {
            Some(Self::Wav)
        } else {
            None
        }
    }

    /// Match a filename suffix, ignoring case.
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = Path::new(path).extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("flac") {
            Some(Self::Flac)
        } else if ext.eq_ignore_ascii_case("mp3") {
            Some(Self::Mp3)
        } else if ext.eq_ignore_ascii_case("ogg") {
            Some(Self::Vorbis)
        } else if ext.eq_ignore_ascii_case("wav") {
            Some(Self::Wav)
        } else {
            None
        }
    }

    /// Select a codec for a response, MIME type first, path suffix second.
    ///
    /// An unrecognized combination is fatal for the track: the caller reports
    /// [`Error::DecoderUnknown`] and the engine advances.
    pub fn select(content_type: Option<&str>, path: &str) -> Result<Self, Error> {
        if let Some(codec) = content_type.and_then(Self::from_mime) {
            return Ok(codec);
        }
        Self::from_path(path).ok_or_else(|| {
            Error::DecoderUnknown(format!(
                "{} ({})",
                content_type.unwrap_or("no content type"),
                path
            ))
        })
    }
}

/// Sample rate and channel count of a decoded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn of<S: Source>(source: &S) -> Self {
        Self {
            sample_rate: source.sample_rate(),
            channels: source.channels(),
        }
    }
}

/// Open a decoder over a seekable media reader.
pub fn open<R>(reader: R) -> Result<Decoder<R>, Error>
where
    R: Read + Seek + Send + Sync + 'static,
{
    Ok(Decoder::new(reader)?)
}

/// Adapter giving a live stream body the `Seek` bound decoders require.
///
/// Position queries answer from a running byte count; any real seek fails,
/// which decoders treat as an unseekable source.
pub struct NoSeek<R> {
    inner: R,
    pos: u64,
}

impl<R> NoSeek<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, pos: 0 }
    }
}

impl<R: Read> Read for NoSeek<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R> Seek for NoSeek<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Current(0) => Ok(self.pos),
            SeekFrom::Start(p) if p == self.pos => Ok(self.pos),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "live stream is not seekable",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_by_mime() {
        assert_eq!(Codec::select(Some("audio/flac"), "/x").unwrap(), Codec::Flac);
        assert_eq!(Codec::select(Some("audio/x-flac"), "/x").unwrap(), Codec::Flac);
        assert_eq!(Codec::select(Some("audio/mp3"), "/x").unwrap(), Codec::Mp3);
        assert_eq!(Codec::select(Some("audio/mpeg"), "/x").unwrap(), Codec::Mp3);
        assert_eq!(Codec::select(Some("audio/ogg"), "/x").unwrap(), Codec::Vorbis);
        assert_eq!(Codec::select(Some("audio/wav"), "/x").unwrap(), Codec::Wav);
    }

    #[test]
    fn select_by_suffix() {
        assert_eq!(Codec::select(None, "/media/a.flac").unwrap(), Codec::Flac);
        assert_eq!(Codec::select(None, "/media/a.mp3").unwrap(), Codec::Mp3);
        assert_eq!(Codec::select(None, "/media/a.OGG").unwrap(), Codec::Vorbis);
        assert_eq!(Codec::select(None, "/media/a.wav").unwrap(), Codec::Wav);
    }

    #[test]
    fn mime_takes_priority_over_suffix() {
        let codec = Codec::select(Some("audio/flac"), "/media/a.mp3").unwrap();
        assert_eq!(codec, Codec::Flac);
    }

    #[test]
    fn mime_parameters_are_ignored() {
        let codec = Codec::select(Some("audio/ogg; codecs=vorbis"), "/x").unwrap();
        assert_eq!(codec, Codec::Vorbis);
    }

    #[test]
    fn unknown_is_an_error() {
        let err = Codec::select(Some("video/mp4"), "/media/a.mp4").unwrap_err();
        assert!(matches!(err, Error::DecoderUnknown(_)));

        let err = Codec::select(None, "/media/a").unwrap_err();
        assert!(matches!(err, Error::DecoderUnknown(_)));
    }

    #[test]
    fn unknown_mime_falls_back_to_suffix() {
        let codec = Codec::select(Some("application/octet-stream"), "/media/a.flac").unwrap();
        assert_eq!(codec, Codec::Flac);
    }

    #[test]
    fn no_seek_tracks_position() {
        let mut reader = NoSeek::new(std::io::Cursor::new(vec![0u8; 16]));
        let mut buf = [0u8; 10];
        reader.read(&mut buf).unwrap();
        assert_eq!(reader.seek(SeekFrom::Current(0)).unwrap(), 10);
        assert!(reader.seek(SeekFrom::Start(0)).is_err());
    }
}
