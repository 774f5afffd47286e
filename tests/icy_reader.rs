//! Tests for the ICY metadata reader.

use playoutrs::{Error, IcyHeaders, IcyMetadata, IcyReader, MAX_INTERVAL};
use reqwest::header::HeaderMap;
use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex};

const INTERVAL: usize = 32768;

fn collected() -> (
    Arc<Mutex<Vec<IcyMetadata>>>,
    impl FnMut(IcyMetadata) + Send + Sync + 'static,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |metadata| sink.lock().unwrap().push(metadata))
}

// interval bytes of 'A', one 32-byte metadata block, interval bytes of 'B'
fn stream_with_metadata() -> Vec<u8> {
    let mut data = vec![b'A'; INTERVAL];
    data.push(0x02);
    let mut block = b"StreamTitle='X';StreamUrl='https://y';".to_vec();
    block.resize(0x02 * 16, 0);
    data.extend_from_slice(&block);
    data.extend(vec![b'B'; INTERVAL]);
    data
}

#[test]
fn test_metadata_extraction() {
    let data = stream_with_metadata();
    let total = data.len();
    let (seen, callback) = collected();

    let mut reader = IcyReader::new(Cursor::new(data), INTERVAL, callback).unwrap();
    let mut audio = Vec::new();
    reader.read_to_end(&mut audio).unwrap();

    // exactly two intervals of audio, with the block stripped out
    assert_eq!(audio.len(), 2 * INTERVAL);
    assert!(audio[..INTERVAL].iter().all(|&b| b == b'A'));
    assert!(audio[INTERVAL..].iter().all(|&b| b == b'B'));

    // audio plus one length byte plus 16·L metadata accounts for every byte
    assert_eq!(audio.len() + 1 + 0x02 * 16, total);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].stream_title.as_deref(), Some("X"));
    assert_eq!(seen[0].stream_url.as_deref(), Some("https://y"));
}

#[test]
fn test_metadata_extraction_with_small_reads() {
    let data = stream_with_metadata();
    let (seen, callback) = collected();

    let mut reader = IcyReader::new(Cursor::new(data), INTERVAL, callback).unwrap();
    let mut audio = Vec::new();
    let mut buf = [0u8; 1000];
    loop {
        let n = reader.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        audio.extend_from_slice(&buf[..n]);
    }

    assert_eq!(audio.len(), 2 * INTERVAL);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn test_zero_length_block_means_unchanged() {
    let mut data = vec![b'A'; INTERVAL];
    data.push(0x00);
    data.extend(vec![b'B'; INTERVAL]);
    let (seen, callback) = collected();

    let mut reader = IcyReader::new(Cursor::new(data), INTERVAL, callback).unwrap();
    let mut audio = Vec::new();
    reader.read_to_end(&mut audio).unwrap();

    assert_eq!(audio.len(), 2 * INTERVAL);
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn test_oversized_metadata_block_fails() {
    let mut data = vec![b'A'; 16];
    data.push(0xFF); // 255 * 16 = 4080 bytes, over the 1 KiB cap
    data.extend(vec![0u8; 4080]);

    let mut reader = IcyReader::new(Cursor::new(data), 16, |_| {}).unwrap();
    let mut audio = Vec::new();
    let err = reader.read_to_end(&mut audio).unwrap_err();

    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    assert!(err.to_string().contains("metadata length"));
}

#[test]
fn test_oversized_interval_is_rejected_up_front() {
    let err = IcyReader::new(Cursor::new(Vec::new()), MAX_INTERVAL + 1, |_| {}).unwrap_err();
    assert!(matches!(err, Error::InvalidIntervalLength(_)));

    // the cap itself is fine
    assert!(IcyReader::new(Cursor::new(Vec::new()), MAX_INTERVAL, |_| {}).is_ok());
}

#[test]
fn test_headers_parse() {
    let mut headers = HeaderMap::new();
    headers.insert("icy-metaint", "32768".parse().unwrap());
    headers.insert("icy-name", "Test Radio Stream".parse().unwrap());
    headers.insert("icy-genre", "Eclectic".parse().unwrap());
    headers.insert("icy-br", "320".parse().unwrap());
    headers.insert("icy-pub", "1".parse().unwrap());
    headers.insert("icy-url", "http://example.com/radio".parse().unwrap());

    let icy = IcyHeaders::parse(&headers).unwrap().unwrap();
    assert_eq!(icy.interval, 32768);
    assert_eq!(icy.name, "Test Radio Stream");
    assert_eq!(icy.genre, "Eclectic");
    assert_eq!(icy.bitrate, Some(320));
    assert!(icy.public);
    assert_eq!(icy.url, "http://example.com/radio");
}

#[test]
fn test_headers_without_interval_are_plain_audio() {
    let mut headers = HeaderMap::new();
    headers.insert("icy-name", "No Metadata Here".parse().unwrap());

    assert!(IcyHeaders::parse(&headers).unwrap().is_none());
}

#[test]
fn test_headers_reject_oversized_interval() {
    let mut headers = HeaderMap::new();
    headers.insert("icy-metaint", "5242880".parse().unwrap());

    let err = IcyHeaders::parse(&headers).unwrap_err();
    assert!(matches!(err, Error::InvalidIntervalLength(5242880)));
}
