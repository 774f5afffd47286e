//! Mid-track listen notification.

use rodio::Source;
use std::time::Duration;

/// Decorates a decoded source and fires a one-shot callback once playback
/// passes the midpoint.
///
/// The player uses this to report a track as listened: halfway through is the
/// point at which the scrobbling convention counts a play. Sources with an
/// unknown duration (live streams) never fire.
pub struct ListenSource<S> {
    inner: S,
    callback: Option<Box<dyn FnMut() + Send>>,
    played: u64,
    half: Option<u64>,
}

impl<S: Source> ListenSource<S> {
    pub fn new(inner: S, callback: impl FnMut() + Send + 'static) -> Self {
        let half = inner.total_duration().map(|total| {
            let rate = inner.sample_rate() as f64;
            let channels = inner.channels() as f64;
            (total.as_secs_f64() * rate * channels / 2.0) as u64
        });
        Self {
            inner,
            callback: Some(Box::new(callback)),
            played: 0,
            half,
        }
    }
}

impl<S: Source> Iterator for ListenSource<S> {
    type Item = <S as Iterator>::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let sample = self.inner.next()?;
        self.played += 1;
        if let Some(half) = self.half {
            if self.played > half {
                if let Some(mut callback) = self.callback.take() {
                    callback();
                }
            }
        }
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<S: Source> Source for ListenSource<S> {
    fn current_span_len(&self) -> Option<usize> {
        self.inner.current_span_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}
