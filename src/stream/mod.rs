pub mod delta;
pub mod frame;
pub mod transcoder;

use std::convert::Infallible;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use smallvec::SmallVec;

pub use delta::{fold_delta, rewrite_chunk, ChunkRewrite, DeltaEvent, Fold, OpenSegments};
pub use frame::{FrameReassembler, RawFrame};
pub use transcoder::{Phase, StreamTranscoder, TranscodeStats};

/// Per-request settings for [`transcode_stream`].
#[derive(Debug, Clone, Copy)]
pub struct TranscodeOptions {
    pub show_reasoning: bool,
    /// Longest tolerated gap between upstream chunks.
    pub idle_timeout: Option<Duration>,
    pub request_id: uuid::Uuid,
}

struct PendingBytes {
    chunks: SmallVec<[Bytes; 8]>,
    head: usize,
}

impl PendingBytes {
    #[inline]
    fn with_capacity(capacity: usize) -> Self {
        let mut chunks = SmallVec::new();
        chunks.reserve(capacity);
        Self { chunks, head: 0 }
    }

    #[inline]
    fn pop_front(&mut self) -> Option<Bytes> {
        if self.head >= self.chunks.len() {
            return None;
        }
        let chunk = std::mem::take(&mut self.chunks[self.head]);
        self.head += 1;
        if self.head == self.chunks.len() {
            self.chunks.clear();
            self.head = 0;
        }
        Some(chunk)
    }

    #[inline]
    fn extend_from_vec(&mut self, frames: &mut Vec<Bytes>) {
        if frames.is_empty() {
            return;
        }
        self.chunks.reserve(frames.len());
        self.chunks.extend(frames.drain(..));
    }
}

struct Driver<S> {
    upstream: std::pin::Pin<Box<S>>,
    transcoder: StreamTranscoder,
    frames: Vec<Bytes>,
    pending: PendingBytes,
    options: TranscodeOptions,
    started: Instant,
}

enum Upstream<E> {
    Chunk(Bytes),
    End,
    Error(E),
    Idle,
}

impl<S, E> Driver<S>
where
    S: Stream<Item = Result<Bytes, E>> + Send,
{
    async fn next_upstream(&mut self) -> Upstream<E> {
        let next = match self.options.idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.upstream.next()).await {
                Ok(next) => next,
                Err(_) => return Upstream::Idle,
            },
            None => self.upstream.next().await,
        };
        match next {
            Some(Ok(chunk)) => Upstream::Chunk(chunk),
            Some(Err(err)) => Upstream::Error(err),
            None => Upstream::End,
        }
    }

    fn log_completion(&self) {
        let stats = self.transcoder.stats();
        tracing::info!(
            request_id = %self.options.request_id,
            frames = stats.frames,
            rewritten = stats.rewritten,
            passthrough_malformed = stats.passthrough_malformed,
            delimiters_closed = stats.delimiters_closed,
            elapsed_ms = self.started.elapsed().as_millis(),
            "stream completed"
        );
    }
}

/// Rewrite an upstream SSE byte stream into the caller's stream.
///
/// Upstream is only read when the caller polls for more output and every
/// pending frame has been delivered. The stream ends after `[DONE]`, after
/// the upstream closes, or after a single in-band error frame.
pub fn transcode_stream<S, E>(
    byte_stream: S,
    options: TranscodeOptions,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let driver = Driver {
        upstream: Box::pin(byte_stream),
        transcoder: StreamTranscoder::new(options.show_reasoning),
        frames: Vec::with_capacity(8),
        pending: PendingBytes::with_capacity(8),
        options,
        started: Instant::now(),
    };

    futures_util::stream::unfold(driver, |mut driver| async move {
        loop {
            if let Some(chunk) = driver.pending.pop_front() {
                return Some((Ok(chunk), driver));
            }
            if driver.transcoder.is_closed() {
                driver.log_completion();
                return None;
            }

            match driver.next_upstream().await {
                Upstream::Chunk(chunk) => driver.transcoder.push(&chunk, &mut driver.frames),
                Upstream::End => driver.transcoder.finish(&mut driver.frames),
                Upstream::Error(err) => {
                    tracing::warn!(
                        request_id = %driver.options.request_id,
                        error = %err,
                        "upstream stream failed"
                    );
                    driver
                        .transcoder
                        .fail(&err.to_string(), &mut driver.frames);
                }
                Upstream::Idle => {
                    let secs = driver.options.idle_timeout.unwrap_or_default().as_secs();
                    tracing::warn!(
                        request_id = %driver.options.request_id,
                        idle_secs = secs,
                        "upstream stream went idle"
                    );
                    driver.transcoder.fail(
                        &format!("no data from upstream for {secs}s"),
                        &mut driver.frames,
                    );
                }
            }
            driver.pending.extend_from_vec(&mut driver.frames);
        }
    })
}
