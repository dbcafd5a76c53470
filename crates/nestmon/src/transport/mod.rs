//! HTTP transport used by the acquisition loops.
//!
//! The loops only see the [`Transport`] trait so they can be driven by a mock
//! in tests; [`HttpTransport`] is the reqwest-backed implementation.

mod http;

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::codec::AnyDelimiterCodecError;

pub use http::HttpTransport;
pub use http::CONNECT_TIMEOUT;
pub use reqwest::StatusCode;
pub use reqwest::Url;

/// Redirect hops followed before a request is abandoned.
pub const MAX_REDIRECTS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server replied with status: {0}")]
    Status(StatusCode),

    #[error("stopped after {limit} redirects")]
    TooManyRedirects { limit: usize },

    #[error("invalid redirect: {0}")]
    InvalidRedirect(String),

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("no data received for {0:?}")]
    IdleTimeout(Duration),

    #[error("stream framing failed: {0}")]
    Framing(#[from] AnyDelimiterCodecError),
}

/// A long-lived response body, read one chunk at a time.
///
/// Chunk boundaries are whatever the network delivered; they need not line up
/// with protocol lines.
#[async_trait]
pub trait ChunkStream: Send {
    /// Next chunk of the body, or `None` once the remote has closed it.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError>;
}

/// Trait for the HTTP operations the acquisition loops need.
///
/// Authenticated implementations attach the bearer token to every request,
/// including redirected ones, and give up after [`MAX_REDIRECTS`] hops.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Single-shot GET returning the full response body.
    async fn fetch(&self, url: &Url) -> Result<String, TransportError>;

    /// Long-lived GET with `Accept: text/event-stream`.
    async fn subscribe(&self, url: &Url) -> Result<Box<dyn ChunkStream>, TransportError>;
}

#[cfg(test)]
pub mod mock {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    use super::*;

    /// Mock transport for testing
    ///
    /// `fetch` returns queued `responses` first, then `document` forever.
    /// `subscribe` hands out queued streams and fails once they run out, or
    /// never answers at all when `stall` is set.
    #[derive(Default)]
    pub struct MockTransport {
        pub responses: Mutex<VecDeque<String>>,
        pub document: Option<String>,
        pub streams: Mutex<VecDeque<MockChunkStream>>,
        pub stall: bool,
        pub fetches: AtomicUsize,
        pub subscribes: AtomicUsize,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_document(document: impl Into<String>) -> Self {
            Self {
                document: Some(document.into()),
                ..Self::default()
            }
        }

        /// A server that accepts the connection but never sends headers.
        pub fn stalled() -> Self {
            Self {
                stall: true,
                ..Self::default()
            }
        }

        pub fn push_response(&self, body: impl Into<String>) {
            self.responses.lock().unwrap().push_back(body.into());
        }

        pub fn push_stream(&self, stream: MockChunkStream) {
            self.streams.lock().unwrap().push_back(stream);
        }

        pub fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }

        pub fn subscribe_count(&self) -> usize {
            self.subscribes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn fetch(&self, _url: &Url) -> Result<String, TransportError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(body) = self.responses.lock().unwrap().pop_front() {
                return Ok(body);
            }
            self.document
                .clone()
                .ok_or(TransportError::Status(StatusCode::SERVICE_UNAVAILABLE))
        }

        async fn subscribe(&self, _url: &Url) -> Result<Box<dyn ChunkStream>, TransportError> {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            let next = self.streams.lock().unwrap().pop_front();
            match next {
                Some(stream) => Ok(Box::new(stream)),
                None if self.stall => std::future::pending().await,
                None => Err(TransportError::Status(StatusCode::SERVICE_UNAVAILABLE)),
            }
        }
    }

    /// Mock response body
    ///
    /// Yields the queued chunks, each after `delay` if set, then either ends
    /// the body or, with `hang`, never produces another chunk.
    #[derive(Debug, Default)]
    pub struct MockChunkStream {
        pub chunks: VecDeque<Vec<u8>>,
        pub hang: bool,
        pub delay: Option<Duration>,
    }

    impl MockChunkStream {
        pub fn from_chunks<I, C>(chunks: I) -> Self
        where
            I: IntoIterator<Item = C>,
            C: AsRef<[u8]>,
        {
            Self {
                chunks: chunks.into_iter().map(|c| c.as_ref().to_vec()).collect(),
                ..Self::default()
            }
        }

        /// One chunk per line, each terminated with `\n`.
        pub fn from_lines<I, S>(lines: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: AsRef<str>,
        {
            Self::from_chunks(lines.into_iter().map(|l| format!("{}\n", l.as_ref())))
        }

        pub fn hanging(mut self) -> Self {
            self.hang = true;
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl ChunkStream for MockChunkStream {
        async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    if let Some(delay) = self.delay {
                        tokio::time::sleep(delay).await;
                    }
                    Ok(Some(chunk))
                }
                None if self.hang => std::future::pending().await,
                None => Ok(None),
            }
        }
    }
}
