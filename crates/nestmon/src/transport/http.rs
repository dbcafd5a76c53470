use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use reqwest::header::ACCEPT;
use reqwest::header::AUTHORIZATION;
use reqwest::header::LOCATION;
use reqwest::redirect;
use reqwest::Response;
use reqwest::StatusCode;
use reqwest::Url;
use tracing::debug;

use super::ChunkStream;
use super::Transport;
use super::TransportError;
use super::MAX_REDIRECTS;

const EVENT_STREAM: &str = "text/event-stream";
const JSON: &str = "application/json";

/// Upper bound on establishing a TCP/TLS connection, for every request.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Real transport implementation using reqwest
///
/// reqwest's own redirect handling is disabled: it strips `Authorization` when
/// a redirect changes host, and the API redirects every client to a
/// per-account host. Redirects are followed by hand instead, re-sending the
/// request headers on every hop.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    token: Option<String>,
    request_timeout: Option<Duration>,
}

impl HttpTransport {
    /// Create a transport that authenticates with `token`.
    ///
    /// `request_timeout` bounds single-shot requests only; event streams are
    /// expected to stay open indefinitely.
    pub fn new(
        token: impl Into<String>,
        request_timeout: Option<Duration>,
    ) -> Result<Self, TransportError> {
        Self::build(Some(token.into()), request_timeout)
    }

    /// Create a transport that sends no credentials, for third-party services.
    pub fn anonymous(request_timeout: Option<Duration>) -> Result<Self, TransportError> {
        Self::build(None, request_timeout)
    }

    fn build(
        token: Option<String>,
        request_timeout: Option<Duration>,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            token,
            request_timeout,
        })
    }

    fn headers(&self, accept: &'static str) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(accept));

        if let Some(token) = &self.token {
            let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))?;
            auth.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth);
        }
        Ok(headers)
    }

    /// GET `url`, following up to [`MAX_REDIRECTS`] redirects with the same headers.
    /// The span records host and path only; query strings may carry API keys.
    #[tracing::instrument(skip(self, url, headers), fields(host = url.host_str(), path = url.path()))]
    async fn get(
        &self,
        url: &Url,
        headers: HeaderMap,
        timeout: Option<Duration>,
    ) -> Result<Response, TransportError> {
        let mut current = url.clone();
        let mut hops = 0;

        loop {
            let mut request = self.client.get(current.clone()).headers(headers.clone());
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }

            let response = request.send().await?;
            let status = response.status();

            if !is_redirect(status) {
                if !status.is_success() {
                    return Err(TransportError::Status(status));
                }
                return Ok(response);
            }

            if hops >= MAX_REDIRECTS {
                return Err(TransportError::TooManyRedirects {
                    limit: MAX_REDIRECTS,
                });
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    TransportError::InvalidRedirect(format!("{} without Location header", status))
                })?;

            current = current
                .join(location)
                .map_err(|e| TransportError::InvalidRedirect(format!("{}: {}", location, e)))?;
            hops += 1;

            debug!(
                "Following redirect {} ({}) to {}{}",
                hops,
                status,
                current.host_str().unwrap_or_default(),
                current.path()
            );
        }
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &Url) -> Result<String, TransportError> {
        let response = self
            .get(url, self.headers(JSON)?, self.request_timeout)
            .await?;
        Ok(response.text().await?)
    }

    async fn subscribe(&self, url: &Url) -> Result<Box<dyn ChunkStream>, TransportError> {
        let response = self.get(url, self.headers(EVENT_STREAM)?, None).await?;
        Ok(Box::new(ResponseBody(response)))
    }
}

/// Body of an open event-stream response.
struct ResponseBody(Response);

#[async_trait]
impl ChunkStream for ResponseBody {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.0.chunk().await?.map(|bytes| bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_carry_bearer_token() {
        let transport = HttpTransport::new("c.token", None).unwrap();
        let headers = transport.headers(EVENT_STREAM).unwrap();

        assert_eq!(headers[ACCEPT], "text/event-stream");
        assert_eq!(headers[AUTHORIZATION], "Bearer c.token");
        assert!(headers[AUTHORIZATION].is_sensitive());
    }

    #[test]
    fn test_token_with_newline_is_rejected() {
        let transport = HttpTransport::new("bad\ntoken", None).unwrap();
        assert!(matches!(
            transport.headers(JSON),
            Err(TransportError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_anonymous_sends_no_token() {
        let transport = HttpTransport::anonymous(None).unwrap();
        let headers = transport.headers(JSON).unwrap();

        assert_eq!(headers[ACCEPT], "application/json");
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_is_redirect() {
        assert!(is_redirect(StatusCode::TEMPORARY_REDIRECT));
        assert!(is_redirect(StatusCode::FOUND));
        assert!(!is_redirect(StatusCode::NOT_MODIFIED));
        assert!(!is_redirect(StatusCode::OK));
    }
}
