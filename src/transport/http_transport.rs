use std::time::Duration;

use bytes::Bytes;

use crate::config::{ServerConfig, UpstreamConfig};
use crate::error::ProxyError;
use crate::protocol::upstream::probe_body;
use crate::resolver::{ModelProbe, ProbeOutcome};

const CHAT_COMPLETIONS_PATH: &str = "chat/completions";

fn build_reqwest_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    timeout: Option<Duration>,
) -> Result<reqwest::Client, ProxyError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(5))
        .redirect(reqwest::redirect::Policy::none());
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }

    builder
        .build()
        .map_err(|err| ProxyError::Config(format!("Failed to build HTTP client: {err}")))
}

/// Resolve the upstream chat completions endpoint from the configured base.
///
/// # Errors
///
/// Returns [`ProxyError::Config`] when the base URL cannot be parsed.
pub fn chat_completions_url(base_url: &str) -> Result<url::Url, ProxyError> {
    let trimmed = base_url.trim_end_matches('/');
    let full = if trimmed.ends_with(CHAT_COMPLETIONS_PATH) {
        trimmed.to_owned()
    } else {
        format!("{trimmed}/{CHAT_COMPLETIONS_PATH}")
    };
    url::Url::parse(&full)
        .map_err(|err| ProxyError::Config(format!("Invalid upstream base_url '{base_url}': {err}")))
}

fn build_upstream_headers(api_key: &str) -> Result<http::HeaderMap, ProxyError> {
    let mut headers = http::HeaderMap::with_capacity(2);
    let mut authorization = http::HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|_| ProxyError::Config("upstream.api_key contains invalid header characters".into()))?;
    authorization.set_sensitive(true);
    headers.insert(http::header::AUTHORIZATION, authorization);
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    Ok(headers)
}

/// HTTP client side of the proxy: one upstream endpoint, two pools.
///
/// Non-streaming calls are bounded by `server.timeout_secs`. Streaming calls
/// only carry a connect timeout; the caller enforces read idleness.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    stream_client: reqwest::Client,
    chat_url: url::Url,
    headers: http::HeaderMap,
    probe_timeout: Duration,
}

impl HttpTransport {
    /// Build both clients and the prepared endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Config`] when the endpoint or credential cannot be
    /// turned into a request, or a client fails to build.
    pub fn new(server: &ServerConfig, upstream: &UpstreamConfig) -> Result<Self, ProxyError> {
        let pool_idle_timeout = if server.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(server.http_pool_idle_timeout_secs))
        };
        let pool_max_idle_per_host = server.http_pool_max_idle_per_host.max(1);

        Ok(Self {
            client: build_reqwest_client(
                pool_max_idle_per_host,
                pool_idle_timeout,
                Some(Duration::from_secs(server.timeout_secs)),
            )?,
            stream_client: build_reqwest_client(pool_max_idle_per_host, pool_idle_timeout, None)?,
            chat_url: chat_completions_url(&upstream.base_url)?,
            headers: build_upstream_headers(&upstream.api_key)?,
            probe_timeout: Duration::from_secs(server.probe_timeout_secs),
        })
    }

    #[must_use]
    pub fn chat_url(&self) -> &url::Url {
        &self.chat_url
    }

    fn chat_request(&self, body: Bytes) -> reqwest::Request {
        let mut request = reqwest::Request::new(http::Method::POST, self.chat_url.clone());
        *request.headers_mut() = self.headers.clone();
        *request.body_mut() = Some(reqwest::Body::from(body));
        request
    }

    /// Send a non-streaming chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::UpstreamUnreachable`] when the request cannot be
    /// delivered or times out. Non-2xx responses are returned as-is.
    pub async fn send_chat(&self, body: Bytes) -> Result<reqwest::Response, ProxyError> {
        self.client
            .execute(self.chat_request(body))
            .await
            .map_err(|err| ProxyError::UpstreamUnreachable(err.to_string()))
    }

    /// Send a streaming chat completion request; the caller reads the body
    /// as a byte stream.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::UpstreamUnreachable`] when the request cannot be
    /// delivered.
    pub async fn send_chat_stream(&self, body: Bytes) -> Result<reqwest::Response, ProxyError> {
        self.stream_client
            .execute(self.chat_request(body))
            .await
            .map_err(|err| ProxyError::UpstreamUnreachable(err.to_string()))
    }
}

impl ModelProbe for HttpTransport {
    async fn probe(&self, model: &str) -> ProbeOutcome {
        let mut request = self.chat_request(probe_body(model));
        *request.timeout_mut() = Some(self.probe_timeout);
        match self.client.execute(request).await {
            Ok(response) if response.status().is_success() => ProbeOutcome::Accepted,
            Ok(response) => ProbeOutcome::Rejected(response.status().as_u16()),
            Err(err) => ProbeOutcome::Failed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_url_joined_once() {
        assert_eq!(
            chat_completions_url("https://api.example.com/v1").unwrap().as_str(),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("https://api.example.com/v1/").unwrap().as_str(),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("https://api.example.com/v1/chat/completions")
                .unwrap()
                .as_str(),
            "https://api.example.com/v1/chat/completions"
        );
        assert!(chat_completions_url("not a url").is_err());
    }

    #[test]
    fn test_headers_carry_bearer_token() {
        let headers = build_upstream_headers("sk-test").unwrap();
        assert_eq!(headers[http::header::AUTHORIZATION], "Bearer sk-test");
        assert!(headers[http::header::AUTHORIZATION].is_sensitive());
        assert_eq!(headers[http::header::CONTENT_TYPE], "application/json");
        assert!(build_upstream_headers("bad\nkey").is_err());
    }

    #[tokio::test]
    async fn test_probe_unreachable_upstream_fails_quietly() {
        let mut server = ServerConfig::default();
        server.probe_timeout_secs = 1;
        let upstream = UpstreamConfig::new("http://127.0.0.1:1/v1", "k");
        let transport = HttpTransport::new(&server, &upstream).unwrap();
        assert!(matches!(
            transport.probe("some-model").await,
            ProbeOutcome::Failed(_)
        ));
    }
}
