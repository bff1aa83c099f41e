//! Outbound HTTP transport.
//!
//! Adapters describe requests as plain `HttpRequest` values; a `Transport`
//! executes them either directly or through the configured relay. The trait
//! uses boxed futures so it stays object safe and tests can swap in a
//! scripted transport.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use url::Url;

use crate::config::{ProxyConfig, ProxyMode};

/// An outbound GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: Url,
    pub headers: BTreeMap<String, String>,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// URL without query string, safe to log and store.
    pub fn redacted_endpoint(&self) -> String {
        let mut url = self.url.clone();
        url.set_query(None);
        url.set_fragment(None);
        let _ = url.set_password(None);
        let _ = url.set_username("");
        url.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok_json(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// How an attempt reaches the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Direct,
    Proxy,
}

impl Route {
    pub fn is_proxy(&self) -> bool {
        matches!(self, Route::Proxy)
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("no proxy route configured")]
    ProxyUnavailable,
    #[error("request failed: {0}")]
    Other(String),
}

pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + 'a>>;

/// Executes provider requests.
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, request: HttpRequest, route: Route) -> TransportFuture<'a>;

    /// Whether `Route::Proxy` can be served at all.
    fn proxy_available(&self) -> bool;
}

#[derive(Debug, Clone)]
enum ProxyRoute {
    /// Standard HTTP(S) forward proxy.
    Forward(reqwest::Client),
    /// URL-rewriting relay: `<prefix><urlencoded target>`.
    Relay { client: reqwest::Client, prefix: String },
}

/// Production transport backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    direct: reqwest::Client,
    proxy: Option<ProxyRoute>,
}

const USER_AGENT: &str = concat!("feedgate/", env!("CARGO_PKG_VERSION"));

impl ReqwestTransport {
    /// Direct-only transport.
    pub fn new() -> Result<Self, TransportError> {
        Ok(Self {
            direct: base_client()?,
            proxy: None,
        })
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self, TransportError> {
        let direct = base_client()?;
        let proxy = match (&config.url, config.enabled) {
            (Some(url), true) => Some(match config.mode {
                ProxyMode::Forward => {
                    let proxy = reqwest::Proxy::all(url.as_str())
                        .map_err(|e| TransportError::Other(format!("invalid proxy url: {e}")))?;
                    let client = reqwest::Client::builder()
                        .user_agent(USER_AGENT)
                        .proxy(proxy)
                        .build()
                        .map_err(|e| TransportError::Other(e.to_string()))?;
                    ProxyRoute::Forward(client)
                }
                ProxyMode::Relay => ProxyRoute::Relay {
                    client: direct.clone(),
                    prefix: url.clone(),
                },
            }),
            _ => None,
        };

        if let Some(route) = &proxy {
            tracing::info!(
                mode = match route {
                    ProxyRoute::Forward(_) => "forward",
                    ProxyRoute::Relay { .. } => "relay",
                },
                "Proxy route configured"
            );
        }

        Ok(Self { direct, proxy })
    }

    async fn execute(
        client: &reqwest::Client,
        request: HttpRequest,
        url: &str,
    ) -> Result<HttpResponse, TransportError> {
        let mut builder = client.get(url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;
        Ok(HttpResponse { status, body })
    }
}

impl Transport for ReqwestTransport {
    fn send<'a>(&'a self, request: HttpRequest, route: Route) -> TransportFuture<'a> {
        Box::pin(async move {
            match (route, &self.proxy) {
                (Route::Direct, _) => {
                    let url = request.url.to_string();
                    Self::execute(&self.direct, request, &url).await
                }
                (Route::Proxy, Some(ProxyRoute::Forward(client))) => {
                    let url = request.url.to_string();
                    Self::execute(client, request, &url).await
                }
                (Route::Proxy, Some(ProxyRoute::Relay { client, prefix })) => {
                    let url = relay_url(prefix, &request.url);
                    Self::execute(client, request, &url).await
                }
                (Route::Proxy, None) => Err(TransportError::ProxyUnavailable),
            }
        })
    }

    fn proxy_available(&self) -> bool {
        self.proxy.is_some()
    }
}

fn base_client() -> Result<reqwest::Client, TransportError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| TransportError::Other(e.to_string()))
}

/// Rewrite `target` for a URL-prefix relay.
pub fn relay_url(prefix: &str, target: &Url) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_str().as_bytes()).collect();
    format!("{prefix}{encoded}")
}

fn map_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        return TransportError::Timeout;
    }

    // Keep the whole source chain: block reasons often sit in an inner error.
    let mut message = error.to_string();
    let mut source = std::error::Error::source(&error);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }

    if error.is_connect() {
        TransportError::Connect(message)
    } else {
        TransportError::Other(message)
    }
}
