//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use url::Url;

use feedgate::config::PoolConfig;
use feedgate::engine::{EngineBuilder, FallbackEngine};
use feedgate::http::client::{HttpRequest, HttpResponse, Route, Transport, TransportError, TransportFuture};
use feedgate::load_balancer::{PoolMember, StrategyKind};
use feedgate::observability::{StatsEvent, StatsSink};
use feedgate::registry::{Category, ProviderDescriptor};
use feedgate::adapter::JsonAdapter;

/// Start a programmable mock backend on an ephemeral port.
///
/// The handler receives the request target (path and query) and returns the
/// status and body to send back.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let (read, mut write) = socket.into_split();
                        let mut reader = BufReader::new(read);

                        let mut request_line = String::new();
                        if reader.read_line(&mut request_line).await.is_err() {
                            return;
                        }
                        // Drain headers.
                        loop {
                            let mut line = String::new();
                            match reader.read_line(&mut line).await {
                                Ok(0) | Err(_) => break,
                                Ok(_) if line == "\r\n" => break,
                                Ok(_) => {}
                            }
                        }

                        let target = request_line
                            .split_whitespace()
                            .nth(1)
                            .unwrap_or("/")
                            .to_string();
                        let (status, body) = f(target).await;
                        let status_text = match status {
                            200 => "200 OK",
                            403 => "403 Forbidden",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = write.write_all(response.as_bytes()).await;
                        let _ = write.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a mock backend that always returns `body` with status 200.
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    start_programmable_backend(move |_| async move { (200, body.to_string()) }).await
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// One scripted transport reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(String),
    Status(u16),
    Error(TransportError),
    /// Wait, then reply.
    After(Duration, Box<Reply>),
}

impl Reply {
    pub fn json(body: impl Into<String>) -> Self {
        Reply::Json(body.into())
    }

    pub fn after(delay: Duration, reply: Reply) -> Self {
        Reply::After(delay, Box::new(reply))
    }
}

/// A request seen by the scripted transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub host: String,
    pub path: String,
    pub route: Route,
}

/// In-memory transport keyed by request host and route. Each script is
/// consumed in order; its last reply repeats.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<(String, bool), Vec<Reply>>>,
    calls: Mutex<Vec<Call>>,
    proxy: bool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_proxy() -> Self {
        Self {
            proxy: true,
            ..Self::default()
        }
    }

    /// Replace the direct-route script for `host`.
    pub fn script(&self, host: &str, replies: Vec<Reply>) {
        self.script_route(host, Route::Direct, replies);
    }

    pub fn script_route(&self, host: &str, route: Route, replies: Vec<Reply>) {
        self.scripts
            .lock()
            .unwrap()
            .insert((host.to_string(), route.is_proxy()), replies);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, host: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.host == host).count()
    }

    fn next_reply(&self, host: &str, route: Route) -> Reply {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(&(host.to_string(), route.is_proxy())) {
            Some(replies) if replies.len() > 1 => replies.remove(0),
            Some(replies) if !replies.is_empty() => replies[0].clone(),
            _ => Reply::Error(TransportError::Connect(format!("no script for {host}"))),
        }
    }
}

impl Transport for ScriptedTransport {
    fn send<'a>(&'a self, request: HttpRequest, route: Route) -> TransportFuture<'a> {
        let host = request.url.host_str().unwrap_or_default().to_string();
        self.calls.lock().unwrap().push(Call {
            host: host.clone(),
            path: request.url.path().to_string(),
            route,
        });
        if route == Route::Proxy && !self.proxy {
            return Box::pin(async { Err(TransportError::ProxyUnavailable) });
        }

        let reply = self.next_reply(&host, route);
        Box::pin(async move {
            let mut reply = reply;
            loop {
                match reply {
                    Reply::Json(body) => return Ok(HttpResponse::new(200, body)),
                    Reply::Status(status) => return Ok(HttpResponse::new(status, "{}")),
                    Reply::Error(error) => return Err(error),
                    Reply::After(delay, next) => {
                        tokio::time::sleep(delay).await;
                        reply = *next;
                    }
                }
            }
        })
    }

    fn proxy_available(&self) -> bool {
        self.proxy
    }
}

/// Descriptor for a provider served at `http://<id>.test/`.
pub fn provider(id: &str, category: &str, priority: i32) -> ProviderDescriptor {
    ProviderDescriptor::new(id, category, Url::parse(&format!("http://{id}.test/")).unwrap())
        .with_priority(priority)
}

pub fn pool(id: &str, category: &str, strategy: StrategyKind, members: &[&str]) -> PoolConfig {
    PoolConfig {
        id: id.into(),
        category: Category::new(category),
        strategy,
        members: members.iter().map(|m| PoolMember::new(*m)).collect(),
        ..PoolConfig::default()
    }
}

/// Engine with one Priority pool `prices` over `providers` (id, priority).
pub fn priority_engine(transport: Arc<ScriptedTransport>, providers: &[(&str, i32)]) -> FallbackEngine {
    let ids: Vec<&str> = providers.iter().map(|(id, _)| *id).collect();
    let mut builder = EngineBuilder::new(transport)
        .pool(pool("prices", "market_price", StrategyKind::Priority, &ids));
    for (id, priority) in providers {
        builder = builder.provider(provider(id, "market_price", *priority), Arc::new(JsonAdapter::default()));
    }
    builder.build().unwrap()
}

/// Stats sink that keeps counts.
#[derive(Default)]
pub struct CountingSink {
    pub attempts: Mutex<usize>,
    pub probes: Mutex<usize>,
    pub health: Mutex<usize>,
}

impl StatsSink for CountingSink {
    fn record(&self, event: &StatsEvent<'_>) {
        match event {
            StatsEvent::Attempt(record) if record.probe => *self.probes.lock().unwrap() += 1,
            StatsEvent::Attempt(_) => *self.attempts.lock().unwrap() += 1,
            StatsEvent::Health(_) => *self.health.lock().unwrap() += 1,
        }
    }
}
