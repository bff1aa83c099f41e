//! HTTP subsystem: inbound API and outbound transport.
//!
//! # Data Flow
//! ```text
//! Inbound:
//!     TCP connection
//!     → server.rs (Axum router, request ID, trace span, timeout)
//!     → FallbackEngine::fetch / cross_validate
//!     → response.rs (errors to status codes and JSON bodies)
//!     → Send to client
//!
//! Outbound:
//!     adapter builds HttpRequest
//!     → client.rs Transport (direct, forward proxy or relay)
//!     → HttpResponse back to the engine for classification
//! ```

pub mod client;
pub mod request;
pub mod response;
pub mod server;

pub use client::{HttpRequest, HttpResponse, ReqwestTransport, Route, Transport, TransportError};
pub use request::{UuidRequestId, X_REQUEST_ID};
pub use response::ApiError;
pub use server::{AppState, HttpServer};
