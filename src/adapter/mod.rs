//! Provider adapters.
//!
//! An adapter turns a fetch into a provider-specific HTTP request and the
//! provider's response back into a JSON payload. The engine never looks at
//! provider wire formats itself.
//!
//! # Design Decisions
//! - Adapters are pure: no I/O, no state, so they can be shared freely
//! - One adapter instance per provider, chosen at registration
//! - A missing credential is an adapter error, surfaced as a skip

use serde_json::Value;

use crate::engine::request::FetchParams;
use crate::http::client::{HttpRequest, HttpResponse};
use crate::registry::ProviderDescriptor;

pub mod json;

pub use json::JsonAdapter;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("missing required parameter '{0}'")]
    MissingParam(String),
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
    #[error("credential not available (env var '{0}' unset)")]
    MissingCredential(String),
    #[error("unparseable response: {0}")]
    Parse(String),
}

pub trait ProviderAdapter: Send + Sync {
    fn build_request(
        &self,
        descriptor: &ProviderDescriptor,
        params: &FetchParams,
    ) -> Result<HttpRequest, AdapterError>;

    fn parse_response(
        &self,
        descriptor: &ProviderDescriptor,
        response: &HttpResponse,
    ) -> Result<Value, AdapterError>;

    /// Cheap request used by the health monitor.
    fn probe_request(&self, descriptor: &ProviderDescriptor) -> Result<HttpRequest, AdapterError> {
        Ok(HttpRequest::get(descriptor.base_url.clone()))
    }
}
