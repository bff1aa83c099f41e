//! Config-driven JSON adapter.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::adapter::{AdapterError, ProviderAdapter};
use crate::config::AdapterConfig;
use crate::engine::request::FetchParams;
use crate::http::client::{HttpRequest, HttpResponse};
use crate::registry::ProviderDescriptor;

/// Builds `GET <base_url>/<path>?<query>` from templates where `{name}`
/// is replaced by the fetch parameter `name`, and extracts the payload at a
/// JSON pointer.
#[derive(Debug, Clone, Default)]
pub struct JsonAdapter {
    config: AdapterConfig,
}

impl JsonAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        Self { config }
    }

    fn credential(&self, descriptor: &ProviderDescriptor) -> Result<Option<String>, AdapterError> {
        if !descriptor.requires_auth {
            return Ok(None);
        }
        let Some(var) = &self.config.auth_env else {
            return Ok(None);
        };
        match std::env::var(var) {
            Ok(value) if !value.is_empty() => Ok(Some(value)),
            _ => Err(AdapterError::MissingCredential(var.clone())),
        }
    }
}

impl ProviderAdapter for JsonAdapter {
    fn build_request(
        &self,
        descriptor: &ProviderDescriptor,
        params: &FetchParams,
    ) -> Result<HttpRequest, AdapterError> {
        let mut used = BTreeSet::new();
        let path = render(&self.config.path, params, &mut used, encode_segment)?;

        let mut url = descriptor
            .base_url
            .join(&path)
            .map_err(|e| AdapterError::InvalidUrl(e.to_string()))?;

        let credential = self.credential(descriptor)?;
        {
            let mut query = url.query_pairs_mut();
            for (name, template) in &self.config.query {
                let value = render(template, params, &mut used, |v| v.to_string())?;
                query.append_pair(name, &value);
            }
            if self.config.forward_params {
                for (name, value) in params.iter().filter(|(name, _)| !used.contains(*name)) {
                    query.append_pair(name, value);
                }
            }
            if let (Some(name), Some(secret)) = (&self.config.auth_query, &credential) {
                query.append_pair(name, secret);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        let mut request = HttpRequest::get(url).with_header("accept", "application/json");
        if let (Some(header), Some(secret)) = (&self.config.auth_header, &credential) {
            let prefix = self.config.auth_prefix.as_deref().unwrap_or_default();
            request = request.with_header(header, format!("{prefix}{secret}"));
        }
        Ok(request)
    }

    fn parse_response(
        &self,
        _descriptor: &ProviderDescriptor,
        response: &HttpResponse,
    ) -> Result<Value, AdapterError> {
        let body: Value = serde_json::from_str(&response.body)
            .map_err(|e| AdapterError::Parse(e.to_string()))?;

        let payload = match &self.config.pointer {
            Some(pointer) => body
                .pointer(pointer)
                .cloned()
                .ok_or_else(|| AdapterError::Parse(format!("nothing at '{pointer}'")))?,
            None => body,
        };

        if payload.is_null() {
            return Err(AdapterError::Parse("payload is null".into()));
        }
        Ok(payload)
    }

    fn probe_request(&self, descriptor: &ProviderDescriptor) -> Result<HttpRequest, AdapterError> {
        let url = match &self.config.probe_path {
            Some(path) => descriptor
                .base_url
                .join(path)
                .map_err(|e| AdapterError::InvalidUrl(e.to_string()))?,
            None => descriptor.base_url.clone(),
        };
        Ok(HttpRequest::get(url))
    }
}

/// Substitute `{name}` placeholders. Unknown placeholders are an error.
fn render(
    template: &str,
    params: &FetchParams,
    used: &mut BTreeSet<String>,
    encode: impl Fn(&str) -> String,
) -> Result<String, AdapterError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = &rest[open + 1..open + close];
        let value = params
            .get(name)
            .ok_or_else(|| AdapterError::MissingParam(name.to_string()))?;
        out.push_str(&encode(value));
        used.insert(name.to_string());
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn encode_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
