//! Passive health checking (outcome classification).
//!
//! # Responsibilities
//! - Classify every attempt into an `AttemptOutcome`
//! - Decide which outcomes count as failures and which call for a proxy
//!
//! # Design Decisions
//! - 429 is neither success nor failure: it feeds the rate limiter only
//! - 403/451 and CORS/geo-block messages mean "try through the relay"
//! - Timeouts and refused connections also warrant one proxied retry

use serde::Serialize;

use crate::http::client::TransportError;

/// Classification of a single provider attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Timeout,
    ConnectionError,
    HttpClientError,
    HttpServerError,
    RateLimited,
    ProxyRequired,
    ParseError,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Timeout => "timeout",
            AttemptOutcome::ConnectionError => "connection_error",
            AttemptOutcome::HttpClientError => "http_client_error",
            AttemptOutcome::HttpServerError => "http_server_error",
            AttemptOutcome::RateLimited => "rate_limited",
            AttemptOutcome::ProxyRequired => "proxy_required",
            AttemptOutcome::ParseError => "parse_error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }

    /// Outcomes after which a direct attempt is retried once through the proxy.
    pub fn triggers_proxy(&self) -> bool {
        matches!(
            self,
            AttemptOutcome::Timeout | AttemptOutcome::ConnectionError | AttemptOutcome::ProxyRequired
        )
    }

    /// Outcomes that advance the circuit breaker's failure counter.
    pub fn counts_as_failure(&self) -> bool {
        !matches!(self, AttemptOutcome::Success | AttemptOutcome::RateLimited)
    }
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map an HTTP status to a failure outcome. Success statuses return `None`.
pub fn classify_status(status: u16) -> Option<AttemptOutcome> {
    match status {
        200..=299 => None,
        429 => Some(AttemptOutcome::RateLimited),
        403 | 451 => Some(AttemptOutcome::ProxyRequired),
        400..=499 => Some(AttemptOutcome::HttpClientError),
        500..=599 => Some(AttemptOutcome::HttpServerError),
        // 1xx/3xx never reach us with redirects followed; treat as a bad upstream.
        _ => Some(AttemptOutcome::HttpServerError),
    }
}

const BLOCK_MARKERS: &[&str] = &[
    "cors",
    "geo",
    "region",
    "not available in your country",
    "restricted location",
];

/// Map a transport failure to an outcome.
pub fn classify_transport(error: &TransportError) -> AttemptOutcome {
    match error {
        TransportError::Timeout => AttemptOutcome::Timeout,
        TransportError::Connect(message) | TransportError::Other(message) => {
            if mentions_block(message) {
                AttemptOutcome::ProxyRequired
            } else {
                AttemptOutcome::ConnectionError
            }
        }
        TransportError::ProxyUnavailable => AttemptOutcome::ConnectionError,
    }
}

fn mentions_block(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    BLOCK_MARKERS.iter().any(|marker| lowered.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_outcomes() {
        assert_eq!(classify_status(200), None);
        assert_eq!(classify_status(204), None);
        assert_eq!(classify_status(429), Some(AttemptOutcome::RateLimited));
        assert_eq!(classify_status(403), Some(AttemptOutcome::ProxyRequired));
        assert_eq!(classify_status(451), Some(AttemptOutcome::ProxyRequired));
        assert_eq!(classify_status(404), Some(AttemptOutcome::HttpClientError));
        assert_eq!(classify_status(502), Some(AttemptOutcome::HttpServerError));
    }

    #[test]
    fn geo_block_messages_require_proxy() {
        let blocked = TransportError::Other("Service unavailable from a restricted location".into());
        assert_eq!(classify_transport(&blocked), AttemptOutcome::ProxyRequired);

        let cors = TransportError::Connect("CORS preflight rejected".into());
        assert_eq!(classify_transport(&cors), AttemptOutcome::ProxyRequired);

        let refused = TransportError::Connect("connection refused".into());
        assert_eq!(classify_transport(&refused), AttemptOutcome::ConnectionError);
    }

    #[test]
    fn rate_limiting_is_not_a_circuit_failure() {
        assert!(!AttemptOutcome::RateLimited.counts_as_failure());
        assert!(!AttemptOutcome::Success.counts_as_failure());
        assert!(AttemptOutcome::ParseError.counts_as_failure());
        assert!(AttemptOutcome::Timeout.triggers_proxy());
        assert!(!AttemptOutcome::HttpServerError.triggers_proxy());
    }
}
