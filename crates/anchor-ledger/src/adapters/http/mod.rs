//! HTTP Adapters
//!
//! REST clients for the anchoring service, the receipt validator and the
//! block explorer. All share one status classification:
//!
//! | Status            | Meaning                   |
//! |-------------------|---------------------------|
//! | 2xx               | success                   |
//! | 401               | token expired or missing  |
//! | 404, 409          | resource not there (yet)  |
//! | 408, 429, 5xx     | transient                 |
//! | other             | permanent rejection       |

mod anchoring;
mod explorer;
mod validator;

#[cfg(test)]
pub(crate) mod canned;

pub use anchoring::{Credentials, HttpAnchoringClient};
pub use explorer::BlockExplorerTxLookup;
pub use validator::HttpReceiptValidator;

use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::domain::AnchorError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StatusClass {
    Success,
    Unauthorized,
    NotFound,
    Transient,
    Permanent,
}

pub(crate) fn classify(status: StatusCode) -> StatusClass {
    match status.as_u16() {
        200..=299 => StatusClass::Success,
        401 => StatusClass::Unauthorized,
        404 | 409 => StatusClass::NotFound,
        408 | 429 | 500..=599 => StatusClass::Transient,
        _ => StatusClass::Permanent,
    }
}

pub(crate) fn build_client(timeout: Duration) -> Result<Client, AnchorError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| AnchorError::Config(format!("http client: {}", e)))
}

pub(crate) fn transport_error(service: &'static str, e: reqwest::Error) -> AnchorError {
    AnchorError::ServiceUnavailable {
        service,
        reason: e.to_string(),
    }
}

/// Error for a non-success status that is not handled by the caller.
pub(crate) fn status_error(service: &'static str, status: StatusCode, body: &str) -> AnchorError {
    let reason = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, truncate(body, 200))
    };
    match classify(status) {
        StatusClass::Transient => AnchorError::ServiceUnavailable { service, reason },
        _ => AnchorError::ServiceRejected { service, reason },
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify(StatusCode::OK), StatusClass::Success);
        assert_eq!(classify(StatusCode::CREATED), StatusClass::Success);
        assert_eq!(classify(StatusCode::UNAUTHORIZED), StatusClass::Unauthorized);
        assert_eq!(classify(StatusCode::NOT_FOUND), StatusClass::NotFound);
        assert_eq!(classify(StatusCode::CONFLICT), StatusClass::NotFound);
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS), StatusClass::Transient);
        assert_eq!(classify(StatusCode::BAD_GATEWAY), StatusClass::Transient);
        assert_eq!(classify(StatusCode::BAD_REQUEST), StatusClass::Permanent);
        assert_eq!(classify(StatusCode::FORBIDDEN), StatusClass::Permanent);
    }

    #[test]
    fn test_status_error_retriability() {
        assert!(status_error("anchoring", StatusCode::SERVICE_UNAVAILABLE, "").is_retriable());
        let err = status_error("anchoring", StatusCode::BAD_REQUEST, "bad hash");
        assert!(!err.is_retriable());
        assert!(err.to_string().contains("bad hash"));
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://h/api/", "/hashitems"), "http://h/api/hashitems");
        assert_eq!(join_url("http://h", "txs/abc"), "http://h/txs/abc");
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ab", 10), "ab");
    }
}
