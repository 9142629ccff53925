//! Resilient dispatch to the external generative API
//!
//! Turns a logical request (model, operation, payload) into a classified
//! outcome using exactly one credential per attempt, and reports credential
//! health as a side channel.
//!
//! # Architecture
//!
//! ```text
//! caller ──▶ with_retry ──▶ Dispatcher::dispatch ──▶ CredentialPool
//!                                  │                      │
//!                                  ▼                      ▼
//!                              Transport            HealthReporter
//!                              (reqwest)            (fire-and-forget)
//! ```
//!
//! # Retry Strategy
//!
//! Only rate limits (429) and server errors (5xx) are retried, with bounded
//! exponential backoff plus jitter. Everything else - other 4xx, parse
//! failures, cancellation - surfaces immediately: retrying a malformed
//! request just burns a credential's quota.

pub mod client;
pub mod pool;
pub mod protocol;
pub mod retry;

pub use client::{
    DispatchOutcome, DispatchRequest, Dispatcher, HttpTransport, Operation, RawResponse,
    Transport, TransportFailure,
};
pub use pool::{Credential, CredentialPool, SelectedCredential};
pub use retry::with_retry;

/// Errors that can occur while dispatching a request
#[derive(Debug, Clone)]
pub enum DispatchError {
    /// The credential pool is empty; fatal until reconfigured
    NoCredentialsConfigured,
    /// The server answered with a non-2xx status
    Classified {
        status: u16,
        message: String,
        raw_body: String,
    },
    /// The transport succeeded (2xx) but the body was not the expected JSON
    Parse { status: u16, raw_text: String },
    /// The network layer failed before or while reading a response
    Network {
        status: Option<u16>,
        message: String,
    },
    /// The caller's cancellation token fired mid-flight
    Cancelled,
}

impl DispatchError {
    /// HTTP status associated with this failure, when one exists.
    pub fn status(&self) -> Option<u16> {
        match self {
            DispatchError::Classified { status, .. } | DispatchError::Parse { status, .. } => {
                Some(*status)
            }
            DispatchError::Network { status, .. } => *status,
            DispatchError::NoCredentialsConfigured | DispatchError::Cancelled => None,
        }
    }

    /// Whether this failure is worth retrying: a rate limit (429) or a
    /// server error (5xx). Failures without a status are never transient.
    pub fn is_transient(&self) -> bool {
        match self.status() {
            Some(status) => status == 429 || (500..600).contains(&status),
            None => false,
        }
    }
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::NoCredentialsConfigured => {
                write!(f, "No valid API credentials are configured")
            }
            DispatchError::Classified {
                status, message, ..
            } => {
                write!(f, "API error ({}): {}", status, message)
            }
            DispatchError::Parse { status, .. } => {
                write!(
                    f,
                    "API returned {} but the body was not the expected JSON",
                    status
                )
            }
            DispatchError::Network { status, message } => match status {
                Some(s) => write!(f, "Network error ({}): {}", s, message),
                None => write!(f, "Network error: {}", message),
            },
            DispatchError::Cancelled => write!(f, "Request was cancelled"),
        }
    }
}

impl std::error::Error for DispatchError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses() {
        let rate_limited = DispatchError::Classified {
            status: 429,
            message: "quota".to_string(),
            raw_body: String::new(),
        };
        assert!(rate_limited.is_transient());

        let server_error = DispatchError::Network {
            status: Some(503),
            message: "unavailable".to_string(),
        };
        assert!(server_error.is_transient());

        let bad_request = DispatchError::Classified {
            status: 400,
            message: "malformed".to_string(),
            raw_body: String::new(),
        };
        assert!(!bad_request.is_transient());

        let parse = DispatchError::Parse {
            status: 200,
            raw_text: "{not json".to_string(),
        };
        assert!(!parse.is_transient());

        assert!(!DispatchError::Cancelled.is_transient());
        assert!(!DispatchError::NoCredentialsConfigured.is_transient());
    }

    #[test]
    fn status_is_present_on_all_classified_variants() {
        let err = DispatchError::Classified {
            status: 404,
            message: "not found".to_string(),
            raw_body: String::new(),
        };
        assert_eq!(err.status(), Some(404));

        let err = DispatchError::Parse {
            status: 200,
            raw_text: String::new(),
        };
        assert_eq!(err.status(), Some(200));

        assert_eq!(DispatchError::NoCredentialsConfigured.status(), None);
    }

    #[test]
    fn error_display_formats() {
        let err = DispatchError::Classified {
            status: 401,
            message: "Invalid API key".to_string(),
            raw_body: String::new(),
        };
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("Invalid API key"));

        let err = DispatchError::NoCredentialsConfigured;
        assert!(err.to_string().contains("credentials"));
    }
}
