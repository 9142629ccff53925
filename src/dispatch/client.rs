//! The dispatcher: one credential, one HTTP exchange, one classified outcome
//!
//! `dispatch()` selects a credential, builds the authenticated endpoint,
//! injects standard generation parameters where they belong, issues the
//! call (honoring cancellation), and classifies the result precisely. The
//! body is always read as raw text *before* any parse attempt - error
//! responses and empty-but-successful responses must both be
//! distinguishable from malformed JSON, and text-then-parse is the only
//! ordering that keeps them apart.
//!
//! The realtime frame path is separate by design: `open_realtime_channel`
//! binds a credential once and hands back a non-blocking sink; frames are
//! never retried and never re-select credentials.

use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::pool::CredentialPool;
use super::protocol;
use super::DispatchError;
use crate::health::{HealthOutcome, HealthReporter};
use crate::realtime::{self, RealtimeChannel, RealtimeReceiver};

/// Shared HTTP client for reuse across requests (avoids TLS handshake
/// overhead).
static HTTP_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

fn shared_client() -> &'static reqwest::Client {
    HTTP_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client")
    })
}

/// What kind of call this is; decides the endpoint action and whether
/// standard generation parameters are injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Ordinary request/response generation.
    Generate,
    /// Server-streamed generation; payload goes out untouched.
    StreamGenerate,
    /// Text-to-speech synthesis; payload goes out untouched.
    SynthesizeSpeech,
}

impl Operation {
    /// Endpoint action suffix, e.g. `models/{model}:generateContent`.
    pub fn action(&self) -> &'static str {
        match self {
            Operation::Generate => ":generateContent",
            Operation::StreamGenerate => ":streamGenerateContent",
            Operation::SynthesizeSpeech => ":synthesizeSpeech",
        }
    }

    fn injects_generation_defaults(&self) -> bool {
        matches!(self, Operation::Generate)
    }
}

/// One logical request. Immutable once issued; discarded after the call
/// resolves or is cancelled.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub model: String,
    pub operation: Operation,
    pub payload: Value,
    pub cancel: Option<CancellationToken>,
}

impl DispatchRequest {
    pub fn new(model: impl Into<String>, operation: Operation, payload: Value) -> Self {
        Self {
            model: model.into(),
            operation,
            payload,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Successful outcome of a dispatch. An empty 2xx body is success too, but
/// callers must be able to tell it apart from a populated result - some
/// operations legitimately return empty acknowledgements.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Success(Value),
    EmptySuccess,
}

/// A completed HTTP exchange, body read as raw text.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// The network layer failed before a usable response existed. `status` is
/// present when the failure happened after a status line was seen.
#[derive(Debug, Clone)]
pub struct TransportFailure {
    pub status: Option<u16>,
    pub message: String,
}

impl std::fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// The HTTP seam. Production uses [`HttpTransport`]; tests script their own.
pub trait Transport: Send + Sync {
    fn post_json(
        &self,
        url: &str,
        body: &Value,
    ) -> impl Future<Output = Result<RawResponse, TransportFailure>> + Send;
}

/// `reqwest`-backed transport over the shared client.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport;

impl HttpTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for HttpTransport {
    fn post_json(
        &self,
        url: &str,
        body: &Value,
    ) -> impl Future<Output = Result<RawResponse, TransportFailure>> + Send {
        let request = shared_client().post(url).json(body);
        async move {
            let response = request.send().await.map_err(|e| TransportFailure {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            })?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| TransportFailure {
                status: Some(status),
                message: e.to_string(),
            })?;
            Ok(RawResponse { status, body })
        }
    }
}

/// Turns a [`DispatchRequest`] into a classified outcome using exactly one
/// credential per attempt.
pub struct Dispatcher<T = HttpTransport> {
    pool: Arc<CredentialPool>,
    health: Arc<dyn HealthReporter>,
    transport: T,
    base_url: String,
    provider: String,
}

impl Dispatcher<HttpTransport> {
    pub fn new(pool: Arc<CredentialPool>, health: Arc<dyn HealthReporter>) -> Self {
        Self::with_transport(HttpTransport::new(), pool, health)
    }
}

impl<T: Transport> Dispatcher<T> {
    pub fn with_transport(
        transport: T,
        pool: Arc<CredentialPool>,
        health: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            pool,
            health,
            transport,
            base_url: protocol::API_URL_BASE.to_string(),
            provider: "Gemini".to_string(),
        }
    }

    /// Override the API base URL (must end with a slash).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Provider label forwarded to the health reporter.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Issue one call and classify the result.
    ///
    /// Exactly one credential is consumed per invocation; retries happen a
    /// layer above (see [`super::with_retry`]) and re-enter here, so each
    /// retry may land on a different credential.
    pub async fn dispatch(
        &self,
        request: &DispatchRequest,
    ) -> Result<DispatchOutcome, DispatchError> {
        let selected = self.pool.select()?;
        let url = self.endpoint(&request.model, request.operation, selected.key());
        let payload = self.prepare_payload(request);

        // The URL embeds the secret, so it never appears in logs.
        log::debug!(
            "dispatching {}{} via '{}'",
            request.model,
            request.operation.action(),
            selected.nickname
        );

        let send = self.transport.post_json(&url, &payload);
        let raw = match &request.cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => {
                        log::info!(
                            "dispatch to {} cancelled by caller",
                            request.model
                        );
                        return Err(DispatchError::Cancelled);
                    }
                    result = send => result,
                }
            }
            None => send.await,
        };

        match raw {
            Ok(response) => self.classify(&request.model, response, &selected),
            Err(failure) => {
                // Transport exceptions are never swallowed. Health and
                // failure accounting apply when there is no status at all
                // or the status is an error.
                if failure.status.map_or(true, |s| s >= 400) {
                    self.pool.report_failure(selected.index);
                    self.health.report_status(
                        &selected.nickname,
                        &self.provider,
                        HealthOutcome::Failure,
                        &failure.message,
                    );
                }
                Err(DispatchError::Network {
                    status: failure.status,
                    message: failure.message,
                })
            }
        }
    }

    /// Open the non-retried frame path for a live call. The returned sink
    /// is bound to the credential selected here for its entire life.
    pub fn open_realtime_channel(
        &self,
    ) -> Result<(RealtimeChannel, RealtimeReceiver), DispatchError> {
        let selected = self.pool.select()?;
        log::info!("realtime channel bound to credential '{}'", selected.nickname);
        Ok(realtime::channel(selected))
    }

    fn endpoint(&self, model: &str, operation: Operation, key: &str) -> String {
        format!("{}{}{}?key={}", self.base_url, model, operation.action(), key)
    }

    /// Standard safety settings and a default generation config go into
    /// generation payloads that don't already carry their own. Streaming
    /// and synthesis payloads pass through untouched.
    fn prepare_payload(&self, request: &DispatchRequest) -> Value {
        let mut payload = request.payload.clone();
        if request.operation.injects_generation_defaults() {
            if let Some(object) = payload.as_object_mut() {
                object
                    .entry("safetySettings")
                    .or_insert_with(|| protocol::standard_safety_settings_value().clone());
                object
                    .entry("generationConfig")
                    .or_insert_with(|| protocol::default_generation_config().clone());
            }
        }
        payload
    }

    fn classify(
        &self,
        model: &str,
        response: RawResponse,
        selected: &super::SelectedCredential,
    ) -> Result<DispatchOutcome, DispatchError> {
        let RawResponse { status, body } = response;

        if !(200..300).contains(&status) {
            let message = protocol::error_message_from_body(status, &body);
            log::error!(
                "API error (model {}, status {}, key '{}'): {}",
                model,
                status,
                selected.nickname,
                message
            );
            self.pool.report_failure(selected.index);
            self.health.report_status(
                &selected.nickname,
                &self.provider,
                HealthOutcome::Failure,
                &message,
            );
            return Err(DispatchError::Classified {
                status,
                message,
                raw_body: body,
            });
        }

        if body.trim().is_empty() {
            log::debug!("empty-but-successful response from {} ({})", model, status);
            return Ok(DispatchOutcome::EmptySuccess);
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(value) => {
                self.health.report_status(
                    &selected.nickname,
                    &self.provider,
                    HealthOutcome::Success,
                    "",
                );
                Ok(DispatchOutcome::Success(value))
            }
            Err(err) => {
                // Transport succeeded but the contract didn't - likely a
                // server-side behavior change, not a rate limit.
                log::error!(
                    "2xx response from {} failed to parse as JSON: {}",
                    model,
                    err
                );
                Err(DispatchError::Parse {
                    status,
                    raw_text: body,
                })
            }
        }
    }
}
