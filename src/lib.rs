//! Resilient AI-API dispatch and live-call audio for Polyglot
//!
//! The systems core of an AI-persona language-practice app: everything
//! between "the user spoke / typed" and "bytes left for the generative
//! API", with the UI, persona prompts, and persistence kept outside as
//! collaborators.
//!
//! # Architecture
//!
//! ```text
//! Audio callback (cpal thread)        Tokio runtime
//! ┌──────────────────────────┐        ┌───────────────────────────────┐
//! │ mute gate → downmix      │        │ with_retry ─▶ Dispatcher      │
//! │  → resample → PCM16      │──try──▶│        │           │          │
//! │  → FrameSink (1 pending) │ send   │  CredentialPool  Transport    │
//! └──────────────────────────┘        │        │        (reqwest)     │
//!                                     │  HealthReporter               │
//!                                     └───────────────────────────────┘
//! ```
//!
//! Request/response calls (text generation, recaps, TTS) run through the
//! retry orchestrator and may suspend at network I/O; audio frames take
//! the separate fire-and-forget path and are never retried.
//!
//! Components are wired by plain constructor injection - no globals, no
//! readiness events. [`bootstrap`] builds the default production stack.

pub mod audio;
pub mod dispatch;
pub mod health;
pub mod keystore;
pub mod realtime;
pub mod settings;

pub use audio::{AudioError, CallCapture, CaptureOptions, TARGET_SAMPLE_RATE};
pub use dispatch::{
    with_retry, DispatchError, DispatchOutcome, DispatchRequest, Dispatcher, Operation,
};
pub use health::{HealthOutcome, HealthReporter, LogHealthReporter};
pub use realtime::{Frame, FrameSink};
pub use settings::AppSettings;

use dispatch::CredentialPool;
use std::sync::Arc;

/// Build the production dispatcher from persisted settings and the
/// environment.
///
/// Loads `.env` (development convenience), reads `settings.json`, resolves
/// the credential roster, and wires the pool, health reporter, and HTTP
/// transport together. An empty pool is not fatal here - it surfaces as
/// `NoCredentialsConfigured` when a call is attempted.
pub fn bootstrap() -> Dispatcher {
    if dotenvy::dotenv().is_ok() {
        log::debug!("bootstrap: .env loaded");
    }

    let settings = settings::load_settings();
    let credentials = settings::load_credentials(&settings);
    let pool = Arc::new(CredentialPool::new(credentials));
    let health = Arc::new(LogHealthReporter::new());

    Dispatcher::new(pool, health)
        .with_base_url(settings.api_base_url)
        .with_provider(settings.provider)
}
