//! Audio capture and resampling for live calls
//!
//! Produces a continuous stream of PCM16 frames at a fixed 16 kHz from the
//! live microphone, without ever blocking the real-time capture callback
//! on network I/O. Capture uses CPAL; resampling is a stateless per-buffer
//! pass.

pub mod capture;
pub mod resample;

pub use capture::{CallCapture, CaptureOptions, MutePredicate};
pub use resample::{frame_to_target, resample_linear, to_pcm16, TARGET_SAMPLE_RATE};

/// Errors that can occur while setting up or running audio capture.
#[derive(Debug, Clone)]
pub enum AudioError {
    /// `initialize()` was never called (or failed); no sink to feed.
    NotInitialized,
    /// The platform has no usable capture host or input device.
    CaptureUnsupported,
    /// The acquired device exposes no usable audio input configuration.
    NoAudioTrack,
    /// The device's sample format is not one this pipeline handles.
    NoSupportedConfig,
    /// Building or starting the stream failed.
    StreamCreationFailed(String),
    /// The running stream reported an error.
    StreamFailed(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::NotInitialized => {
                write!(f, "Capture not initialized; call initialize() first")
            }
            AudioError::CaptureUnsupported => {
                write!(f, "Audio capture is not supported on this platform")
            }
            AudioError::NoAudioTrack => {
                write!(f, "No audio tracks available on the input device")
            }
            AudioError::NoSupportedConfig => {
                write!(f, "No supported audio configuration")
            }
            AudioError::StreamCreationFailed(e) => {
                write!(f, "Failed to create audio stream: {}", e)
            }
            AudioError::StreamFailed(e) => write!(f, "Audio stream error: {}", e),
        }
    }
}

impl std::error::Error for AudioError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        assert!(AudioError::CaptureUnsupported
            .to_string()
            .contains("not supported"));
        assert!(AudioError::NoAudioTrack.to_string().contains("audio tracks"));
        assert!(AudioError::StreamCreationFailed("device busy".to_string())
            .to_string()
            .contains("device busy"));
    }
}
