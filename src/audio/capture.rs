//! Live-call microphone capture
//!
//! Owns the exclusive microphone stream and its processing graph for one
//! call. Every callback buffer is downmixed to mono, resampled to the
//! target rate, converted to PCM16, and handed to the realtime sink -
//! all synchronously, because the audio callback must never await, block
//! on network I/O, or panic outward.
//!
//! Muting is a filter inside the capturing state, not a separate state:
//! a muted callback does nothing at all (no resampling work either), but
//! resource ownership is identical to unmuted capture.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, Stream, StreamConfig};
use std::sync::Arc;
use uuid::Uuid;

use super::resample;
use super::AudioError;
use crate::realtime::{Frame, FrameSink};

/// Externally-owned mute predicate, checked at the top of every callback.
pub type MutePredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Callback invoked for stream errors after capture has started.
pub type CaptureErrorHandler = Arc<dyn Fn(AudioError) + Send + Sync>;

/// Platform audio-processing requests. Best-effort: cpal exposes no knobs
/// for these, so they are recorded and logged while the OS decides; the
/// contract is "requested, not guaranteed".
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Requested frames per callback; the backend may impose its own.
    pub buffer_size: u32,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            buffer_size: 4096,
        }
    }
}

/// Per-session lifecycle. No Paused state exists - muting happens inside
/// Capturing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureState {
    Uninitialized,
    Capturing,
    Stopped,
}

/// One call's audio session: exclusively owns the hardware stream and the
/// processing graph from `start_capture` until `stop_capture`.
pub struct CallCapture {
    options: CaptureOptions,
    sink: Option<Arc<dyn FrameSink>>,
    is_muted: Option<MutePredicate>,
    stream: Option<Stream>,
    state: CaptureState,
    session_id: Option<Uuid>,
}

impl CallCapture {
    pub fn new(options: CaptureOptions) -> Self {
        Self {
            options,
            sink: None,
            is_muted: None,
            stream: None,
            state: CaptureState::Uninitialized,
            session_id: None,
        }
    }

    /// Arm the session with its sink and mute predicate.
    ///
    /// Pure validation step: returns false (and changes nothing) when a
    /// capture is already active. The dynamic capability checks of the
    /// source environment collapse into the type system here; what remains
    /// is the not-already-capturing guard.
    pub fn initialize(&mut self, sink: Arc<dyn FrameSink>, is_muted: MutePredicate) -> bool {
        if self.state == CaptureState::Capturing {
            log::error!("CallCapture: initialize() while capturing; ignoring");
            return false;
        }
        self.sink = Some(sink);
        self.is_muted = Some(is_muted);
        true
    }

    /// Acquire the microphone and start the processing graph.
    ///
    /// The native capture rate comes from the device's active configuration,
    /// not from any caller request - the platform is authoritative.
    /// Immediate failures release partially-acquired resources before
    /// returning; `on_error` handles stream errors after startup.
    pub fn start_capture<F>(&mut self, on_error: F) -> Result<(), AudioError>
    where
        F: Fn(AudioError) + Send + Sync + 'static,
    {
        let on_error: CaptureErrorHandler = Arc::new(on_error);

        let sink = match self.sink.clone() {
            Some(sink) => sink,
            None => return Err(AudioError::NotInitialized),
        };
        let is_muted = match self.is_muted.clone() {
            Some(pred) => pred,
            None => return Err(AudioError::NotInitialized),
        };

        match self.acquire_stream(sink, is_muted, on_error) {
            Ok((stream, session_id)) => {
                self.stream = Some(stream);
                self.state = CaptureState::Capturing;
                self.session_id = Some(session_id);
                Ok(())
            }
            Err(e) => {
                self.stop_capture();
                Err(e)
            }
        }
    }

    fn acquire_stream(
        &self,
        sink: Arc<dyn FrameSink>,
        is_muted: MutePredicate,
        on_error: CaptureErrorHandler,
    ) -> Result<(Stream, Uuid), AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(AudioError::CaptureUnsupported)?;

        log::info!("CallCapture: using input device {:?}", device.name());
        log::debug!(
            "CallCapture: requesting echo_cancellation={} noise_suppression={} auto_gain={} (best-effort)",
            self.options.echo_cancellation,
            self.options.noise_suppression,
            self.options.auto_gain_control
        );

        let supported = device
            .default_input_config()
            .map_err(|_| AudioError::NoAudioTrack)?;
        if supported.channels() == 0 {
            return Err(AudioError::NoAudioTrack);
        }

        // The active config's rate is authoritative, not the caller's intent.
        let native_rate = supported.sample_rate().0;
        let sample_format = supported.sample_format();
        let mut config: StreamConfig = supported.into();

        if native_rate != resample::TARGET_SAMPLE_RATE {
            log::warn!(
                "CallCapture: device captures at {}Hz; resampling each buffer to {}Hz",
                native_rate,
                resample::TARGET_SAMPLE_RATE
            );
        }

        config.buffer_size = BufferSize::Fixed(self.options.buffer_size);
        let stream = match self.build_stream(
            &device,
            &config,
            sample_format,
            native_rate,
            sink.clone(),
            is_muted.clone(),
            on_error.clone(),
        ) {
            Ok(stream) => stream,
            Err(AudioError::StreamCreationFailed(e)) => {
                // Some backends reject fixed buffer sizes outright.
                log::warn!(
                    "CallCapture: fixed {}-frame buffer rejected ({}); using device default",
                    self.options.buffer_size,
                    e
                );
                config.buffer_size = BufferSize::Default;
                self.build_stream(
                    &device,
                    &config,
                    sample_format,
                    native_rate,
                    sink,
                    is_muted,
                    on_error,
                )?
            }
            Err(e) => return Err(e),
        };

        stream
            .play()
            .map_err(|e| AudioError::StreamCreationFailed(format!("Failed to start stream: {}", e)))?;

        let session_id = Uuid::new_v4();
        log::info!(
            "CallCapture: session {} capturing at {}Hz, {} channel(s)",
            session_id,
            native_rate,
            config.channels
        );
        Ok((stream, session_id))
    }

    #[allow(clippy::too_many_arguments)]
    fn build_stream(
        &self,
        device: &cpal::Device,
        config: &StreamConfig,
        sample_format: SampleFormat,
        native_rate: u32,
        sink: Arc<dyn FrameSink>,
        is_muted: MutePredicate,
        on_error: CaptureErrorHandler,
    ) -> Result<Stream, AudioError> {
        match sample_format {
            SampleFormat::I16 => self.build_stream_typed::<i16, _>(
                device,
                config,
                native_rate,
                sink,
                is_muted,
                on_error,
                |s| s as f32 / 32768.0,
            ),
            SampleFormat::U16 => self.build_stream_typed::<u16, _>(
                device,
                config,
                native_rate,
                sink,
                is_muted,
                on_error,
                |s| (s as f32 - 32768.0) / 32768.0,
            ),
            SampleFormat::F32 => self.build_stream_typed::<f32, _>(
                device,
                config,
                native_rate,
                sink,
                is_muted,
                on_error,
                |s| s,
            ),
            _ => Err(AudioError::NoSupportedConfig),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_stream_typed<T, F>(
        &self,
        device: &cpal::Device,
        config: &StreamConfig,
        native_rate: u32,
        sink: Arc<dyn FrameSink>,
        is_muted: MutePredicate,
        on_error: CaptureErrorHandler,
        convert: F,
    ) -> Result<Stream, AudioError>
    where
        T: cpal::SizedSample + Send + 'static,
        F: FnMut(T) -> f32 + Send + Copy + 'static,
    {
        let channels = config.channels as usize;
        let mut scratch: Vec<f32> = Vec::new();

        let err_fn = move |err: cpal::StreamError| {
            log::error!("CallCapture: stream error: {}", err);
            on_error.as_ref()(AudioError::StreamFailed(err.to_string()));
        };

        let stream = device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    process_input_block(
                        data,
                        channels,
                        convert,
                        native_rate,
                        is_muted.as_ref()(),
                        &mut scratch,
                        sink.as_ref(),
                    );
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

        Ok(stream)
    }

    /// Tear down the processing graph and release the hardware stream.
    ///
    /// Idempotent: calling it twice, or before any start, is a no-op. Safe
    /// to call from an error handler.
    pub fn stop_capture(&mut self) {
        if let Some(stream) = self.stream.take() {
            // Dropping the stream disconnects the graph and releases the
            // device; cpal joins any in-flight callback first.
            drop(stream);
            if let Some(id) = self.session_id.take() {
                log::info!("CallCapture: session {} stopped, resources released", id);
            }
        }
        if self.state == CaptureState::Capturing {
            self.state = CaptureState::Stopped;
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.state == CaptureState::Capturing
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }
}

impl Drop for CallCapture {
    fn drop(&mut self) {
        self.stop_capture();
    }
}

/// Downmix multi-channel input to mono while applying the provided
/// converter, averaging each interleaved frame.
fn append_downmixed_samples<T, F>(buf: &mut Vec<f32>, data: &[T], channels: usize, mut convert: F)
where
    T: Copy,
    F: FnMut(T) -> f32,
{
    if channels <= 1 {
        buf.extend(data.iter().copied().map(&mut convert));
        return;
    }

    let mut acc = 0.0f32;
    let mut count = 0usize;
    for sample in data.iter().copied() {
        acc += convert(sample);
        count += 1;
        if count == channels {
            buf.push(acc / channels as f32);
            acc = 0.0;
            count = 0;
        }
    }
    if count > 0 {
        buf.push(acc / count as f32);
    }
}

/// One callback's worth of work. Muted means nothing at all happens - no
/// downmix, no resample, no send; that is a cost decision, not just a UI
/// gate. Unusable buffers are dropped (logged inside `frame_to_target`),
/// never propagated: a single bad frame must not tear down a live call.
fn process_input_block<T, F>(
    data: &[T],
    channels: usize,
    convert: F,
    native_rate: u32,
    muted: bool,
    scratch: &mut Vec<f32>,
    sink: &dyn FrameSink,
) where
    T: Copy,
    F: FnMut(T) -> f32,
{
    if muted {
        return;
    }

    scratch.clear();
    append_downmixed_samples(scratch, data, channels, convert);

    if let Some(pcm) = resample::frame_to_target(scratch, native_rate) {
        sink.send_realtime_frame(Frame::new(pcm));
    }
}
