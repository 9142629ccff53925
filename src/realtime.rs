//! Realtime frame hand-off between the capture callback and the live session
//!
//! The capture callback runs on the audio thread and must never block, so
//! frames cross into async land through a bounded single-slot channel: at
//! most one frame is ever pending, and a frame that finds the slot full is
//! counted and dropped. Audio frames are inherently lossy and
//! latency-sensitive - a stale frame is worth less than no frame.
//!
//! A channel is bound to one credential when it is opened and keeps it for
//! its whole life; frames never go through per-call credential selection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::dispatch::protocol::RealtimeAudioInput;
use crate::dispatch::SelectedCredential;

/// At most this many frames wait in the channel. One: a frame is consumed
/// exactly once and never buffered further.
pub const PENDING_FRAME_LIMIT: usize = 1;

/// One fixed-length buffer of 16-bit PCM samples at the target rate,
/// produced by a single capture callback and consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    samples: Vec<i16>,
}

impl Frame {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of this frame in milliseconds at the given sample rate.
    pub fn duration_ms(&self, sample_rate: u32) -> u64 {
        if sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1000) / sample_rate as u64
    }

    /// Encode into the live surface's realtime-input message.
    pub fn to_realtime_input(&self) -> RealtimeAudioInput {
        RealtimeAudioInput::from_samples(&self.samples)
    }
}

/// Anything that accepts realtime frames without blocking the caller.
pub trait FrameSink: Send + Sync {
    /// Fire-and-forget: implementations must return promptly and must not
    /// panic; delivery failures are theirs to log.
    fn send_realtime_frame(&self, frame: Frame);
}

/// Sending half of a realtime channel. Cheap to clone into the capture
/// callback.
#[derive(Clone)]
pub struct RealtimeChannel {
    tx: mpsc::Sender<Frame>,
    nickname: String,
    sent: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl RealtimeChannel {
    /// Nickname of the credential this channel was bound to at open time.
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Frames accepted by the channel so far.
    pub fn sent_frames(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Frames discarded because the single pending slot was occupied or the
    /// consumer went away.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl FrameSink for RealtimeChannel {
    fn send_realtime_frame(&self, frame: Frame) {
        match self.tx.try_send(frame) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                // First drop is worth a warning; after that, sample the log.
                if dropped == 1 || dropped % 50 == 0 {
                    log::warn!(
                        "realtime sink full; {} frame(s) dropped so far",
                        dropped
                    );
                }
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!("realtime sink closed; frame discarded");
            }
        }
    }
}

/// Receiving half: consumed by the live-session collaborator that owns the
/// actual socket. Carries the bound credential so the session can
/// authenticate without re-selecting.
pub struct RealtimeReceiver {
    rx: mpsc::Receiver<Frame>,
    credential: SelectedCredential,
}

impl RealtimeReceiver {
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    pub fn credential(&self) -> &SelectedCredential {
        &self.credential
    }
}

/// Build a realtime channel bound to `credential`.
pub(crate) fn channel(credential: SelectedCredential) -> (RealtimeChannel, RealtimeReceiver) {
    let (tx, rx) = mpsc::channel(PENDING_FRAME_LIMIT);
    let channel = RealtimeChannel {
        tx,
        nickname: credential.nickname.clone(),
        sent: Arc::new(AtomicU64::new(0)),
        dropped: Arc::new(AtomicU64::new(0)),
    };
    let receiver = RealtimeReceiver { rx, credential };
    (channel, receiver)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credential() -> SelectedCredential {
        use crate::dispatch::{Credential, CredentialPool};
        let pool = CredentialPool::new(vec![Credential::new(
            "PRIMARY",
            "test-secret-key-0123456789abcdef",
        )]);
        pool.select().unwrap()
    }

    #[test]
    fn frame_duration() {
        let frame = Frame::new(vec![0i16; 16_000]);
        assert_eq!(frame.duration_ms(16_000), 1000);
        assert_eq!(frame.duration_ms(0), 0);
    }

    #[tokio::test]
    async fn frames_flow_through_the_channel() {
        let (sink, mut receiver) = channel(test_credential());
        sink.send_realtime_frame(Frame::new(vec![1, 2, 3]));

        let frame = receiver.recv().await.unwrap();
        assert_eq!(frame.samples(), &[1, 2, 3]);
        assert_eq!(sink.sent_frames(), 1);
        assert_eq!(sink.dropped_frames(), 0);
    }

    #[tokio::test]
    async fn overflow_is_dropped_not_buffered() {
        let (sink, mut receiver) = channel(test_credential());

        // First frame occupies the single pending slot; the next two are lost.
        sink.send_realtime_frame(Frame::new(vec![1]));
        sink.send_realtime_frame(Frame::new(vec![2]));
        sink.send_realtime_frame(Frame::new(vec![3]));

        assert_eq!(sink.sent_frames(), 1);
        assert_eq!(sink.dropped_frames(), 2);

        assert_eq!(receiver.recv().await.unwrap().samples(), &[1]);
        assert!(receiver.try_recv().is_none());
    }

    #[tokio::test]
    async fn closed_receiver_discards_quietly() {
        let (sink, receiver) = channel(test_credential());
        drop(receiver);

        // Must not panic or block.
        sink.send_realtime_frame(Frame::new(vec![1]));
        assert_eq!(sink.dropped_frames(), 1);
    }

    #[test]
    fn channel_is_bound_to_the_selected_credential() {
        let credential = test_credential();
        let nickname = credential.nickname.clone();
        let (sink, receiver) = channel(credential);
        assert_eq!(sink.nickname(), nickname);
        assert_eq!(receiver.credential().nickname, nickname);
    }
}
