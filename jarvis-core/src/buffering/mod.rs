//! Lock-free SPSC frame queue between the capture callback and the engine.
//!
//! The ring stores raw `i16` samples. The producer (audio callback thread)
//! writes whatever block size the device delivers; the consumer (engine
//! thread) re-frames by popping exactly `frame_length` samples at a time.
//!
//! ## Overflow policy
//!
//! Drop newest, whole buffer. When the ring cannot hold an entire callback
//! buffer, that buffer is discarded and `buffers_dropped` is incremented.
//! Partial writes never happen, so the producer never blocks and the audio
//! already queued stays contiguous.

pub mod frame;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

pub use frame::Frame;

/// Default ring size in frames: 256 x 512 samples ≈ 8.2 s at 16 kHz.
pub const DEFAULT_CAPACITY_FRAMES: usize = 256;

/// Counters shared by both halves of one queue and the device error callback.
#[derive(Debug, Default)]
pub struct QueueStats {
    pub samples_pushed: AtomicUsize,
    pub frames_popped: AtomicUsize,
    pub buffers_dropped: AtomicUsize,
    pub stream_errors: AtomicUsize,
}

impl QueueStats {
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            samples_pushed: self.samples_pushed.load(Ordering::Relaxed),
            frames_popped: self.frames_popped.load(Ordering::Relaxed),
            buffers_dropped: self.buffers_dropped.load(Ordering::Relaxed),
            stream_errors: self.stream_errors.load(Ordering::Relaxed),
        }
    }

    pub fn record_stream_error(&self) {
        self.stream_errors.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub samples_pushed: usize,
    pub frames_popped: usize,
    pub buffers_dropped: usize,
    pub stream_errors: usize,
}

/// Producer half, owned by the audio callback.
pub struct FrameProducer {
    inner: ringbuf::HeapProd<i16>,
    stats: Arc<QueueStats>,
}

impl FrameProducer {
    /// Push one callback buffer. Returns `false` if it was dropped.
    ///
    /// Wait-free and allocation-free.
    pub fn push_samples(&mut self, samples: &[i16]) -> bool {
        if samples.is_empty() {
            return true;
        }
        if self.inner.vacant_len() < samples.len() {
            self.stats.buffers_dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let written = self.inner.push_slice(samples);
        self.stats
            .samples_pushed
            .fetch_add(written, Ordering::Relaxed);
        true
    }

    pub fn push_frame(&mut self, frame: &Frame) -> bool {
        self.push_samples(frame.samples())
    }

    pub fn stats(&self) -> &Arc<QueueStats> {
        &self.stats
    }
}

/// Consumer half, owned by the engine.
pub struct FrameConsumer {
    inner: ringbuf::HeapCons<i16>,
    frame_length: usize,
    stats: Arc<QueueStats>,
}

impl FrameConsumer {
    /// Pop the oldest complete frame, or `None` immediately if fewer than
    /// `frame_length` samples are queued.
    pub fn pop_frame(&mut self) -> Option<Frame> {
        if self.inner.occupied_len() < self.frame_length {
            return None;
        }
        let mut samples = vec![0i16; self.frame_length];
        let n = self.inner.pop_slice(&mut samples);
        debug_assert_eq!(n, self.frame_length);
        self.stats.frames_popped.fetch_add(1, Ordering::Relaxed);
        Some(Frame::new(samples))
    }

    /// Number of complete frames currently queued.
    pub fn pending_frames(&self) -> usize {
        self.inner.occupied_len() / self.frame_length
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    pub fn stats(&self) -> &Arc<QueueStats> {
        &self.stats
    }
}

/// Create a matched producer/consumer pair holding up to `capacity_frames`
/// frames of `frame_length` samples.
///
/// # Panics
/// Panics if `frame_length` or `capacity_frames` is zero.
pub fn create_frame_queue(
    frame_length: usize,
    capacity_frames: usize,
) -> (FrameProducer, FrameConsumer) {
    create_frame_queue_with_stats(frame_length, capacity_frames, Arc::default())
}

/// Like [`create_frame_queue`] but accumulating into existing counters.
pub fn create_frame_queue_with_stats(
    frame_length: usize,
    capacity_frames: usize,
    stats: Arc<QueueStats>,
) -> (FrameProducer, FrameConsumer) {
    assert!(frame_length > 0, "frame_length must be non-zero");
    assert!(capacity_frames > 0, "capacity_frames must be non-zero");
    let (prod, cons) = HeapRb::<i16>::new(frame_length * capacity_frames).split();
    (
        FrameProducer {
            inner: prod,
            stats: Arc::clone(&stats),
        },
        FrameConsumer {
            inner: cons,
            frame_length,
            stats,
        },
    )
}
