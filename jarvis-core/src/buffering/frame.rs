//! Fixed-length audio frame handed from the frame queue to the engine.

/// One block of mono 16-bit PCM samples.
///
/// Every frame popped from a [`FrameConsumer`](super::FrameConsumer) has exactly
/// the configured frame length. Frames are immutable once built.
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

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }

    /// Duration of this frame in seconds at `sample_rate`.
    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        self.samples.len() as f64 / sample_rate as f64
    }
}

impl From<Vec<i16>> for Frame {
    fn from(samples: Vec<i16>) -> Self {
        Self::new(samples)
    }
}

/// Concatenate frames in order into one contiguous sample buffer.
pub fn concat_frames(frames: &[Frame]) -> Vec<i16> {
    let total: usize = frames.iter().map(Frame::len).sum();
    let mut out = Vec::with_capacity(total);
    for frame in frames {
        out.extend_from_slice(frame.samples());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_preserves_order() {
        let frames = vec![Frame::new(vec![1, 2]), Frame::new(vec![3]), Frame::new(vec![4, 5])];
        assert_eq!(concat_frames(&frames), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn duration_of_standard_frame() {
        let frame = Frame::new(vec![0; 512]);
        assert!((frame.duration_secs(16_000) - 0.032).abs() < 1e-9);
    }
}
