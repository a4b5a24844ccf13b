//! Command capture and speech-to-text.
//!
//! `CommandRecorder` owns the recording-window discipline: it drains the frame
//! queue for a fixed wall-clock duration, concatenates what arrived and hands
//! the buffer to the `SpeechRecognizer` collaborator. Every per-utterance
//! failure collapses to an empty string.

pub mod stub;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::buffering::{frame::concat_frames, FrameConsumer};
use crate::error::Result;
use crate::models::{ModelLoader, Slot};

/// Contract for speech-to-text backends.
pub trait SpeechRecognizer: Send {
    /// Recognise one mono 16-bit buffer captured at `sample_rate`.
    fn transcribe(&mut self, samples: &[i16], sample_rate: u32) -> Result<String>;
}

/// Captures one recording window and recognises it.
pub struct CommandRecorder {
    recognizer: Slot<Box<dyn SpeechRecognizer>>,
    sample_rate: u32,
    poll_interval: Duration,
    dump_dir: Option<PathBuf>,
}

impl CommandRecorder {
    pub fn new(sample_rate: u32, poll_interval: Duration, dump_dir: Option<PathBuf>) -> Self {
        Self {
            recognizer: Slot::Unloaded,
            sample_rate,
            poll_interval,
            dump_dir,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.recognizer.is_loaded()
    }

    pub fn load(&mut self, loader: &dyn ModelLoader) -> Result<()> {
        self.recognizer.ensure_loaded(|| loader.load_recognizer())?;
        Ok(())
    }

    pub fn unload(&mut self) {
        self.recognizer.unload();
    }

    /// Drain `consumer` for `duration` of wall-clock time and recognise the
    /// concatenated frames.
    ///
    /// Returns trimmed text, or an empty string when nothing was captured or
    /// recognition failed. The recognizer is not called for an empty window.
    pub fn record(&mut self, consumer: &mut FrameConsumer, duration: Duration) -> String {
        info!(seconds = duration.as_secs_f32(), "recording command");

        let mut frames = Vec::new();
        let start = Instant::now();
        while start.elapsed() < duration {
            match consumer.pop_frame() {
                Some(frame) => frames.push(frame),
                None => std::thread::sleep(self.poll_interval),
            }
        }

        if frames.is_empty() {
            debug!("recording window captured no frames");
            return String::new();
        }

        let samples = concat_frames(&frames);
        debug!(
            frames = frames.len(),
            samples = samples.len(),
            "recording complete"
        );

        if let Some(dir) = &self.dump_dir {
            if let Err(e) = dump_wav(dir, &samples, self.sample_rate) {
                warn!("failed to dump command audio: {e}");
            }
        }

        let Some(recognizer) = self.recognizer.get_mut() else {
            warn!("speech recognizer not loaded");
            return String::new();
        };

        match recognizer.transcribe(&samples, self.sample_rate) {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                error!("recognition failed: {e}");
                String::new()
            }
        }
    }
}

/// Write one recorded window as a 16-bit mono WAV named by capture time.
fn dump_wav(dir: &Path, samples: &[i16], sample_rate: u32) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!(
        "command-{}.wav",
        chrono::Local::now().format("%Y%m%d-%H%M%S%.3f")
    ));
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).map_err(anyhow::Error::from)?;
    for &sample in samples {
        writer.write_sample(sample).map_err(anyhow::Error::from)?;
    }
    writer.finalize().map_err(anyhow::Error::from)?;
    debug!(path = %path.display(), "command audio saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::{create_frame_queue, Frame};
    use crate::error::JarvisError;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    struct EchoLen {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl SpeechRecognizer for EchoLen {
        fn transcribe(&mut self, samples: &[i16], _sample_rate: u32) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(JarvisError::Recognition("intentional test failure".into()));
            }
            Ok(format!("  {} samples \n", samples.len()))
        }
    }

    fn recorder_with(fail: bool) -> (CommandRecorder, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut rec = CommandRecorder::new(16_000, Duration::from_millis(1), None);
        rec.recognizer = Slot::Loaded(Box::new(EchoLen {
            calls: Arc::clone(&calls),
            fail,
        }));
        (rec, calls)
    }

    #[test]
    fn zero_duration_skips_recognizer() {
        let (mut rec, calls) = recorder_with(false);
        let (mut prod, mut cons) = create_frame_queue(4, 8);
        prod.push_frame(&Frame::new(vec![1; 4]));
        assert_eq!(rec.record(&mut cons, Duration::ZERO), "");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_window_skips_recognizer() {
        let (mut rec, calls) = recorder_with(false);
        let (_prod, mut cons) = create_frame_queue(4, 8);
        assert_eq!(rec.record(&mut cons, Duration::from_millis(30)), "");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn queued_frames_are_recognised_and_trimmed() {
        let (mut rec, calls) = recorder_with(false);
        let (mut prod, mut cons) = create_frame_queue(4, 8);
        for _ in 0..3 {
            prod.push_frame(&Frame::new(vec![5; 4]));
        }
        assert_eq!(rec.record(&mut cons, Duration::from_millis(30)), "12 samples");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn recognition_failure_yields_empty_text() {
        let (mut rec, calls) = recorder_with(true);
        let (mut prod, mut cons) = create_frame_queue(4, 8);
        prod.push_frame(&Frame::new(vec![5; 4]));
        assert_eq!(rec.record(&mut cons, Duration::from_millis(20)), "");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dump_writes_readable_wav() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dump_wav(&dir.path().join("dumps"), &[0, 100, -100, 0], 16_000)
            .expect("dump wav");
        let reader = hound::WavReader::open(&path).expect("open wav");
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.len(), 4);
    }
}
