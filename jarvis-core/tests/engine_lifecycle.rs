use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use jarvis_core::recognize::stub::StubRecognizer;
use jarvis_core::testing::{FakeBackend, FakeLoader};
use jarvis_core::{EngineConfig, EngineState, EngineStatus, JarvisError, VoiceEngine};
use tokio::sync::broadcast::error::TryRecvError;

fn build(backend: &FakeBackend, loader: &FakeLoader) -> VoiceEngine {
    VoiceEngine::from_backend(EngineConfig::default(), backend, Arc::new(loader.clone()))
        .expect("fake backend binds the default device")
}

fn assert_stream_matches_state(engine: &VoiceEngine, backend: &FakeBackend) {
    let listening = engine.state() == EngineState::Listening;
    assert_eq!(engine.is_capturing(), listening, "state {:?}", engine.state());
    assert_eq!(
        backend.opens() - backend.closes(),
        usize::from(listening),
        "open/close imbalance in state {:?}",
        engine.state()
    );
}

#[test]
fn stream_open_iff_listening_across_toggles() {
    let backend = FakeBackend::new();
    let loader = FakeLoader::new(backend.log());
    let mut engine = build(&backend, &loader);

    let script = [true, true, false, false, true, false, true, true, false];
    for (step, enabled) in script.into_iter().enumerate() {
        engine.set_mic_state(enabled).expect("toggle succeeds");
        assert_stream_matches_state(&engine, &backend);
        if enabled {
            engine.speak(&format!("step {step}"), None);
            assert_stream_matches_state(&engine, &backend);
        }
    }

    engine.cleanup();
    assert_stream_matches_state(&engine, &backend);
}

#[test]
fn inactive_engine_never_activates_or_records() {
    let backend = FakeBackend::new();
    let loader = FakeLoader::new(backend.log());
    let mut engine = build(&backend, &loader);

    assert!(!engine.check_activation());
    assert_eq!(engine.record_command(Duration::from_millis(20)), "");
    engine.speak("nobody hears this", None);

    assert!(backend.log().entries().is_empty());
    assert_eq!(loader.recognize_calls(), 0);
}

#[test]
fn zero_duration_recording_skips_recognition() {
    let backend = FakeBackend::new();
    let loader = FakeLoader::new(backend.log());
    let mut engine = build(&backend, &loader);
    engine.set_mic_state(true).unwrap();

    let feeder = backend.feeder();
    assert!(feeder.push_constant(100, 512));

    assert_eq!(engine.record_command(Duration::ZERO), "");
    assert_eq!(loader.recognize_calls(), 0);
}

#[test]
fn wake_word_fires_on_scripted_frame_only() {
    let backend = FakeBackend::new();
    let mut loader = FakeLoader::new(backend.log());
    loader.wake_on = vec![5];
    let mut engine = build(&backend, &loader);
    engine.set_mic_state(true).unwrap();

    let feeder = backend.feeder();
    for _ in 0..10 {
        assert!(feeder.push_constant(0, 512));
    }

    let hits: Vec<bool> = (0..10).map(|_| engine.check_activation()).collect();
    let fired: Vec<usize> = hits
        .iter()
        .enumerate()
        .filter_map(|(i, hit)| hit.then_some(i + 1))
        .collect();
    assert_eq!(fired, vec![5]);

    // Queue drained: no frame, no activation, no blocking.
    let start = Instant::now();
    assert!(!engine.check_activation());
    assert!(start.elapsed() < Duration::from_millis(50));
    assert_eq!(engine.diagnostics().frames_popped, 10);
}

#[test]
fn recording_window_collects_frames_arriving_during_it() {
    let backend = FakeBackend::new();
    let loader = FakeLoader::new(backend.log());
    let mut engine = build(&backend, &loader);
    engine.set_mic_state(true).unwrap();

    let feeder = backend.feeder();
    let producer = thread::spawn(move || {
        for _ in 0..40 {
            assert!(feeder.push_constant(250, 512), "queue rejected a frame");
            thread::sleep(Duration::from_millis(40));
        }
    });

    let start = Instant::now();
    let text = engine.record_command(Duration::from_secs(2));
    let elapsed = start.elapsed();
    producer.join().expect("producer thread panicked");

    assert_eq!(text, StubRecognizer::canned_text(40 * 512, 16_000));
    assert_eq!(text, "[stub: 20480 samples @ 16000 Hz]");
    assert!(elapsed >= Duration::from_secs(2), "returned early: {elapsed:?}");
    assert_eq!(loader.recognize_calls(), 1);
}

#[test]
fn speak_closes_capture_around_playback() {
    let backend = FakeBackend::new();
    let loader = FakeLoader::new(backend.log());
    let mut engine = build(&backend, &loader);
    engine.set_mic_state(true).unwrap();

    engine.speak("Yes, sir?", None);

    assert_eq!(
        backend.log().entries(),
        vec![
            "open:default",
            "close:default",
            "synthesize",
            "play",
            "open:default"
        ]
    );
    assert_eq!(engine.state(), EngineState::Listening);
    assert!(engine.is_capturing());
}

#[test]
fn speak_reopens_capture_when_synthesis_fails() {
    let backend = FakeBackend::new();
    let mut loader = FakeLoader::new(backend.log());
    loader.fail_synthesis = true;
    let mut engine = build(&backend, &loader);
    engine.set_mic_state(true).unwrap();

    engine.speak("this will not render", None);

    assert_eq!(
        backend.log().entries(),
        vec!["open:default", "close:default", "synthesize", "open:default"]
    );
    assert_eq!(engine.state(), EngineState::Listening);
}

#[test]
fn failed_reopen_after_speaking_leaves_engine_inactive() {
    let backend = FakeBackend::new();
    let loader = FakeLoader::new(backend.log());
    let mut engine = build(&backend, &loader);
    let mut status = engine.subscribe_status();
    engine.set_mic_state(true).unwrap();

    backend.fail_next_open();
    engine.speak("goodbye microphone", None);

    assert_eq!(engine.state(), EngineState::Inactive);
    assert!(!engine.is_capturing());

    let mut last = None;
    loop {
        match status.try_recv() {
            Ok(ev) => last = Some(ev),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    let last = last.expect("status events were published");
    assert_eq!(last.status, EngineStatus::Error);
    assert!(last.detail.is_some());

    // Enabling again recovers.
    engine.set_mic_state(true).unwrap();
    assert!(engine.is_active());
}

#[test]
fn cleanup_is_idempotent_and_releases_everything() {
    let backend = FakeBackend::new();
    let loader = FakeLoader::new(backend.log());
    let mut engine = build(&backend, &loader);
    engine.set_mic_state(true).unwrap();
    assert_eq!(loader.live_handles(), 3);

    engine.cleanup();
    engine.cleanup();

    assert_eq!(loader.live_handles(), 0);
    assert!(!engine.is_capturing());
    assert_eq!(backend.opens(), backend.closes());
    assert!(matches!(
        engine.set_mic_state(true),
        Err(JarvisError::Released)
    ));
    assert_eq!(backend.opens(), 1);
}

#[test]
fn open_failure_unloads_collaborators() {
    let backend = FakeBackend::new();
    let loader = FakeLoader::new(backend.log());
    let mut engine = build(&backend, &loader);

    backend.fail_next_open();
    assert!(engine.set_mic_state(true).is_err());

    assert_eq!(engine.state(), EngineState::Inactive);
    assert_eq!(loader.live_handles(), 0);
    assert!(!engine.models_loaded());
}

#[test]
fn fresh_queue_on_every_open() {
    let backend = FakeBackend::new();
    let mut loader = FakeLoader::new(backend.log());
    loader.wake_on = vec![1, 2, 3, 4, 5, 6];
    let mut engine = build(&backend, &loader);
    let feeder = backend.feeder();

    engine.set_mic_state(true).unwrap();
    assert!(feeder.push_constant(0, 512));
    engine.set_mic_state(false).unwrap();
    engine.set_mic_state(true).unwrap();

    // The frame queued before the restart is gone.
    assert!(!engine.check_activation());
}
