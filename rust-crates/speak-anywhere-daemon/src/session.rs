//! Recording session state machine
//!
//! Exactly one of Idle / Recording / Transcribing at any time. The only
//! non-Idle transition is Recording → Transcribing; `set_idle` is the
//! unconditional way back. The window context is snapshotted when recording
//! starts and carried untouched until the transcript is stored. Nothing here
//! spawns the transcription worker; that is the daemon core's job.

use anyhow::{bail, Result};
use speak_anywhere_audio::{AudioCapture, RingBuffer};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use crate::sway::WindowContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Transcribing,
}

pub struct Session {
    ring: Arc<RingBuffer>,
    capture: Box<dyn AudioCapture>,
    state: SessionState,
    record_start: Option<Instant>,
    window: WindowContext,
}

impl Session {
    pub fn new(ring: Arc<RingBuffer>, capture: Box<dyn AudioCapture>) -> Self {
        Self {
            ring,
            capture,
            state: SessionState::Idle,
            record_start: None,
            window: WindowContext::default(),
        }
    }

    /// Begin recording with a snapshot of the focused window. Requires Idle;
    /// on failure the state is unchanged.
    pub fn start_recording(&mut self, window: WindowContext) -> Result<()> {
        if self.state != SessionState::Idle {
            bail!("cannot start recording, session is not idle");
        }

        self.ring.reset();
        self.capture.start()?;

        self.window = window;
        self.record_start = Some(Instant::now());
        self.state = SessionState::Recording;
        Ok(())
    }

    /// Stop capture and drain the buffered audio. Requires Recording; the
    /// returned samples may be empty when nothing reached the ring, in which
    /// case the caller transitions back to Idle.
    pub fn stop_recording(&mut self) -> Vec<i16> {
        if self.state != SessionState::Recording {
            warn!("stop_recording called while not recording");
            return Vec::new();
        }

        self.capture.stop();
        let samples = self.ring.drain_samples();
        self.state = SessionState::Transcribing;
        samples
    }

    /// Stop capture without transcribing (shutdown path).
    pub fn abort(&mut self) {
        if self.state == SessionState::Recording {
            self.capture.stop();
        }
        self.state = SessionState::Idle;
        self.record_start = None;
    }

    pub fn set_idle(&mut self) {
        self.state = SessionState::Idle;
        self.record_start = None;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Seconds since recording started, zero outside Recording.
    pub fn recording_duration(&self) -> f64 {
        match (self.state, self.record_start) {
            (SessionState::Recording, Some(start)) => start.elapsed().as_secs_f64(),
            _ => 0.0,
        }
    }

    pub fn window_context(&self) -> &WindowContext {
        &self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speak_anywhere_audio::AudioError;

    struct FakeCapture {
        capturing: bool,
        fail_start: bool,
    }

    impl FakeCapture {
        fn ok() -> Box<Self> {
            Box::new(Self {
                capturing: false,
                fail_start: false,
            })
        }

        fn failing() -> Box<Self> {
            Box::new(Self {
                capturing: false,
                fail_start: true,
            })
        }
    }

    impl AudioCapture for FakeCapture {
        fn start(&mut self) -> speak_anywhere_audio::Result<()> {
            if self.fail_start {
                return Err(AudioError::device("fake device unavailable"));
            }
            self.capturing = true;
            Ok(())
        }

        fn stop(&mut self) {
            self.capturing = false;
        }

        fn is_capturing(&self) -> bool {
            self.capturing
        }
    }

    fn session_with(capture: Box<dyn AudioCapture>) -> Session {
        Session::new(Arc::new(RingBuffer::new(1024)), capture)
    }

    fn window(app: &str) -> WindowContext {
        WindowContext {
            app_id: app.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_full_cycle() {
        let ring = Arc::new(RingBuffer::new(1024));
        let mut session = Session::new(Arc::clone(&ring), FakeCapture::ok());

        assert_eq!(session.state(), SessionState::Idle);
        session.start_recording(window("kitty")).unwrap();
        assert_eq!(session.state(), SessionState::Recording);
        assert_eq!(session.window_context().app_id, "kitty");
        assert!(session.recording_duration() >= 0.0);

        ring.write(&1i16.to_le_bytes());
        ring.write(&2i16.to_le_bytes());

        let samples = session.stop_recording();
        assert_eq!(samples, vec![1, 2]);
        assert_eq!(session.state(), SessionState::Transcribing);

        session.set_idle();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_start_requires_idle() {
        let mut session = session_with(FakeCapture::ok());
        session.start_recording(window("a")).unwrap();
        assert!(session.start_recording(window("b")).is_err());
        // Snapshot untouched by the failed attempt.
        assert_eq!(session.window_context().app_id, "a");
    }

    #[test]
    fn test_capture_failure_leaves_idle() {
        let mut session = session_with(FakeCapture::failing());
        assert!(session.start_recording(window("x")).is_err());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.recording_duration(), 0.0);
    }

    #[test]
    fn test_stop_outside_recording_is_empty() {
        let mut session = session_with(FakeCapture::ok());
        assert!(session.stop_recording().is_empty());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_set_idle_is_idempotent() {
        let mut session = session_with(FakeCapture::ok());
        session.set_idle();
        session.set_idle();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_ring_reset_on_start() {
        let ring = Arc::new(RingBuffer::new(1024));
        ring.write(&[1, 2, 3, 4]);

        let mut session = Session::new(Arc::clone(&ring), FakeCapture::ok());
        session.start_recording(window("x")).unwrap();
        assert_eq!(ring.available(), 0);
    }
}
