//! Daemon core: command dispatch and worker lifecycle
//!
//! Owns all long-lived business state (session, cached focused window,
//! waiting-client registry, the in-flight worker) and is only ever touched
//! from the reactor. The transcription worker is a fresh thread per stop; it
//! owns the samples and the context snapshot by value and reports back over
//! the notifier channel, after which the reactor hands the report to
//! [`DaemonCore::on_transcription_complete`]. The worker handle is joined
//! there, before the result is consumed.

use serde_json::{json, Value};
use speak_anywhere_ipc::protocol::{Request, DEFAULT_HISTORY_LIMIT};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::agents::AgentDetector;
use crate::config::Config;
use crate::history::HistoryStore;
use crate::output::{self, OutputMethod};
use crate::session::{Session, SessionState};
use crate::sway::WindowContext;
use crate::whisper::{BackendError, TranscriptResult, WhisperBackend};

/// How a command is answered: immediately, or with the transcribing envelope
/// now and a result envelope once the worker finishes.
#[derive(Debug)]
pub enum Outcome {
    Reply(Value),
    Transcribing(Value),
}

/// Everything the worker hands back to the reactor.
pub struct WorkerReport {
    pub result: Result<TranscriptResult, BackendError>,
    pub context: WindowContext,
    pub output_method: String,
}

/// Injection point for output delivery, so tests can observe deliveries
/// without spawning clipboard tools.
pub type OutputFactory = Box<dyn Fn(&str, bool) -> Box<dyn OutputMethod>>;

pub struct DaemonCore {
    config: Config,
    session: Session,
    detector: AgentDetector,
    backend: Arc<dyn WhisperBackend>,
    history: Arc<dyn HistoryStore>,
    output_factory: OutputFactory,

    worker_tx: UnboundedSender<WorkerReport>,
    worker: Option<JoinHandle<()>>,

    focused_window: WindowContext,
    pending_output_method: String,
    waiting_clients: Vec<u64>,
}

impl DaemonCore {
    pub fn new(
        config: Config,
        session: Session,
        backend: Arc<dyn WhisperBackend>,
        history: Arc<dyn HistoryStore>,
        output_factory: OutputFactory,
        worker_tx: UnboundedSender<WorkerReport>,
    ) -> Self {
        let detector = AgentDetector::new(config.agents.clone());
        Self {
            config,
            session,
            detector,
            backend,
            history,
            output_factory,
            worker_tx,
            worker: None,
            focused_window: WindowContext::default(),
            pending_output_method: String::new(),
            waiting_clients: Vec::new(),
        }
    }

    /// Dispatch one parsed JSON command.
    pub fn handle_command(&mut self, command: Value) -> Outcome {
        let request: Request = match serde_json::from_value(command) {
            Ok(request) => request,
            Err(_) => {
                return Outcome::Reply(json!({"status": "error", "message": "unknown command"}));
            }
        };

        match request {
            Request::Start { output } => Outcome::Reply(self.handle_start(output)),
            Request::Stop => self.handle_stop(),
            Request::Toggle { output } => {
                if self.session.state() == SessionState::Recording {
                    self.handle_stop()
                } else {
                    Outcome::Reply(self.handle_start(output))
                }
            }
            Request::Status => Outcome::Reply(self.handle_status()),
            Request::History { limit } => Outcome::Reply(self.handle_history(limit)),
        }
    }

    fn handle_start(&mut self, output: Option<String>) -> Value {
        if self.session.state() != SessionState::Idle {
            return json!({"status": "error", "message": "already recording or transcribing"});
        }

        self.pending_output_method =
            output.unwrap_or_else(|| self.config.output.default_method.clone());

        let window = self.enrich_window_context(self.focused_window.clone());
        if let Err(e) = self.session.start_recording(window) {
            error!("failed to start recording: {e:#}");
            return json!({"status": "error", "message": "failed to start recording"});
        }

        let context = &self.session.window_context().context;
        if context.is_empty() {
            info!("recording started");
        } else {
            info!("recording started ({context})");
        }
        json!({"status": "ok", "message": "recording"})
    }

    fn handle_stop(&mut self) -> Outcome {
        if self.session.state() != SessionState::Recording {
            return Outcome::Reply(json!({"status": "error", "message": "not recording"}));
        }

        let samples = self.session.stop_recording();
        if samples.is_empty() {
            self.session.set_idle();
            return Outcome::Reply(json!({"status": "error", "message": "no audio captured"}));
        }

        let duration = samples.len() as f64 / self.config.audio.sample_rate as f64;
        info!("recording stopped, {duration:.1}s audio, transcribing");

        let context = self.session.window_context().clone();
        if let Err(e) = self.start_transcription(samples, context, self.pending_output_method.clone()) {
            error!("failed to start transcription worker: {e:#}");
            self.session.set_idle();
            return Outcome::Reply(json!({"status": "error", "message": "failed to start transcription"}));
        }

        Outcome::Transcribing(json!({"status": "transcribing", "duration": duration}))
    }

    fn handle_status(&self) -> Value {
        match self.session.state() {
            SessionState::Idle => json!({"status": "ok", "state": "idle"}),
            SessionState::Recording => json!({
                "status": "ok",
                "state": "recording",
                "duration": self.session.recording_duration(),
            }),
            SessionState::Transcribing => json!({"status": "ok", "state": "transcribing"}),
        }
    }

    fn handle_history(&self, limit: Option<i64>) -> Value {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).max(0);
        let entries = self.history.recent(limit);
        json!({"status": "ok", "entries": entries})
    }

    fn start_transcription(
        &mut self,
        samples: Vec<i16>,
        context: WindowContext,
        output_method: String,
    ) -> std::io::Result<()> {
        let backend = Arc::clone(&self.backend);
        let tx = self.worker_tx.clone();
        let sample_rate = self.config.audio.sample_rate;

        let handle = std::thread::Builder::new()
            .name("transcribe".to_string())
            .spawn(move || {
                let result = backend.transcribe(&samples, sample_rate);
                // The reactor may already be gone on shutdown races; the
                // report is then dropped with the channel.
                let _ = tx.send(WorkerReport {
                    result,
                    context,
                    output_method,
                });
            })?;

        self.worker = Some(handle);
        Ok(())
    }

    /// Consume a worker report: deliver the text, store history, build the
    /// result envelope and drain the waiting-client list. Returns the
    /// envelope and the clients that should receive it.
    pub fn on_transcription_complete(&mut self, report: WorkerReport) -> (Value, Vec<u64>) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("transcription worker panicked");
            }
        }

        let response = match report.result {
            Ok(transcript) => self.finish_transcript(transcript, &report.context, &report.output_method),
            Err(e) => {
                warn!("transcription failed: {e}");
                json!({"status": "error", "message": e.to_string()})
            }
        };

        self.session.set_idle();
        let waiting = std::mem::take(&mut self.waiting_clients);
        (response, waiting)
    }

    fn finish_transcript(
        &mut self,
        transcript: TranscriptResult,
        context: &WindowContext,
        output_method: &str,
    ) -> Value {
        info!(
            "transcription complete: {:.1}s processing, {} chars",
            transcript.processing_s,
            transcript.text.len()
        );

        if !transcript.text.is_empty() {
            let is_terminal = output::is_terminal_app(context.app_name());
            let output = (self.output_factory)(output_method, is_terminal);
            if let Err(e) = output.deliver(&transcript.text) {
                // The transcript is still valid; the response and history
                // proceed regardless.
                warn!("output delivery failed: {e}");
            }
        }

        if !self.history.insert(
            &transcript.text,
            transcript.duration_s,
            transcript.processing_s,
            context,
            &self.config.backend.backend_type,
        ) {
            debug!("history entry not recorded");
        }

        json!({
            "status": "ok",
            "text": transcript.text,
            "duration": transcript.duration_s,
            "processing_time": transcript.processing_s,
        })
    }

    /// Attach agent detection to a window snapshot and compose the
    /// human-readable context string.
    fn enrich_window_context(&self, mut window: WindowContext) -> WindowContext {
        if window.pid > 0 {
            let app = window.app_name().to_string();
            match self.detector.detect(window.pid) {
                Some(found) => {
                    window.context = format!("{} code on {}", found.agent, app);
                    window.agent = found.agent;
                    window.working_dir = found.working_dir;
                }
                None => window.context = app,
            }
        }
        window
    }

    pub fn add_waiting_client(&mut self, id: u64) {
        self.waiting_clients.push(id);
    }

    pub fn remove_waiting_client(&mut self, id: u64) {
        self.waiting_clients.retain(|&c| c != id);
    }

    pub fn set_focused_window(&mut self, window: WindowContext) {
        self.focused_window = window;
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Shutdown path: stop capture without transcribing.
    pub fn abort_recording(&mut self) {
        if self.session.state() == SessionState::Recording {
            self.session.abort();
        }
    }
}
