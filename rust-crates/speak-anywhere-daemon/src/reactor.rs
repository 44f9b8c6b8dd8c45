//! Single-threaded event loop
//!
//! One `select!` loop on a current-thread runtime multiplexes everything the
//! daemon reacts to: termination signals, new IPC connections, parsed client
//! commands, window focus changes and transcription-worker completion. All
//! business state stays inside this loop; spawned tasks only pump bytes into
//! the event channel.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use speak_anywhere_audio::{CpalCapture, RingBuffer};
use speak_anywhere_ipc::paths;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::{DaemonCore, Outcome, WorkerReport};
use crate::history::{HistoryStore, SqliteHistory};
use crate::ipc::{self, IpcServer};
use crate::output;
use crate::session::{Session, SessionState};
use crate::sway::{FocusEvents, SwayIpc, WindowContext};
use crate::whisper::{LanBackend, WhisperBackend};

/// Everything the pump tasks feed into the reactor.
pub enum Event {
    /// A parsed JSON command from a client.
    Command { id: u64, command: Value },
    /// The client sent bytes that are not valid JSON: protocol violation.
    Malformed { id: u64 },
    /// EOF or transport error on the client connection.
    Gone { id: u64 },
    /// The compositor reported a focus change.
    Focus(WindowContext),
}

pub struct Reactor {
    server: IpcServer,
    core: DaemonCore,

    clients: HashMap<u64, OwnedWriteHalf>,
    next_client_id: u64,

    events_tx: UnboundedSender<Event>,
    events_rx: UnboundedReceiver<Event>,
    worker_rx: UnboundedReceiver<WorkerReport>,

    running: bool,
}

impl Reactor {
    pub fn new(server: IpcServer, core: DaemonCore, worker_rx: UnboundedReceiver<WorkerReport>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            server,
            core,
            clients: HashMap::new(),
            next_client_id: 1,
            events_tx,
            events_rx,
            worker_rx,
            running: true,
        }
    }

    pub fn core_mut(&mut self) -> &mut DaemonCore {
        &mut self.core
    }

    /// Subscribe the reactor to the compositor's focus events.
    pub fn spawn_focus_watcher(&self, events: FocusEvents) {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let mut events = events;
            loop {
                match events.next_event().await {
                    Ok(Some(window)) => {
                        if tx.send(Event::Focus(window)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!("sway event stream ended: {e:#}");
                        break;
                    }
                }
            }
        });
    }

    /// Block until a termination signal arrives, then shut down cleanly.
    pub async fn run(&mut self) -> Result<()> {
        let mut sigint = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
        let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

        while self.running {
            tokio::select! {
                _ = sigint.recv() => {
                    info!("received SIGINT, shutting down");
                    self.running = false;
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down");
                    self.running = false;
                }
                accepted = self.server.accept() => match accepted {
                    Ok(stream) => self.register_client(stream),
                    Err(e) => warn!("accept failed: {e}"),
                },
                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event).await;
                }
                Some(report) = self.worker_rx.recv() => {
                    self.finish_transcription(report).await;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    fn register_client(&mut self, stream: UnixStream) {
        let id = self.next_client_id;
        self.next_client_id += 1;

        let (read_half, write_half) = stream.into_split();
        self.clients.insert(id, write_half);
        spawn_client_reader(id, read_half, self.events_tx.clone());
        debug!("client {id} connected");
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Command { id, command } => match self.core.handle_command(command) {
                Outcome::Reply(response) => self.send_to(id, &response).await,
                Outcome::Transcribing(response) => {
                    // The transcribing envelope goes out immediately; the
                    // result envelope follows on the same connection once
                    // the worker reports in.
                    self.send_to(id, &response).await;
                    self.core.add_waiting_client(id);
                }
            },
            Event::Malformed { id } => {
                debug!("client {id}: protocol violation, dropping");
                self.drop_client(id);
            }
            Event::Gone { id } => {
                debug!("client {id} disconnected");
                self.drop_client(id);
            }
            Event::Focus(window) => self.core.set_focused_window(window),
        }
    }

    async fn finish_transcription(&mut self, report: WorkerReport) {
        let (response, waiting) = self.core.on_transcription_complete(report);
        for id in waiting {
            self.send_to(id, &response).await;
        }
    }

    async fn send_to(&mut self, id: u64, response: &Value) {
        let Some(writer) = self.clients.get_mut(&id) else {
            return;
        };
        if let Err(e) = ipc::send_response(writer, response).await {
            debug!("client {id}: write failed ({e}), dropping");
            self.drop_client(id);
        }
    }

    fn drop_client(&mut self, id: u64) {
        self.clients.remove(&id);
        self.core.remove_waiting_client(id);
    }

    async fn shutdown(&mut self) {
        self.core.abort_recording();

        if self.core.session_state() == SessionState::Transcribing {
            info!("waiting for pending transcription to complete");
            if let Some(report) = self.worker_rx.recv().await {
                self.finish_transcription(report).await;
            }
        }

        self.clients.clear();
        // The socket file is unlinked when the server drops.
    }
}

/// Pump one client's read half: buffer until newline, parse, forward.
fn spawn_client_reader(id: u64, read_half: OwnedReadHalf, tx: UnboundedSender<Event>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match serde_json::from_str::<Value>(&line) {
                    Ok(command) => {
                        if tx.send(Event::Command { id, command }).is_err() {
                            break;
                        }
                    }
                    Err(_) => {
                        let _ = tx.send(Event::Malformed { id });
                        break;
                    }
                },
                Ok(None) | Err(_) => {
                    let _ = tx.send(Event::Gone { id });
                    break;
                }
            }
        }
    });
}

/// Assemble the production daemon and run it until a signal stops it.
pub async fn run_daemon(config: Config) -> Result<()> {
    if config.backend.backend_type != "lan" {
        bail!("unknown backend type: {}", config.backend.backend_type);
    }

    let ring = Arc::new(RingBuffer::new(config.audio.ring_buffer_bytes()));
    let capture = Box::new(CpalCapture::new(Arc::clone(&ring), config.audio.sample_rate));
    let session = Session::new(ring, capture);

    let backend: Arc<dyn WhisperBackend> = Arc::new(LanBackend::new(
        config.backend.url.clone(),
        config.backend.api_format.clone(),
        config.backend.language.clone(),
    ));

    let history: Arc<dyn HistoryStore> =
        Arc::new(SqliteHistory::open(&paths::data_dir().join("history.db")));

    let (worker_tx, worker_rx) = mpsc::unbounded_channel();
    let core = DaemonCore::new(
        config,
        session,
        backend,
        history,
        Box::new(output::make_output),
        worker_tx,
    );

    let server = IpcServer::bind(&paths::socket_path())?;
    let mut reactor = Reactor::new(server, core, worker_rx);

    // Window context is best-effort: no compositor, no context.
    match SwayIpc::connect().await {
        Ok(mut sway) => {
            let focused = sway.get_focused_window().await;
            reactor.core_mut().set_focused_window(focused);
            match sway.subscribe_focus_events().await {
                Ok(events) => {
                    reactor.spawn_focus_watcher(events);
                    info!("sway IPC connected");
                }
                Err(e) => warn!("sway focus events unavailable: {e:#}"),
            }
        }
        Err(e) => info!("sway IPC not available, window context disabled: {e:#}"),
    }

    reactor.run().await
}
