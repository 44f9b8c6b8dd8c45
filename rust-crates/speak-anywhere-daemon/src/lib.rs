//! Speak-Anywhere daemon library
//!
//! Session engine of the dictation daemon: audio capture into a lock-free
//! ring buffer, a single-threaded reactor multiplexing IPC clients, window
//! focus events, signals and the transcription worker, and the deferred
//! response protocol toward waiting clients.
//!
//! The modules are exported for integration testing; the binary entry point
//! lives in `main.rs`.

pub mod agents;
pub mod config;
pub mod core;
pub mod history;
pub mod ipc;
pub mod output;
pub mod reactor;
pub mod session;
pub mod sway;
pub mod wav;
pub mod whisper;
