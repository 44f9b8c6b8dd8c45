//! Speak-Anywhere Daemon: voice dictation for sway/Wayland desktops
//!
//! Runs as a background service. IPC clients (the `speak-anywhere` CLI,
//! compositor keybindings) drive the record/transcribe cycle over a Unix
//! socket; results land in the focused application and the history database.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use speak_anywhere_daemon::config::Config;
use speak_anywhere_daemon::reactor;

#[derive(Parser, Debug)]
#[command(name = "speak-anywhere-daemon", version, about = "Voice dictation daemon")]
struct Args {
    /// Run in the foreground (don't daemonize)
    #[arg(short, long)]
    foreground: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if !args.foreground {
        daemonize().context("failed to daemonize")?;
    }

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    let config = match &args.config {
        Some(path) => Config::load(path),
        None => Config::load_default(),
    };

    info!(
        "starting speak-anywhere v{} (backend: {} @ {})",
        env!("CARGO_PKG_VERSION"),
        config.backend.backend_type,
        config.backend.url
    );

    // Single-reactor design: everything multiplexes on one thread. The only
    // other threads are the audio driver callback and the per-stop
    // transcription worker.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;

    runtime.block_on(reactor::run_daemon(config))
}

/// Classic double-fork daemonization: detach from the controlling terminal
/// and point stdio at /dev/null. Must run before the runtime spins up.
fn daemonize() -> Result<()> {
    use nix::unistd::{dup2, fork, setsid, ForkResult};
    use std::os::fd::AsRawFd;

    match unsafe { fork() }.context("first fork failed")? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    setsid().context("setsid failed")?;

    // Second fork prevents reacquiring a controlling terminal.
    match unsafe { fork() }.context("second fork failed")? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    let devnull = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .context("failed to open /dev/null")?;
    let fd = devnull.as_raw_fd();
    for stdio in 0..=2 {
        dup2(fd, stdio).context("failed to redirect stdio")?;
    }

    Ok(())
}
