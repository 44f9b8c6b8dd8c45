//! speak-anywhere: CLI client for the dictation daemon
//!
//! Sends one command over the daemon's unix socket and renders the reply.
//! `stop` and `toggle` may receive a deferred result: the daemon first
//! acknowledges with a transcribing envelope, then sends the transcript (or
//! an error) on the same connection once the worker finishes.

mod client;

use clap::{Parser, Subcommand};
use serde_json::Value;
use speak_anywhere_ipc::protocol::Request;
use speak_anywhere_ipc::paths;
use std::process::ExitCode;

use crate::client::DaemonClient;

#[derive(Parser, Debug)]
#[command(name = "speak-anywhere", version, about = "Control the speak-anywhere dictation daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start recording
    Start {
        /// Delivery method: clipboard | type
        #[arg(long)]
        output: Option<String>,
    },
    /// Stop recording and transcribe
    Stop,
    /// Toggle recording
    Toggle {
        /// Delivery method: clipboard | type
        #[arg(long)]
        output: Option<String>,
    },
    /// Show daemon status
    Status,
    /// Show transcription history
    History {
        /// Number of entries
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                // Unknown command or bad arguments.
                ExitCode::FAILURE
            } else {
                // --help / --version.
                ExitCode::SUCCESS
            };
        }
    };

    let request = match cli.command {
        Command::Start { output } => Request::Start { output },
        Command::Stop => Request::Stop,
        Command::Toggle { output } => Request::Toggle { output },
        Command::Status => Request::Status,
        Command::History { limit } => Request::History { limit: Some(limit) },
    };

    let socket_path = paths::socket_path();
    let mut client = match DaemonClient::connect(&socket_path) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{e:#}");
            eprintln!("Is speak-anywhere-daemon running?");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = client.send(&request) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    let mut response = match client.recv() {
        Ok(response) => response,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    // Deferred result: wait for the follow-up envelope on the same
    // connection.
    if response["status"] == "transcribing" {
        if let Some(duration) = response["duration"].as_f64() {
            eprintln!("Transcribing {duration:.1}s of audio...");
        }
        response = match client.recv() {
            Ok(response) => response,
            Err(e) => {
                eprintln!("{e:#}");
                return ExitCode::FAILURE;
            }
        };
    }

    render(&request, &response)
}

fn render(request: &Request, response: &Value) -> ExitCode {
    let status = response["status"].as_str().unwrap_or("");

    if status == "error" {
        eprintln!("Error: {}", response["message"].as_str().unwrap_or("unknown error"));
        return ExitCode::FAILURE;
    }

    match request {
        Request::Status => {
            println!("State: {}", response["state"].as_str().unwrap_or("unknown"));
            if let Some(duration) = response["duration"].as_f64() {
                println!("Recording duration: {duration:.1}s");
            }
        }
        Request::History { .. } => {
            if let Some(entries) = response["entries"].as_array() {
                for entry in entries {
                    println!(
                        "[{}] {}",
                        entry["timestamp"].as_str().unwrap_or(""),
                        entry["text"].as_str().unwrap_or("")
                    );
                    if let Some(context) = entry["app_context"].as_str() {
                        if !context.is_empty() {
                            println!("  Context: {context}");
                        }
                    }
                }
            }
        }
        _ => {
            if let Some(text) = response["text"].as_str() {
                println!("{text}");
            } else {
                println!("OK");
            }
        }
    }

    ExitCode::SUCCESS
}
