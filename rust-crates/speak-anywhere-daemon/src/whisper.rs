//! Remote transcription backend
//!
//! Speaks two multipart dialects: the whisper.cpp server (`POST /inference`)
//! and OpenAI-compatible services (`POST /v1/audio/transcriptions`). The
//! call is blocking and runs on the dedicated transcription worker thread,
//! never on the reactor.

use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use crate::wav;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// A finished transcription, immutable once produced.
#[derive(Debug, Clone)]
pub struct TranscriptResult {
    pub text: String,
    /// Length of the submitted audio in seconds.
    pub duration_s: f64,
    /// Wall-clock time spent in the remote call.
    pub processing_s: f64,
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("empty audio")]
    EmptyAudio,

    #[error("wav encoding failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("invalid JSON in response: {0}")]
    MalformedReply(#[source] serde_json::Error),

    #[error("server error: {0}")]
    Server(String),

    #[error("unexpected response: {0}")]
    UnexpectedReply(String),
}

/// Behavior contract for transcription so tests (and future local engines)
/// can replace the network client.
pub trait WhisperBackend: Send + Sync {
    fn transcribe(&self, samples: &[i16], sample_rate: u32) -> Result<TranscriptResult, BackendError>;
}

/// Backend reaching a whisper server over the LAN.
pub struct LanBackend {
    url: String,
    api_format: String,
    language: String,
}

impl LanBackend {
    pub fn new(url: String, api_format: String, language: String) -> Self {
        Self {
            url,
            api_format,
            language,
        }
    }

    fn build_form(&self, wav_bytes: Vec<u8>) -> Result<(String, reqwest::blocking::multipart::Form), BackendError> {
        use reqwest::blocking::multipart::{Form, Part};

        let file_part = Part::bytes(wav_bytes)
            .file_name("audio.wav")
            .mime_str("audio/wav")?;

        if self.api_format == "openai" {
            let endpoint = format!("{}/v1/audio/transcriptions", self.url);
            let form = Form::new()
                .part("file", file_part)
                .text("model", "whisper-1")
                .text("language", self.language.clone())
                .text("response_format", "json");
            Ok((endpoint, form))
        } else {
            // whisper.cpp server format
            let endpoint = format!("{}/inference", self.url);
            let mut form = Form::new()
                .part("file", file_part)
                .text("temperature", "0.0")
                .text("response_format", "json");
            if !self.language.is_empty() {
                form = form.text("language", self.language.clone());
            }
            Ok((endpoint, form))
        }
    }
}

impl WhisperBackend for LanBackend {
    fn transcribe(&self, samples: &[i16], sample_rate: u32) -> Result<TranscriptResult, BackendError> {
        if samples.is_empty() {
            return Err(BackendError::EmptyAudio);
        }

        let duration_s = samples.len() as f64 / sample_rate as f64;
        let wav_bytes = wav::encode(samples, sample_rate)?;

        let started = Instant::now();

        // The blocking client must not touch the reactor's runtime; it is
        // created and used on this worker thread only.
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let (endpoint, form) = self.build_form(wav_bytes)?;
        debug!("posting {duration_s:.1}s of audio to {endpoint}");

        let response = client.post(&endpoint).multipart(form).send()?;
        let status = response.status();
        let body = response.text()?;

        let processing_s = started.elapsed().as_secs_f64();

        if !status.is_success() {
            return Err(BackendError::HttpStatus { status, body });
        }

        let text = parse_reply(&body)?;
        Ok(TranscriptResult {
            text,
            duration_s,
            processing_s,
        })
    }
}

/// Extract the transcript from a service reply: `{"text": …}` on success,
/// `{"error": …}` on failure, anything else is a protocol surprise.
fn parse_reply(body: &str) -> Result<String, BackendError> {
    let reply: serde_json::Value =
        serde_json::from_str(body).map_err(BackendError::MalformedReply)?;

    if let Some(text) = reply.get("text").and_then(|t| t.as_str()) {
        return Ok(text.trim_matches(&[' ', '\t', '\r', '\n'][..]).to_string());
    }

    if let Some(error) = reply.get("error") {
        let message = error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(BackendError::Server(message));
    }

    Err(BackendError::UnexpectedReply(body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply_trims_whitespace() {
        assert_eq!(parse_reply(r#"{"text":" \t hello world \r\n"}"#).unwrap(), "hello world");
        assert_eq!(parse_reply(r#"{"text":""}"#).unwrap(), "");
    }

    #[test]
    fn test_parse_reply_server_error() {
        match parse_reply(r#"{"error":"model not loaded"}"#) {
            Err(BackendError::Server(msg)) => assert_eq!(msg, "model not loaded"),
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_reply_neither_field() {
        assert!(matches!(
            parse_reply(r#"{"transcript":"hi"}"#),
            Err(BackendError::UnexpectedReply(_))
        ));
    }

    #[test]
    fn test_parse_reply_malformed_json() {
        assert!(matches!(parse_reply("not json"), Err(BackendError::MalformedReply(_))));
    }

    #[test]
    fn test_empty_audio_rejected() {
        let backend = LanBackend::new(
            "http://localhost:8080".into(),
            "whisper.cpp".into(),
            "en".into(),
        );
        assert!(matches!(backend.transcribe(&[], 16_000), Err(BackendError::EmptyAudio)));
    }

    #[test]
    fn test_endpoints_per_dialect() {
        let whisper_cpp = LanBackend::new("http://h:1".into(), "whisper.cpp".into(), "en".into());
        let (endpoint, _) = whisper_cpp.build_form(vec![0; 44]).unwrap();
        assert_eq!(endpoint, "http://h:1/inference");

        let openai = LanBackend::new("http://h:1".into(), "openai".into(), "en".into());
        let (endpoint, _) = openai.build_form(vec![0; 44]).unwrap();
        assert_eq!(endpoint, "http://h:1/v1/audio/transcriptions");
    }
}
