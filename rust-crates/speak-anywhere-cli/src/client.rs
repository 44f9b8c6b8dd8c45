//! Blocking unix-socket client for the daemon's command protocol.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use speak_anywhere_ipc::protocol::{Request, RECV_TIMEOUT_MS};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

pub struct DaemonClient {
    stream: UnixStream,
    reader: BufReader<UnixStream>,
}

impl DaemonClient {
    pub fn connect(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path)
            .with_context(|| format!("failed to connect to {}", socket_path.display()))?;
        stream
            .set_read_timeout(Some(Duration::from_millis(RECV_TIMEOUT_MS)))
            .context("failed to set read timeout")?;

        let reader = BufReader::new(stream.try_clone().context("failed to clone socket")?);
        Ok(Self { stream, reader })
    }

    pub fn send(&mut self, request: &Request) -> Result<()> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.stream
            .write_all(line.as_bytes())
            .context("failed to send command")
    }

    /// Read one response line. Times out after the protocol's receive
    /// timeout when the daemon goes silent.
    pub fn recv(&mut self) -> Result<Value> {
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .context("no response from daemon (timeout)")?;
        if n == 0 {
            bail!("daemon closed the connection");
        }
        serde_json::from_str(&line).context("invalid response from daemon")
    }
}
