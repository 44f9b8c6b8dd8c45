//! IPC command socket
//!
//! Stream socket at `$XDG_RUNTIME_DIR/speak-anywhere.sock`. A stale file is
//! unlinked before binding, permissions are tightened to owner-only, and
//! the path is unlinked again when the server is dropped. Framing is one
//! JSON object per line in each direction.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tracing::info;

/// Owner read/write only.
const SOCKET_MODE: u32 = 0o600;

pub struct IpcServer {
    listener: UnixListener,
    path: PathBuf,
}

impl IpcServer {
    /// Bind the command socket. Failure here is fatal for the daemon.
    pub fn bind(path: &Path) -> Result<Self> {
        // Remove a stale socket from a previous run.
        let _ = std::fs::remove_file(path);

        let listener = UnixListener::bind(path)
            .with_context(|| format!("failed to bind IPC socket at {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(SOCKET_MODE))
                .with_context(|| format!("failed to set permissions on {}", path.display()))?;
        }

        info!("IPC listening on {}", path.display());
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    pub async fn accept(&self) -> std::io::Result<UnixStream> {
        let (stream, _) = self.listener.accept().await?;
        Ok(stream)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Write one response line. SIGPIPE is a non-issue: the Rust runtime leaves
/// it ignored, so writes to a dead peer fail with an error instead.
pub async fn send_response(writer: &mut OwnedWriteHalf, response: &Value) -> std::io::Result<()> {
    let mut line = response.to_string();
    line.push('\n');
    writer.write_all(line.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn temp_socket() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sock");
        (dir, path)
    }

    #[tokio::test]
    async fn test_bind_sets_owner_only_mode() {
        let (_dir, path) = temp_socket();
        let _server = IpcServer::bind(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, SOCKET_MODE);
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let (_dir, path) = temp_socket();
        std::fs::write(&path, b"stale").unwrap();

        let server = IpcServer::bind(&path).unwrap();
        assert_eq!(server.path(), path);
    }

    #[tokio::test]
    async fn test_drop_unlinks_socket() {
        let (_dir, path) = temp_socket();
        let server = IpcServer::bind(&path).unwrap();
        assert!(path.exists());
        drop(server);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_send_response_is_line_framed() {
        use tokio::io::AsyncBufReadExt;

        let (_dir, path) = temp_socket();
        let server = IpcServer::bind(&path).unwrap();

        let client = UnixStream::connect(&path).await.unwrap();
        let accepted = server.accept().await.unwrap();

        let (_, mut write_half) = accepted.into_split();
        send_response(&mut write_half, &serde_json::json!({"status": "ok"}))
            .await
            .unwrap();

        let mut line = String::new();
        let mut reader = tokio::io::BufReader::new(client);
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line, "{\"status\":\"ok\"}\n");
    }
}
