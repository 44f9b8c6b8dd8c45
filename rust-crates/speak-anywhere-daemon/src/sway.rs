//! Sway window focus source
//!
//! Two connections to the compositor's IPC socket: one for synchronous
//! queries (GET_TREE), one subscribed to window events. Connecting is
//! optional; without a compositor the daemon runs with an empty cached
//! context.
//!
//! Wire format (i3-ipc): 6-byte magic `"i3-ipc"`, u32 LE payload length,
//! u32 LE message type, then the JSON payload.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::{debug, warn};

const MAGIC: &[u8; 6] = b"i3-ipc";
const HEADER_LEN: usize = 14;

const MSG_SUBSCRIBE: u32 = 2;
const MSG_GET_TREE: u32 = 4;
const EVENT_WINDOW: u32 = 0x8000_0003;

/// Identity of the focused window plus the agent detection attached to it.
/// Snapshotted into the session at recording start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowContext {
    /// Wayland app_id (e.g. "kitty").
    pub app_id: String,
    /// X11 class for XWayland windows (e.g. "Firefox").
    pub window_class: String,
    /// Window title.
    pub title: String,
    /// Window process PID.
    pub pid: i32,
    /// Detected CLI agent, e.g. "claude".
    pub agent: String,
    /// The agent's working directory.
    pub working_dir: String,
    /// Human-readable summary, e.g. "claude code on kitty".
    pub context: String,
}

impl WindowContext {
    pub fn is_empty(&self) -> bool {
        self.app_id.is_empty() && self.window_class.is_empty() && self.title.is_empty() && self.pid == 0
    }

    /// Application name for display: app_id, falling back to the X11 class.
    pub fn app_name(&self) -> &str {
        if !self.app_id.is_empty() {
            &self.app_id
        } else {
            &self.window_class
        }
    }
}

/// Query-side connection to the sway IPC socket.
pub struct SwayIpc {
    query: UnixStream,
    socket_path: PathBuf,
}

impl SwayIpc {
    /// Connect using `$SWAYSOCK`. Fails when the variable is unset or the
    /// compositor is unreachable; the caller treats that as "no window
    /// context available".
    pub async fn connect() -> Result<Self> {
        let socket_path = PathBuf::from(
            std::env::var("SWAYSOCK").context("SWAYSOCK is not set")?,
        );
        let query = UnixStream::connect(&socket_path)
            .await
            .with_context(|| format!("failed to connect to sway at {}", socket_path.display()))?;
        Ok(Self { query, socket_path })
    }

    /// Walk the window tree and return the focused window, or an empty
    /// context when none is focused or the query fails.
    pub async fn get_focused_window(&mut self) -> WindowContext {
        match self.query_tree().await {
            Ok(tree) => find_focused(&tree).unwrap_or_default(),
            Err(e) => {
                warn!("sway: GET_TREE failed: {e:#}");
                WindowContext::default()
            }
        }
    }

    async fn query_tree(&mut self) -> Result<Value> {
        send_message(&mut self.query, MSG_GET_TREE, b"").await?;
        let (_, payload) = recv_message(&mut self.query).await?;
        serde_json::from_slice(&payload).context("sway: invalid GET_TREE payload")
    }

    /// Open the second connection and subscribe to window events.
    pub async fn subscribe_focus_events(&self) -> Result<FocusEvents> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .context("failed to open sway event connection")?;

        send_message(&mut stream, MSG_SUBSCRIBE, br#"["window"]"#).await?;
        let (_, payload) = recv_message(&mut stream).await?;
        debug!("sway: subscribed to window events: {}", String::from_utf8_lossy(&payload));

        Ok(FocusEvents { stream })
    }
}

/// Subscribed event-side connection.
pub struct FocusEvents {
    stream: UnixStream,
}

impl FocusEvents {
    /// Read the next event. `Ok(Some(..))` only for focus changes; other
    /// window events yield `Ok(None)`. Errors mean the stream is gone.
    pub async fn next_event(&mut self) -> Result<Option<WindowContext>> {
        let (msg_type, payload) = recv_message(&mut self.stream).await?;
        if msg_type != EVENT_WINDOW {
            return Ok(None);
        }

        let event: Value = match serde_json::from_slice(&payload) {
            Ok(v) => v,
            Err(e) => {
                debug!("sway: unparseable window event: {e}");
                return Ok(None);
            }
        };

        if event.get("change").and_then(Value::as_str) != Some("focus") {
            return Ok(None);
        }

        match event.get("container") {
            Some(container) => Ok(Some(window_from_node(container))),
            None => Ok(None),
        }
    }
}

fn encode_header(payload_len: u32, msg_type: u32) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..6].copy_from_slice(MAGIC);
    header[6..10].copy_from_slice(&payload_len.to_le_bytes());
    header[10..].copy_from_slice(&msg_type.to_le_bytes());
    header
}

fn decode_header(header: &[u8; HEADER_LEN]) -> Result<(u32, u32)> {
    if &header[..6] != MAGIC {
        bail!("sway: bad magic in IPC header");
    }
    let len = u32::from_le_bytes([header[6], header[7], header[8], header[9]]);
    let msg_type = u32::from_le_bytes([header[10], header[11], header[12], header[13]]);
    Ok((len, msg_type))
}

async fn send_message(stream: &mut UnixStream, msg_type: u32, payload: &[u8]) -> Result<()> {
    let header = encode_header(payload.len() as u32, msg_type);
    stream.write_all(&header).await?;
    if !payload.is_empty() {
        stream.write_all(payload).await?;
    }
    Ok(())
}

async fn recv_message(stream: &mut UnixStream) -> Result<(u32, Vec<u8>)> {
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header).await?;
    let (len, msg_type) = decode_header(&header)?;

    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await?;
    Ok((msg_type, payload))
}

/// Depth-first search for the first node flagged focused, visiting tiling
/// children before floating ones.
fn find_focused(node: &Value) -> Option<WindowContext> {
    if node.get("focused").and_then(Value::as_bool) == Some(true) {
        return Some(window_from_node(node));
    }

    for key in ["nodes", "floating_nodes"] {
        if let Some(children) = node.get(key).and_then(Value::as_array) {
            for child in children {
                if let Some(found) = find_focused(child) {
                    return Some(found);
                }
            }
        }
    }
    None
}

fn window_from_node(node: &Value) -> WindowContext {
    let str_field = |v: Option<&Value>| -> String {
        v.and_then(Value::as_str).unwrap_or_default().to_string()
    };

    WindowContext {
        app_id: str_field(node.get("app_id")),
        window_class: str_field(
            node.get("window_properties").and_then(|p| p.get("class")),
        ),
        title: str_field(node.get("name")),
        pid: node.get("pid").and_then(Value::as_i64).unwrap_or(0) as i32,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_header_roundtrip() {
        let header = encode_header(1234, MSG_GET_TREE);
        let (len, msg_type) = decode_header(&header).unwrap();
        assert_eq!(len, 1234);
        assert_eq!(msg_type, MSG_GET_TREE);
    }

    #[test]
    fn test_header_bad_magic() {
        let mut header = encode_header(0, MSG_SUBSCRIBE);
        header[0] = b'x';
        assert!(decode_header(&header).is_err());
    }

    #[test]
    fn test_find_focused_in_nested_tree() {
        let tree = json!({
            "focused": false,
            "nodes": [
                {"focused": false, "nodes": []},
                {
                    "focused": false,
                    "nodes": [
                        {"focused": true, "app_id": "kitty", "name": "~/src", "pid": 4242, "nodes": []}
                    ]
                }
            ]
        });

        let found = find_focused(&tree).unwrap();
        assert_eq!(found.app_id, "kitty");
        assert_eq!(found.title, "~/src");
        assert_eq!(found.pid, 4242);
        assert!(found.window_class.is_empty());
    }

    #[test]
    fn test_find_focused_checks_floating_nodes() {
        let tree = json!({
            "focused": false,
            "nodes": [{"focused": false, "nodes": []}],
            "floating_nodes": [
                {"focused": true, "name": "popup", "pid": 7, "window_properties": {"class": "Pavucontrol"}}
            ]
        });

        let found = find_focused(&tree).unwrap();
        assert_eq!(found.title, "popup");
        assert_eq!(found.window_class, "Pavucontrol");
        assert_eq!(found.app_name(), "Pavucontrol");
    }

    #[test]
    fn test_no_focused_window() {
        let tree = json!({"focused": false, "nodes": []});
        assert!(find_focused(&tree).is_none());
    }

    #[test]
    fn test_empty_context() {
        assert!(WindowContext::default().is_empty());
        let ctx = WindowContext {
            pid: 1,
            ..Default::default()
        };
        assert!(!ctx.is_empty());
    }
}
