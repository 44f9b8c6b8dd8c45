//! XDG path resolution shared by daemon and CLI.
//!
//! The IPC socket lives in `XDG_RUNTIME_DIR` (user-owned, mode 0700,
//! auto-cleaned) when available, with a `/tmp` fallback matching the
//! daemon's historical location.

use std::env;
use std::path::PathBuf;

const SOCKET_NAME: &str = "speak-anywhere.sock";
const APP_DIR: &str = "speak-anywhere";

/// Path of the daemon's command socket.
pub fn socket_path() -> PathBuf {
    if let Ok(runtime_dir) = env::var("XDG_RUNTIME_DIR") {
        let dir = PathBuf::from(runtime_dir);
        if dir.is_dir() {
            return dir.join(SOCKET_NAME);
        }
    }
    PathBuf::from("/tmp").join(SOCKET_NAME)
}

/// Path of the JSON configuration file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

fn config_dir() -> PathBuf {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg).join(APP_DIR);
        }
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Directory holding durable daemon state (the transcription history).
pub fn data_dir() -> PathBuf {
    if let Ok(xdg) = env::var("XDG_DATA_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg).join(APP_DIR);
        }
    }
    if let Some(data) = dirs::data_dir() {
        return data.join(APP_DIR);
    }
    // HOME-less environments (e.g. a bare service user).
    PathBuf::from("/tmp").join(APP_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_path_is_absolute() {
        let path = socket_path();
        assert!(path.is_absolute());
        assert!(path.ends_with(SOCKET_NAME));
    }

    #[test]
    fn test_config_path_ends_with_json() {
        let path = config_path();
        assert!(path.ends_with("speak-anywhere/config.json"));
    }

    #[test]
    fn test_data_dir_is_app_scoped() {
        let dir = data_dir();
        assert!(dir.ends_with(APP_DIR));
    }
}
