//! Durable transcription history
//!
//! One sqlite table, append-only from the daemon's perspective. A store
//! that fails to open degrades rather than disables the daemon: inserts
//! become no-ops and `recent` returns nothing. Empty context fields are
//! stored as NULL so "absent" survives a round-trip distinct from a present
//! column; they read back as empty strings.

use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, warn};

use crate::sway::WindowContext;

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    /// Server-generated ISO-8601 timestamp with millisecond precision.
    pub timestamp: String,
    pub text: String,
    pub audio_duration: f64,
    pub processing_time: f64,
    pub app_context: String,
    pub app_id: String,
    pub window_title: String,
    pub agent: String,
    pub working_dir: String,
    pub backend: String,
}

pub trait HistoryStore {
    /// Durable append. Returns whether a row was written.
    fn insert(
        &self,
        text: &str,
        audio_duration: f64,
        processing_time: f64,
        context: &WindowContext,
        backend: &str,
    ) -> bool;

    /// Newest-first by insertion order.
    fn recent(&self, limit: i64) -> Vec<HistoryEntry>;
}

pub struct SqliteHistory {
    conn: Option<Connection>,
}

impl SqliteHistory {
    /// Open (or create) the database at `path`, creating parent directories.
    /// Failure leaves a degraded store and logs a warning.
    pub fn open(path: &Path) -> Self {
        Self {
            conn: Self::try_open(path)
                .map_err(|e| warn!("history: disabled, failed to open {}: {e}", path.display()))
                .ok(),
        }
    }

    fn try_open(path: &Path) -> Result<Connection, rusqlite::Error> {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("history: could not create {}: {e}", parent.display());
            }
        }

        let conn = Connection::open(path)?;

        // WAL keeps concurrent readers (the CLI's history command via a
        // second daemon, external tools) from blocking inserts.
        conn.pragma_update(None, "journal_mode", "WAL")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS transcriptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f','now')),
                text TEXT NOT NULL,
                audio_duration REAL,
                processing_time REAL,
                app_context TEXT,
                app_id TEXT,
                window_title TEXT,
                agent TEXT,
                working_dir TEXT,
                backend TEXT
            );",
        )?;

        Ok(conn)
    }
}

fn null_when_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

impl HistoryStore for SqliteHistory {
    fn insert(
        &self,
        text: &str,
        audio_duration: f64,
        processing_time: f64,
        context: &WindowContext,
        backend: &str,
    ) -> bool {
        let Some(conn) = &self.conn else {
            debug!("history: store unavailable, dropping entry");
            return false;
        };

        let result = conn.execute(
            "INSERT INTO transcriptions (text, audio_duration, processing_time,
                 app_context, app_id, window_title, agent, working_dir, backend)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                text,
                audio_duration,
                processing_time,
                null_when_empty(&context.context),
                null_when_empty(&context.app_id),
                null_when_empty(&context.title),
                null_when_empty(&context.agent),
                null_when_empty(&context.working_dir),
                null_when_empty(backend),
            ],
        );

        match result {
            Ok(_) => true,
            Err(e) => {
                warn!("history: insert failed: {e}");
                false
            }
        }
    }

    fn recent(&self, limit: i64) -> Vec<HistoryEntry> {
        let Some(conn) = &self.conn else {
            return Vec::new();
        };

        let mut stmt = match conn.prepare_cached(
            "SELECT id, timestamp, text, audio_duration, processing_time,
                    app_context, app_id, window_title, agent, working_dir, backend
             FROM transcriptions ORDER BY id DESC LIMIT ?1",
        ) {
            Ok(stmt) => stmt,
            Err(e) => {
                warn!("history: query prepare failed: {e}");
                return Vec::new();
            }
        };

        let rows = stmt.query_map([limit], |row| {
            let opt = |i: usize| -> rusqlite::Result<String> {
                Ok(row.get::<_, Option<String>>(i)?.unwrap_or_default())
            };
            Ok(HistoryEntry {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                text: row.get(2)?,
                audio_duration: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                processing_time: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                app_context: opt(5)?,
                app_id: opt(6)?,
                window_title: opt(7)?,
                agent: opt(8)?,
                working_dir: opt(9)?,
                backend: opt(10)?,
            })
        });

        match rows {
            Ok(rows) => rows.filter_map(|r| r.ok()).collect(),
            Err(e) => {
                warn!("history: query failed: {e}");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, SqliteHistory) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteHistory::open(&dir.path().join("nested").join("history.db"));
        (dir, store)
    }

    fn context(app: &str, agent: &str) -> WindowContext {
        WindowContext {
            app_id: app.to_string(),
            agent: agent.to_string(),
            context: if agent.is_empty() {
                app.to_string()
            } else {
                format!("{agent} code on {app}")
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_and_recent_roundtrip() {
        let (_dir, store) = open_temp();

        assert!(store.insert("hello world", 2.0, 0.3, &context("kitty", "claude"), "lan"));

        let entries = store.recent(10);
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.id, 1);
        assert_eq!(entry.text, "hello world");
        assert_eq!(entry.audio_duration, 2.0);
        assert_eq!(entry.processing_time, 0.3);
        assert_eq!(entry.app_context, "claude code on kitty");
        assert_eq!(entry.app_id, "kitty");
        assert_eq!(entry.agent, "claude");
        assert_eq!(entry.backend, "lan");
        // Millisecond-precision ISO-8601, e.g. 2026-08-02T12:00:00.000
        assert_eq!(entry.timestamp.len(), 23);
        assert_eq!(&entry.timestamp[10..11], "T");
    }

    #[test]
    fn test_empty_fields_roundtrip_through_null() {
        let (_dir, store) = open_temp();
        assert!(store.insert("bare", 1.0, 0.1, &WindowContext::default(), ""));

        let conn = store.conn.as_ref().unwrap();
        let nulls: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM transcriptions WHERE app_id IS NULL AND backend IS NULL",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(nulls, 1);

        let entry = &store.recent(1)[0];
        assert_eq!(entry.app_id, "");
        assert_eq!(entry.backend, "");
    }

    #[test]
    fn test_recent_is_newest_first_and_limited() {
        let (_dir, store) = open_temp();
        for i in 0..5 {
            store.insert(&format!("entry {i}"), 1.0, 0.1, &WindowContext::default(), "lan");
        }

        let entries = store.recent(3);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].text, "entry 4");
        assert_eq!(entries[2].text, "entry 2");

        assert!(store.recent(0).is_empty());
    }

    #[test]
    fn test_degraded_store_is_noop() {
        // A directory path cannot be opened as a database file.
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteHistory::open(dir.path());

        assert!(!store.insert("x", 1.0, 0.1, &WindowContext::default(), "lan"));
        assert!(store.recent(10).is_empty());
    }
}
