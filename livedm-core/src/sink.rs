//! Append-only archive of revenue events.

use crate::error::CoreError;
use crate::event::DomainEvent;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// One archived event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedEvent {
    pub room_id: u64,
    pub received_at: DateTime<Utc>,
    pub event: DomainEvent,
}

impl ArchivedEvent {
    pub fn new(room_id: u64, event: DomainEvent) -> Self {
        Self {
            room_id,
            received_at: Utc::now(),
            event,
        }
    }
}

/// Persistence boundary for gift, membership and super-chat events.
pub trait EventSink: Send + Sync {
    fn append(&self, room_id: u64, event: &DomainEvent) -> Result<(), CoreError>;
}

/// Keeps archived events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<ArchivedEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything appended so far.
    pub fn entries(&self) -> Vec<ArchivedEvent> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl EventSink for MemorySink {
    fn append(&self, room_id: u64, event: &DomainEvent) -> Result<(), CoreError> {
        self.entries
            .lock()
            .push(ArchivedEvent::new(room_id, event.clone()));
        Ok(())
    }
}

/// Writes one JSON line per event to `<dir>/<room_id>.jsonl`.
///
/// Each line is written with a single `write_all`, so a crash can at worst
/// leave a torn final line. [`JsonlSink::replay`] skips it, and the first
/// append after a restart truncates it before writing.
pub struct JsonlSink {
    dir: PathBuf,
    files: Mutex<HashMap<u64, File>>,
}

impl JsonlSink {
    /// Opens (creating if needed) an archive directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            files: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the archive file for a room.
    pub fn room_path(&self, room_id: u64) -> PathBuf {
        self.dir.join(format!("{}.jsonl", room_id))
    }

    /// Reads back every intact entry archived for a room, oldest first.
    pub fn replay(&self, room_id: u64) -> Result<Vec<ArchivedEvent>, CoreError> {
        let path = self.room_path(room_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut entries = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(
                        "Skipping unreadable archive line {} in {}: {}",
                        index + 1,
                        path.display(),
                        e
                    );
                }
            }
        }

        tracing::debug!("Replayed {} archived events for room {}", entries.len(), room_id);
        Ok(entries)
    }
}

impl EventSink for JsonlSink {
    fn append(&self, room_id: u64, event: &DomainEvent) -> Result<(), CoreError> {
        let mut line = serde_json::to_vec(&ArchivedEvent::new(room_id, event.clone()))?;
        line.push(b'\n');

        let mut files = self.files.lock();
        let file = match files.entry(room_id) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                let path = self.room_path(room_id);
                truncate_torn_tail(&path)?;
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                e.insert(file)
            }
        };
        file.write_all(&line)?;
        Ok(())
    }
}

/// Cuts a room file back to its last complete line.
///
/// Returns the number of bytes removed.
fn truncate_torn_tail(path: &Path) -> Result<u64, CoreError> {
    let mut file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let len = file.metadata()?.len();
    let mut last_newline_end = 0u64;
    let mut offset = 0u64;
    let mut chunk = [0u8; 8192];
    loop {
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        if let Some(pos) = chunk[..n].iter().rposition(|&b| b == b'\n') {
            last_newline_end = offset + pos as u64 + 1;
        }
        offset += n as u64;
    }

    let torn = len.saturating_sub(last_newline_end);
    if torn > 0 {
        file.set_len(last_newline_end)?;
        tracing::warn!(
            "Truncated torn archive tail in {} (removed {} bytes)",
            path.display(),
            torn
        );
    }
    Ok(torn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{SuperChatEvent, ViewerCount, ViewerCountSource};
    use tempfile::TempDir;

    fn super_chat(id: u64) -> DomainEvent {
        DomainEvent::SuperChat(SuperChatEvent {
            id,
            uid: 42,
            uname: "alice".into(),
            message: "hello".into(),
            price: 30,
            duration_secs: 60,
            start_time: None,
        })
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());

        sink.append(1, &super_chat(1)).unwrap();
        sink.append(2, &super_chat(2)).unwrap();

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].room_id, 1);
        assert_eq!(entries[1].event, super_chat(2));
    }

    #[test]
    fn test_jsonl_append_and_replay() {
        let dir = TempDir::new().unwrap();
        let sink = JsonlSink::open(dir.path()).unwrap();

        for id in 0..3 {
            sink.append(100, &super_chat(id)).unwrap();
        }
        sink.append(200, &super_chat(9)).unwrap();

        let entries = sink.replay(100).unwrap();
        assert_eq!(entries.len(), 3);
        let ids: Vec<_> = entries
            .iter()
            .map(|e| match &e.event {
                DomainEvent::SuperChat(sc) => sc.id,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);

        assert_eq!(sink.replay(200).unwrap().len(), 1);
        assert!(sink.replay(300).unwrap().is_empty());
    }

    #[test]
    fn test_replay_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let sink = JsonlSink::open(dir.path()).unwrap();
            sink.append(7, &super_chat(1)).unwrap();
        }

        let sink = JsonlSink::open(dir.path()).unwrap();
        sink.append(7, &super_chat(2)).unwrap();
        assert_eq!(sink.replay(7).unwrap().len(), 2);
    }

    #[test]
    fn test_replay_skips_torn_line() {
        let dir = TempDir::new().unwrap();
        let sink = JsonlSink::open(dir.path()).unwrap();
        sink.append(7, &super_chat(1)).unwrap();

        let mut file = OpenOptions::new()
            .append(true)
            .open(sink.room_path(7))
            .unwrap();
        file.write_all(b"{\"room_id\": 7, \"rece").unwrap();

        let entries = sink.replay(7).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, super_chat(1));
    }

    #[test]
    fn test_append_after_torn_line_keeps_new_event() {
        let dir = TempDir::new().unwrap();
        {
            let sink = JsonlSink::open(dir.path()).unwrap();
            sink.append(7, &super_chat(1)).unwrap();
        }
        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join("7.jsonl"))
            .unwrap();
        file.write_all(b"{\"room_id\": 7, \"rece").unwrap();
        drop(file);

        let sink = JsonlSink::open(dir.path()).unwrap();
        sink.append(7, &super_chat(2)).unwrap();

        let entries = sink.replay(7).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event, super_chat(1));
        assert_eq!(entries[1].event, super_chat(2));
    }

    #[test]
    fn test_truncate_torn_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.jsonl");
        assert_eq!(truncate_torn_tail(&path).unwrap(), 0);

        fs::write(&path, b"{}\n{\"a\"").unwrap();
        assert_eq!(truncate_torn_tail(&path).unwrap(), 4);
        assert_eq!(fs::read(&path).unwrap(), b"{}\n");

        fs::write(&path, b"{\"a\"").unwrap();
        assert_eq!(truncate_torn_tail(&path).unwrap(), 4);
        assert!(fs::read(&path).unwrap().is_empty());
    }

    #[test]
    fn test_archived_event_format() {
        let entry = ArchivedEvent::new(
            5,
            DomainEvent::ViewerCount(ViewerCount {
                count: 3,
                source: ViewerCountSource::Heartbeat,
            }),
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["room_id"], 5);
        assert_eq!(json["event"]["type"], "viewer_count");
        assert!(json["received_at"].is_string());
    }
}
