//! Durable append-only queue of captured records
//!
//! The queue is a single newline-delimited file. A record is committed once
//! its terminating newline has been synced to disk; anything after the last
//! newline is a torn write from an interrupted append and is never reported as
//! a record. The next append truncates it away before writing.
//!
//! Draining works on a [`Snapshot`]: the committed prefix seen at the start of
//! the pass. [`DurableQueue::clear_snapshot`] removes exactly that prefix and
//! keeps anything appended afterwards.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sha2::{Digest, Sha256};

use crate::config::QueueConfig;
use crate::error::{Error, Result};
use crate::record::{parse_lines, Record};

/// Point-in-time view of the committed queue contents.
#[derive(Debug, Clone)]
pub struct Snapshot {
    records: Vec<Record>,
    committed_len: u64,
    digest: String,
}

impl Snapshot {
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// File-backed record queue.
#[derive(Debug)]
pub struct DurableQueue {
    path: PathBuf,
    max_records: Option<usize>,
    /// Serializes file operations issued through this handle.
    lock: Mutex<()>,
}

impl DurableQueue {
    /// Create a queue backed by `path`. The file is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_records: None,
            lock: Mutex::new(()),
        }
    }

    /// Create a queue from configuration.
    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.resolved_path()).with_max_records(config.max_records)
    }

    /// Bound the queue to `max` records, evicting the oldest on append.
    /// A bound of zero is treated as unbounded.
    pub fn with_max_records(mut self, max: Option<usize>) -> Self {
        self.max_records = max.filter(|m| *m > 0);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and sync it to disk before returning.
    ///
    /// On error the file is truncated back to its previous length, so the
    /// record is not committed and may be appended again. When the queue is
    /// full the surviving records and the new one are written in a single
    /// atomic rewrite.
    pub fn append(&self, record: &Record) -> Result<()> {
        let _guard = self.guard();
        let line = record.to_line()?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| Error::write("create directory for", &self.path, e))?;
            }
        }

        let rewritten = match self.max_records {
            Some(max) => self.append_evicting(&line, max)?,
            None => false,
        };
        if !rewritten {
            self.append_line(&line)?;
        }

        tracing::debug!(
            path = %self.path.display(),
            category = %record.category(),
            "Appended record"
        );
        Ok(())
    }

    /// Every committed record in commit order. Empty if the file does not exist.
    pub fn read_all(&self) -> Result<Vec<Record>> {
        Ok(self.snapshot()?.into_records())
    }

    /// Number of committed records.
    pub fn len(&self) -> Result<usize> {
        Ok(self.snapshot()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Capture the committed prefix for a drain pass.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let _guard = self.guard();
        let bytes = self.read_bytes()?.unwrap_or_default();
        let committed = committed_prefix(&bytes);

        if committed.len() < bytes.len() {
            tracing::warn!(
                path = %self.path.display(),
                torn_bytes = bytes.len() - committed.len(),
                "Ignoring unterminated trailing write"
            );
        }

        Ok(Snapshot {
            records: parse_lines(committed),
            committed_len: committed.len() as u64,
            digest: digest(committed),
        })
    }

    /// Remove every committed record. Clearing an empty queue is a no-op.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.guard();
        self.remove_file()
    }

    /// Remove exactly the records captured in `snapshot`.
    ///
    /// Records appended after the snapshot are preserved. Fails with
    /// [`Error::QueueChanged`] if the snapshotted prefix is no longer at the
    /// head of the file.
    pub fn clear_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let _guard = self.guard();
        if snapshot.committed_len == 0 {
            return Ok(());
        }

        let Some(bytes) = self.read_bytes()? else {
            tracing::debug!(path = %self.path.display(), "Queue already removed");
            return Ok(());
        };

        let prefix_len = snapshot.committed_len as usize;
        if bytes.len() < prefix_len {
            return Err(Error::QueueChanged {
                path: self.path.clone(),
                reason: format!("file shrank to {} bytes, snapshot covered {}", bytes.len(), prefix_len),
            });
        }
        let (prefix, suffix) = bytes.split_at(prefix_len);
        if digest(prefix) != snapshot.digest {
            return Err(Error::QueueChanged {
                path: self.path.clone(),
                reason: "snapshotted records were rewritten".to_string(),
            });
        }

        if suffix.is_empty() {
            self.remove_file()
        } else {
            tracing::info!(
                path = %self.path.display(),
                kept_bytes = suffix.len(),
                "Preserving records appended during drain"
            );
            self.replace_contents(suffix, "clear")
        }
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::read(&self.path, e)),
        }
    }

    fn remove_file(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Cleared queue");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::write("clear", &self.path, e)),
        }
    }

    /// Atomically replace the queue file with `contents`.
    fn replace_contents(&self, contents: &[u8], op: &'static str) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::write(op, &self.path, e))?;
        tmp.write_all(contents)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| Error::write(op, &self.path, e))?;
        tmp.persist(&self.path)
            .map_err(|e| Error::write(op, &self.path, e.error))?;
        Ok(())
    }

    fn append_line(&self, line: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::write("open", &self.path, e))?;

        self.repair_torn_tail(&mut file)
            .map_err(|e| Error::write("repair", &self.path, e))?;

        let committed = file
            .metadata()
            .map_err(|e| Error::write("append to", &self.path, e))?
            .len();

        if let Err(e) = file.write_all(line).and_then(|_| file.sync_all()) {
            if let Err(rollback) = file.set_len(committed).and_then(|_| file.sync_all()) {
                tracing::error!(
                    path = %self.path.display(),
                    error = %rollback,
                    "Failed to roll back partial append"
                );
            }
            return Err(Error::write("append to", &self.path, e));
        }
        Ok(())
    }

    /// If the queue already holds `max` records, rewrite it as the newest
    /// `max - 1` records followed by `line`. Returns false when there is room
    /// for a plain append.
    fn append_evicting(&self, line: &[u8], max: usize) -> Result<bool> {
        let Some(bytes) = self.read_bytes()? else {
            return Ok(false);
        };
        let records = parse_lines(committed_prefix(&bytes));
        if records.len() < max {
            return Ok(false);
        }

        let evicted = records.len() + 1 - max;
        let mut contents = Vec::new();
        for record in &records[evicted..] {
            contents.extend_from_slice(&record.to_line()?);
        }
        contents.extend_from_slice(line);

        tracing::warn!(
            path = %self.path.display(),
            evicted,
            max_records = max,
            "Queue full, evicting oldest records"
        );

        self.replace_contents(&contents, "append to")?;
        Ok(true)
    }

    /// Truncate an unterminated trailing write left by an interrupted append.
    fn repair_torn_tail(&self, file: &mut File) -> io::Result<()> {
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(());
        }

        let mut last = [0u8; 1];
        file.seek(SeekFrom::Start(len - 1))?;
        file.read_exact(&mut last)?;
        if last[0] == b'\n' {
            return Ok(());
        }

        let mut bytes = Vec::with_capacity(len as usize);
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut bytes)?;
        let keep = committed_prefix(&bytes).len() as u64;

        tracing::warn!(
            path = %self.path.display(),
            torn_bytes = len - keep,
            "Truncating unterminated trailing write"
        );
        file.set_len(keep)?;
        file.sync_all()
    }
}

/// Bytes up to and including the last newline.
fn committed_prefix(bytes: &[u8]) -> &[u8] {
    match bytes.iter().rposition(|b| *b == b'\n') {
        Some(i) => &bytes[..=i],
        None => &[],
    }
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::encode;
    use tempfile::TempDir;

    fn queue_in(dir: &TempDir) -> DurableQueue {
        DurableQueue::new(dir.path().join("mood_log.csv"))
    }

    #[test]
    fn test_read_all_without_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let queue = queue_in(&dir);
        assert!(queue.read_all().unwrap().is_empty());
        assert!(!queue.path().exists());
    }

    #[test]
    fn test_append_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let queue = DurableQueue::new(dir.path().join("nested/deeper/mood_log.csv"));
        queue.append(&encode("2024-01-01", "09:00:00", "Happy :D")).unwrap();
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[test]
    fn test_append_writes_legacy_lines() {
        let dir = TempDir::new().unwrap();
        let queue = queue_in(&dir);
        queue.append(&encode("2024-01-01", "09:00:00", "Happy :D")).unwrap();
        queue.append(&encode("2024-01-01", "09:05:00", "Anxious X(")).unwrap();

        let contents = fs::read_to_string(queue.path()).unwrap();
        assert_eq!(contents, "2024-01-01,09:00:00,Happy :D\n2024-01-01,09:05:00,Anxious X(\n");
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let queue = queue_in(&dir);
        queue.clear().unwrap();
        queue.clear().unwrap();
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn test_clear_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mood_log.csv");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("stray"), "x").unwrap();
        let queue = DurableQueue::new(&path);

        let err = queue.clear().unwrap_err();
        assert!(matches!(err, Error::StorageWrite { op: "clear", .. }));
        assert!(path.exists());
    }

    #[test]
    fn test_torn_tail_is_invisible_and_repaired() {
        let dir = TempDir::new().unwrap();
        let queue = queue_in(&dir);
        fs::write(queue.path(), "2024-01-01,09:00:00,Happy :D\n2024-01-01,09:0").unwrap();

        let records = queue.read_all().unwrap();
        assert_eq!(records, vec![encode("2024-01-01", "09:00:00", "Happy :D")]);

        queue.append(&encode("2024-01-01", "09:10:00", "Tired -_-")).unwrap();
        let contents = fs::read_to_string(queue.path()).unwrap();
        assert_eq!(contents, "2024-01-01,09:00:00,Happy :D\n2024-01-01,09:10:00,Tired -_-\n");
    }

    #[test]
    fn test_torn_only_line_is_dropped() {
        let dir = TempDir::new().unwrap();
        let queue = queue_in(&dir);
        fs::write(queue.path(), "2024-01-01,09:0").unwrap();
        assert!(queue.read_all().unwrap().is_empty());

        queue.append(&encode("2024-01-02", "10:00:00", "Peace :)")).unwrap();
        assert_eq!(queue.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_clear_snapshot_keeps_later_appends() {
        let dir = TempDir::new().unwrap();
        let queue = queue_in(&dir);
        queue.append(&encode("2024-01-01", "09:00:00", "Happy :D")).unwrap();
        let snapshot = queue.snapshot().unwrap();

        let late = encode("2024-01-01", "09:01:00", "Peace :)");
        queue.append(&late).unwrap();
        queue.clear_snapshot(&snapshot).unwrap();

        assert_eq!(queue.read_all().unwrap(), vec![late]);
    }

    #[test]
    fn test_clear_snapshot_removes_file_when_nothing_new() {
        let dir = TempDir::new().unwrap();
        let queue = queue_in(&dir);
        queue.append(&encode("2024-01-01", "09:00:00", "Happy :D")).unwrap();
        let snapshot = queue.snapshot().unwrap();
        queue.clear_snapshot(&snapshot).unwrap();
        assert!(!queue.path().exists());
    }

    #[test]
    fn test_clear_snapshot_detects_rewrite() {
        let dir = TempDir::new().unwrap();
        let queue = queue_in(&dir);
        queue.append(&encode("2024-01-01", "09:00:00", "Happy :D")).unwrap();
        let snapshot = queue.snapshot().unwrap();

        fs::write(queue.path(), "2024-01-01,09:00:00,Angry :D\n").unwrap();
        let err = queue.clear_snapshot(&snapshot).unwrap_err();
        assert!(matches!(err, Error::QueueChanged { .. }));
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[test]
    fn test_max_records_evicts_oldest() {
        let dir = TempDir::new().unwrap();
        let queue = queue_in(&dir).with_max_records(Some(2));
        for minute in 0..4 {
            let time = format!("09:0{}:00", minute);
            queue.append(&encode("2024-01-01", &time, "Happy :D")).unwrap();
        }

        let times: Vec<_> = queue
            .read_all()
            .unwrap()
            .iter()
            .map(|r| r.time().to_string())
            .collect();
        assert_eq!(times, vec!["09:02:00", "09:03:00"]);
    }

    #[test]
    fn test_full_queue_append_is_one_rewrite() {
        let dir = TempDir::new().unwrap();
        let queue = queue_in(&dir).with_max_records(Some(2));
        fs::write(
            queue.path(),
            "2024-01-01,09:00:00,Happy :D\n2024-01-01,09:01:00,Tired -_-\n2024-01-01,09:0",
        )
        .unwrap();

        queue.append(&encode("2024-01-01", "09:02:00", "Peace :)")).unwrap();

        let contents = fs::read_to_string(queue.path()).unwrap();
        assert_eq!(contents, "2024-01-01,09:01:00,Tired -_-\n2024-01-01,09:02:00,Peace :)\n");
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_failure_is_reported_as_storage_write() {
        // Every write to /dev/full fails with ENOSPC.
        let queue = DurableQueue::new("/dev/full");
        let err = queue.append(&encode("2024-01-01", "09:00:00", "Happy :D")).unwrap_err();
        assert!(matches!(err, Error::StorageWrite { op: "append to", .. }));
    }

    #[test]
    fn test_append_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        // A directory where the queue file should be makes every open fail.
        let path = dir.path().join("mood_log.csv");
        fs::create_dir(&path).unwrap();
        let queue = DurableQueue::new(&path);

        let err = queue.append(&encode("2024-01-01", "09:00:00", "Happy :D")).unwrap_err();
        assert!(matches!(err, Error::StorageWrite { .. }));
    }
}
