//! JSONL outcome log - persists every loop cycle to an append-only file

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, error, warn};

use super::sink::OutcomeSink;
use super::types::IterationRecord;

/// Sink that appends one JSON object per line to a file
///
/// All loops share one writer behind a mutex, so lines never interleave.
pub struct JsonlSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlSink {
    /// Open (or create) the log file in append mode, creating parent directories
    pub fn open(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!(?path, "JsonlSink::open: called");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a record as one JSON line and flush
    pub fn write_record(&self, record: &IterationRecord) -> eyre::Result<()> {
        let json = serde_json::to_string(record)?;
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        Ok(())
    }
}

impl OutcomeSink for JsonlSink {
    fn record(&self, record: &IterationRecord) {
        if let Err(e) = self.write_record(record) {
            error!(path = %self.path.display(), task_id = %record.task_id, error = %e, "JsonlSink: failed to write record");
        }
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        let writer = self.writer.get_mut().unwrap_or_else(|e| e.into_inner());
        let _ = writer.flush();
    }
}

/// Read records back from a JSONL log
///
/// Malformed lines are skipped with a warning. A missing file yields no records.
pub fn read_records(path: impl AsRef<Path>) -> eyre::Result<Vec<IterationRecord>> {
    let path = path.as_ref();
    debug!(?path, "read_records: reading log file");

    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)?;
    let mut records = Vec::new();

    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<IterationRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(line = lineno + 1, error = %e, "read_records: skipping malformed line"),
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use tempfile::TempDir;

    use crate::scheduler::TaskId;

    #[test]
    fn test_write_and_read_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("logs").join("outcomes.jsonl");
        let sink = JsonlSink::open(&path).unwrap();

        let id = TaskId::new("earn");
        sink.record(&IterationRecord::success(id.clone(), "earn", 1, Duration::from_millis(3)));
        sink.record(&IterationRecord::failure(id.clone(), "earn", 2, Duration::ZERO, "market closed"));

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].task_id, id);
        assert!(!records[0].is_failure());
        assert_eq!(records[1].error.as_deref(), Some("market closed"));
    }

    #[test]
    fn test_appends_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("outcomes.jsonl");

        for i in 1..=2 {
            let sink = JsonlSink::open(&path).unwrap();
            sink.record(&IterationRecord::success(TaskId::new("a"), "a", i, Duration::ZERO));
        }

        assert_eq!(read_records(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_concurrent_writers_do_not_interleave() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("outcomes.jsonl");
        let sink = Arc::new(JsonlSink::open(&path).unwrap());

        let threads: Vec<_> = (0..8)
            .map(|t| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    let id = TaskId::new(&format!("worker-{}", t));
                    for i in 1..=50 {
                        sink.record(&IterationRecord::success(id.clone(), "worker", i, Duration::ZERO));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 400);
        assert_eq!(read_records(&path).unwrap().len(), 400);
    }

    #[test]
    fn test_read_skips_malformed_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("outcomes.jsonl");
        let good = serde_json::to_string(&IterationRecord::success(TaskId::new("a"), "a", 1, Duration::ZERO)).unwrap();
        fs::write(&path, format!("{}\nnot json\n\n{}\n", good, good)).unwrap();

        assert_eq!(read_records(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(read_records(temp.path().join("nope.jsonl")).unwrap().is_empty());
    }
}
