//! Persistence boundary.
//!
//! The pipeline never stores records itself. A [`RecordSink`] reports which
//! identifiers already exist in a table and accepts bulk inserts of the
//! selected rows.
//!
//! - [`JsonLinesSink`] - one `<table>.jsonl` file per table in a directory
//! - [`MemorySink`] - in-process tables, for tests and dry runs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::error::{SinkError, SinkResult};

/// One row handed to the destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub id: String,
    pub data: Map<String, Value>,
}

/// Destination of committed rows.
pub trait RecordSink: Send {
    /// Identifiers already stored in `table`.
    fn existing_ids(&self, table: &str) -> SinkResult<HashSet<String>>;

    /// Store `records` in `table`, all or nothing. Returns the number stored.
    fn bulk_insert(&mut self, table: &str, records: &[CommitRecord]) -> SinkResult<usize>;
}

// =============================================================================
// JSON lines directory
// =============================================================================

/// Appends records to `<dir>/<table>.jsonl`.
pub struct JsonLinesSink {
    dir: PathBuf,
}

impl JsonLinesSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", table))
    }

    /// Every record stored in `table`, in insertion order.
    pub fn read_table(&self, table: &str) -> SinkResult<Vec<CommitRecord>> {
        let path = self.table_path(table);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(&path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

impl RecordSink for JsonLinesSink {
    fn existing_ids(&self, table: &str) -> SinkResult<HashSet<String>> {
        Ok(self.read_table(table)?.into_iter().map(|r| r.id).collect())
    }

    fn bulk_insert(&mut self, table: &str, records: &[CommitRecord]) -> SinkResult<usize> {
        if table.is_empty() || table.contains(['/', '\\']) || table.starts_with('.') {
            return Err(SinkError::Rejected {
                table: table.to_string(),
                message: "invalid table name".to_string(),
            });
        }

        // Serialize everything before touching the file
        let mut buffer = String::new();
        for record in records {
            buffer.push_str(&serde_json::to_string(record)?);
            buffer.push('\n');
        }

        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.table_path(table))?;
        file.write_all(buffer.as_bytes())?;

        Ok(records.len())
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Tables held in memory. Can be told to reject inserts.
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: BTreeMap<String, Vec<CommitRecord>>,
    reject_with: Option<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a table.
    pub fn with_records(mut self, table: &str, records: Vec<CommitRecord>) -> Self {
        self.tables.entry(table.to_string()).or_default().extend(records);
        self
    }

    /// Make every following insert fail with `message`.
    pub fn reject_inserts(&mut self, message: impl Into<String>) {
        self.reject_with = Some(message.into());
    }

    pub fn accept_inserts(&mut self) {
        self.reject_with = None;
    }

    pub fn records(&self, table: &str) -> &[CommitRecord] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl RecordSink for MemorySink {
    fn existing_ids(&self, table: &str) -> SinkResult<HashSet<String>> {
        Ok(self.records(table).iter().map(|r| r.id.clone()).collect())
    }

    fn bulk_insert(&mut self, table: &str, records: &[CommitRecord]) -> SinkResult<usize> {
        if let Some(message) = &self.reject_with {
            return Err(SinkError::Rejected {
                table: table.to_string(),
                message: message.clone(),
            });
        }
        self.tables
            .entry(table.to_string())
            .or_default()
            .extend(records.iter().cloned());
        Ok(records.len())
    }
}
