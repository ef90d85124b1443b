//! Inspection history
//!
//! Append-only JSON Lines log of inspection results, with CSV export.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::analysis::InspectionResult;

/// File name of the log inside the data directory
pub const HISTORY_FILE_NAME: &str = "history.jsonl";

/// CSV columns, in order
const CSV_HEADER: [&str; 5] = ["time", "part", "verdict", "final_conf", "reasons"];

/// One logged inspection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    /// Seconds since the Unix epoch
    pub timestamp: u64,
    pub part_id: String,
    /// Image path as given on the command line
    pub image: String,
    pub result: InspectionResult,
}

impl HistoryEntry {
    pub fn new(part_id: &str, image: &str, result: InspectionResult) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            id: Uuid::new_v4(),
            timestamp,
            part_id: part_id.to_string(),
            image: image.to_string(),
            result,
        }
    }

    fn csv_row(&self) -> [String; 5] {
        [
            self.timestamp.to_string(),
            self.part_id.clone(),
            self.result.verdict.to_string(),
            self.result.final_conf().to_string(),
            self.result.reasons_joined(),
        ]
    }
}

/// History log backed by a single file
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry, creating the file and its directory if needed
    pub fn append(&self, entry: &HistoryEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let line = serde_json::to_string(entry)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open history log {:?}", self.path))?;
        writeln!(file, "{}", line)?;

        debug!("Logged inspection {} to history", entry.id);
        Ok(())
    }

    /// Read all entries in log order; malformed lines are skipped
    pub fn read_all(&self) -> Result<Vec<HistoryEntry>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to open history log {:?}", self.path))
            }
        };

        let mut entries = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping malformed history line {}: {}", number + 1, e),
            }
        }
        Ok(entries)
    }

    /// Write the history as CSV, newest first; returns the number of rows
    pub fn export_csv(&self, out: &Path) -> Result<usize> {
        let entries = self.read_all()?;
        let file = std::fs::File::create(out)
            .with_context(|| format!("Failed to create CSV {:?}", out))?;
        write_csv(&entries, file).with_context(|| format!("Failed to write CSV {:?}", out))?;
        Ok(entries.len())
    }
}

/// Write entries as CSV, newest first, every field quoted
pub fn write_csv<W: Write>(entries: &[HistoryEntry], writer: W) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    csv_writer.write_record(CSV_HEADER)?;
    for entry in entries.iter().rev() {
        csv_writer.write_record(entry.csv_row())?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Render entries as a CSV string
pub fn to_csv(entries: &[HistoryEntry]) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(entries, &mut buf)?;
    Ok(String::from_utf8(buf)?)
}
