use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::BookingId;

/// What happened to one promotion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionOutcome {
    Promoted,
    Failed,
}

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionRecord {
    pub date: NaiveDate,
    pub booking_id: BookingId,
    pub outcome: PromotionOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PromotionRecord {
    pub fn promoted(date: NaiveDate, booking_id: BookingId) -> Self {
        Self {
            date,
            booking_id,
            outcome: PromotionOutcome::Promoted,
            reason: None,
        }
    }

    pub fn failed(date: NaiveDate, booking_id: BookingId, reason: String) -> Self {
        Self {
            date,
            booking_id,
            outcome: PromotionOutcome::Failed,
            reason: Some(reason),
        }
    }
}

/// Append-only record of promotion sweep outcomes, independent of the
/// primary booking journal. One file per calendar day, never rewritten,
/// one JSON object per line. Each append is fsynced so an acknowledged
/// record survives a crash.
pub struct PromotionLog {
    dir: PathBuf,
}

impl PromotionLog {
    /// Open the log directory, creating it if needed. Called once at
    /// startup; failure here is fatal to the process.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("promotions_{}.log", date.format("%Y-%m-%d")))
    }

    /// Append one record to its day's file.
    pub fn append(&self, record: &PromotionRecord) -> io::Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.day_path(record.date))?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()
    }

    /// Read back one day's records. A torn final line (crash mid-append)
    /// is discarded; anything corrupt before that is a hard error.
    pub fn read_day(&self, date: NaiveDate) -> io::Result<Vec<PromotionRecord>> {
        let path = self.day_path(date);
        read_records(&path)
    }
}

fn read_records(path: &Path) -> io::Result<Vec<PromotionRecord>> {
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    let mut lines = reader.lines().peekable();
    while let Some(line) = lines.next() {
        let line = line?;
        match serde_json::from_str::<PromotionRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) if lines.peek().is_none() => {
                // Torn tail from a crash mid-append; everything before it
                // was fsynced and parsed.
                tracing::warn!("discarding torn audit record in {}: {e}", path.display());
                break;
            }
            Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
        }
    }
    Ok(records)
}
