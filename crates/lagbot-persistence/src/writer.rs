//! JSON Lines spool writer for synchronizer snapshots.
//!
//! Uses JSON Lines format (.jsonl) for robustness:
//! - Each line is a complete JSON object
//! - Partial file corruption only affects individual lines
//! - Readable even if the last write was interrupted

use crate::error::PersistenceResult;
use chrono::Utc;
use lagbot_core::SynchronizedSnapshot;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One spooled row per snapshot: each source's price and timestamp plus
/// the derived lag and divergence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub timestamp_ms: i64,
    pub spot_direct_price: Option<f64>,
    pub spot_direct_ts: Option<i64>,
    pub venue_spot_price: Option<f64>,
    pub venue_spot_ts: Option<i64>,
    pub venue_oracle_price: Option<f64>,
    pub venue_oracle_ts: Option<i64>,
    pub chain_oracle_price: Option<f64>,
    pub chain_oracle_ts: Option<i64>,
    pub lag_ms: Option<i64>,
    pub divergence_pct: Option<f64>,
    /// Book count at capture time, as a coverage indicator.
    pub book_count: usize,
}

impl SnapshotRecord {
    #[must_use]
    pub fn from_snapshot(snapshot: &SynchronizedSnapshot) -> Self {
        Self {
            timestamp_ms: snapshot.timestamp_ms,
            spot_direct_price: snapshot.spot_direct.as_ref().map(|u| u.price),
            spot_direct_ts: snapshot.spot_direct.as_ref().map(|u| u.timestamp_ms),
            venue_spot_price: snapshot.venue_spot.as_ref().map(|u| u.price),
            venue_spot_ts: snapshot.venue_spot.as_ref().map(|u| u.timestamp_ms),
            venue_oracle_price: snapshot.venue_oracle.as_ref().map(|u| u.price),
            venue_oracle_ts: snapshot.venue_oracle.as_ref().map(|u| u.timestamp_ms),
            chain_oracle_price: snapshot.chain_oracle.as_ref().map(|u| u.price),
            chain_oracle_ts: snapshot.chain_oracle.as_ref().map(|u| u.timestamp_ms),
            lag_ms: snapshot.lag_ms(),
            divergence_pct: snapshot.divergence_pct(),
            book_count: snapshot.books.len(),
        }
    }
}

struct ActiveWriter {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

/// Buffered, date-rotated JSON Lines writer.
///
/// Append mode: safe for interrupted writes.
pub struct SnapshotSpooler {
    base_dir: PathBuf,
    buffer: Vec<SnapshotRecord>,
    max_buffer_size: usize,
    active_writer: Option<ActiveWriter>,
}

impl SnapshotSpooler {
    pub fn new(base_dir: &Path, max_buffer_size: usize) -> Self {
        if let Err(e) = std::fs::create_dir_all(base_dir) {
            warn!(?e, dir = %base_dir.display(), "failed to create spool directory");
        }

        Self {
            base_dir: base_dir.to_path_buf(),
            buffer: Vec::with_capacity(max_buffer_size),
            max_buffer_size,
            active_writer: None,
        }
    }

    /// Buffer one record; flushes when the buffer fills.
    pub fn add_record(&mut self, record: SnapshotRecord) -> PersistenceResult<()> {
        self.buffer.push(record);
        if self.buffer.len() >= self.max_buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Append all buffered records to the current daily file.
    pub fn flush(&mut self) -> PersistenceResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let date = Utc::now().format("%Y%m%d").to_string();
        self.rotate_if_needed(&date)?;

        let records = std::mem::take(&mut self.buffer);
        let count = records.len();

        if let Some(active) = self.active_writer.as_mut() {
            for record in records {
                serde_json::to_writer(&mut active.writer, &record)?;
                active.writer.write_all(b"\n")?;
            }
            active.writer.flush()?;
            active.records_written += count;
            debug!(count, total = active.records_written, "spool flushed");
        }

        Ok(())
    }

    fn rotate_if_needed(&mut self, date: &str) -> PersistenceResult<()> {
        let needs_new = self
            .active_writer
            .as_ref()
            .map_or(true, |w| w.date != date);
        if !needs_new {
            return Ok(());
        }

        if let Some(old) = self.active_writer.take() {
            info!(
                date = %old.date,
                records = old.records_written,
                "spool file rotated"
            );
        }

        let path = self.file_path(date);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), "spool file opened");

        self.active_writer = Some(ActiveWriter {
            writer: BufWriter::new(file),
            date: date.to_string(),
            records_written: 0,
        });
        Ok(())
    }

    fn file_path(&self, date: &str) -> PathBuf {
        self.base_dir.join(format!("snapshots_{date}.jsonl"))
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Drop for SnapshotSpooler {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(?e, "spool flush on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lagbot_core::{PriceUpdate, StreamSource};

    fn snapshot(ts: i64) -> SynchronizedSnapshot {
        SynchronizedSnapshot {
            timestamp_ms: ts,
            spot_direct: Some(PriceUpdate::new(
                StreamSource::SpotDirect,
                "BTCUSDT",
                50_100.0,
                ts - 100,
            )),
            venue_oracle: Some(PriceUpdate::new(
                StreamSource::VenueOracle,
                "BTCUSD",
                50_000.0,
                ts - 700,
            )),
            ..Default::default()
        }
    }

    #[test]
    fn test_record_derives_lag_and_divergence() {
        let record = SnapshotRecord::from_snapshot(&snapshot(1_700_000_000_000));
        assert_eq!(record.lag_ms, Some(600));
        assert!(record.divergence_pct.unwrap() > 0.0);
        assert_eq!(record.spot_direct_price, Some(50_100.0));
        assert!(record.venue_spot_price.is_none());
    }

    #[test]
    fn test_spool_writes_one_line_per_record() {
        let dir = std::env::temp_dir().join(format!("lagbot-spool-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        {
            let mut spooler = SnapshotSpooler::new(&dir, 2);
            for i in 0..5_i64 {
                spooler
                    .add_record(SnapshotRecord::from_snapshot(&snapshot(i)))
                    .unwrap();
            }
            spooler.flush().unwrap();
        }

        let date = Utc::now().format("%Y%m%d").to_string();
        let contents =
            std::fs::read_to_string(dir.join(format!("snapshots_{date}.jsonl"))).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 5);
        for line in lines {
            let parsed: SnapshotRecord = serde_json::from_str(line).unwrap();
            assert_eq!(parsed.lag_ms, Some(600));
        }

        let _ = std::fs::remove_dir_all(&dir);
    }
}
