// Record Store: the append-only `events.csv` keyed by post id, and the
// enrichment pass that rewrites `events_enriched.csv` from it.
//
// Dedupe reads the whole file before each append. That is only correct with a
// single writer process.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::extractor::TextExtractor;
use crate::types::StoredRow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendStats {
    pub written: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichStats {
    pub rows: usize,
    /// Rows that went through the caption fallback.
    pub attempted: usize,
    /// Of those, rows that came back with at least one event.
    pub filled: usize,
}

#[derive(Deserialize)]
struct IdOnly {
    post_id: String,
}

pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Post ids already stored. A missing file has none.
    pub fn existing_ids(&self) -> Result<HashSet<String>> {
        if !self.path.exists() {
            return Ok(HashSet::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut ids = HashSet::new();
        for row in reader.deserialize::<IdOnly>() {
            ids.insert(row?.post_id);
        }
        Ok(ids)
    }

    pub fn read_all(&self) -> Result<Vec<StoredRow>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut rows = Vec::new();
        for row in reader.deserialize::<StoredRow>() {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// Append rows whose post id is not stored yet. The header is written
    /// once, when the file is created (or found empty).
    pub fn append(&self, rows: &[StoredRow]) -> Result<AppendStats> {
        let mut seen = self.existing_ids()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            writer.write_record(StoredRow::HEADERS)?;
        }

        let mut stats = AppendStats::default();
        for row in rows {
            if !seen.insert(row.post_id.clone()) {
                debug!(post_id = %row.post_id, "Already stored, skipping");
                stats.skipped += 1;
                continue;
            }
            writer.serialize(row)?;
            stats.written += 1;
        }
        writer.flush()?;

        info!(
            path = %self.path.display(),
            written = stats.written,
            skipped = stats.skipped,
            "Appended rows"
        );
        Ok(stats)
    }
}

/// Fill empty event lists from captions and write every row to `output`,
/// replacing whatever was there. Rows that already carry a non-empty list
/// are copied byte for byte, even when an entry would not decode today, and
/// cost no model call.
pub async fn enrich(
    input: &RecordStore,
    output: &Path,
    text: &dyn TextExtractor,
) -> Result<EnrichStats> {
    let rows = input.read_all()?;
    if rows.is_empty() {
        warn!(path = %input.path().display(), "No stored rows to enrich");
    }

    let mut stats = EnrichStats {
        rows: rows.len(),
        ..EnrichStats::default()
    };
    let mut enriched = Vec::with_capacity(rows.len());

    for mut row in rows {
        let stored = row.event_count();
        if stored == 0 {
            let cell = row.ocr_events.trim();
            if !cell.is_empty() && cell != "[]" {
                warn!(post_id = %row.post_id, cell, "Stored events are not a JSON list, treating as empty");
            }
            stats.attempted += 1;
            let extraction = text.extract(&row.caption, &row.timestamp).await;
            if !extraction.events.is_empty() {
                stats.filled += 1;
            }
            row.ocr_events = serde_json::to_string(&extraction.events)?;
        } else {
            debug!(post_id = %row.post_id, events = stored, "Row already has events");
        }
        enriched.push(row);
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(File::create(output)?);
    writer.write_record(StoredRow::HEADERS)?;
    for row in &enriched {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!(
        output = %output.display(),
        rows = stats.rows,
        attempted = stats.attempted,
        filled = stats.filled,
        "Enrichment complete"
    );
    Ok(stats)
}
