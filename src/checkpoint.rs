use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Local;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::input_loader::InputTable;
use crate::resolver::Resolution;

const MANIFEST_FILE: &str = "progress.json";
const SNAPSHOT_PREFIX: &str = "temp_results_";
const FINAL_PREFIX: &str = "final_results_";

/// Name of the results column appended to every snapshot.
pub const RESULT_COLUMN: &str = "Groups Name";

/// Resume state written alongside every snapshot. The manifest, not the
/// snapshot filename, is the source of resume truth.
#[derive(Serialize, Deserialize, Default)]
struct Manifest {
    entries: HashMap<String, Resolution>,
    processed: usize,
    total: usize,
}

/// Persists partial and final results under a working directory.
///
/// Two artifacts per checkpoint: a JSON manifest with structured
/// resolutions, and a CSV snapshot of the full input table plus the
/// [`RESULT_COLUMN`]. Loading prefers the manifest and falls back to the
/// newest snapshot, so runs checkpointed by older versions still resume.
pub struct CheckpointStore {
    dir: PathBuf,
    link_column: String,
}

impl CheckpointStore {
    pub fn new<P: AsRef<Path>>(dir: P, link_column: &str) -> Self {
        CheckpointStore {
            dir: dir.as_ref().to_path_buf(),
            link_column: link_column.to_string(),
        }
    }

    /// Restore the latest prior partial results, if any. Fails soft: any
    /// unreadable or malformed state is treated as "no checkpoint".
    pub fn load_previous(&self) -> Option<(HashMap<String, Resolution>, usize)> {
        if let Some(found) = self.load_manifest() {
            return Some(found);
        }
        self.load_latest_snapshot()
    }

    pub fn save_checkpoint(
        &self,
        table: &InputTable,
        results: &HashMap<String, Resolution>,
        processed: usize,
        total: usize,
    ) -> Result<PathBuf, csv::Error> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!("{}{}_{}_of_{}.csv", SNAPSHOT_PREFIX, timestamp, processed, total);
        let path = self.dir.join(filename);

        self.write_snapshot(&path, table, results)?;
        self.write_manifest(results, processed, total);
        info!("Saved checkpoint: {:?}", path);
        Ok(path)
    }

    pub fn save_final(
        &self,
        table: &InputTable,
        results: &HashMap<String, Resolution>,
        total: usize,
    ) -> Result<PathBuf, csv::Error> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = self.dir.join(format!("{}{}.csv", FINAL_PREFIX, timestamp));

        self.write_snapshot(&path, table, results)?;
        self.write_manifest(results, total, total);
        Ok(path)
    }

    fn load_manifest(&self) -> Option<(HashMap<String, Resolution>, usize)> {
        let path = self.dir.join(MANIFEST_FILE);
        if !path.exists() {
            return None;
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to read {:?}: {}. Starting fresh.", path, e);
                return None;
            }
        };
        let manifest: Manifest = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                error!("Failed to parse {:?}: {}. Starting fresh.", path, e);
                return None;
            }
        };
        if manifest.entries.is_empty() {
            return None;
        }

        // A processed count that exceeds the number of stored entries cannot
        // be trusted; the entry count wins so a corrupt manifest never skips
        // unprocessed links.
        let processed = manifest.processed.min(manifest.entries.len());
        info!("Resumed from manifest: {} results.", manifest.entries.len());
        Some((manifest.entries, processed))
    }

    fn load_latest_snapshot(&self) -> Option<(HashMap<String, Resolution>, usize)> {
        let read_dir = std::fs::read_dir(&self.dir).ok()?;

        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for entry in read_dir.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(SNAPSHOT_PREFIX) || !name.ends_with(".csv") {
                continue;
            }
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(_) => continue,
            };
            if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
                newest = Some((modified, entry.path()));
            }
        }

        let (_, path) = newest?;
        let entries = match self.read_snapshot_results(&path) {
            Ok(e) if !e.is_empty() => e,
            Ok(_) => return None,
            Err(e) => {
                warn!("Failed to load snapshot {:?}: {}. Starting fresh.", path, e);
                return None;
            }
        };

        // Filename counts are informational; clamp to what was actually
        // loaded.
        let claimed = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_processed_count);
        let processed = claimed.unwrap_or(entries.len()).min(entries.len());

        info!("Resumed from snapshot {:?}: {} results.", path, entries.len());
        Some((entries, processed))
    }

    /// Legacy snapshots hold rendered text, error tags included, so every
    /// non-empty cell comes back as a plain `Name`.
    fn read_snapshot_results(
        &self,
        path: &Path,
    ) -> Result<HashMap<String, Resolution>, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(path)?;

        let headers = rdr.headers()?.clone();
        let link_idx = headers.iter().position(|h| h.trim() == self.link_column);
        let result_idx = headers.iter().position(|h| h.trim() == RESULT_COLUMN);
        let (link_idx, result_idx) = match (link_idx, result_idx) {
            (Some(l), Some(r)) => (l, r),
            _ => return Ok(HashMap::new()),
        };

        let mut entries = HashMap::new();
        for record in rdr.records() {
            let record = record?;
            let link = record.get(link_idx).map(str::trim).unwrap_or_default();
            let result = record.get(result_idx).map(str::trim).unwrap_or_default();
            if !link.is_empty() && !result.is_empty() {
                entries.insert(link.to_string(), Resolution::Name(result.to_string()));
            }
        }
        Ok(entries)
    }

    fn write_snapshot(
        &self,
        path: &Path,
        table: &InputTable,
        results: &HashMap<String, Resolution>,
    ) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(path)?;

        let mut headers = table.headers.clone();
        headers.push(RESULT_COLUMN.to_string());
        writer.write_record(&headers)?;

        for row in &table.rows {
            let resolved = table
                .link_cell(row)
                .and_then(|link| results.get(link))
                .map(|r| r.to_string())
                .unwrap_or_default();

            let mut record = row.clone();
            // Pad short rows so every record lines up with the header.
            record.resize(table.headers.len(), String::new());
            record.push(resolved);
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }

    // Manifest writes fail soft: losing one checkpoint's resume state is
    // recoverable, aborting the run is not.
    fn write_manifest(&self, results: &HashMap<String, Resolution>, processed: usize, total: usize) {
        let manifest = Manifest {
            entries: results.clone(),
            processed,
            total,
        };
        let json = match serde_json::to_string_pretty(&manifest) {
            Ok(j) => j,
            Err(e) => {
                error!("Failed to serialize manifest: {}", e);
                return;
            }
        };
        if let Err(e) = std::fs::write(self.dir.join(MANIFEST_FILE), json) {
            error!("Failed to write manifest: {}", e);
        }
    }
}

/// Pull the processed count out of `temp_results_<ts>_<k>_of_<n>.csv`.
fn parse_processed_count(name: &str) -> Option<usize> {
    let stem = name.strip_suffix(".csv")?;
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() < 7 || parts[parts.len() - 2] != "of" {
        return None;
    }
    parts[parts.len() - 3].parse().ok()
}

/// A checkpoint is due every `interval` completions and on the final one.
pub fn checkpoint_due(processed: usize, total: usize, interval: usize) -> bool {
    processed % interval == 0 || processed == total
}
