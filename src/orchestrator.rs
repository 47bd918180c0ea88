use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};
use thiserror::Error;

use crate::cache::{ResultCache, DEFAULT_CACHE_CAPACITY};
use crate::checkpoint::{checkpoint_due, CheckpointStore};
use crate::input_loader::{self, InputError};
use crate::resolver::{NameFetcher, Resolution};

pub const DEFAULT_LINK_COLUMN: &str = "whatsAppLink";
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 500;

pub struct RunConfig {
    pub input_path: PathBuf,
    /// Checkpoints and final results land here.
    pub work_dir: PathBuf,
    pub link_column: String,
    pub workers: usize,
    pub checkpoint_interval: usize,
    /// 0 enables auto-resume from the latest checkpoint.
    pub start_from: usize,
}

impl RunConfig {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(input_path: P, work_dir: Q) -> Self {
        RunConfig {
            input_path: input_path.into(),
            work_dir: work_dir.into(),
            link_column: DEFAULT_LINK_COLUMN.to_string(),
            workers: DEFAULT_WORKERS,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            start_from: 0,
        }
    }
}

/// Only initialization can fail; per-link failures are recorded as tagged
/// resolutions and never abort the run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("no valid links found in the input file")]
    NoLinks,
    #[error("failed to write results: {0}")]
    Output(#[from] csv::Error),
}

#[derive(Debug)]
pub struct RunSummary {
    pub total: usize,
    pub resolved: usize,
    pub final_path: PathBuf,
    pub elapsed: Duration,
}

/// Drive one full run: load, resume, dispatch to the worker pool, collect in
/// completion order, checkpoint on cadence, finalize.
pub fn run(config: &RunConfig, fetcher: Arc<dyn NameFetcher>) -> Result<RunSummary, RunError> {
    let table = input_loader::load_table(&config.input_path, &config.link_column)?;
    let links = table.links();
    let total = links.len();
    if total == 0 {
        return Err(RunError::NoLinks);
    }

    let store = CheckpointStore::new(&config.work_dir, &config.link_column);

    let mut results: HashMap<String, Resolution> = HashMap::new();
    let mut start_from = config.start_from;
    if start_from == 0 {
        if let Some((previous, count)) = store.load_previous() {
            info!(
                "Loaded {} previous results, resuming from link {}",
                previous.len(),
                count + 1
            );
            results = previous;
            start_from = count;
        }
    }

    info!("Starting at link {} of {}", start_from + 1, total);
    info!("Worker threads: {}", config.workers);
    info!("Checkpoint interval: {} links", config.checkpoint_interval);

    // Links already restored from a checkpoint are never re-fetched.
    // Membership in the result set decides, not position: checkpoints are
    // written in completion order from the pool, so their entries are
    // rarely a prefix of the input. An explicitly supplied start index
    // still skips everything before it.
    let pending: VecDeque<String> = links
        .iter()
        .skip(config.start_from)
        .filter(|link| !results.contains_key(link.as_str()))
        .cloned()
        .collect();

    let queue = Arc::new(Mutex::new(pending));
    let cache = Arc::new(Mutex::new(ResultCache::new(DEFAULT_CACHE_CAPACITY)));
    let (tx, rx) = mpsc::channel();

    let mut handles = Vec::new();
    for _ in 0..config.workers.max(1) {
        let queue = Arc::clone(&queue);
        let cache = Arc::clone(&cache);
        let fetcher = Arc::clone(&fetcher);
        let tx = tx.clone();

        handles.push(thread::spawn(move || loop {
            let link = { queue.lock().unwrap().pop_front() };
            let Some(link) = link else { break };

            let cached = { cache.lock().unwrap().get(&link) };
            let resolution = match cached {
                Some(res) => res,
                None => {
                    let res = fetcher.fetch(&link);
                    cache.lock().unwrap().insert(link.clone(), res.clone());
                    res
                }
            };

            if tx.send((link, resolution)).is_err() {
                break;
            }
        }));
    }
    // Collector owns the only remaining receiver end; dropping our sender
    // lets the loop below end when the workers finish.
    drop(tx);

    let start_time = Instant::now();
    let interval = config.checkpoint_interval.max(1);
    let mut processed = start_from;

    for (link, resolution) in rx {
        results.insert(link, resolution.clone());
        processed += 1;

        if checkpoint_due(processed, total, interval) {
            if let Err(e) = store.save_checkpoint(&table, &results, processed, total) {
                warn!("Checkpoint save failed: {}", e);
            }
        }

        print_progress(processed, total, start_from, start_time.elapsed(), &resolution);
    }
    println!();

    for handle in handles {
        let _ = handle.join();
    }

    let final_path = store.save_final(&table, &results, total)?;
    let elapsed = start_time.elapsed();
    info!("Finished. Final results saved to {:?}", final_path);
    info!("Total time: {:.2} minutes", elapsed.as_secs_f64() / 60.0);

    Ok(RunSummary {
        total,
        resolved: results.len(),
        final_path,
        elapsed,
    })
}

// One continuously overwritten line; lifecycle messages go through the
// logger instead so they don't fight over the terminal.
fn print_progress(
    processed: usize,
    total: usize,
    start_from: usize,
    elapsed: Duration,
    last: &Resolution,
) {
    let percent = processed as f64 / total as f64 * 100.0;
    let eta = estimate_eta_minutes(processed, total, start_from, elapsed);
    let preview: String = last.to_string().chars().take(50).collect();
    print!(
        "\r{}/{} ({:.1}%) | ETA {:.1} min | last: {}",
        processed, total, percent, eta, preview
    );
    let _ = std::io::stdout().flush();
}

/// Remaining minutes from the average completion rate of this run. Links
/// restored from a checkpoint don't count toward the average.
fn estimate_eta_minutes(
    processed: usize,
    total: usize,
    start_from: usize,
    elapsed: Duration,
) -> f64 {
    let done_this_run = processed.saturating_sub(start_from);
    if done_this_run == 0 {
        return 0.0;
    }
    let avg_secs = elapsed.as_secs_f64() / done_this_run as f64;
    total.saturating_sub(processed) as f64 * avg_secs / 60.0
}
