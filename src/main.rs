use std::error::Error;
use std::sync::Arc;

use log::{error, info};

use group_scraper_lib::logger;
use group_scraper_lib::orchestrator::{self, RunConfig};
use group_scraper_lib::resolver::ChromeFetcher;

const INPUT_FILE: &str = "groups name.xlsx";

fn main() -> Result<(), Box<dyn Error>> {
    logger::init();
    info!("Starting WhatsApp group name scraper...");

    // Optional starting index; 0 (the default) enables auto-resume from the
    // latest checkpoint.
    let start_from = match std::env::args().nth(1) {
        Some(arg) => arg
            .parse::<usize>()
            .map_err(|e| format!("invalid starting index '{}': {}", arg, e))?,
        None => 0,
    };

    let mut config = RunConfig::new(INPUT_FILE, ".");
    config.start_from = start_from;

    match orchestrator::run(&config, Arc::new(ChromeFetcher)) {
        Ok(summary) => {
            info!("Resolved {} of {} links.", summary.resolved, summary.total);
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
