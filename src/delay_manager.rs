use std::thread;
use std::time::Duration;

use log::debug;
use rand::Rng;

/// Short pause after a successful meta-tag extraction, before the result
/// is returned. Keeps the request rate below what the invite pages throttle.
pub fn politeness_delay() {
    sleep_range(500, 1500);
}

/// Pause applied on every outcome, right before the browser session is
/// released. One to two seconds between consecutive fetches per worker.
pub fn throttle_delay() {
    sleep_range(1000, 2000);
}

fn sleep_range(min_ms: u64, max_ms: u64) {
    let delay_ms = random_delay_ms(min_ms, max_ms);
    debug!("Waiting for {} ms", delay_ms);
    thread::sleep(Duration::from_millis(delay_ms));
}

fn random_delay_ms(min_ms: u64, max_ms: u64) -> u64 {
    let mut rng = rand::thread_rng();
    rng.gen_range(min_ms..=max_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_stays_within_requested_range() {
        for _ in 0..100 {
            let d = random_delay_ms(500, 1500);
            assert!((500..=1500).contains(&d));
        }
    }
}
