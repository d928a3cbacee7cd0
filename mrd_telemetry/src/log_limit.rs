//! Rate-limited error logging.
//!
//! The producer hot path can hit the same failure thousands of times per
//! second when a platform is misconfigured. Every distinct message text is
//! emitted at most once per suppression interval; the table of seen
//! messages is bounded, and distinct messages dropped while it is full are
//! counted and surfaced in a single periodic summary line.

use crate::consts::{LOG_MAX_ENTRIES, LOG_SUPPRESS_SECS};
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};
use std::time::{Duration, Instant};
use tracing::error;

struct Limiter {
    last_emit: HashMap<String, Instant>,
    dropped: u64,
    last_summary: Option<Instant>,
}

static LIMITER: LazyLock<Mutex<Limiter>> = LazyLock::new(|| {
    Mutex::new(Limiter {
        last_emit: HashMap::new(),
        dropped: 0,
        last_summary: None,
    })
});

fn interval() -> Duration {
    Duration::from_secs(LOG_SUPPRESS_SECS)
}

/// Log `message` at error level unless the same text was emitted within
/// the suppression interval.
pub fn log_error_limited(message: String) {
    let now = Instant::now();
    let mut limiter = match LIMITER.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    if let Some(last) = limiter.last_emit.get_mut(&message) {
        if now.duration_since(*last) < interval() {
            return;
        }
        *last = now;
    } else {
        if limiter.last_emit.len() >= LOG_MAX_ENTRIES {
            // Make room by expiring stale entries before giving up.
            let cutoff = interval();
            limiter
                .last_emit
                .retain(|_, stamp| now.duration_since(*stamp) < cutoff);
        }
        if limiter.last_emit.len() >= LOG_MAX_ENTRIES {
            limiter.dropped += 1;
            let due = limiter
                .last_summary
                .map_or(true, |stamp| now.duration_since(stamp) >= interval());
            if due {
                error!(
                    dropped = limiter.dropped,
                    "error log suppression table full; distinct messages dropped"
                );
                limiter.last_summary = Some(now);
            }
            return;
        }
        limiter.last_emit.insert(message.clone(), now);
    }

    drop(limiter);
    error!("{message}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_message_is_suppressed() {
        // Both calls go through the shared limiter; the second is within
        // the interval and must not panic or grow state unboundedly.
        log_error_limited("limiter-test repeated message".to_string());
        log_error_limited("limiter-test repeated message".to_string());

        let limiter = LIMITER.lock().unwrap();
        assert!(limiter.last_emit.contains_key("limiter-test repeated message"));
    }

    #[test]
    fn distinct_messages_tracked_up_to_cap() {
        for i in 0..8 {
            log_error_limited(format!("limiter-test distinct {i}"));
        }
        let limiter = LIMITER.lock().unwrap();
        assert!(limiter.last_emit.len() <= LOG_MAX_ENTRIES);
    }
}
