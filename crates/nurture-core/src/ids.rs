//! Human-readable record identifiers.
//!
//! Students and employees get a prefixed millisecond timestamp
//! (`STU1718000000000`, `EMP1718000000000`). A process-wide high-water mark
//! keeps ids strictly increasing even when two records are created in the
//! same millisecond.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

static LAST_ISSUED: AtomicI64 = AtomicI64::new(0);

fn next_millis() -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_ISSUED.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_ISSUED.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// New `STU<millis>` student id.
pub fn student_id() -> String {
    format!("STU{}", next_millis())
}

/// New `EMP<millis>` employee id.
pub fn employee_id() -> String {
    format!("EMP{}", next_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_prefixes() {
        assert!(student_id().starts_with("STU"));
        assert!(employee_id().starts_with("EMP"));
        assert!(student_id()[3..].parse::<i64>().is_ok());
    }

    #[test]
    fn test_ids_unique_in_tight_loop() {
        let ids: HashSet<String> = (0..1000).map(|_| student_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..250).map(|_| employee_id()).collect::<Vec<_>>()))
            .collect();
        let mut all = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(all.insert(id));
            }
        }
        assert_eq!(all.len(), 1000);
    }
}
