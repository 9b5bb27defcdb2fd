//! Time utilities for zli

use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp in milliseconds.
///
/// # Panics
/// Panics if the system time is before the Unix epoch (1970-01-01),
/// which would indicate a severely misconfigured system.
///
/// # Examples
/// ```
/// use zl_core::time::current_time_millis;
///
/// let now = current_time_millis();
/// assert!(now > 0);
/// ```
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX epoch")
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_time_millis_is_monotonic_enough() {
        let first = current_time_millis();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(current_time_millis() >= first + 5);
    }
}
