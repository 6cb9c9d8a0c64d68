use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Monotonic local clock in float seconds.
///
/// Zero is the first call in this process. Source and receive timestamps must
/// share this domain for latency to be meaningful.
pub fn local_clock() -> f64 {
    EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_monotonic() {
        let a = local_clock();
        let b = local_clock();
        assert!(b >= a);
    }
}
