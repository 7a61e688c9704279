use std::sync::atomic::{AtomicU64, Ordering};

/// Asks the display to schedule another frame. Called from any thread.
pub trait RefreshRequester: Send + Sync {
    fn request_refresh(&self);
}

/// Counts refresh requests; the headless frame loop polls it to decide
/// whether another frame is due.
#[derive(Debug, Default)]
pub struct RefreshCounter(AtomicU64);

impl RefreshCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Returns the requests seen since the last call.
    pub fn take(&self) -> u64 {
        self.0.swap(0, Ordering::AcqRel)
    }
}

impl RefreshRequester for RefreshCounter {
    fn request_refresh(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::{RefreshCounter, RefreshRequester};

    #[test]
    fn take_resets() {
        let c = RefreshCounter::new();
        c.request_refresh();
        c.request_refresh();
        assert_eq!(c.count(), 2);
        assert_eq!(c.take(), 2);
        assert_eq!(c.count(), 0);
    }
}
