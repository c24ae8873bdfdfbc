use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag polled by long running loads.
pub trait Breaker: Send + Sync {
    fn is_aborted(&self) -> bool;

    fn reset(&self);

    fn abort(&self);
}

pub type BreakerRef = Arc<dyn Breaker>;

/// A breaker that can be fired from any thread.
#[derive(Debug, Default)]
pub struct ThreadedBreaker {
    aborted: AtomicBool,
}

impl ThreadedBreaker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Breaker for ThreadedBreaker {
    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    fn reset(&self) {
        self.aborted.store(false, Ordering::Release);
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_across_threads() {
        let breaker: BreakerRef = Arc::new(ThreadedBreaker::new());
        assert!(!breaker.is_aborted());

        let remote = Arc::clone(&breaker);
        std::thread::spawn(move || remote.abort()).join().unwrap();
        assert!(breaker.is_aborted());

        breaker.reset();
        assert!(!breaker.is_aborted());
    }
}
