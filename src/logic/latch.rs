//! Alert Latch - fire-once guard for the human alert
//!
//! Once fired, the latch stays fired for the life of the process. The only
//! way back is `reset()`, which is an administrative action and is never
//! called from a detection pass.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LatchState {
    Open,
    Fired,
}

#[derive(Debug, Default)]
pub struct AlertLatch {
    fired: AtomicBool,
}

impl AlertLatch {
    pub fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
        }
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> LatchState {
        if self.is_fired() {
            LatchState::Fired
        } else {
            LatchState::Open
        }
    }

    /// Flip Open -> Fired. Returns true only for the caller that flipped it.
    pub fn try_fire(&self) -> bool {
        self.fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Re-arm (operator action only)
    pub fn reset(&self) {
        if self.fired.swap(false, Ordering::SeqCst) {
            log::warn!("Alert latch reset to open by operator");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fires_once() {
        let latch = AlertLatch::new();
        assert_eq!(latch.state(), LatchState::Open);
        assert!(latch.try_fire());
        assert!(!latch.try_fire());
        assert_eq!(latch.state(), LatchState::Fired);
    }

    #[test]
    fn test_reset_rearms() {
        let latch = AlertLatch::new();
        latch.try_fire();
        latch.reset();
        assert!(!latch.is_fired());
        assert!(latch.try_fire());
    }

    #[test]
    fn test_concurrent_fire_has_one_winner() {
        let latch = Arc::new(AlertLatch::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let latch = Arc::clone(&latch);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    if latch.try_fire() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
