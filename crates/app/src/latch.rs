//! One-shot latch guarding operations that must run at most once.

use std::sync::atomic::{AtomicBool, Ordering};

/// A check-and-set flag.
///
/// [`try_fire`](Self::try_fire) returns `true` for exactly one caller, no
/// matter how many completion paths race to it.
#[derive(Debug, Default)]
pub struct OnceLatch {
    fired: AtomicBool,
}

impl OnceLatch {
    /// A latch that has not fired yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
        }
    }

    /// Fire the latch. Returns `true` only on the first call.
    pub fn try_fire(&self) -> bool {
        !self.fired.swap(true, Ordering::AcqRel)
    }

    /// Whether the latch already fired.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn should_fire_only_once() {
        let latch = OnceLatch::new();
        assert!(!latch.is_fired());
        assert!(latch.try_fire());
        assert!(!latch.try_fire());
        assert!(latch.is_fired());
    }

    #[tokio::test]
    async fn should_let_exactly_one_racing_task_win() {
        let latch = Arc::new(OnceLatch::new());
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let latch = Arc::clone(&latch);
            tasks.spawn(async move { latch.try_fire() });
        }

        let mut winners = 0;
        while let Some(won) = tasks.join_next().await {
            if won.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
