use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-stage "already running" flag. Entering is a compare-and-swap; the
/// returned guard clears the flag when dropped, including on early return
/// or panic unwinding.
#[derive(Debug, Clone, Default)]
pub struct StageFlag(Arc<AtomicBool>);

impl StageFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when a run is already in progress.
    pub fn try_enter(&self) -> Option<StageGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| StageGuard(self.0.clone()))
    }

    #[cfg(test)]
    fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct StageGuard(Arc<AtomicBool>);

impl Drop for StageGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_entry_is_refused_until_release() {
        let flag = StageFlag::new();
        let guard = flag.try_enter().unwrap();
        assert!(flag.is_running());
        assert!(flag.try_enter().is_none());

        drop(guard);
        assert!(!flag.is_running());
        assert!(flag.try_enter().is_some());
    }

    #[test]
    fn clones_share_state() {
        let flag = StageFlag::new();
        let other = flag.clone();
        let _guard = flag.try_enter().unwrap();
        assert!(other.try_enter().is_none());
    }
}
