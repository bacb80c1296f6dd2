//! Readiness gate
//!
//! Decisions that need the type catalog are refused until the catalog cache
//! reports its initial sync. The check never waits; callers retry.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::AdmissionError;

/// Predicate telling whether the type catalog has synced
#[derive(Clone)]
pub struct ReadinessGate {
    probe: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl ReadinessGate {
    /// Gate backed by an arbitrary sync predicate
    pub fn new(probe: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self {
            probe: Arc::new(probe),
        }
    }

    /// Gate backed by a shared flag set by the cache once synced
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self::new(move || flag.load(Ordering::Acquire))
    }

    /// Gate that never opens; used until a catalog is wired in
    pub fn never() -> Self {
        Self::new(|| false)
    }

    /// Whether the catalog has completed its initial sync
    pub fn is_ready(&self) -> bool {
        (self.probe)()
    }

    /// Fail with [`AdmissionError::NotReady`] unless ready
    pub fn check(&self) -> Result<(), AdmissionError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(AdmissionError::NotReady)
        }
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::never()
    }
}

impl fmt::Debug for ReadinessGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessGate")
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_gate_is_closed() {
        let gate = ReadinessGate::default();
        assert!(!gate.is_ready());
        assert_eq!(gate.check(), Err(AdmissionError::NotReady));
    }

    #[test]
    fn test_flag_gate_follows_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let gate = ReadinessGate::from_flag(flag.clone());
        assert!(!gate.is_ready());

        flag.store(true, Ordering::Release);
        assert!(gate.is_ready());
        assert!(gate.check().is_ok());
    }
}
