//! Replay guard - monotonic timestamp admission
//!
//! A candidate is admitted only when its timestamp is strictly greater than
//! the last one accepted; equal timestamps count as replays. The very first
//! candidate a guard (or a guard key) sees is always admitted, `0` included.
//!
//! Two flavours sit behind [`ReplayGuard`]:
//! - [`SingleSourceGuard`]: one timestamp for the whole process, whatever
//!   channel a frame came from
//! - [`KeyedGuard`]: one timestamp per source key, so independent sensors do
//!   not starve each other
//!
//! u32 wraparound is not handled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::contracts::{Admission, RejectReason};

/// Admission check keyed by source
///
/// Implementations must be safe to call from overlapping delivery callbacks.
pub trait ReplayGuard: Send + Sync {
    /// Admit or reject `candidate` for `source`, recording it on admission
    fn admit(&self, source: &str, candidate: u32) -> Admission;

    /// Last accepted timestamp for `source`, `None` before the first admission
    fn last_accepted(&self, source: &str) -> Option<u32>;
}

/// Which guard a subscriber builds when none is supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuardMode {
    #[default]
    SingleSource,
    PerChannel,
}

impl GuardMode {
    pub fn build(self) -> Arc<dyn ReplayGuard> {
        match self {
            Self::SingleSource => Arc::new(SingleSourceGuard::new()),
            Self::PerChannel => Arc::new(KeyedGuard::new()),
        }
    }
}

fn decide(last: Option<u32>, candidate: u32) -> Admission {
    match last {
        Some(last) if candidate <= last => {
            Admission::Rejected(RejectReason::ReplayOrStale { candidate, last })
        }
        _ => Admission::Accepted,
    }
}

/// One guard for every source, lock-free
///
/// The atomic stores `last + 1`, leaving `0` for "nothing accepted yet".
#[derive(Debug, Default)]
pub struct SingleSourceGuard {
    state: AtomicU64,
}

impl SingleSourceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit_timestamp(&self, candidate: u32) -> Admission {
        let encoded = u64::from(candidate) + 1;
        match self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |stored| {
                (encoded > stored).then_some(encoded)
            }) {
            Ok(_) => Admission::Accepted,
            Err(stored) => decide(decode_state(stored), candidate),
        }
    }

    pub fn last_accepted_timestamp(&self) -> Option<u32> {
        decode_state(self.state.load(Ordering::Acquire))
    }
}

fn decode_state(stored: u64) -> Option<u32> {
    stored.checked_sub(1).map(|last| last as u32)
}

impl ReplayGuard for SingleSourceGuard {
    fn admit(&self, _source: &str, candidate: u32) -> Admission {
        self.admit_timestamp(candidate)
    }

    fn last_accepted(&self, _source: &str) -> Option<u32> {
        self.last_accepted_timestamp()
    }
}

/// Independent last-accepted timestamp per source key
#[derive(Debug, Default)]
pub struct KeyedGuard {
    sources: Mutex<HashMap<String, u32>>,
}

impl KeyedGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sources seen so far
    pub fn source_count(&self) -> usize {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ReplayGuard for KeyedGuard {
    fn admit(&self, source: &str, candidate: u32) -> Admission {
        let mut sources = self.sources.lock().unwrap_or_else(PoisonError::into_inner);

        let outcome = decide(sources.get(source).copied(), candidate);
        if outcome.is_accepted() {
            sources.insert(source.to_string(), candidate);
        }
        outcome
    }

    fn last_accepted(&self, source: &str) -> Option<u32> {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(candidate: u32, last: u32) -> Admission {
        Admission::Rejected(RejectReason::ReplayOrStale { candidate, last })
    }

    #[test]
    fn test_strictly_increasing_accepted() {
        let guard = SingleSourceGuard::new();
        for ts in [1, 2, 10, 1000, u32::MAX] {
            assert_eq!(guard.admit_timestamp(ts), Admission::Accepted);
        }
        assert_eq!(guard.last_accepted_timestamp(), Some(u32::MAX));
    }

    #[test]
    fn test_equal_and_older_rejected() {
        let guard = SingleSourceGuard::new();
        assert!(guard.admit_timestamp(1000).is_accepted());
        assert_eq!(guard.admit_timestamp(1000), rejected(1000, 1000));
        assert_eq!(guard.admit_timestamp(999), rejected(999, 1000));
        assert_eq!(guard.last_accepted_timestamp(), Some(1000));
    }

    #[test]
    fn test_zero_only_admitted_first() {
        let guard = SingleSourceGuard::new();
        assert_eq!(guard.last_accepted_timestamp(), None);
        assert!(guard.admit_timestamp(0).is_accepted());
        assert_eq!(guard.admit_timestamp(0), rejected(0, 0));
    }

    #[test]
    fn test_single_source_ignores_channel() {
        let guard = SingleSourceGuard::new();
        assert!(guard.admit("a/b/c", 50).is_accepted());
        assert_eq!(guard.admit("x/y/z", 40), rejected(40, 50));
    }

    #[test]
    fn test_keyed_sources_are_independent() {
        let guard = KeyedGuard::new();
        assert!(guard.admit("escola/sala1/temperatura", 50).is_accepted());
        assert!(guard.admit("escola/sala2/temperatura", 40).is_accepted());
        assert_eq!(guard.admit("escola/sala1/temperatura", 50), rejected(50, 50));
        assert_eq!(guard.last_accepted("escola/sala2/temperatura"), Some(40));
        assert_eq!(guard.last_accepted("unknown"), None);
        assert_eq!(guard.source_count(), 2);
    }

    #[test]
    fn test_guard_mode_default() {
        let guard = GuardMode::default().build();
        assert!(guard.admit("a", 5).is_accepted());
        assert!(!guard.admit("b", 5).is_accepted());

        let keyed = GuardMode::PerChannel.build();
        assert!(keyed.admit("a", 5).is_accepted());
        assert!(keyed.admit("b", 5).is_accepted());
    }
}
