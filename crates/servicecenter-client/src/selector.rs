//! Round-robin endpoint selection

use std::sync::atomic::{AtomicIsize, Ordering};

/// Best-effort round robin over a fixed endpoint list.
///
/// The cursor is the only mutable state. Concurrent callers may observe the
/// same endpoint or skip one when they race; losers of the
/// compare-and-exchange re-read the cursor instead of spinning.
#[derive(Debug)]
pub struct RoundRobin {
    endpoints: Vec<String>,
    index: AtomicIsize,
}

impl RoundRobin {
    /// Create a selector; the first `next()` returns the first endpoint
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            index: AtomicIsize::new(-1),
        }
    }

    /// Pick the next endpoint, `None` when the list is empty
    pub fn next(&self) -> Option<&str> {
        let len = self.endpoints.len() as isize;
        if len == 0 {
            return None;
        }

        let current = self.index.load(Ordering::Acquire);
        if current >= len - 1 {
            self.index.store(0, Ordering::Release);
            return Some(self.endpoints[0].as_str());
        }

        match self.index.compare_exchange(
            current,
            current + 1,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Some(self.endpoints[(current + 1) as usize].as_str()),
            Err(observed) => {
                let slot = observed.clamp(0, len - 1) as usize;
                Some(self.endpoints[slot].as_str())
            }
        }
    }

    /// Number of endpoints
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether there is no endpoint at all
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// The endpoint list in selection order
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }
}
