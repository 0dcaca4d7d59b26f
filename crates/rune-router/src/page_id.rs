//! Fixed-capacity page id pool.
//!
//! Ids are bit indices in a single 64-bit mask. Allocation and recycling are lock-free so
//! either execution context may call them without holding the stack mutex.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of page ids the pool can hand out at once.
pub const MAX_PAGE_ID_SIZE: u32 = u64::BITS;

/// Identifier of a live page, always below [`MAX_PAGE_ID_SIZE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl PageId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bitmask pool issuing the lowest free page id.
#[derive(Debug, Default)]
pub struct PageIdAllocator {
    pool: AtomicU64,
}

impl PageIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the lowest unset bit. `None` once all 64 ids are live.
    pub fn allocate(&self) -> Option<PageId> {
        for idx in 0..MAX_PAGE_ID_SIZE {
            let mask = 1u64 << idx;
            if self.pool.fetch_or(mask, Ordering::Relaxed) & mask == 0 {
                return Some(PageId(idx));
            }
        }
        None
    }

    /// Releases `id`. Out-of-range ids are ignored.
    pub fn recycle(&self, id: PageId) {
        if id.0 >= MAX_PAGE_ID_SIZE {
            return;
        }
        self.pool.fetch_and(!(1u64 << id.0), Ordering::Relaxed);
    }

    pub fn is_live(&self, id: PageId) -> bool {
        id.0 < MAX_PAGE_ID_SIZE && self.pool.load(Ordering::Relaxed) & (1u64 << id.0) != 0
    }

    pub fn live_count(&self) -> u32 {
        self.pool.load(Ordering::Relaxed).count_ones()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn allocates_lowest_free_slot() {
        let ids = PageIdAllocator::new();
        assert_eq!(ids.allocate(), Some(PageId(0)));
        assert_eq!(ids.allocate(), Some(PageId(1)));
        assert_eq!(ids.allocate(), Some(PageId(2)));
        ids.recycle(PageId(1));
        assert_eq!(ids.allocate(), Some(PageId(1)));
        assert_eq!(ids.allocate(), Some(PageId(3)));
    }

    #[test]
    fn exhaustion_returns_none_until_recycled() {
        let ids = PageIdAllocator::new();
        for expected in 0..MAX_PAGE_ID_SIZE {
            assert_eq!(ids.allocate(), Some(PageId(expected)));
        }
        assert_eq!(ids.allocate(), None);
        assert_eq!(ids.live_count(), 64);

        ids.recycle(PageId(40));
        assert_eq!(ids.allocate(), Some(PageId(40)));
    }

    #[test]
    fn recycle_ignores_out_of_range_ids() {
        let ids = PageIdAllocator::new();
        let first = ids.allocate().unwrap();
        ids.recycle(PageId(64));
        ids.recycle(PageId(u32::MAX));
        assert!(ids.is_live(first));
        assert_eq!(ids.live_count(), 1);
    }

    #[test]
    fn recycling_everything_restarts_in_ascending_order() {
        let ids = PageIdAllocator::new();
        let held: Vec<_> = (0..10).filter_map(|_| ids.allocate()).collect();
        for id in held.iter().rev() {
            ids.recycle(*id);
        }
        let again: Vec<_> = (0..10).filter_map(|_| ids.allocate()).collect();
        assert_eq!(again, held);
    }

    #[test]
    fn concurrent_allocations_never_collide() {
        let ids = Arc::new(PageIdAllocator::new());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..16).filter_map(|_| ids.allocate()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for worker in workers {
            for id in worker.join().unwrap() {
                assert!(seen.insert(id), "page id {id} handed out twice");
            }
        }
        assert_eq!(seen.len(), 64);
        assert_eq!(ids.allocate(), None);
    }
}
