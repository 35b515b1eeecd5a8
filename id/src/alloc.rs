// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! First-free allocation of [`Id`]s from a bounded range.
//!
//! The allocator always hands out the lowest free value of its range, the same policy as an
//! allocating xarray.
//! It is internally serialized, so a single allocator may be shared between threads (and between
//! devices: the auxiliary device id space is process-wide).

use crate::Id;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::ops::RangeInclusive;
use tracing::trace;

/// The full 32-bit range, starting at zero.
pub const LIMIT_32B: RangeInclusive<u32> = 0..=u32::MAX;

/// The full 32-bit range, excluding zero.
///
/// Use this range when zero is reserved to mean "no id".
pub const LIMIT_32B_ALLOC1: RangeInclusive<u32> = 1..=u32::MAX;

/// Errors which may occur when allocating or reserving an [`Id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IdAllocError {
    /// Every value of the allocator's range is in use.
    #[error("no free id in {start}..={end}")]
    Exhausted {
        /// first value of the range
        start: u32,
        /// last value of the range
        end: u32,
    },
    /// The requested value is already in use.
    #[error("id {0} is already allocated")]
    Busy(u32),
    /// The requested value lies outside of the allocator's range.
    #[error("id {id} is outside of {start}..={end}")]
    OutOfRange {
        /// the requested value
        id: u32,
        /// first value of the range
        start: u32,
        /// last value of the range
        end: u32,
    },
}

/// Hands out unique [`Id<T>`] values from a bounded range.
///
/// No value is ever returned twice until it has been [freed](IdAllocator::free).
#[derive(Debug)]
pub struct IdAllocator<T: ?Sized> {
    limit: RangeInclusive<u32>,
    used: Mutex<BTreeSet<u32>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ?Sized> IdAllocator<T> {
    /// Create an empty allocator handing out values in `limit`.
    #[must_use]
    pub const fn new(limit: RangeInclusive<u32>) -> Self {
        Self {
            limit,
            used: Mutex::new(BTreeSet::new()),
            _marker: PhantomData,
        }
    }

    /// The range of values this allocator hands out.
    #[must_use]
    pub fn limit(&self) -> &RangeInclusive<u32> {
        &self.limit
    }

    fn exhausted(&self) -> IdAllocError {
        IdAllocError::Exhausted {
            start: *self.limit.start(),
            end: *self.limit.end(),
        }
    }

    /// Allocate the lowest free value.
    ///
    /// # Errors
    ///
    /// Returns [`IdAllocError::Exhausted`] if every value of the range is in use.
    pub fn alloc(&self) -> Result<Id<T>, IdAllocError> {
        let (start, end) = (*self.limit.start(), *self.limit.end());
        if start > end {
            return Err(self.exhausted());
        }
        let mut used = self.used.lock();
        // walk the used values in order; the first gap is the answer
        let mut candidate = u64::from(start);
        for &taken in used.range(start..=end) {
            if u64::from(taken) != candidate {
                break;
            }
            candidate += 1;
        }
        let Ok(id) = u32::try_from(candidate) else {
            return Err(self.exhausted());
        };
        if id > end {
            return Err(self.exhausted());
        }
        used.insert(id);
        trace!("allocated id {id}");
        Ok(Id::from_raw(id))
    }

    /// Reserve a specific value.
    ///
    /// # Errors
    ///
    /// - [`IdAllocError::OutOfRange`] if `id` is outside of the allocator's range
    /// - [`IdAllocError::Busy`] if `id` is already in use
    pub fn insert(&self, id: Id<T>) -> Result<(), IdAllocError> {
        let raw = id.as_u32();
        if !self.limit.contains(&raw) {
            return Err(IdAllocError::OutOfRange {
                id: raw,
                start: *self.limit.start(),
                end: *self.limit.end(),
            });
        }
        if self.used.lock().insert(raw) {
            trace!("reserved id {raw}");
            Ok(())
        } else {
            Err(IdAllocError::Busy(raw))
        }
    }

    /// Return `id` to the pool.
    ///
    /// Returns `false` if `id` was not allocated.
    pub fn free(&self, id: Id<T>) -> bool {
        let removed = self.used.lock().remove(&id.as_u32());
        trace!("freed id {id}: {removed}");
        removed
    }

    /// Returns true iff `id` is currently allocated.
    #[must_use]
    pub fn contains(&self, id: Id<T>) -> bool {
        self.used.lock().contains(&id.as_u32())
    }

    /// Number of values currently allocated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.used.lock().len()
    }

    /// Returns true iff no value is currently allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.used.lock().is_empty()
    }
}

impl<T: ?Sized> Default for IdAllocator<T> {
    fn default() -> Self {
        Self::new(LIMIT_32B_ALLOC1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    struct Marker;

    #[test]
    fn alloc1_never_hands_out_zero() {
        let ids = IdAllocator::<Marker>::default();
        assert_eq!(ids.alloc().unwrap().as_u32(), 1);
        assert_eq!(ids.alloc().unwrap().as_u32(), 2);
    }

    #[test]
    fn lowest_free_value_is_reused() {
        let ids = IdAllocator::<Marker>::new(1..=10);
        let a = ids.alloc().unwrap();
        let b = ids.alloc().unwrap();
        let c = ids.alloc().unwrap();
        assert!(ids.free(b));
        assert_eq!(ids.alloc().unwrap(), b);
        assert!(ids.free(a));
        assert_eq!(ids.alloc().unwrap(), a);
        assert_eq!(ids.alloc().unwrap().as_u32(), c.as_u32() + 1);
    }

    #[test]
    fn exhaustion_is_reported() {
        let ids = IdAllocator::<Marker>::new(1..=3);
        for _ in 0..3 {
            ids.alloc().unwrap();
        }
        assert_eq!(
            ids.alloc(),
            Err(IdAllocError::Exhausted { start: 1, end: 3 })
        );
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn exhaustion_at_the_top_of_the_32_bit_range() {
        let ids = IdAllocator::<Marker>::new(u32::MAX - 1..=u32::MAX);
        assert_eq!(ids.alloc().unwrap().as_u32(), u32::MAX - 1);
        assert_eq!(ids.alloc().unwrap().as_u32(), u32::MAX);
        assert!(matches!(ids.alloc(), Err(IdAllocError::Exhausted { .. })));
    }

    #[test]
    fn insert_conflicts_and_range() {
        let ids = IdAllocator::<Marker>::new(0..=7);
        ids.insert(Id::from_raw(3)).unwrap();
        assert_eq!(ids.insert(Id::from_raw(3)), Err(IdAllocError::Busy(3)));
        assert_eq!(
            ids.insert(Id::from_raw(8)),
            Err(IdAllocError::OutOfRange {
                id: 8,
                start: 0,
                end: 7
            })
        );
        // allocation skips reserved values
        assert_eq!(ids.alloc().unwrap().as_u32(), 0);
        assert_eq!(ids.alloc().unwrap().as_u32(), 1);
        assert_eq!(ids.alloc().unwrap().as_u32(), 2);
        assert_eq!(ids.alloc().unwrap().as_u32(), 4);
    }

    #[test]
    fn double_free_is_harmless() {
        let ids = IdAllocator::<Marker>::default();
        let id = ids.alloc().unwrap();
        assert!(ids.free(id));
        assert!(!ids.free(id));
        assert!(ids.is_empty());
    }

    #[test]
    fn live_ids_are_pairwise_distinct() {
        bolero::check!()
            .with_type()
            .for_each(|ops: &Vec<(bool, u8)>| {
                let ids = IdAllocator::<Marker>::new(1..=32);
                let mut live: Vec<Id<Marker>> = Vec::new();
                for (alloc, pick) in ops {
                    if *alloc || live.is_empty() {
                        match ids.alloc() {
                            Ok(id) => {
                                assert!(!live.contains(&id));
                                live.push(id);
                            }
                            Err(IdAllocError::Exhausted { .. }) => assert_eq!(live.len(), 32),
                            Err(e) => unreachable!("unexpected error {e}"),
                        }
                    } else {
                        let id = live.swap_remove(usize::from(*pick) % live.len());
                        assert!(ids.free(id));
                    }
                    assert_eq!(ids.len(), live.len());
                }
            });
    }

    #[test]
    fn concurrent_allocations_do_not_overlap() {
        let ids = Arc::new(IdAllocator::<Marker>::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..64).map(|_| ids.alloc().unwrap()).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "id {id} handed out twice");
            }
        }
        assert_eq!(seen.len(), 8 * 64);
    }
}
