//! Free slot allocation.
//!
//! Key-store indices are handed out from the shared [`FreeRing`]. In
//! multi-writer modes each worker additionally keeps a private cache, refilled
//! from and flushed to the ring in bursts of `P::CACHE_SIZE`.

use core::marker::PhantomData;

use crossbeam_utils::CachePadded;

use crate::error::Error;
use crate::index::SlotIndex;
use crate::index::WorkerId;
use crate::params::Params;
use crate::params::ParamsExt;
use crate::ring::FreeRing;
use crate::sync::Mutex;

type Cache = CachePadded<Mutex<Vec<u32>>>;

pub(crate) struct FreeSlots<P>
where
  P: Params + ?Sized,
{
  ring: FreeRing,
  caches: Option<Box<[Cache]>>,
  slots: u32,
  marker: PhantomData<fn(P)>,
}

impl<P> FreeSlots<P>
where
  P: Params + ?Sized,
{
  /// Returns the number of key-store records, including record `0`, needed
  /// to hold `capacity` keys.
  pub(crate) const fn records(capacity: usize, cached: bool) -> usize {
    if cached {
      capacity + P::CACHE_SLACK + 1
    } else {
      capacity + 1
    }
  }

  /// Creates an allocator holding `slots` free indices (`1..=slots`).
  pub(crate) fn new(slots: u32, cached: bool) -> Self {
    let caches: Option<Box<[Cache]>> = cached.then(|| {
      (0..P::WORKERS)
        .map(|_| CachePadded::new(Mutex::new(Vec::with_capacity(P::CACHE_SIZE))))
        .collect()
    });

    Self {
      ring: FreeRing::filled(slots as usize, slots),
      caches,
      slots,
      marker: PhantomData,
    }
  }

  /// Returns the total number of indices managed, free or not.
  #[inline]
  pub(crate) const fn slots(&self) -> u32 {
    self.slots
  }

  /// Checks that `worker` names an existing cache.
  pub(crate) fn check_worker(&self, worker: WorkerId) -> Result<(), Error> {
    match self.caches {
      Some(ref caches) if worker.get() >= caches.len() => {
        Err(Error::InvalidArgument("worker id out of range"))
      }
      Some(_) | None => Ok(()),
    }
  }

  /// Takes a free index on behalf of `worker`.
  ///
  /// # Errors
  ///
  /// Returns [`Error::OutOfSpace`] when neither the worker cache nor the ring
  /// holds a free index.
  pub(crate) fn acquire(&self, worker: WorkerId) -> Result<SlotIndex, Error> {
    let index: Option<u32> = match self.cache(worker)? {
      Some(cache) => {
        let mut cache = cache.lock();

        if cache.is_empty() {
          self.ring.dequeue_burst(&mut cache, P::CACHE_SIZE);
        }

        cache.pop()
      }
      None => self.ring.dequeue(),
    };

    index.and_then(SlotIndex::new).ok_or(Error::OutOfSpace)
  }

  /// Returns `index` to the free pool on behalf of `worker`.
  pub(crate) fn release(&self, worker: WorkerId, index: SlotIndex) -> Result<(), Error> {
    match self.cache(worker)? {
      Some(cache) => {
        let mut cache = cache.lock();

        if cache.len() >= P::CACHE_SIZE {
          self.ring.enqueue_burst(&mut cache);
        }

        cache.push(index.get());
      }
      None => {
        // Every index has a home in the ring; overflow means a double free.
        let result: Result<(), u32> = self.ring.enqueue(index.get());
        debug_assert!(result.is_ok(), "free ring overflow");
      }
    }

    Ok(())
  }

  /// Returns the number of indices currently handed out.
  pub(crate) fn in_use(&self) -> usize {
    let cached: usize = self.caches.as_deref().map_or(0, |caches| {
      caches.iter().map(|cache| cache.lock().len()).sum()
    });

    (self.slots as usize)
      .saturating_sub(self.ring.len())
      .saturating_sub(cached)
  }

  /// Marks every index free again and empties every worker cache.
  ///
  /// Callers must hold exclusive mutation rights.
  pub(crate) fn reset(&self) {
    if let Some(caches) = self.caches.as_deref() {
      for cache in caches {
        cache.lock().clear();
      }
    }

    self.ring.clear();
    self.ring.fill(self.slots);
  }

  #[inline]
  fn cache(&self, worker: WorkerId) -> Result<Option<&Mutex<Vec<u32>>>, Error> {
    match self.caches.as_deref() {
      Some(caches) => caches
        .get(worker.get())
        .map(|cache| Some(&**cache))
        .ok_or(Error::InvalidArgument("worker id out of range")),
      None => Ok(None),
    }
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use crate::error::Error;
  use crate::index::SlotIndex;
  use crate::index::WorkerId;
  use crate::params::ConstParams;
  use crate::slots::FreeSlots;

  type P = ConstParams<64, 4, 3>;

  #[test]
  fn records_include_slack() {
    assert_eq!(FreeSlots::<P>::records(16, false), 17);
    assert_eq!(FreeSlots::<P>::records(16, true), 16 + 2 * 3 + 1);
  }

  #[test]
  fn direct_acquire_exhausts() {
    let slots: FreeSlots<P> = FreeSlots::new(4, false);
    let mut seen: HashSet<u32> = HashSet::new();

    for _ in 0..4 {
      assert!(seen.insert(slots.acquire(WorkerId::MAIN).unwrap().get()));
    }

    assert_eq!(slots.acquire(WorkerId::MAIN), Err(Error::OutOfSpace));
    assert_eq!(slots.in_use(), 4);
  }

  #[test]
  fn cached_acquire_refills_in_bursts() {
    let slots: FreeSlots<P> = FreeSlots::new(10, true);

    let index: SlotIndex = slots.acquire(WorkerId::new(1)).unwrap();

    // One index handed out, three parked in the worker cache.
    assert_eq!(slots.in_use(), 1);
    assert_eq!(slots.ring.len(), 6);

    slots.release(WorkerId::new(1), index).unwrap();

    assert_eq!(slots.in_use(), 0);
  }

  #[test]
  fn cached_release_flushes_full_cache() {
    let slots: FreeSlots<P> = FreeSlots::new(10, true);
    let mut taken: Vec<SlotIndex> = Vec::new();

    for _ in 0..10 {
      taken.push(slots.acquire(WorkerId::new(0)).unwrap());
    }

    assert_eq!(slots.acquire(WorkerId::new(0)), Err(Error::OutOfSpace));

    for index in taken {
      slots.release(WorkerId::new(0), index).unwrap();
    }

    assert_eq!(slots.in_use(), 0);
    assert!(slots.ring.len() >= 10 - 4);
  }

  #[test]
  fn worker_out_of_range() {
    let slots: FreeSlots<P> = FreeSlots::new(10, true);

    assert!(slots.check_worker(WorkerId::new(2)).is_ok());
    assert!(matches!(
      slots.check_worker(WorkerId::new(3)),
      Err(Error::InvalidArgument(_)),
    ));
    assert!(matches!(
      slots.acquire(WorkerId::new(3)),
      Err(Error::InvalidArgument(_)),
    ));
  }

  #[test]
  fn single_writer_ignores_worker() {
    let slots: FreeSlots<P> = FreeSlots::new(4, false);

    assert!(slots.check_worker(WorkerId::new(1000)).is_ok());
  }

  #[test]
  fn reset_frees_everything() {
    let slots: FreeSlots<P> = FreeSlots::new(8, true);

    for _ in 0..5 {
      slots.acquire(WorkerId::new(2)).unwrap();
    }

    slots.reset();

    assert_eq!(slots.in_use(), 0);
    assert_eq!(slots.ring.len(), 8);
  }
}
