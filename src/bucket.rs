//! The bucket table.
//!
//! Each [`Bucket`] holds [`BUCKET_ENTRIES`] parallel slots of `(current
//! signature, alternate signature, key index)`. Key index `0` marks an empty
//! slot. Slots are plain atomics so concurrent readers never race with the
//! writer in the memory-model sense; the concurrency controller decides which
//! *logical* interleavings are allowed.

use core::array;
#[cfg(not(loom))]
use core::mem::MaybeUninit;

use crate::array::Array;
use crate::error::Error;
use crate::index::SlotIndex;
use crate::params::BUCKET_ENTRIES;
use crate::signature::NULL_SIGNATURE;
use crate::sync::atomic::AtomicU32;
use crate::sync::atomic::Ordering::Acquire;
use crate::sync::atomic::Ordering::Relaxed;
use crate::sync::atomic::Ordering::Release;

/// The key index stored in unoccupied slots.
pub(crate) const EMPTY_SLOT: u32 = 0;

// -----------------------------------------------------------------------------
// Bucket
// -----------------------------------------------------------------------------

#[repr(C)]
pub(crate) struct Bucket {
  sig_current: [AtomicU32; BUCKET_ENTRIES],
  sig_alt: [AtomicU32; BUCKET_ENTRIES],
  key_idx: [AtomicU32; BUCKET_ENTRIES],
}

impl Bucket {
  #[allow(dead_code, reason = "only used with loom tests")]
  #[inline]
  fn new() -> Self {
    Self {
      sig_current: array::from_fn(|_| AtomicU32::new(NULL_SIGNATURE)),
      sig_alt: array::from_fn(|_| AtomicU32::new(NULL_SIGNATURE)),
      key_idx: array::from_fn(|_| AtomicU32::new(EMPTY_SLOT)),
    }
  }

  /// Returns a snapshot of the current signatures of every slot.
  #[inline]
  pub(crate) fn signatures(&self) -> [u32; BUCKET_ENTRIES] {
    array::from_fn(|slot| self.sig_current[slot].load(Relaxed))
  }

  #[inline]
  pub(crate) fn current(&self, slot: usize) -> u32 {
    self.sig_current[slot].load(Relaxed)
  }

  #[inline]
  pub(crate) fn alt(&self, slot: usize) -> u32 {
    self.sig_alt[slot].load(Relaxed)
  }

  /// Returns the raw key index of `slot`; [`EMPTY_SLOT`] when unoccupied.
  ///
  /// Acquires the key-store record published by [`Bucket::write`].
  #[inline]
  pub(crate) fn raw_index(&self, slot: usize) -> u32 {
    self.key_idx[slot].load(Acquire)
  }

  #[inline]
  pub(crate) fn index(&self, slot: usize) -> Option<SlotIndex> {
    SlotIndex::new(self.raw_index(slot))
  }

  #[inline]
  pub(crate) fn is_empty(&self, slot: usize) -> bool {
    self.raw_index(slot) == EMPTY_SLOT
  }

  /// Returns the first unoccupied slot, if any.
  #[inline]
  pub(crate) fn find_empty(&self) -> Option<usize> {
    (0..BUCKET_ENTRIES).find(|slot| self.is_empty(*slot))
  }

  /// Publishes an entry into `slot`.
  ///
  /// Signatures are written first and the key index last, so a reader that
  /// observes the index also observes the key-store record behind it.
  #[inline]
  pub(crate) fn write(&self, slot: usize, current: u32, alt: u32, index: u32) {
    self.sig_current[slot].store(current, Relaxed);
    self.sig_alt[slot].store(alt, Relaxed);
    self.key_idx[slot].store(index, Release);
  }

  #[inline]
  pub(crate) fn clear(&self, slot: usize) {
    self.sig_current[slot].store(NULL_SIGNATURE, Relaxed);
    self.sig_alt[slot].store(NULL_SIGNATURE, Relaxed);
    self.key_idx[slot].store(EMPTY_SLOT, Release);
  }

  /// Returns the number of occupied slots.
  #[cfg(test)]
  pub(crate) fn occupied(&self) -> usize {
    (0..BUCKET_ENTRIES).filter(|slot| !self.is_empty(*slot)).count()
  }
}

// -----------------------------------------------------------------------------
// Bucket Table
// -----------------------------------------------------------------------------

/// A power-of-two array of buckets addressed by `signature & mask`.
pub(crate) struct Buckets {
  array: Array<Bucket>,
  mask: u32,
}

impl Buckets {
  pub(crate) fn new(count: u32) -> Result<Self, Error> {
    debug_assert!(count.is_power_of_two(), "bucket count must be a power of two");

    Ok(Self {
      array: Self::new_array(count as usize)?,
      mask: count - 1,
    })
  }

  #[cfg(not(loom))]
  #[inline]
  fn new_array(count: usize) -> Result<Array<Bucket>, Error> {
    let array: Array<MaybeUninit<Bucket>> = Array::new_zeroed(count)?;

    // SAFETY: All-zeros is a valid `Bucket`: null signatures and empty slots.
    Ok(unsafe { array.assume_init() })
  }

  #[cfg(loom)]
  #[inline]
  fn new_array(count: usize) -> Result<Array<Bucket>, Error> {
    Array::new(count, |_, slot| {
      slot.write(Bucket::new());
    })
  }

  #[inline]
  pub(crate) fn len(&self) -> u32 {
    self.mask + 1
  }

  /// Returns the bucket index selected by `signature`.
  #[inline]
  pub(crate) const fn index_of(&self, signature: u32) -> u32 {
    signature & self.mask
  }

  /// Returns the bucket selected by `signature`.
  #[inline]
  pub(crate) fn get(&self, signature: u32) -> &Bucket {
    self.array.get(self.index_of(signature) as usize)
  }

  #[inline]
  pub(crate) fn at(&self, index: u32) -> &Bucket {
    self.array.get(index as usize)
  }

  /// Empties every slot. Callers must hold exclusive mutation rights.
  pub(crate) fn reset(&self) {
    for bucket in self.iter() {
      for slot in 0..BUCKET_ENTRIES {
        bucket.clear(slot);
      }
    }
  }

  pub(crate) fn iter(&self) -> impl Iterator<Item = &Bucket> {
    self.array.as_slice().iter()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
