//! Core table implementation.
//!
//! Combines the bucket table, key store, free slot allocator and concurrency
//! controller into the insert, lookup and delete algorithms.

use core::fmt::Debug;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;

use crossbeam_utils::CachePadded;

use crate::bucket::Bucket;
use crate::bucket::Buckets;
use crate::config::Mode;
use crate::config::Parameters;
use crate::cuckoo::CuckooPath;
use crate::cuckoo::Search;
use crate::cuckoo::Visit;
use crate::error::Error;
use crate::error::Result;
use crate::index::Cursor;
use crate::index::Position;
use crate::index::SlotIndex;
use crate::index::WorkerId;
use crate::lock::Controller;
use crate::params::BUCKET_ENTRIES;
use crate::params::Capacity;
use crate::params::Params;
use crate::params::ParamsExt;
use crate::signature;
use crate::signature::CmpFn;
use crate::signature::Compare;
use crate::signature::HashFn;
use crate::slots::FreeSlots;
use crate::store::KeyStore;

/// The largest bulk lookup any [`Params`] may configure.
const BULK_LIMIT: usize = u64::BITS as usize;

/// The outcome of placing a new entry.
enum Placed {
  Inserted,
  /// The key was inserted concurrently; its data was updated instead.
  Updated(Position),
}

// -----------------------------------------------------------------------------
// Table State
// -----------------------------------------------------------------------------

#[repr(C)]
pub(crate) struct Table<P>
where
  P: Params + ?Sized,
{
  readonly: CachePadded<ReadOnly>,
  slots: CachePadded<FreeSlots<P>>,
  controller: CachePadded<Controller>,
}

impl<P> Table<P>
where
  P: Params + ?Sized,
{
  pub(crate) fn new(params: &Parameters, capacity: Capacity) -> Result<Self> {
    P::validate();

    let cached: bool = params.mode().is_multi_writer();
    let records: usize = FreeSlots::<P>::records(capacity.as_usize(), cached);
    let slots: u32 = u32::try_from(records - 1).map_err(|_| Error::OutOfMemory)?;

    Ok(Self {
      readonly: CachePadded::new(ReadOnly {
        buckets: Buckets::new(capacity.buckets())?,
        store: KeyStore::new(records, params.key_len())?,
        hash_fn: params.hash_fn(),
        cmp_fn: params.cmp_fn(),
        init_val: params.init_val(),
        compare: Compare::detect(),
        capacity,
      }),
      slots: CachePadded::new(FreeSlots::new(slots, cached)),
      controller: CachePadded::new(Controller::new(
        params.mode(),
        params.elision(),
        P::SPIN_RETRIES,
      )),
    })
  }

  #[inline]
  pub(crate) fn capacity(&self) -> Capacity {
    self.readonly.capacity
  }

  #[inline]
  pub(crate) fn key_len(&self) -> usize {
    self.readonly.store.key_len()
  }

  #[inline]
  pub(crate) fn mode(&self) -> Mode {
    self.controller.mode()
  }

  /// Returns the number of key-store records usable by entries.
  #[inline]
  pub(crate) fn max_positions(&self) -> usize {
    self.slots.slots() as usize
  }

  #[inline]
  pub(crate) fn buckets(&self) -> u32 {
    self.readonly.buckets.len()
  }

  #[inline]
  pub(crate) fn set_cmp_fn(&mut self, cmp_fn: CmpFn) {
    self.readonly.cmp_fn = Some(cmp_fn);
  }

  #[inline]
  pub(crate) fn hash(&self, key: &[u8]) -> u32 {
    (self.readonly.hash_fn)(key, self.readonly.init_val)
  }

  #[inline]
  pub(crate) fn check_key(&self, key: &[u8]) -> Result<()> {
    if key.len() != self.key_len() {
      return Err(Error::InvalidArgument("key length mismatch"));
    }

    Ok(())
  }

  #[inline]
  pub(crate) fn check_worker(&self, worker: WorkerId) -> Result<()> {
    self.slots.check_worker(worker)
  }

  /// Returns the number of live entries.
  ///
  /// Approximate in multi-writer modes while mutations are in flight.
  #[inline]
  pub(crate) fn count(&self) -> usize {
    self.slots.in_use()
  }

  // ---------------------------------------------------------------------------
  // Insert
  // ---------------------------------------------------------------------------

  /// Inserts `key` with `data`, or updates the data of an existing `key`.
  pub(crate) fn insert(
    &self,
    worker: WorkerId,
    key: &[u8],
    sig: u32,
    data: usize,
  ) -> Result<Position> {
    self.check_key(key)?;
    self.check_worker(worker)?;

    let alt: u32 = signature::alternate(sig);
    let primary: &Bucket = self.readonly.buckets.get(sig);
    let secondary: &Bucket = self.readonly.buckets.get(alt);

    signature::prefetch(primary);
    signature::prefetch(secondary);

    {
      let _guard = self.controller.writer();

      if let Some(position) = self.update(primary, secondary, key, sig, alt, data) {
        return Ok(position);
      }
    }

    let index: SlotIndex = self.slots.acquire(worker)?;

    self.readonly.store.write(index, key, data);

    match self.place(key, sig, alt, index, data) {
      Some(Placed::Inserted) => Ok(Position::from_slot(index)),
      Some(Placed::Updated(position)) => {
        self.slots.release(worker, index)?;
        Ok(position)
      }
      None => {
        self.slots.release(worker, index)?;
        Err(Error::OutOfSpace)
      }
    }
  }

  /// Publishes `index` into a free slot of the primary bucket, else of the
  /// secondary bucket. When both are full, searches from the primary bucket,
  /// then from the secondary bucket with the signature roles swapped, for a
  /// path that frees one.
  fn place(
    &self,
    key: &[u8],
    sig: u32,
    alt: u32,
    index: SlotIndex,
    data: usize,
  ) -> Option<Placed> {
    if let Some(placed) = self.place_direct(key, sig, alt, index, data) {
      return Some(placed);
    }

    let buckets: &Buckets = &self.readonly.buckets;
    let mut search: Search<'_, P> = Search::new(buckets);

    let visit = |current: u32, other: u32| {
      move |path: &CuckooPath| {
        let _guard = self.controller.writer();

        let primary: &Bucket = buckets.get(sig);
        let secondary: &Bucket = buckets.get(alt);

        if let Some(position) = self.update(primary, secondary, key, sig, alt, data) {
          return Visit::Done(Placed::Updated(position));
        }

        match path.apply(buckets, current, other, index.get()) {
          Ok(()) => {
            if path.displaced() != 0 {
              tracing::trace!(displaced = path.displaced(), "applied cuckoo path");
            }

            Visit::Done(Placed::Inserted)
          }
          Err(_) => Visit::Stale,
        }
      }
    };

    search
      .run(buckets.index_of(sig), visit(sig, alt))
      .or_else(|| search.run(buckets.index_of(alt), visit(alt, sig)))
  }

  /// Writes `index` into the first free slot of either candidate bucket.
  ///
  /// Returns `None` when both buckets are full.
  fn place_direct(
    &self,
    key: &[u8],
    sig: u32,
    alt: u32,
    index: SlotIndex,
    data: usize,
  ) -> Option<Placed> {
    let primary: &Bucket = self.readonly.buckets.get(sig);
    let secondary: &Bucket = self.readonly.buckets.get(alt);
    let _guard = self.controller.writer();

    if let Some(position) = self.update(primary, secondary, key, sig, alt, data) {
      return Some(Placed::Updated(position));
    }

    if let Some(slot) = primary.find_empty() {
      primary.write(slot, sig, alt, index.get());
    } else if let Some(slot) = secondary.find_empty() {
      secondary.write(slot, alt, sig, index.get());
    } else {
      return None;
    }

    Some(Placed::Inserted)
  }

  /// Updates the data of `key` if present in either candidate bucket.
  ///
  /// Callers must hold exclusive mutation rights.
  fn update(
    &self,
    primary: &Bucket,
    secondary: &Bucket,
    key: &[u8],
    sig: u32,
    alt: u32,
    data: usize,
  ) -> Option<Position> {
    let index: SlotIndex = self
      .find_exact(primary, key, sig, alt)
      .or_else(|| self.find_exact(secondary, key, alt, sig))?;

    self.readonly.store.set_data(index, data);

    Some(Position::from_slot(index))
  }

  /// Finds `key` stored with exactly this pair of signatures.
  fn find_exact(&self, bucket: &Bucket, key: &[u8], current: u32, alt: u32) -> Option<SlotIndex> {
    let mask: u8 = self.readonly.compare.matches(&bucket.signatures(), current);

    hits(mask)
      .filter(|slot| bucket.alt(*slot) == alt)
      .filter_map(|slot| bucket.index(slot))
      .find(|index| self.key_eq(*index, key))
  }

  // ---------------------------------------------------------------------------
  // Lookup
  // ---------------------------------------------------------------------------

  /// Returns the position and data of `key`.
  pub(crate) fn lookup(&self, key: &[u8], sig: u32) -> Result<(Position, usize)> {
    self.check_key(key)?;

    let alt: u32 = signature::alternate(sig);
    let _guard = self.controller.reader();

    let (_, index): (usize, SlotIndex) = self
      .find(self.readonly.buckets.get(sig), key, sig)
      .or_else(|| self.find(self.readonly.buckets.get(alt), key, alt))
      .ok_or(Error::NotFound)?;

    Ok((Position::from_slot(index), self.readonly.store.data(index)))
  }

  /// Looks up every key of `keys`, reporting each result to `report`.
  ///
  /// Hashes and prefetches every candidate bucket first, then compares all
  /// signatures, and only then compares keys.
  pub(crate) fn lookup_bulk<K, F>(&self, keys: &[K], mut report: F) -> Result<()>
  where
    K: AsRef<[u8]>,
    F: FnMut(usize, Option<(Position, usize)>),
  {
    if keys.is_empty() || keys.len() > P::BULK_MAX.min(BULK_LIMIT) {
      return Err(Error::InvalidArgument("bulk lookup size out of range"));
    }

    for key in keys {
      self.check_key(key.as_ref())?;
    }

    let buckets: &Buckets = &self.readonly.buckets;

    let mut sigs: [(u32, u32); BULK_LIMIT] = [(0, 0); BULK_LIMIT];
    let mut masks: [(u8, u8); BULK_LIMIT] = [(0, 0); BULK_LIMIT];

    for (key, sig) in keys.iter().zip(sigs.iter_mut()) {
      let primary: u32 = self.hash(key.as_ref());
      let secondary: u32 = signature::alternate(primary);

      signature::prefetch(buckets.get(primary));
      signature::prefetch(buckets.get(secondary));

      *sig = (primary, secondary);
    }

    let _guard = self.controller.reader();

    for (&(primary, secondary), mask) in sigs.iter().zip(masks.iter_mut()).take(keys.len()) {
      *mask = (
        self
          .readonly
          .compare
          .matches(&buckets.get(primary).signatures(), primary),
        self
          .readonly
          .compare
          .matches(&buckets.get(secondary).signatures(), secondary),
      );
    }

    for (offset, key) in keys.iter().enumerate() {
      let (primary, secondary): (u32, u32) = sigs[offset];
      let (primary_hits, secondary_hits): (u8, u8) = masks[offset];

      let found: Option<SlotIndex> = self
        .find_masked(buckets.get(primary), key.as_ref(), primary_hits)
        .or_else(|| self.find_masked(buckets.get(secondary), key.as_ref(), secondary_hits));

      report(
        offset,
        found.map(|index| (Position::from_slot(index), self.readonly.store.data(index))),
      );
    }

    Ok(())
  }

  /// Finds `key` among the slots of `bucket` whose current signature is `sig`.
  fn find(&self, bucket: &Bucket, key: &[u8], sig: u32) -> Option<(usize, SlotIndex)> {
    let mask: u8 = self.readonly.compare.matches(&bucket.signatures(), sig);

    hits(mask)
      .filter_map(|slot| bucket.index(slot).map(|index| (slot, index)))
      .find(|(_, index)| self.key_eq(*index, key))
  }

  fn find_masked(&self, bucket: &Bucket, key: &[u8], mask: u8) -> Option<SlotIndex> {
    hits(mask)
      .filter_map(|slot| bucket.index(slot))
      .find(|index| self.key_eq(*index, key))
  }

  #[inline]
  fn key_eq(&self, index: SlotIndex, key: &[u8]) -> bool {
    self.readonly.store.key_eq(index, key, self.readonly.cmp_fn)
  }

  // ---------------------------------------------------------------------------
  // Delete
  // ---------------------------------------------------------------------------

  /// Removes `key`, returning the position it occupied.
  pub(crate) fn delete(&self, worker: WorkerId, key: &[u8], sig: u32) -> Result<Position> {
    self.check_key(key)?;
    self.check_worker(worker)?;

    let alt: u32 = signature::alternate(sig);
    let _guard = self.controller.writer();

    for (bucket, current) in [
      (self.readonly.buckets.get(sig), sig),
      (self.readonly.buckets.get(alt), alt),
    ] {
      if let Some((slot, index)) = self.find(bucket, key, current) {
        bucket.clear(slot);
        self.slots.release(worker, index)?;

        return Ok(Position::from_slot(index));
      }
    }

    Err(Error::NotFound)
  }

  // ---------------------------------------------------------------------------
  // Iteration
  // ---------------------------------------------------------------------------

  /// Returns the next live entry at or after `cursor`, advancing it past the
  /// returned entry.
  pub(crate) fn iterate(&self, cursor: &mut Cursor) -> Result<(Position, Vec<u8>, usize)> {
    let total: u32 = self.buckets() * BUCKET_ENTRIES as u32;
    let _guard = self.controller.reader();

    while cursor.offset() < total {
      let bucket: &Bucket = self.readonly.buckets.at(cursor.bucket());
      let slot: usize = cursor.slot();

      cursor.advance();

      if let Some(index) = bucket.index(slot) {
        return Ok((
          Position::from_slot(index),
          self.readonly.store.read(index),
          self.readonly.store.data(index),
        ));
      }
    }

    Err(Error::NotFound)
  }

  /// Returns the key stored at a live `position`.
  pub(crate) fn key_at(&self, position: Position) -> Result<Vec<u8>> {
    let index: SlotIndex = position
      .to_slot()
      .filter(|index| index.as_usize() < self.readonly.store.records())
      .ok_or(Error::NotFound)?;

    let key: Vec<u8> = self.readonly.store.read(index);

    match self.lookup(&key, self.hash(&key)) {
      Ok((found, _)) if found == position => Ok(key),
      Ok(_) | Err(_) => Err(Error::NotFound),
    }
  }

  /// Removes every entry and returns every slot to the free pool.
  pub(crate) fn reset(&mut self) {
    self.readonly.buckets.reset();
    self.readonly.store.reset();
    self.slots.reset();
  }
}

impl<P> Debug for Table<P>
where
  P: Params + ?Sized,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("Table")
      .field("capacity", &self.capacity())
      .field("buckets", &self.buckets())
      .field("key_len", &self.key_len())
      .field("mode", &self.mode())
      .field("count", &self.count())
      .field("slots", &self.slots.slots())
      .field("compare", &self.readonly.compare)
      .finish_non_exhaustive()
  }
}

// -----------------------------------------------------------------------------
// Read-only State
// -----------------------------------------------------------------------------

/// Table state fixed at construction.
///
/// Bucket slots and key-store records are modified atomically, but the arrays
/// themselves never resize.
struct ReadOnly {
  buckets: Buckets,
  store: KeyStore,
  hash_fn: HashFn,
  cmp_fn: Option<CmpFn>,
  init_val: u32,
  compare: Compare,
  capacity: Capacity,
}

/// Iterates the slot numbers set in a signature hit mask.
#[inline]
fn hits(mask: u8) -> impl Iterator<Item = usize> {
  (0..BUCKET_ENTRIES).filter(move |slot| mask & (1 << slot) != 0)
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
