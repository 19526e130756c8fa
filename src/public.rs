use core::fmt::Debug;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;
use core::iter::FusedIterator;

use crate::config::Mode;
use crate::config::Parameters;
use crate::error::Error;
use crate::error::Result;
use crate::index::Cursor;
use crate::index::Position;
use crate::index::WorkerId;
use crate::params::Capacity;
use crate::params::DefaultParams;
use crate::params::Params;
use crate::params::ParamsExt;
use crate::signature::CmpFn;
use crate::table::Table;

/// A fixed-capacity concurrent cuckoo hash table.
///
/// `CuckooHash` maps fixed-length byte keys to a pointer-sized data value and
/// to a stable [`Position`]. Every key has two candidate buckets; when both
/// are full, existing entries are displaced along a bounded search path to
/// make room.
///
/// See the [crate-level documentation][crate] for an overview of the
/// concurrency modes.
///
/// # Type Parameters
///
/// - `P`: Engine tuning implementing [`Params`]. Defaults to
///   [`DefaultParams`].
///
/// # Examples
///
/// ```
/// use cuckoo_tab::{CuckooHash, Error, Parameters};
///
/// let table: CuckooHash = CuckooHash::new(Parameters::new("flows", 1024, 4)).unwrap();
///
/// let position = table.add_with_data(b"abcd", 42).unwrap();
///
/// assert_eq!(table.lookup_with_data(b"abcd"), Ok((position, 42)));
/// assert_eq!(table.del(b"abcd"), Ok(position));
/// assert_eq!(table.lookup(b"abcd"), Err(Error::NotFound));
/// ```
pub struct CuckooHash<P = DefaultParams>
where
  P: Params + ?Sized,
{
  name: String,
  socket_id: Option<u32>,
  inner: Table<P>,
}

impl<P> CuckooHash<P>
where
  P: Params + ?Sized,
{
  /// Creates a new, empty table.
  ///
  /// # Errors
  ///
  /// Returns [`Error::InvalidArgument`] if `params` fails validation, or
  /// [`Error::OutOfMemory`] if the table cannot be allocated.
  ///
  /// # Panics
  ///
  /// Panics if `P` is an invalid [`Params`] configuration.
  pub fn new(params: Parameters) -> Result<Self> {
    let capacity: Capacity = params.validate()?;
    let inner: Table<P> = Table::new(&params, capacity)?;

    tracing::debug!(
      name = params.name(),
      entries = capacity.as_usize(),
      buckets = inner.buckets(),
      key_len = params.key_len(),
      mode = ?params.mode(),
      socket_id = ?params.socket_id(),
      "created table",
    );

    Ok(Self {
      name: params.name().to_owned(),
      socket_id: params.socket_id(),
      inner,
    })
  }

  #[inline]
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Returns the maximum number of keys the table can hold.
  ///
  /// Always the requested capacity rounded up to a power of two.
  #[inline]
  pub fn capacity(&self) -> usize {
    self.inner.capacity().as_usize()
  }

  /// Returns the exclusive upper bound of every [`Position`] this table hands
  /// out.
  ///
  /// Equal to [`capacity`] in single-writer mode. Multi-writer modes reserve
  /// extra key-store records for slots parked in per-worker caches, so
  /// positions may exceed [`capacity`] there. Size arrays indexed by
  /// position with this value.
  ///
  /// [`capacity`]: Self::capacity
  #[inline]
  pub fn max_positions(&self) -> usize {
    self.inner.max_positions()
  }

  #[inline]
  pub fn key_len(&self) -> usize {
    self.inner.key_len()
  }

  #[inline]
  pub fn mode(&self) -> Mode {
    self.inner.mode()
  }

  /// Returns the NUMA node the table was created for, if one was given.
  #[inline]
  pub fn socket_id(&self) -> Option<u32> {
    self.socket_id
  }

  /// Returns the number of keys currently stored.
  ///
  /// In multi-writer modes this may be momentarily off while other workers
  /// are mid-insert or mid-delete.
  #[inline]
  pub fn count(&self) -> usize {
    self.inner.count()
  }

  /// Returns `true` if the table holds no keys.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.count() == 0
  }

  /// Computes the signature of `key` with the table's hash function.
  ///
  /// The result can be passed to the `*_with_hash` operations to avoid
  /// hashing the same key twice.
  #[inline]
  pub fn hash(&self, key: &[u8]) -> u32 {
    self.inner.hash(key)
  }

  /// Replaces the key comparison function.
  #[inline]
  pub fn set_cmp_fn(&mut self, cmp_fn: CmpFn) {
    self.inner.set_cmp_fn(cmp_fn);
  }

  /// Returns a view that performs mutations on behalf of `worker`.
  ///
  /// # Errors
  ///
  /// Returns [`Error::InvalidArgument`] if the table is in a multi-writer mode
  /// and `worker` is not below [`Params::WORKERS`].
  ///
  /// # Examples
  ///
  /// ```
  /// use cuckoo_tab::config::Mode;
  /// use cuckoo_tab::{CuckooHash, Parameters, WorkerId};
  ///
  /// let params = Parameters::new("workers", 64, 8).with_mode(Mode::MultiWriterExclusive);
  /// let table: CuckooHash = CuckooHash::new(params).unwrap();
  ///
  /// let worker = table.worker(WorkerId::new(3)).unwrap();
  /// let position = worker.add(&7_u64.to_le_bytes()).unwrap();
  ///
  /// assert_eq!(table.lookup(&7_u64.to_le_bytes()), Ok(position));
  /// assert!(table.worker(WorkerId::new(100_000)).is_err());
  /// ```
  #[inline]
  pub fn worker(&self, worker: WorkerId) -> Result<Worker<'_, P>> {
    self.inner.check_worker(worker)?;

    Ok(Worker {
      table: self,
      worker,
    })
  }

  // ---------------------------------------------------------------------------
  // Insert
  // ---------------------------------------------------------------------------

  /// Inserts `key` with data `0`.
  ///
  /// Inserting a key that is already present keeps its position and resets
  /// its data.
  ///
  /// # Errors
  ///
  /// See [`add_with_hash_data`].
  ///
  /// [`add_with_hash_data`]: Self::add_with_hash_data
  #[inline]
  pub fn add(&self, key: &[u8]) -> Result<Position> {
    self.add_with_hash_data(key, self.hash(key), 0)
  }

  /// Inserts `key` with `data`, or replaces the data of an existing `key`.
  ///
  /// # Errors
  ///
  /// See [`add_with_hash_data`].
  ///
  /// [`add_with_hash_data`]: Self::add_with_hash_data
  #[inline]
  pub fn add_with_data(&self, key: &[u8], data: usize) -> Result<Position> {
    self.add_with_hash_data(key, self.hash(key), data)
  }

  /// Inserts `key` with a precomputed signature and data `0`.
  ///
  /// # Errors
  ///
  /// See [`add_with_hash_data`].
  ///
  /// [`add_with_hash_data`]: Self::add_with_hash_data
  #[inline]
  pub fn add_with_hash(&self, key: &[u8], sig: u32) -> Result<Position> {
    self.add_with_hash_data(key, sig, 0)
  }

  /// Inserts `key` with a precomputed signature and `data`.
  ///
  /// `sig` must be the value [`hash`] returns for `key`; any other value
  /// stores the key where lookups by key will not find it.
  ///
  /// # Errors
  ///
  /// - [`Error::InvalidArgument`] if `key` is not [`key_len`] bytes long.
  /// - [`Error::OutOfSpace`] if no free slot or displacement path was found.
  ///
  /// [`hash`]: Self::hash
  /// [`key_len`]: Self::key_len
  #[inline]
  pub fn add_with_hash_data(&self, key: &[u8], sig: u32, data: usize) -> Result<Position> {
    self.inner.insert(WorkerId::MAIN, key, sig, data)
  }

  // ---------------------------------------------------------------------------
  // Lookup
  // ---------------------------------------------------------------------------

  /// Returns the position of `key`.
  ///
  /// # Errors
  ///
  /// Returns [`Error::NotFound`] if `key` is not present, or
  /// [`Error::InvalidArgument`] if it has the wrong length.
  #[inline]
  pub fn lookup(&self, key: &[u8]) -> Result<Position> {
    self.lookup_with_hash(key, self.hash(key))
  }

  /// Returns the position and data of `key`.
  ///
  /// # Errors
  ///
  /// See [`lookup`].
  ///
  /// [`lookup`]: Self::lookup
  #[inline]
  pub fn lookup_with_data(&self, key: &[u8]) -> Result<(Position, usize)> {
    self.lookup_with_hash_data(key, self.hash(key))
  }

  /// Returns the position of `key`, using a precomputed signature.
  ///
  /// # Errors
  ///
  /// See [`lookup`].
  ///
  /// [`lookup`]: Self::lookup
  #[inline]
  pub fn lookup_with_hash(&self, key: &[u8], sig: u32) -> Result<Position> {
    self.inner.lookup(key, sig).map(|(position, _)| position)
  }

  /// Returns the position and data of `key`, using a precomputed signature.
  ///
  /// # Errors
  ///
  /// See [`lookup`].
  ///
  /// [`lookup`]: Self::lookup
  #[inline]
  pub fn lookup_with_hash_data(&self, key: &[u8], sig: u32) -> Result<(Position, usize)> {
    self.inner.lookup(key, sig)
  }

  /// Looks up a batch of keys, writing each key's position (or `None` on a
  /// miss) to the matching element of `positions`.
  ///
  /// # Errors
  ///
  /// Returns [`Error::InvalidArgument`] if `keys` is empty, longer than
  /// [`Params::BULK_MAX`], longer than `positions`, or holds a key of the
  /// wrong length.
  ///
  /// # Examples
  ///
  /// ```
  /// use cuckoo_tab::{CuckooHash, Parameters, Position};
  ///
  /// let table: CuckooHash = CuckooHash::new(Parameters::new("bulk", 64, 1)).unwrap();
  /// let hit: Position = table.add(b"a").unwrap();
  ///
  /// let mut positions: [Option<Position>; 2] = [None; 2];
  /// table.lookup_bulk(&[b"a", b"b"], &mut positions).unwrap();
  ///
  /// assert_eq!(positions, [Some(hit), None]);
  /// ```
  pub fn lookup_bulk<K>(&self, keys: &[K], positions: &mut [Option<Position>]) -> Result<()>
  where
    K: AsRef<[u8]>,
  {
    check_output(keys.len(), positions.len())?;

    self.inner.lookup_bulk(keys, |offset, found| {
      positions[offset] = found.map(|(position, _)| position);
    })
  }

  /// Looks up a batch of keys, writing the data of every hit to the matching
  /// element of `data`. Elements for misses are left untouched.
  ///
  /// # Errors
  ///
  /// See [`lookup_bulk`].
  ///
  /// [`lookup_bulk`]: Self::lookup_bulk
  pub fn lookup_bulk_data<K>(&self, keys: &[K], data: &mut [usize]) -> Result<Hits>
  where
    K: AsRef<[u8]>,
  {
    check_output(keys.len(), data.len())?;

    let mut hits: Hits = Hits::default();

    self.inner.lookup_bulk(keys, |offset, found| {
      if let Some((_, value)) = found {
        data[offset] = value;
        hits.mask |= 1 << offset;
      }
    })?;

    Ok(hits)
  }

  // ---------------------------------------------------------------------------
  // Delete
  // ---------------------------------------------------------------------------

  /// Removes `key`, returning the position it occupied.
  ///
  /// # Errors
  ///
  /// See [`lookup`].
  ///
  /// [`lookup`]: Self::lookup
  #[inline]
  pub fn del(&self, key: &[u8]) -> Result<Position> {
    self.del_with_hash(key, self.hash(key))
  }

  /// Removes `key` using a precomputed signature.
  ///
  /// # Errors
  ///
  /// See [`lookup`].
  ///
  /// [`lookup`]: Self::lookup
  #[inline]
  pub fn del_with_hash(&self, key: &[u8], sig: u32) -> Result<Position> {
    self.inner.delete(WorkerId::MAIN, key, sig)
  }

  // ---------------------------------------------------------------------------
  // Iteration & Maintenance
  // ---------------------------------------------------------------------------

  /// Returns the next entry at or after `cursor` and advances it.
  ///
  /// # Errors
  ///
  /// Returns [`Error::NotFound`] once every bucket slot has been visited.
  #[inline]
  pub fn iterate(&self, cursor: &mut Cursor) -> Result<Entry> {
    self
      .inner
      .iterate(cursor)
      .map(|(position, key, data)| Entry {
        position,
        key,
        data,
      })
  }

  /// Returns an iterator over every entry.
  ///
  /// ```
  /// use cuckoo_tab::{CuckooHash, Parameters};
  ///
  /// let table: CuckooHash = CuckooHash::new(Parameters::new("iter", 64, 2)).unwrap();
  ///
  /// table.add_with_data(b"aa", 1).unwrap();
  /// table.add_with_data(b"bb", 2).unwrap();
  ///
  /// let sum: usize = table.iter().map(|entry| entry.data).sum();
  /// assert_eq!(sum, 3);
  /// ```
  #[inline]
  pub fn iter(&self) -> Iter<'_, P> {
    Iter {
      table: self,
      cursor: Cursor::new(),
    }
  }

  /// Returns the key stored at `position`.
  ///
  /// # Errors
  ///
  /// Returns [`Error::NotFound`] if no live key occupies `position`.
  #[inline]
  pub fn get_key_with_position(&self, position: Position) -> Result<Vec<u8>> {
    self.inner.key_at(position)
  }

  /// Removes every key and returns every slot, including those parked in
  /// worker caches, to the free pool.
  ///
  /// Requires exclusive access in every mode: an insert holds its slot
  /// outside the writer lock until the entry is published, so a concurrent
  /// reset could hand that slot out twice. Tables shared through an
  /// [`Arc`] can be reset with [`Arc::get_mut`] once no other handle remains.
  ///
  /// [`Arc`]: std::sync::Arc
  /// [`Arc::get_mut`]: std::sync::Arc::get_mut
  pub fn reset(&mut self) {
    self.inner.reset();

    tracing::debug!(name = %self.name, "reset table");
  }
}

impl<P> Debug for CuckooHash<P>
where
  P: Params + ?Sized,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("CuckooHash")
      .field("name", &self.name)
      .field("params", &P::debug())
      .field("table", &self.inner)
      .finish()
  }
}

#[inline]
fn check_output(keys: usize, output: usize) -> Result<()> {
  if output < keys {
    return Err(Error::InvalidArgument("bulk output too short"));
  }

  Ok(())
}

// -----------------------------------------------------------------------------
// Worker View
// -----------------------------------------------------------------------------

/// A [`CuckooHash`] handle that mutates on behalf of a specific worker.
///
/// Created by [`CuckooHash::worker`].
pub struct Worker<'a, P = DefaultParams>
where
  P: Params + ?Sized,
{
  table: &'a CuckooHash<P>,
  worker: WorkerId,
}

impl<'a, P> Worker<'a, P>
where
  P: Params + ?Sized,
{
  #[inline]
  pub fn id(&self) -> WorkerId {
    self.worker
  }

  #[inline]
  pub fn table(&self) -> &'a CuckooHash<P> {
    self.table
  }

  /// See [`CuckooHash::add`].
  ///
  /// # Errors
  ///
  /// See [`CuckooHash::add_with_hash_data`].
  #[inline]
  pub fn add(&self, key: &[u8]) -> Result<Position> {
    self.add_with_hash_data(key, self.table.hash(key), 0)
  }

  /// See [`CuckooHash::add_with_data`].
  ///
  /// # Errors
  ///
  /// See [`CuckooHash::add_with_hash_data`].
  #[inline]
  pub fn add_with_data(&self, key: &[u8], data: usize) -> Result<Position> {
    self.add_with_hash_data(key, self.table.hash(key), data)
  }

  /// See [`CuckooHash::add_with_hash`].
  ///
  /// # Errors
  ///
  /// See [`CuckooHash::add_with_hash_data`].
  #[inline]
  pub fn add_with_hash(&self, key: &[u8], sig: u32) -> Result<Position> {
    self.add_with_hash_data(key, sig, 0)
  }

  /// See [`CuckooHash::add_with_hash_data`].
  ///
  /// # Errors
  ///
  /// See [`CuckooHash::add_with_hash_data`].
  #[inline]
  pub fn add_with_hash_data(&self, key: &[u8], sig: u32, data: usize) -> Result<Position> {
    self.table.inner.insert(self.worker, key, sig, data)
  }

  /// See [`CuckooHash::del`].
  ///
  /// # Errors
  ///
  /// See [`CuckooHash::lookup`].
  #[inline]
  pub fn del(&self, key: &[u8]) -> Result<Position> {
    self.del_with_hash(key, self.table.hash(key))
  }

  /// See [`CuckooHash::del_with_hash`].
  ///
  /// # Errors
  ///
  /// See [`CuckooHash::lookup`].
  #[inline]
  pub fn del_with_hash(&self, key: &[u8], sig: u32) -> Result<Position> {
    self.table.inner.delete(self.worker, key, sig)
  }
}

impl<P> Clone for Worker<'_, P>
where
  P: Params + ?Sized,
{
  #[inline]
  fn clone(&self) -> Self {
    *self
  }
}

impl<P> Copy for Worker<'_, P> where P: Params + ?Sized {}

impl<P> Debug for Worker<'_, P>
where
  P: Params + ?Sized,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("Worker")
      .field("table", &self.table.name)
      .field("worker", &self.worker)
      .finish()
  }
}

// -----------------------------------------------------------------------------
// Entry & Hits
// -----------------------------------------------------------------------------

/// A stored key with its data and position, as returned by iteration.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Entry {
  pub position: Position,
  pub key: Vec<u8>,
  pub data: usize,
}

/// The hit mask of a bulk lookup: bit `i` is set when key `i` was found.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub struct Hits {
  mask: u64,
}

impl Hits {
  #[inline]
  pub const fn mask(self) -> u64 {
    self.mask
  }

  /// Returns the number of keys found.
  #[inline]
  pub const fn count(self) -> u32 {
    self.mask.count_ones()
  }

  /// Returns `true` if the key at `offset` was found.
  #[inline]
  pub const fn contains(self, offset: usize) -> bool {
    offset < u64::BITS as usize && self.mask & (1 << offset) != 0
  }
}

// -----------------------------------------------------------------------------
// Iterator
// -----------------------------------------------------------------------------

/// An iterator over the entries of a [`CuckooHash`].
///
/// Created by [`CuckooHash::iter`]. Entries moved by a concurrent insert may
/// be yielded twice or not at all.
pub struct Iter<'a, P = DefaultParams>
where
  P: Params + ?Sized,
{
  table: &'a CuckooHash<P>,
  cursor: Cursor,
}

impl<P> Iterator for Iter<'_, P>
where
  P: Params + ?Sized,
{
  type Item = Entry;

  #[inline]
  fn next(&mut self) -> Option<Self::Item> {
    self.table.iterate(&mut self.cursor).ok()
  }
}

impl<P> FusedIterator for Iter<'_, P> where P: Params + ?Sized {}

impl<P> Debug for Iter<'_, P>
where
  P: Params + ?Sized,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("Iter")
      .field("table", &self.table.name)
      .field("cursor", &self.cursor)
      .finish()
  }
}

impl<'a, P> IntoIterator for &'a CuckooHash<P>
where
  P: Params + ?Sized,
{
  type Item = Entry;
  type IntoIter = Iter<'a, P>;

  #[inline]
  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
