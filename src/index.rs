//! Index types and conversions.
//!
//! Provides [`Position`], the public handle of a stored key, [`WorkerId`], the
//! caller-supplied worker identity, [`Cursor`], the iteration offset, and the
//! internal 1-based [`SlotIndex`] used to address key-store records.

use core::fmt::Debug;
use core::fmt::Display;
use core::fmt::Formatter;
use core::fmt::Result;
use core::num::NonZeroU32;

use crate::params::BUCKET_ENTRIES;

// -----------------------------------------------------------------------------
// Position
// -----------------------------------------------------------------------------

/// A stable, 0-based handle identifying a stored key.
///
/// Returned by insert, lookup and delete operations. A position stays valid
/// until its key is deleted, and always lies in `0..max_positions` (see
/// [`CuckooHash::max_positions`]) so callers can use it to index a parallel
/// array of their own.
///
/// [`CuckooHash::max_positions`]: crate::CuckooHash::max_positions
///
/// # Examples
///
/// ```
/// use cuckoo_tab::{CuckooHash, Parameters, Position};
///
/// let table: CuckooHash = CuckooHash::new(Parameters::new("doc", 64, 4)).unwrap();
/// let mut values: Vec<u64> = vec![0; table.max_positions()];
///
/// let position: Position = table.add(b"abcd").unwrap();
/// values[position.get()] = 42;
///
/// assert_eq!(values[table.lookup(b"abcd").unwrap().get()], 42);
/// ```
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Position {
  bits: u32,
}

impl Position {
  /// Creates a [`Position`] from its raw value.
  ///
  /// # Warning
  ///
  /// An arbitrary value may not refer to a live key; using it is safe but
  /// returns [`Error::NotFound`].
  ///
  /// [`Error::NotFound`]: crate::error::Error::NotFound
  #[inline]
  pub const fn from_bits(bits: u32) -> Self {
    Self { bits }
  }

  /// Returns the raw value of this position.
  #[inline]
  pub const fn into_bits(self) -> u32 {
    self.bits
  }

  /// Returns the position as an array index.
  #[inline]
  pub const fn get(self) -> usize {
    self.bits as usize
  }

  /// Returns the position in the signed form used by integer interfaces,
  /// where negative values carry error codes.
  #[allow(clippy::cast_possible_wrap, reason = "positions stay below 2^31")]
  #[inline]
  pub const fn as_i32(self) -> i32 {
    self.bits as i32
  }

  #[inline]
  pub(crate) const fn from_slot(slot: SlotIndex) -> Self {
    Self::from_bits(slot.get() - 1)
  }

  #[inline]
  pub(crate) const fn to_slot(self) -> Option<SlotIndex> {
    match self.bits.checked_add(1) {
      Some(bits) => SlotIndex::new(bits),
      None => None,
    }
  }
}

impl Debug for Position {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    Debug::fmt(&self.bits, f)
  }
}

impl Display for Position {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    Display::fmt(&self.bits, f)
  }
}

// -----------------------------------------------------------------------------
// Slot Index
// -----------------------------------------------------------------------------

/// A 1-based key-store index.
///
/// Index `0` is the permanent "empty" marker in bucket slots and is never
/// handed out by the allocator.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub(crate) struct SlotIndex(NonZeroU32);

impl SlotIndex {
  #[inline]
  pub(crate) const fn new(bits: u32) -> Option<Self> {
    match NonZeroU32::new(bits) {
      Some(bits) => Some(Self(bits)),
      None => None,
    }
  }

  #[inline]
  pub(crate) const fn get(self) -> u32 {
    self.0.get()
  }

  #[inline]
  pub(crate) const fn as_usize(self) -> usize {
    self.0.get() as usize
  }
}

impl Debug for SlotIndex {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    Debug::fmt(&self.0, f)
  }
}

// -----------------------------------------------------------------------------
// Worker Id
// -----------------------------------------------------------------------------

/// Identifies the worker on whose behalf a mutation runs.
///
/// In multi-writer modes each worker owns a private cache of free slot
/// indices. Two threads mutating the same table concurrently should use
/// different worker ids; sharing one is safe but serializes them on that
/// cache.
#[derive(Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct WorkerId {
  bits: u32,
}

impl WorkerId {
  /// The worker used by operations that do not name one.
  pub const MAIN: Self = Self::new(0);

  /// Creates a new [`WorkerId`].
  #[inline]
  pub const fn new(bits: u32) -> Self {
    Self { bits }
  }

  /// Returns the worker id as an array index.
  #[inline]
  pub const fn get(self) -> usize {
    self.bits as usize
  }
}

impl Debug for WorkerId {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    write!(f, "WorkerId({})", self.bits)
  }
}

impl Display for WorkerId {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    Display::fmt(&self.bits, f)
  }
}

// -----------------------------------------------------------------------------
// Cursor
// -----------------------------------------------------------------------------

/// A forward-only iteration offset over bucket slots.
///
/// Not stable across concurrent mutation: entries moved by a concurrent insert
/// may be visited twice or not at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
  next: u32,
}

impl Cursor {
  /// Creates a cursor positioned at the first bucket slot.
  #[inline]
  pub const fn new() -> Self {
    Self { next: 0 }
  }

  #[inline]
  pub(crate) const fn offset(self) -> u32 {
    self.next
  }

  #[inline]
  pub(crate) const fn bucket(self) -> u32 {
    self.next / BUCKET_ENTRIES as u32
  }

  #[inline]
  pub(crate) const fn slot(self) -> usize {
    self.next as usize % BUCKET_ENTRIES
  }

  #[inline]
  pub(crate) const fn advance(&mut self) {
    self.next += 1;
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use crate::index::Cursor;
  use crate::index::Position;
  use crate::index::SlotIndex;
  use crate::index::WorkerId;

  #[test]
  fn slot_zero_is_empty() {
    assert!(SlotIndex::new(0).is_none());
    assert!(SlotIndex::new(1).is_some());
  }

  #[test]
  fn position_slot_offset() {
    let slot: SlotIndex = SlotIndex::new(17).unwrap();
    let position: Position = Position::from_slot(slot);

    assert_eq!(position.get(), 16);
    assert_eq!(position.to_slot(), Some(slot));
  }

  #[test]
  fn position_max_has_no_slot() {
    assert_eq!(Position::from_bits(u32::MAX).to_slot(), None);
  }

  #[test]
  fn position_debug_transparency() {
    let value: u32 = 123;
    let index: Position = Position::from_bits(value);

    assert_eq!(format!("{index:?}"), format!("{value:?}"));
    assert_eq!(format!("{index}"), format!("{value}"));
  }

  #[test]
  fn worker_default_is_main() {
    assert_eq!(WorkerId::default(), WorkerId::MAIN);
    assert_eq!(WorkerId::new(7).get(), 7);
  }

  #[test]
  fn cursor_walks_slots_then_buckets() {
    let mut cursor: Cursor = Cursor::new();

    for _ in 0..9 {
      cursor.advance();
    }

    assert_eq!(cursor.offset(), 9);
    assert_eq!(cursor.bucket(), 1);
    assert_eq!(cursor.slot(), 1);
  }
}
