use core::any;
use core::fmt::Debug;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;
use core::marker::PhantomData;
use core::num::NonZeroU32;

use crossbeam_utils::CachePadded;

use crate::error::Error;

// -----------------------------------------------------------------------------
// Layout Properties
// -----------------------------------------------------------------------------

/// The size of a cache line in bytes.
///
/// Used to align the bucket table and key store so that a bucket never
/// straddles more cache lines than necessary.
pub const CACHE_LINE: usize = align_of::<CachePadded<u8>>();

/// The number of slots in every bucket.
///
/// Fixed so that the signatures of a whole bucket can be compared with a
/// single 256-bit vector instruction.
pub const BUCKET_ENTRIES: usize = 8;

/// The maximum length of a table name in bytes.
pub const NAME_MAX: usize = 32;

const _: () = assert!(
  CACHE_LINE.is_power_of_two(),
  "invalid params: `CACHE_LINE` must be a power of two",
);

const _: () = assert!(
  BUCKET_ENTRIES.is_power_of_two() && BUCKET_ENTRIES <= u8::BITS as usize,
  "invalid params: `BUCKET_ENTRIES` must fit an 8-bit hit mask",
);

// -----------------------------------------------------------------------------
// Configurable Params
// -----------------------------------------------------------------------------

/// Compile-time tuning parameters for a [`CuckooHash`].
///
/// Runtime properties (name, capacity, key length, concurrency mode) are set
/// through [`Parameters`]; the values here bound the work and memory of the
/// engine itself. The simplest way to override them is [`ConstParams`]:
///
/// ```no_run
/// use cuckoo_tab::{ConstParams, CuckooHash};
///
/// // Deeper eviction search, 32-entry worker caches, 16 workers.
/// type FlowTable = CuckooHash<ConstParams<4096, 32, 16>>;
/// ```
///
/// # Implementing `Params`
///
/// ```no_run
/// use cuckoo_tab::Params;
///
/// struct FewWorkers;
///
/// impl Params for FewWorkers {
///   const WORKERS: usize = 4;
/// }
/// ```
///
/// [`CuckooHash`]: crate::public::CuckooHash
/// [`Parameters`]: crate::config::Parameters
pub trait Params {
  /// The maximum length of the breadth-first eviction search queue.
  ///
  /// Each dequeued bucket pushes [`BUCKET_ENTRIES`] successors, so this bounds
  /// the number of buckets an insert may visit. Raising it improves the
  /// achievable load factor; lowering it caps worst-case insert latency.
  const BFS_QUEUE_LEN: usize = DefaultParams::BFS_QUEUE_LEN;

  /// The number of free slot indices a worker keeps in its private cache.
  const CACHE_SIZE: usize = DefaultParams::CACHE_SIZE;

  /// The number of worker caches allocated in multi-writer modes.
  const WORKERS: usize = DefaultParams::WORKERS;

  /// The maximum number of keys accepted by a single bulk lookup.
  const BULK_MAX: usize = DefaultParams::BULK_MAX;

  /// The number of speculative writer-lock attempts made before an elided
  /// lock falls back to blocking acquisition.
  const SPIN_RETRIES: u32 = DefaultParams::SPIN_RETRIES;
}

// -----------------------------------------------------------------------------
// Configurable Params - Extensions
// -----------------------------------------------------------------------------

/// Derived parameters computed from [`Params`].
///
/// Automatically implemented for all [`Params`] types.
///
/// # Example
///
/// ```no_run
/// use cuckoo_tab::config::{DefaultParams, ParamsExt};
///
/// println!("{:#?}", <DefaultParams as ParamsExt>::debug());
/// ```
pub trait ParamsExt: Params + Sealed {
  /// Extra key-store records reserved in multi-writer modes so that indices
  /// parked in worker caches never reduce the usable capacity.
  const CACHE_SLACK: usize = Self::WORKERS
    .strict_sub(1)
    .strict_mul(Self::CACHE_SIZE.strict_sub(1));

  /// The number of BFS nodes that may still be pushed after a dequeue.
  const BFS_LIMIT: usize = Self::BFS_QUEUE_LEN.strict_sub(BUCKET_ENTRIES);

  #[track_caller]
  fn validate() {
    assert!(
      Self::BFS_QUEUE_LEN > BUCKET_ENTRIES,
      "invalid params: `BFS_QUEUE_LEN` must exceed `BUCKET_ENTRIES`",
    );
    assert!(Self::CACHE_SIZE != 0, "invalid params: `CACHE_SIZE` is `0`");
    assert!(Self::WORKERS != 0, "invalid params: `WORKERS` is `0`");
    assert!(
      Self::BULK_MAX != 0 && Self::BULK_MAX <= u64::BITS as usize,
      "invalid params: `BULK_MAX` must fit a 64-bit hit mask",
    );
  }

  #[inline]
  fn debug() -> DebugParams<Self> {
    DebugParams {
      marker: PhantomData,
    }
  }
}

// -----------------------------------------------------------------------------
// Debug Params
// -----------------------------------------------------------------------------

/// A helper type for displaying [`Params`] configuration.
///
/// Returned by [`ParamsExt::debug`].
#[derive(Clone, Copy)]
pub struct DebugParams<P>
where
  P: ?Sized,
{
  marker: PhantomData<fn(P)>,
}

impl<P> Debug for DebugParams<P>
where
  P: Params + ?Sized,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct(any::type_name::<P>())
      .field("BFS_QUEUE_LEN", &P::BFS_QUEUE_LEN)
      .field("BFS_LIMIT", &P::BFS_LIMIT)
      .field("CACHE_SIZE", &P::CACHE_SIZE)
      .field("CACHE_SLACK", &P::CACHE_SLACK)
      .field("WORKERS", &P::WORKERS)
      .field("BULK_MAX", &P::BULK_MAX)
      .field("SPIN_RETRIES", &P::SPIN_RETRIES)
      .finish()
  }
}

// -----------------------------------------------------------------------------
// Default Params
// -----------------------------------------------------------------------------

/// The default engine configuration.
///
/// A 1000-node eviction search, 64-entry worker caches, 128 workers and
/// 64-key bulk lookups.
#[derive(Clone, Copy)]
#[non_exhaustive]
pub struct DefaultParams;

impl Debug for DefaultParams {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    Debug::fmt(&<Self as ParamsExt>::debug(), f)
  }
}

impl Params for DefaultParams {
  const BFS_QUEUE_LEN: usize = 1000;
  const CACHE_SIZE: usize = 64;
  const WORKERS: usize = 128;
  const BULK_MAX: usize = 64;
  const SPIN_RETRIES: u32 = 20;
}

// -----------------------------------------------------------------------------
// Const-Generic Params
// -----------------------------------------------------------------------------

/// A [`Params`] implementation with compile-time configurable search depth,
/// worker cache size and worker count.
///
/// ```no_run
/// use cuckoo_tab::{ConstParams, CuckooHash};
///
/// type SmallTable = CuckooHash<ConstParams<256, 8, 4>>;
/// ```
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[non_exhaustive]
pub struct ConstParams<const BFS: usize, const CACHE: usize, const WORKERS: usize>;

impl<const BFS: usize, const CACHE: usize, const WORKERS: usize> Params
  for ConstParams<BFS, CACHE, WORKERS>
{
  const BFS_QUEUE_LEN: usize = BFS;
  const CACHE_SIZE: usize = CACHE;
  const WORKERS: usize = WORKERS;
}

// -----------------------------------------------------------------------------
// Auto-implement Derive
// -----------------------------------------------------------------------------

mod private {
  pub trait Sealed {}
}

use private::Sealed;

impl<P> Sealed for P where P: Params + ?Sized {}
impl<P> ParamsExt for P where P: Params + ?Sized {}

// -----------------------------------------------------------------------------
// Capacity
// -----------------------------------------------------------------------------

/// A validated table capacity.
///
/// Always a power of two in <code>[MIN]..=[MAX]</code>.
///
/// ```
/// use cuckoo_tab::Capacity;
///
/// assert_eq!(Capacity::new(1000).unwrap().as_usize(), 1024);
/// assert!(Capacity::new(4).is_err());
/// ```
///
/// [MIN]: Self::MIN
/// [MAX]: Self::MAX
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Capacity(NonZeroU32);

impl Capacity {
  /// The minimum capacity: a single bucket.
  pub const MIN: Self = Self(NonZeroU32::new(BUCKET_ENTRIES as u32).unwrap());

  /// The maximum capacity (2³⁰ entries).
  pub const MAX: Self = Self(NonZeroU32::new(1 << 30).unwrap());

  /// Creates a new [`Capacity`], rounding `value` up to a power of two.
  ///
  /// # Errors
  ///
  /// Returns [`Error::InvalidArgument`] if `value` is below [`MIN`] or above
  /// [`MAX`].
  ///
  /// [MIN]: Self::MIN
  /// [MAX]: Self::MAX
  /// [`MIN`]: Self::MIN
  /// [`MAX`]: Self::MAX
  #[inline]
  pub const fn new(value: usize) -> Result<Self, Error> {
    if value < Self::MIN.as_usize() {
      return Err(Error::InvalidArgument("entries below bucket width"));
    }

    if value > Self::MAX.as_usize() {
      return Err(Error::InvalidArgument("entries above maximum"));
    }

    // `value <= MAX` so rounding up cannot exceed `MAX`.
    match NonZeroU32::new(value.next_power_of_two() as u32) {
      Some(bits) => Ok(Self(bits)),
      None => Err(Error::InvalidArgument("entries not representable")),
    }
  }

  /// Returns the capacity as a [`usize`].
  #[inline]
  pub const fn as_usize(self) -> usize {
    self.0.get() as usize
  }

  /// Returns the capacity as a [`u32`].
  #[inline]
  pub const fn as_u32(self) -> u32 {
    self.0.get()
  }

  /// Returns the base-2 logarithm of the capacity.
  #[inline]
  pub const fn log2(self) -> u32 {
    self.0.trailing_zeros()
  }

  /// Returns the number of buckets needed to hold this many entries.
  #[inline]
  pub const fn buckets(self) -> u32 {
    self.as_u32() / BUCKET_ENTRIES as u32
  }
}

impl Debug for Capacity {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    write!(f, "{:?} (1 << {:?})", self.0, self.log2())
  }
}

impl TryFrom<usize> for Capacity {
  type Error = Error;

  #[inline]
  fn try_from(other: usize) -> Result<Self, Self::Error> {
    Self::new(other)
  }
}

impl From<Capacity> for usize {
  #[inline]
  fn from(other: Capacity) -> Self {
    other.as_usize()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
