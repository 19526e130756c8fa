//! Table configuration.
//!
//! Compile-time tuning lives in [`Params`]; per-table runtime settings are
//! collected in [`Parameters`] and validated when the table is created.

pub use crate::params::BUCKET_ENTRIES;
pub use crate::params::CACHE_LINE;
pub use crate::params::Capacity;
pub use crate::params::ConstParams;
pub use crate::params::DebugParams;
pub use crate::params::DefaultParams;
pub use crate::params::NAME_MAX;
pub use crate::params::Params;
pub use crate::params::ParamsExt;

use crate::error::Error;
use crate::signature;
use crate::signature::CmpFn;
use crate::signature::HashFn;

// -----------------------------------------------------------------------------
// Mode
// -----------------------------------------------------------------------------

/// The concurrency mode of a table, fixed at creation.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
#[non_exhaustive]
pub enum Mode {
  /// No internal locking.
  ///
  /// The caller serializes every mutation, and must not run lookups
  /// concurrently with mutations.
  #[default]
  SingleWriter,
  /// Mutations from any number of workers are serialized by a table-wide
  /// writer lock. Lookups take no lock and must not overlap mutations.
  MultiWriterExclusive,
  /// As [`MultiWriterExclusive`], and lookups take the lock in shared form so
  /// they may run concurrently with mutations from any worker.
  ///
  /// [`MultiWriterExclusive`]: Self::MultiWriterExclusive
  MultiWriterReaderConcurrent,
}

impl Mode {
  /// Returns `true` if mutations take the writer lock and use worker caches.
  #[inline]
  pub const fn is_multi_writer(self) -> bool {
    matches!(
      self,
      Self::MultiWriterExclusive | Self::MultiWriterReaderConcurrent
    )
  }

  /// Returns `true` if lookups take the lock in shared form.
  #[inline]
  pub const fn is_reader_concurrent(self) -> bool {
    matches!(self, Self::MultiWriterReaderConcurrent)
  }
}

// -----------------------------------------------------------------------------
// Lock Elision
// -----------------------------------------------------------------------------

/// How the writer lock is acquired in multi-writer modes.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
#[non_exhaustive]
pub enum Elision {
  /// Always block on the writer lock.
  #[default]
  Disabled,
  /// Attempt the lock speculatively a bounded number of times
  /// ([`Params::SPIN_RETRIES`]) before blocking.
  Speculative,
}

// -----------------------------------------------------------------------------
// Parameters
// -----------------------------------------------------------------------------

/// Runtime creation parameters for a table.
///
/// # Examples
///
/// ```
/// use cuckoo_tab::config::{Mode, Parameters};
///
/// let params: Parameters = Parameters::new("flows", 1 << 16, 13)
///   .with_init_val(0xdead_beef)
///   .with_mode(Mode::MultiWriterReaderConcurrent)
///   .with_socket_id(0);
///
/// assert_eq!(params.entries(), 1 << 16);
/// assert_eq!(params.mode(), Mode::MultiWriterReaderConcurrent);
/// ```
#[derive(Clone, Debug)]
pub struct Parameters {
  name: String,
  entries: usize,
  key_len: usize,
  hash_fn: Option<HashFn>,
  cmp_fn: Option<CmpFn>,
  init_val: u32,
  mode: Mode,
  elision: Elision,
  socket_id: Option<u32>,
}

impl Parameters {
  /// Creates parameters for a single-writer table named `name` holding up to
  /// `entries` keys of `key_len` bytes.
  pub fn new(name: impl Into<String>, entries: usize, key_len: usize) -> Self {
    Self {
      name: name.into(),
      entries,
      key_len,
      hash_fn: None,
      cmp_fn: None,
      init_val: 0,
      mode: Mode::SingleWriter,
      elision: Elision::Disabled,
      socket_id: None,
    }
  }

  /// Sets the signature function. Defaults to [`signature::crc32`].
  #[must_use]
  pub fn with_hash_fn(mut self, hash_fn: HashFn) -> Self {
    self.hash_fn = Some(hash_fn);
    self
  }

  /// Sets the key comparison. Defaults to a bytewise comparison.
  #[must_use]
  pub fn with_cmp_fn(mut self, cmp_fn: CmpFn) -> Self {
    self.cmp_fn = Some(cmp_fn);
    self
  }

  /// Sets the seed passed to the signature function.
  #[must_use]
  pub fn with_init_val(mut self, init_val: u32) -> Self {
    self.init_val = init_val;
    self
  }

  #[must_use]
  pub fn with_mode(mut self, mode: Mode) -> Self {
    self.mode = mode;
    self
  }

  #[must_use]
  pub fn with_elision(mut self, elision: Elision) -> Self {
    self.elision = elision;
    self
  }

  /// Records the NUMA node the table is meant for. Advisory only.
  #[must_use]
  pub fn with_socket_id(mut self, socket_id: u32) -> Self {
    self.socket_id = Some(socket_id);
    self
  }

  #[inline]
  pub fn name(&self) -> &str {
    &self.name
  }

  #[inline]
  pub fn entries(&self) -> usize {
    self.entries
  }

  #[inline]
  pub fn key_len(&self) -> usize {
    self.key_len
  }

  /// Returns the signature function, falling back to the default.
  #[inline]
  pub fn hash_fn(&self) -> HashFn {
    self.hash_fn.unwrap_or(signature::crc32)
  }

  #[inline]
  pub fn cmp_fn(&self) -> Option<CmpFn> {
    self.cmp_fn
  }

  #[inline]
  pub fn init_val(&self) -> u32 {
    self.init_val
  }

  #[inline]
  pub fn mode(&self) -> Mode {
    self.mode
  }

  #[inline]
  pub fn elision(&self) -> Elision {
    self.elision
  }

  #[inline]
  pub fn socket_id(&self) -> Option<u32> {
    self.socket_id
  }

  /// Checks every field and returns the rounded capacity.
  ///
  /// # Errors
  ///
  /// Returns [`Error::InvalidArgument`] if the name is empty or longer than
  /// [`NAME_MAX`] bytes, if `key_len` is zero, or if `entries` is outside
  /// <code>[Capacity::MIN]..=[Capacity::MAX]</code>.
  pub fn validate(&self) -> Result<Capacity, Error> {
    let result: Result<Capacity, Error> = self.check();

    if let Err(ref error) = result {
      tracing::error!(name = %self.name, %error, "rejected table parameters");
    }

    result
  }

  fn check(&self) -> Result<Capacity, Error> {
    if self.name.is_empty() {
      return Err(Error::InvalidArgument("empty table name"));
    }

    if self.name.len() > NAME_MAX {
      return Err(Error::InvalidArgument("table name too long"));
    }

    if self.key_len == 0 {
      return Err(Error::InvalidArgument("zero key length"));
    }

    Capacity::new(self.entries)
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use crate::config::Capacity;
  use crate::config::Elision;
  use crate::config::Mode;
  use crate::config::NAME_MAX;
  use crate::config::Parameters;
  use crate::error::Error;
  use crate::signature;

  fn zero(_: &[u8], _: u32) -> u32 {
    0
  }

  #[test]
  fn defaults() {
    let params: Parameters = Parameters::new("test", 64, 4);

    assert_eq!(params.mode(), Mode::SingleWriter);
    assert_eq!(params.elision(), Elision::Disabled);
    assert_eq!(params.init_val(), 0);
    assert_eq!(params.socket_id(), None);
    assert!(params.cmp_fn().is_none());
    assert_eq!(
      (params.hash_fn())(b"abcd", 0),
      signature::crc32(b"abcd", 0),
    );
  }

  #[test]
  fn custom_hash_fn() {
    let params: Parameters = Parameters::new("test", 64, 4).with_hash_fn(zero);

    assert_eq!((params.hash_fn())(b"abcd", 0), 0);
  }

  #[test]
  fn mode_flags() {
    assert!(!Mode::SingleWriter.is_multi_writer());
    assert!(Mode::MultiWriterExclusive.is_multi_writer());
    assert!(!Mode::MultiWriterExclusive.is_reader_concurrent());
    assert!(Mode::MultiWriterReaderConcurrent.is_multi_writer());
    assert!(Mode::MultiWriterReaderConcurrent.is_reader_concurrent());
  }

  #[test]
  fn validate_rounds_capacity() {
    let params: Parameters = Parameters::new("test", 1000, 4);

    assert_eq!(params.validate(), Capacity::new(1024));
  }

  #[test]
  fn validate_rejects_bad_fields() {
    let long: String = "x".repeat(NAME_MAX + 1);

    let rejected: [Parameters; 5] = [
      Parameters::new("", 64, 4),
      Parameters::new(long, 64, 4),
      Parameters::new("test", 64, 0),
      Parameters::new("test", 0, 4),
      Parameters::new("test", (1 << 30) + 1, 4),
    ];

    for params in rejected {
      assert!(
        matches!(params.validate(), Err(Error::InvalidArgument(_))),
        "{params:?}",
      );
    }
  }

  #[test]
  fn validate_accepts_name_max() {
    let name: String = "x".repeat(NAME_MAX);

    assert!(Parameters::new(name, 8, 1).validate().is_ok());
  }
}
