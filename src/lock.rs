//! The concurrency controller.
//!
//! Decides, per the table's [`Mode`], which operations take the table-wide
//! reader/writer lock and in which form. The writer side is acquired through
//! an [`Acquire`] strategy chosen at creation, so lock elision stays behind a
//! single seam.

use crossbeam_utils::Backoff;

use crate::config::Elision;
use crate::config::Mode;
use crate::sync::RwLock;
use crate::sync::RwLockReadGuard;
use crate::sync::RwLockWriteGuard;

pub(crate) type WriteGuard<'a> = RwLockWriteGuard<'a, ()>;
pub(crate) type ReadGuard<'a> = RwLockReadGuard<'a, ()>;

// -----------------------------------------------------------------------------
// Writer Acquisition
// -----------------------------------------------------------------------------

/// A strategy for taking the writer lock.
pub(crate) trait Acquire: Send + Sync {
  fn acquire<'a>(&self, lock: &'a RwLock<()>, retries: u32) -> WriteGuard<'a>;
}

/// Blocks on the writer lock.
pub(crate) struct Exclusive;

impl Acquire for Exclusive {
  #[inline]
  fn acquire<'a>(&self, lock: &'a RwLock<()>, _retries: u32) -> WriteGuard<'a> {
    lock.write()
  }
}

/// Tries the writer lock with backoff before falling back to blocking.
pub(crate) struct Speculative;

impl Acquire for Speculative {
  fn acquire<'a>(&self, lock: &'a RwLock<()>, retries: u32) -> WriteGuard<'a> {
    let backoff: Backoff = Backoff::new();

    for _ in 0..retries {
      if let Some(guard) = lock.try_write() {
        return guard;
      }

      backoff.spin();
    }

    lock.write()
  }
}

// -----------------------------------------------------------------------------
// Controller
// -----------------------------------------------------------------------------

pub(crate) struct Controller {
  mode: Mode,
  lock: RwLock<()>,
  acquire: &'static dyn Acquire,
  retries: u32,
}

impl Controller {
  pub(crate) fn new(mode: Mode, elision: Elision, retries: u32) -> Self {
    let acquire: &'static dyn Acquire = match elision {
      Elision::Disabled => &Exclusive,
      Elision::Speculative => &Speculative,
    };

    Self {
      mode,
      lock: RwLock::new(()),
      acquire,
      retries,
    }
  }

  #[inline]
  pub(crate) const fn mode(&self) -> Mode {
    self.mode
  }

  /// Takes the writer lock if mutations are serialized internally.
  #[inline]
  pub(crate) fn writer(&self) -> Option<WriteGuard<'_>> {
    self
      .mode
      .is_multi_writer()
      .then(|| self.acquire.acquire(&self.lock, self.retries))
  }

  /// Takes the reader lock if lookups run concurrently with mutations.
  #[inline]
  pub(crate) fn reader(&self) -> Option<ReadGuard<'_>> {
    self.mode.is_reader_concurrent().then(|| self.lock.read())
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use crate::config::Elision;
  use crate::config::Mode;
  use crate::lock::Acquire;
  use crate::lock::Controller;
  use crate::lock::Speculative;
  use crate::sync::RwLock;

  #[test]
  fn single_writer_takes_no_lock() {
    let controller: Controller = Controller::new(Mode::SingleWriter, Elision::Disabled, 0);

    assert!(controller.writer().is_none());
    assert!(controller.reader().is_none());
  }

  #[test]
  fn exclusive_locks_writers_only() {
    let controller: Controller =
      Controller::new(Mode::MultiWriterExclusive, Elision::Disabled, 0);

    assert!(controller.reader().is_none());
    assert!(controller.writer().is_some());
  }

  #[test]
  fn reader_concurrent_locks_both() {
    let controller: Controller =
      Controller::new(Mode::MultiWriterReaderConcurrent, Elision::Speculative, 4);

    {
      let first = controller.reader();
      let second = controller.reader();

      assert!(first.is_some());
      assert!(second.is_some());
    }

    assert!(controller.writer().is_some());
  }

  #[test]
  fn speculative_acquires_free_lock() {
    let lock: RwLock<()> = RwLock::new(());

    let guard = Speculative.acquire(&lock, 3);

    assert!(lock.try_write().is_none());

    drop(guard);

    assert!(lock.try_write().is_some());
  }
}
