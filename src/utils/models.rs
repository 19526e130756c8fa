#[cfg(not(loom))]
pub(crate) mod alloc {
  pub(crate) use ::std::alloc::Layout;
  pub(crate) use ::std::alloc::alloc;
  pub(crate) use ::std::alloc::dealloc;
}

#[cfg(loom)]
pub(crate) mod alloc {
  pub(crate) use ::loom::alloc::Layout;
  pub(crate) use ::loom::alloc::alloc;
  pub(crate) use ::loom::alloc::dealloc;
}

#[cfg(not(loom))]
pub(crate) mod sync {
  pub(crate) mod atomic {
    pub(crate) use ::core::sync::atomic::AtomicU32;
    pub(crate) use ::core::sync::atomic::AtomicU64;
    pub(crate) use ::core::sync::atomic::AtomicUsize;
    pub(crate) use ::core::sync::atomic::Ordering;
  }

  pub(crate) use ::parking_lot::Mutex;
  pub(crate) use ::parking_lot::RwLock;
  pub(crate) use ::parking_lot::RwLockReadGuard;
  pub(crate) use ::parking_lot::RwLockWriteGuard;
}

#[cfg(loom)]
pub(crate) mod sync {
  pub(crate) mod atomic {
    pub(crate) use ::loom::sync::atomic::AtomicU32;
    pub(crate) use ::loom::sync::atomic::AtomicU64;
    pub(crate) use ::loom::sync::atomic::AtomicUsize;
    pub(crate) use ::loom::sync::atomic::Ordering;
  }

  use ::std::sync::PoisonError;

  pub(crate) use ::loom::sync::MutexGuard;
  pub(crate) use ::loom::sync::RwLockReadGuard;
  pub(crate) use ::loom::sync::RwLockWriteGuard;

  /// Poison-free facade over [`loom::sync::Mutex`] matching `parking_lot`.
  pub(crate) struct Mutex<T> {
    inner: ::loom::sync::Mutex<T>,
  }

  impl<T> Mutex<T> {
    #[inline]
    pub(crate) fn new(value: T) -> Self {
      Self {
        inner: ::loom::sync::Mutex::new(value),
      }
    }

    #[inline]
    pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
      self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
  }

  /// Poison-free facade over [`loom::sync::RwLock`] matching `parking_lot`.
  pub(crate) struct RwLock<T> {
    inner: ::loom::sync::RwLock<T>,
  }

  impl<T> RwLock<T> {
    #[inline]
    pub(crate) fn new(value: T) -> Self {
      Self {
        inner: ::loom::sync::RwLock::new(value),
      }
    }

    #[inline]
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, T> {
      self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, T> {
      self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub(crate) fn try_write(&self) -> Option<RwLockWriteGuard<'_, T>> {
      self.inner.try_write().ok()
    }
  }
}
