//! Cache-aligned array allocation.
//!
//! Provides [`Array`], the fixed-length backing storage of the bucket table and
//! the key store. Arrays never grow, move, or shrink after construction.

use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::mem::MaybeUninit;
use core::ptr::NonNull;
use core::slice;

use crate::alloc::Layout;
use crate::alloc::alloc;
use crate::alloc::dealloc;
use crate::error::Error;
use crate::params::CACHE_LINE;

/// A fixed-length array with cache-line-aligned allocation.
pub(crate) struct Array<T> {
  nonnull: NonNull<T>,
  length: usize,
  phantom: PhantomData<T>,
}

impl<T> Array<T> {
  /// Creates a new array, initializing each element with the given function.
  #[inline]
  pub(crate) fn new<F>(length: usize, init: F) -> Result<Self, Error>
  where
    F: Fn(usize, &mut MaybeUninit<T>),
  {
    let this: Array<MaybeUninit<T>> = Self::new_uninit(length)?;

    for index in 0..length {
      // SAFETY: `index < length` and allocation holds `length` elements.
      let ptr: NonNull<MaybeUninit<T>> = unsafe { this.nonnull.add(index) };

      // SAFETY: Pointer is valid and aligned; we have exclusive access.
      let uninit: &mut MaybeUninit<T> = unsafe { &mut *ptr.as_ptr() };

      init(index, uninit);
    }

    // SAFETY: All `length` elements initialized by the loop.
    Ok(unsafe { this.assume_init() })
  }

  /// Creates a new array with all bytes zeroed.
  #[allow(dead_code, reason = "not used with loom tests")]
  #[inline]
  pub(crate) fn new_zeroed(length: usize) -> Result<Array<MaybeUninit<T>>, Error> {
    let this: Array<MaybeUninit<T>> = Self::new_uninit(length)?;

    // SAFETY: Allocation holds `length` elements; zeroing `MaybeUninit` is valid.
    unsafe {
      this.nonnull.write_bytes(0, length);
    }

    Ok(this)
  }

  /// Creates a new array without initializing its contents.
  ///
  /// Allocation failure is reported as [`Error::OutOfMemory`] rather than
  /// aborting, since table sizes are caller-controlled.
  #[inline]
  pub(crate) fn new_uninit(length: usize) -> Result<Array<MaybeUninit<T>>, Error> {
    let layout: Layout = Self::layout(length)?;

    // SAFETY: `layout` has non-zero size as checked by `Self::layout`.
    let raw: *mut u8 = unsafe { alloc(layout) };

    let Some(nonnull) = NonNull::new(raw.cast()) else {
      tracing::error!(bytes = layout.size(), "array allocation failed");
      return Err(Error::OutOfMemory);
    };

    Ok(Array {
      nonnull,
      length,
      phantom: PhantomData,
    })
  }

  #[inline]
  fn layout(length: usize) -> Result<Layout, Error> {
    let size: usize = length
      .checked_mul(size_of::<T>())
      .ok_or(Error::OutOfMemory)?;

    if size == 0 {
      return Err(Error::InvalidArgument("zero-sized array"));
    }

    let align: usize = CACHE_LINE.max(align_of::<T>());

    Layout::from_size_align(size, align).map_err(|_| Error::OutOfMemory)
  }

  #[inline]
  pub(crate) const fn len(&self) -> usize {
    self.length
  }

  #[inline]
  pub(crate) const fn as_ptr(&self) -> *const T {
    self.nonnull.as_ptr()
  }

  #[inline]
  pub(crate) const fn as_slice(&self) -> &[T] {
    // SAFETY: Contiguous allocation of `length` initialized elements.
    unsafe { slice::from_raw_parts(self.as_ptr(), self.length) }
  }

  /// Returns a reference to the element at the given index.
  ///
  /// # Panics
  ///
  /// Panics if `index` is out of bounds.
  #[inline]
  pub(crate) fn get(&self, index: usize) -> &T {
    &self.as_slice()[index]
  }
}

impl<T> Array<MaybeUninit<T>> {
  /// Converts to an initialized array.
  ///
  /// # Safety
  ///
  /// All `length` elements must be initialized.
  #[inline]
  pub(crate) unsafe fn assume_init(self) -> Array<T> {
    let this: ManuallyDrop<Self> = ManuallyDrop::new(self);

    Array {
      // Prevent drop from running on `self` (would deallocate).
      nonnull: this.nonnull.cast(),
      length: this.length,
      phantom: PhantomData,
    }
  }
}

impl<T> Drop for Array<T> {
  fn drop(&mut self) {
    let Ok(layout) = Self::layout(self.length) else {
      return;
    };

    // SAFETY: Elements are dropped in place before releasing the allocation
    // made with this exact layout in `new_uninit`.
    unsafe {
      core::ptr::drop_in_place(core::ptr::slice_from_raw_parts_mut(
        self.nonnull.as_ptr(),
        self.length,
      ));
      dealloc(self.nonnull.cast().as_ptr(), layout);
    }
  }
}

// SAFETY: `Array` owns its elements like a `Box<[T]>`.
unsafe impl<T: Send> Send for Array<T> {}

// SAFETY: Shared access only hands out `&T`.
unsafe impl<T: Sync> Sync for Array<T> {}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use crate::array::Array;
  use crate::error::Error;
  use crate::params::CACHE_LINE;
  use crate::sync::atomic::AtomicU32;
  use crate::sync::atomic::Ordering::Relaxed;

  #[test]
  fn new_initializes_every_element() {
    let array: Array<usize> = Array::new(100, |index, slot| {
      slot.write(index * 2);
    })
    .unwrap();

    assert_eq!(array.len(), 100);

    for (index, value) in array.as_slice().iter().enumerate() {
      assert_eq!(*value, index * 2);
    }
  }

  #[test]
  fn zeroed_atomics_are_zero() {
    // SAFETY: All-zeros is a valid `AtomicU32`.
    let array: Array<AtomicU32> = unsafe { Array::new_zeroed(64).unwrap().assume_init() };

    assert!(array.as_slice().iter().all(|value| value.load(Relaxed) == 0));
  }

  #[test]
  fn allocation_is_cache_aligned() {
    let array: Array<u8> = Array::new(3, |_, slot| {
      slot.write(0);
    })
    .unwrap();

    assert_eq!(array.as_ptr().addr() % CACHE_LINE, 0);
  }

  #[test]
  fn zero_length_rejected() {
    assert!(matches!(
      Array::<u64>::new_uninit(0),
      Err(Error::InvalidArgument(_)),
    ));
  }

  #[test]
  fn overflowing_length_rejected() {
    assert!(matches!(
      Array::<u64>::new_uninit(usize::MAX),
      Err(Error::OutOfMemory),
    ));
  }
}
