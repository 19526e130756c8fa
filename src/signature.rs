//! Key signatures.
//!
//! A signature is the 32-bit hash of a key. The primary signature selects the
//! primary bucket; the alternate signature is derived from the primary one
//! alone, so an entry can always find its other bucket without its key.

use core::ptr;

use crate::params::BUCKET_ENTRIES;

/// A keyed hash over raw key bytes, returning the primary signature.
pub type HashFn = fn(key: &[u8], init: u32) -> u32;

/// A key equality function. Both slices always have the table's key length.
pub type CmpFn = fn(a: &[u8], b: &[u8]) -> bool;

/// The signature stored in cleared bucket slots.
pub(crate) const NULL_SIGNATURE: u32 = 0;

const ALT_BITS_SHIFT: u32 = 12;
const ALT_BITS_XOR: u32 = 0x5bd1_e995;

/// The default hash function: CRC32 seeded with `init`.
///
/// ```
/// use cuckoo_tab::signature;
///
/// assert_ne!(signature::crc32(b"abcd", 0), signature::crc32(b"abcd", 1));
/// ```
#[inline]
pub fn crc32(key: &[u8], init: u32) -> u32 {
  let mut hasher: crc32fast::Hasher = crc32fast::Hasher::new_with_initial(init);
  hasher.update(key);
  hasher.finalize()
}

/// The default key comparison.
#[inline]
pub fn bytes_eq(a: &[u8], b: &[u8]) -> bool {
  a == b
}

/// Derives the alternate signature from a primary signature.
///
/// The high bits of `primary` are multiplied by an odd constant and folded
/// back in, so the result depends only on `primary` and differs from it in
/// both halves.
///
/// ```
/// use cuckoo_tab::signature;
///
/// let primary: u32 = signature::crc32(b"abcd", 0);
///
/// assert_eq!(signature::alternate(primary), signature::alternate(primary));
/// assert_ne!(signature::alternate(primary), primary);
/// ```
#[inline]
pub const fn alternate(primary: u32) -> u32 {
  let tag: u32 = primary >> ALT_BITS_SHIFT;

  primary ^ tag.wrapping_add(1).wrapping_mul(ALT_BITS_XOR)
}

// -----------------------------------------------------------------------------
// Signature Compare
// -----------------------------------------------------------------------------

/// Bucket-wide signature comparison backend.
///
/// All backends produce the same bitmask; they differ only in speed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Compare {
  #[cfg_attr(
    target_arch = "x86_64",
    allow(dead_code, reason = "only selected off x86_64")
  )]
  Scalar,
  #[cfg(target_arch = "x86_64")]
  Sse2,
  #[cfg(target_arch = "x86_64")]
  Avx2,
}

impl Compare {
  /// Selects the widest backend supported by the running CPU.
  #[inline]
  pub(crate) fn detect() -> Self {
    #[cfg(target_arch = "x86_64")]
    {
      if std::arch::is_x86_feature_detected!("avx2") {
        return Self::Avx2;
      }

      // SSE2 is part of the x86_64 baseline.
      Self::Sse2
    }

    #[cfg(not(target_arch = "x86_64"))]
    {
      Self::Scalar
    }
  }

  /// Returns a bitmask with bit `i` set when `sigs[i] == target`.
  #[inline]
  pub(crate) fn matches(self, sigs: &[u32; BUCKET_ENTRIES], target: u32) -> u8 {
    match self {
      Self::Scalar => matches_scalar(sigs, target),
      #[cfg(target_arch = "x86_64")]
      Self::Sse2 => matches_sse2(sigs, target),
      // SAFETY: `Avx2` is only selected after runtime feature detection.
      #[cfg(target_arch = "x86_64")]
      Self::Avx2 => unsafe { matches_avx2(sigs, target) },
    }
  }
}

#[inline]
fn matches_scalar(sigs: &[u32; BUCKET_ENTRIES], target: u32) -> u8 {
  let mut mask: u8 = 0;

  for (index, sig) in sigs.iter().enumerate() {
    mask |= u8::from(*sig == target) << index;
  }

  mask
}

#[cfg(target_arch = "x86_64")]
#[inline]
fn matches_sse2(sigs: &[u32; BUCKET_ENTRIES], target: u32) -> u8 {
  use core::arch::x86_64::__m128i;
  use core::arch::x86_64::_mm_castsi128_ps;
  use core::arch::x86_64::_mm_cmpeq_epi32;
  use core::arch::x86_64::_mm_loadu_si128;
  use core::arch::x86_64::_mm_movemask_ps;
  use core::arch::x86_64::_mm_set1_epi32;

  let needle: i32 = i32::from_ne_bytes(target.to_ne_bytes());

  // SAFETY: SSE2 is always available on x86_64; both loads read 4 in-bounds
  // lanes of `sigs` without alignment requirements.
  let (lo, hi): (i32, i32) = unsafe {
    let needle: __m128i = _mm_set1_epi32(needle);
    let lo: __m128i = _mm_loadu_si128(sigs.as_ptr().cast());
    let hi: __m128i = _mm_loadu_si128(sigs.as_ptr().add(4).cast());

    (
      _mm_movemask_ps(_mm_castsi128_ps(_mm_cmpeq_epi32(lo, needle))),
      _mm_movemask_ps(_mm_castsi128_ps(_mm_cmpeq_epi32(hi, needle))),
    )
  };

  (lo | (hi << 4)).to_le_bytes()[0]
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
#[inline]
unsafe fn matches_avx2(sigs: &[u32; BUCKET_ENTRIES], target: u32) -> u8 {
  use core::arch::x86_64::__m256i;
  use core::arch::x86_64::_mm256_castsi256_ps;
  use core::arch::x86_64::_mm256_cmpeq_epi32;
  use core::arch::x86_64::_mm256_loadu_si256;
  use core::arch::x86_64::_mm256_movemask_ps;
  use core::arch::x86_64::_mm256_set1_epi32;

  let needle: i32 = i32::from_ne_bytes(target.to_ne_bytes());

  // SAFETY: The caller verified AVX2 support; the load reads exactly the 8
  // lanes of `sigs` without alignment requirements.
  let mask: i32 = unsafe {
    let needle: __m256i = _mm256_set1_epi32(needle);
    let value: __m256i = _mm256_loadu_si256(sigs.as_ptr().cast());

    _mm256_movemask_ps(_mm256_castsi256_ps(_mm256_cmpeq_epi32(value, needle)))
  };

  mask.to_le_bytes()[0]
}

// -----------------------------------------------------------------------------
// Prefetch
// -----------------------------------------------------------------------------

/// Hints the CPU to pull `value` into cache ahead of use.
#[inline(always)]
pub(crate) fn prefetch<T>(value: &T) {
  #[cfg(target_arch = "x86_64")]
  {
    use core::arch::x86_64::_MM_HINT_T0;
    use core::arch::x86_64::_mm_prefetch;

    // SAFETY: Prefetching is a hint; it never faults or changes memory.
    unsafe {
      _mm_prefetch::<_MM_HINT_T0>(ptr::from_ref(value).cast::<i8>());
    }
  }

  #[cfg(not(target_arch = "x86_64"))]
  {
    let _unused: *const T = ptr::from_ref(value);
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use crate::params::BUCKET_ENTRIES;
  use crate::signature::Compare;
  use crate::signature::alternate;
  use crate::signature::crc32;

  const SIGS: [u32; BUCKET_ENTRIES] = [7, 0, 7, 3, 0xFFFF_FFFF, 7, 9, 7];

  fn backends() -> Vec<Compare> {
    let mut backends: Vec<Compare> = vec![Compare::Scalar];

    #[cfg(target_arch = "x86_64")]
    {
      backends.push(Compare::Sse2);

      if std::arch::is_x86_feature_detected!("avx2") {
        backends.push(Compare::Avx2);
      }
    }

    backends
  }

  #[test]
  fn backends_agree() {
    for backend in backends() {
      assert_eq!(backend.matches(&SIGS, 7), 0b1010_0101, "{backend:?}");
      assert_eq!(backend.matches(&SIGS, 0), 0b0000_0010, "{backend:?}");
      assert_eq!(backend.matches(&SIGS, 0xFFFF_FFFF), 0b0001_0000, "{backend:?}");
      assert_eq!(backend.matches(&SIGS, 42), 0, "{backend:?}");
    }
  }

  #[test]
  fn detect_is_usable() {
    assert_eq!(Compare::detect().matches(&SIGS, 3), 0b0000_1000);
  }

  #[test]
  fn alternate_is_deterministic() {
    for key in 0_u32..1024 {
      let primary: u32 = crc32(&key.to_le_bytes(), 0);

      assert_eq!(alternate(primary), alternate(primary));
      assert_ne!(alternate(primary), primary);
    }
  }

  #[test]
  fn crc32_depends_on_seed() {
    assert_ne!(crc32(b"abcd", 0), crc32(b"abcd", 0xdead_beef));
    assert_eq!(crc32(b"abcd", 7), crc32(b"abcd", 7));
  }
}
