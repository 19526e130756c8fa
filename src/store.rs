//! The key store.
//!
//! A flat arena of fixed-size records, one per slot index. Each record holds
//! the key bytes packed into 64-bit words and one pointer-sized data value.
//! Record `0` is never handed out; it backs the "empty" key index.

use crate::array::Array;
use crate::error::Error;
use crate::index::SlotIndex;
use crate::signature::CmpFn;
use crate::sync::atomic::AtomicU64;
use crate::sync::atomic::AtomicUsize;
use crate::sync::atomic::Ordering::Relaxed;

const WORD: usize = size_of::<u64>();

pub(crate) struct KeyStore {
  keys: Array<AtomicU64>,
  data: Array<AtomicUsize>,
  key_len: usize,
  words: usize,
}

impl KeyStore {
  pub(crate) fn new(records: usize, key_len: usize) -> Result<Self, Error> {
    debug_assert!(key_len != 0, "keys must not be empty");

    let words: usize = key_len.div_ceil(WORD);
    let total: usize = records.checked_mul(words).ok_or(Error::OutOfMemory)?;

    Ok(Self {
      keys: Array::new(total, |_, word| {
        word.write(AtomicU64::new(0));
      })?,
      data: Array::new(records, |_, data| {
        data.write(AtomicUsize::new(0));
      })?,
      key_len,
      words,
    })
  }

  #[inline]
  pub(crate) const fn key_len(&self) -> usize {
    self.key_len
  }

  /// Returns the number of records, including the reserved record `0`.
  #[inline]
  pub(crate) const fn records(&self) -> usize {
    self.data.len()
  }

  #[inline]
  fn record(&self, index: SlotIndex) -> &[AtomicU64] {
    let start: usize = index.as_usize() * self.words;

    &self.keys.as_slice()[start..start + self.words]
  }

  /// Writes `key` and `data` into the record at `index`.
  ///
  /// The record becomes visible to readers once a bucket slot publishes
  /// `index`.
  pub(crate) fn write(&self, index: SlotIndex, key: &[u8], data: usize) {
    debug_assert_eq!(key.len(), self.key_len);

    for (word, chunk) in self.record(index).iter().zip(key.chunks(WORD)) {
      word.store(pack(chunk), Relaxed);
    }

    self.data.get(index.as_usize()).store(data, Relaxed);
  }

  #[inline]
  pub(crate) fn data(&self, index: SlotIndex) -> usize {
    self.data.get(index.as_usize()).load(Relaxed)
  }

  #[inline]
  pub(crate) fn set_data(&self, index: SlotIndex, data: usize) {
    self.data.get(index.as_usize()).store(data, Relaxed);
  }

  /// Copies the key stored at `index` into a new buffer.
  pub(crate) fn read(&self, index: SlotIndex) -> Vec<u8> {
    let mut output: Vec<u8> = Vec::with_capacity(self.words * WORD);

    for word in self.record(index) {
      output.extend_from_slice(&word.load(Relaxed).to_ne_bytes());
    }

    output.truncate(self.key_len);
    output
  }

  /// Returns `true` if the key stored at `index` equals `key`.
  ///
  /// Uses `cmp` when set, otherwise compares the packed words directly.
  #[inline]
  pub(crate) fn key_eq(&self, index: SlotIndex, key: &[u8], cmp: Option<CmpFn>) -> bool {
    if let Some(cmp) = cmp {
      return cmp(key, &self.read(index));
    }

    self
      .record(index)
      .iter()
      .zip(key.chunks(WORD))
      .all(|(word, chunk)| word.load(Relaxed) == pack(chunk))
  }

  /// Zeroes every record. Callers must hold exclusive mutation rights.
  pub(crate) fn reset(&self) {
    for word in self.keys.as_slice() {
      word.store(0, Relaxed);
    }

    for data in self.data.as_slice() {
      data.store(0, Relaxed);
    }
  }
}

/// Packs up to 8 key bytes into a word, zero-padding the tail.
#[inline]
fn pack(chunk: &[u8]) -> u64 {
  let mut bytes: [u8; WORD] = [0; WORD];
  bytes[..chunk.len()].copy_from_slice(chunk);
  u64::from_ne_bytes(bytes)
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use crate::index::SlotIndex;
  use crate::store::KeyStore;

  fn slot(bits: u32) -> SlotIndex {
    SlotIndex::new(bits).unwrap()
  }

  #[test]
  fn write_then_read() {
    let store: KeyStore = KeyStore::new(4, 13).unwrap();

    store.write(slot(2), b"hello, world!", 99);

    assert_eq!(store.records(), 4);
    assert_eq!(store.key_len(), 13);
    assert_eq!(store.read(slot(2)), b"hello, world!");
    assert_eq!(store.data(slot(2)), 99);
    assert_eq!(store.read(slot(1)), [0; 13]);
  }

  #[test]
  fn key_eq_compares_all_bytes() {
    let store: KeyStore = KeyStore::new(2, 10).unwrap();

    store.write(slot(1), b"0123456789", 0);

    assert!(store.key_eq(slot(1), b"0123456789", None));
    assert!(!store.key_eq(slot(1), b"0123456788", None));
    assert!(!store.key_eq(slot(1), b"1123456789", None));
  }

  #[test]
  fn key_eq_uses_custom_cmp() {
    fn first_byte(a: &[u8], b: &[u8]) -> bool {
      a[0] == b[0]
    }

    let store: KeyStore = KeyStore::new(2, 4).unwrap();

    store.write(slot(1), b"abcd", 0);

    assert!(store.key_eq(slot(1), b"axxx", Some(first_byte)));
    assert!(!store.key_eq(slot(1), b"axxx", None));
  }

  #[test]
  fn set_data_keeps_key() {
    let store: KeyStore = KeyStore::new(2, 4).unwrap();

    store.write(slot(1), b"abcd", 1);
    store.set_data(slot(1), 2);

    assert_eq!(store.data(slot(1)), 2);
    assert_eq!(store.read(slot(1)), b"abcd");
  }

  #[test]
  fn reset_zeroes_records() {
    let store: KeyStore = KeyStore::new(2, 4).unwrap();

    store.write(slot(1), b"abcd", 7);
    store.reset();

    assert_eq!(store.read(slot(1)), [0; 4]);
    assert_eq!(store.data(slot(1)), 0);
  }
}
