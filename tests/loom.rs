#![cfg(loom)]

use loom::sync::Arc;
use loom::thread;
use loom::thread::JoinHandle;
use std::ops::Deref;

use cuckoo_tab::ConstParams;
use cuckoo_tab::CuckooHash;
use cuckoo_tab::Error;
use cuckoo_tab::Parameters;
use cuckoo_tab::Position;
use cuckoo_tab::WorkerId;
use cuckoo_tab::config::Mode;

type Insert = JoinHandle<Result<Position, Error>>;
type Remove = JoinHandle<Result<Position, Error>>;
type Lookup = JoinHandle<Result<(Position, usize), Error>>;

type ArcTable = Arc<CuckooHash<ConstParams<16, 2, 3>>>;

struct LoomTable {
  inner: ArcTable,
}

impl LoomTable {
  fn new(mode: Mode) -> Self {
    let params: Parameters = Parameters::new("loom", 8, 1).with_mode(mode);

    Self {
      inner: Arc::new(CuckooHash::new(params).unwrap()),
    }
  }

  fn spawn_insert(&self, worker: u32, key: u8, data: usize) -> Insert {
    let table: ArcTable = ArcTable::clone(&self.inner);

    thread::spawn(move || {
      table
        .worker(WorkerId::new(worker))?
        .add_with_data(&[key], data)
    })
  }

  fn spawn_remove(&self, worker: u32, key: u8) -> Remove {
    let table: ArcTable = ArcTable::clone(&self.inner);

    thread::spawn(move || table.worker(WorkerId::new(worker))?.del(&[key]))
  }

  fn spawn_lookup(&self, key: u8) -> Lookup {
    let table: ArcTable = ArcTable::clone(&self.inner);
    thread::spawn(move || table.lookup_with_data(&[key]))
  }
}

impl Deref for LoomTable {
  type Target = ArcTable;

  #[inline]
  fn deref(&self) -> &Self::Target {
    &self.inner
  }
}

#[test]
fn test_insert() {
  loom::model(|| {
    let table: LoomTable = LoomTable::new(Mode::MultiWriterExclusive);

    let thread_a: Insert = table.spawn_insert(1, 1, 10);
    let thread_b: Insert = table.spawn_insert(2, 2, 20);

    let result_a: Position = thread_a.join().unwrap().unwrap();
    let result_b: Position = thread_b.join().unwrap().unwrap();

    assert_ne!(result_a, result_b);
    assert_eq!(table.count(), 2);
    assert_eq!(table.lookup_with_data(&[1]), Ok((result_a, 10)));
    assert_eq!(table.lookup_with_data(&[2]), Ok((result_b, 20)));
  });
}

#[test]
fn test_insert_same_key() {
  loom::model(|| {
    let table: LoomTable = LoomTable::new(Mode::MultiWriterExclusive);

    let thread_a: Insert = table.spawn_insert(1, 7, 1);
    let thread_b: Insert = table.spawn_insert(2, 7, 2);

    let result_a: Position = thread_a.join().unwrap().unwrap();
    let result_b: Position = thread_b.join().unwrap().unwrap();

    assert_eq!(result_a, result_b, "one key, one position");
    assert_eq!(table.count(), 1);

    let (_, data): (Position, usize) = table.lookup_with_data(&[7]).unwrap();

    assert!(data == 1 || data == 2);
  });
}

#[test]
fn test_insert_read() {
  loom::model(|| {
    let table: LoomTable = LoomTable::new(Mode::MultiWriterReaderConcurrent);
    let position: Position = table.add_with_data(&[1], 123).unwrap();

    let insert: Insert = table.spawn_insert(1, 2, 100);
    let lookup: Lookup = table.spawn_lookup(1);

    assert!(insert.join().unwrap().is_ok());
    assert_eq!(lookup.join().unwrap(), Ok((position, 123)));
  });
}

#[test]
fn test_insert_remove() {
  loom::model(|| {
    let table: LoomTable = LoomTable::new(Mode::MultiWriterExclusive);
    let position: Position = table.add(&[1]).unwrap();

    let insert: Insert = table.spawn_insert(1, 2, 0);
    let remove: Remove = table.spawn_remove(2, 1);

    assert!(insert.join().unwrap().is_ok());
    assert_eq!(remove.join().unwrap(), Ok(position));
    assert_eq!(table.lookup(&[1]), Err(Error::NotFound));
    assert_eq!(table.count(), 1);
  });
}

#[test]
fn test_remove_race() {
  loom::model(|| {
    let table: LoomTable = LoomTable::new(Mode::MultiWriterExclusive);
    let position: Position = table.add(&[9]).unwrap();

    let remove_a: Remove = table.spawn_remove(1, 9);
    let remove_b: Remove = table.spawn_remove(2, 9);

    let removed_a: Result<Position, Error> = remove_a.join().unwrap();
    let removed_b: Result<Position, Error> = remove_b.join().unwrap();

    assert!(removed_a.is_ok() != removed_b.is_ok(), "exactly one remove should succeed");
    assert!(removed_a == Ok(position) || removed_b == Ok(position));
    assert!(table.is_empty());
  });
}

#[test]
fn test_remove_race_read() {
  loom::model(|| {
    let table: LoomTable = LoomTable::new(Mode::MultiWriterReaderConcurrent);
    let position: Position = table.add_with_data(&[5], 55).unwrap();

    let lookup: Lookup = table.spawn_lookup(5);
    let remove: Remove = table.spawn_remove(1, 5);

    assert_eq!(remove.join().unwrap(), Ok(position));

    match lookup.join().unwrap() {
      Ok(found) => assert_eq!(found, (position, 55)),
      Err(error) => assert_eq!(error, Error::NotFound),
    }
  });
}

#[test]
fn test_read_unaffected_by_other_remove() {
  loom::model(|| {
    let table: LoomTable = LoomTable::new(Mode::MultiWriterReaderConcurrent);

    table.add_with_data(&[1], 111).unwrap();

    let position: Position = table.add_with_data(&[2], 222).unwrap();

    let lookup: Lookup = table.spawn_lookup(2);
    let remove: Remove = table.spawn_remove(1, 1);

    assert!(remove.join().unwrap().is_ok());
    assert_eq!(lookup.join().unwrap(), Ok((position, 222)));
  });
}
