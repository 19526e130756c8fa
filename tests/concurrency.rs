#![cfg(not(loom))]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Barrier;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::thread::JoinHandle;

use cuckoo_tab::ConstParams;
use cuckoo_tab::CuckooHash;
use cuckoo_tab::Error;
use cuckoo_tab::Parameters;
use cuckoo_tab::Position;
use cuckoo_tab::Worker;
use cuckoo_tab::WorkerId;
use cuckoo_tab::config::Elision;
use cuckoo_tab::config::Mode;

type Params = ConstParams<1000, 16, 8>;
type Table = CuckooHash<Params>;

const WRITERS: u32 = 4;
const PER_WRITER: u32 = 1500;

fn shared(name: &str, entries: usize, mode: Mode, elision: Elision) -> Arc<Table> {
  let params: Parameters = Parameters::new(name, entries, 8)
    .with_mode(mode)
    .with_elision(elision);

  Arc::new(CuckooHash::new(params).unwrap())
}

fn key(writer: u32, value: u32) -> [u8; 8] {
  (u64::from(writer) << 32 | u64::from(value)).to_le_bytes()
}

fn spawn_writers<T, F>(table: &Arc<Table>, f: F) -> Vec<JoinHandle<T>>
where
  T: Send + 'static,
  F: Fn(Worker<'_, Params>, u32) -> T + Send + Sync + 'static,
{
  let f: Arc<F> = Arc::new(f);
  let barrier: Arc<Barrier> = Arc::new(Barrier::new(WRITERS as usize));

  (0..WRITERS)
    .map(|id| {
      let table: Arc<Table> = Arc::clone(table);
      let barrier: Arc<Barrier> = Arc::clone(&barrier);
      let f: Arc<F> = Arc::clone(&f);

      thread::spawn(move || {
        let worker: Worker<'_, Params> = table.worker(WorkerId::new(id)).unwrap();
        barrier.wait();
        f(worker, id)
      })
    })
    .collect()
}

#[test]
fn test_writers_get_unique_positions() {
  for elision in [Elision::Disabled, Elision::Speculative] {
    let table: Arc<Table> = shared("unique", 8192, Mode::MultiWriterExclusive, elision);

    let handles: Vec<JoinHandle<Vec<Position>>> = spawn_writers(&table, |worker, id| {
      (0..PER_WRITER)
        .map(|value| worker.add_with_data(&key(id, value), value as usize).unwrap())
        .collect()
    });

    let mut positions: HashSet<Position> = HashSet::new();

    for handle in handles {
      for position in handle.join().unwrap() {
        assert!(positions.insert(position), "position {position} handed out twice");
        assert!(position.get() < table.max_positions(), "position {position} out of range");
      }
    }

    assert_eq!(positions.len(), (WRITERS * PER_WRITER) as usize);
    assert_eq!(table.count(), positions.len());

    for id in 0..WRITERS {
      for value in 0..PER_WRITER {
        assert_eq!(table.lookup_with_data(&key(id, value)).unwrap().1, value as usize);
      }
    }
  }
}

#[test]
fn test_writers_race_on_same_keys() {
  let table: Arc<Table> = shared("race", 4096, Mode::MultiWriterExclusive, Elision::Speculative);

  // Every writer inserts the same keys; each key must end up stored once.
  let handles: Vec<JoinHandle<Vec<Position>>> = spawn_writers(&table, |worker, _| {
    (0..PER_WRITER)
      .map(|value| worker.add(&key(0, value)).unwrap())
      .collect()
  });

  let results: Vec<Vec<Position>> = handles
    .into_iter()
    .map(|handle| handle.join().unwrap())
    .collect();

  for result in &results[1..] {
    assert_eq!(result, &results[0]);
  }

  assert_eq!(table.count(), PER_WRITER as usize);
}

#[test]
fn test_insert_delete_churn() {
  let table: Arc<Table> = shared("churn", 2048, Mode::MultiWriterExclusive, Elision::Disabled);

  let handles: Vec<JoinHandle<()>> = spawn_writers(&table, |worker, id| {
    for round in 0..20 {
      for value in 0..200 {
        worker.add_with_data(&key(id, value), round).unwrap();
      }

      for value in 0..200 {
        worker.del(&key(id, value)).unwrap();
      }
    }

    for value in 0..100 {
      worker.add(&key(id, value)).unwrap();
    }
  });

  for handle in handles {
    handle.join().unwrap();
  }

  assert_eq!(table.count(), (WRITERS * 100) as usize);
  assert_eq!(table.iter().count(), (WRITERS * 100) as usize);
}

#[test]
fn test_readers_see_stable_keys() {
  let table: Arc<Table> = shared(
    "readers",
    16384,
    Mode::MultiWriterReaderConcurrent,
    Elision::Disabled,
  );

  // Keys of a reserved writer id that stay put while others churn.
  let stable: Vec<(Position, [u8; 8])> = (0..500)
    .map(|value| {
      let key: [u8; 8] = key(u32::MAX, value);
      (table.add_with_data(&key, value as usize).unwrap(), key)
    })
    .collect();

  let done: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));

  let reader: JoinHandle<usize> = {
    let table: Arc<Table> = Arc::clone(&table);
    let done: Arc<AtomicBool> = Arc::clone(&done);

    thread::spawn(move || {
      let mut rounds: usize = 0;

      while !done.load(Ordering::Acquire) || rounds == 0 {
        for (value, (position, key)) in stable.iter().enumerate() {
          assert_eq!(table.lookup_with_data(key), Ok((*position, value)));
        }

        let keys: Vec<[u8; 8]> = stable.iter().take(32).map(|(_, key)| *key).collect();
        let mut data: Vec<usize> = vec![0; keys.len()];

        assert_eq!(table.lookup_bulk_data(&keys, &mut data).unwrap().count(), 32);

        rounds += 1;
      }

      rounds
    })
  };

  let handles: Vec<JoinHandle<()>> = spawn_writers(&table, |worker, id| {
    for value in 0..PER_WRITER {
      worker.add(&key(id, value)).unwrap();
    }

    for value in (0..PER_WRITER).step_by(2) {
      worker.del(&key(id, value)).unwrap();
    }
  });

  for handle in handles {
    handle.join().unwrap();
  }

  done.store(true, Ordering::Release);

  assert!(reader.join().unwrap() > 0);
  assert_eq!(table.count(), 500 + (WRITERS * PER_WRITER / 2) as usize);

  for id in 0..WRITERS {
    for value in 0..PER_WRITER {
      let found: Result<Position, Error> = table.lookup(&key(id, value));

      if value % 2 == 0 {
        assert_eq!(found, Err(Error::NotFound));
      } else {
        assert!(found.is_ok());
      }
    }
  }
}

#[test]
fn test_worker_out_of_range() {
  let table: Arc<Table> = shared("range", 64, Mode::MultiWriterExclusive, Elision::Disabled);

  assert!(table.worker(WorkerId::new(7)).is_ok());
  assert!(matches!(
    table.worker(WorkerId::new(8)),
    Err(Error::InvalidArgument(_)),
  ));
}

#[test]
fn test_cached_slots_do_not_reduce_capacity() {
  let table: Arc<Table> = shared("slack", 64, Mode::MultiWriterExclusive, Elision::Disabled);

  // Park free slots in every other worker cache first.
  for id in 1..8 {
    let worker: Worker<'_, Params> = table.worker(WorkerId::new(id)).unwrap();
    let position: Position = worker.add(&key(id, 0)).unwrap();

    assert_eq!(worker.del(&key(id, 0)), Ok(position));
  }

  assert!(table.is_empty());

  let worker: Worker<'_, Params> = table.worker(WorkerId::MAIN).unwrap();

  for value in 0..48 {
    worker.add(&key(100, value)).unwrap();
  }

  assert_eq!(table.count(), 48);
}
