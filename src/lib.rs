//! A fixed-capacity, concurrent cuckoo hash table.
//!
//! `cuckoo-tab` provides [`CuckooHash`], an open-addressing index from
//! fixed-length byte keys to a pointer-sized data value, built for
//! flow, session and neighbour lookup tables on packet-processing paths.
//!
//! # Overview
//!
//! Keys are hashed to a 32-bit signature. The signature selects a primary
//! bucket and, through a cheap mixing step, an alternate bucket; each bucket
//! holds [`BUCKET_ENTRIES`] slots. A key always lives in one of its two
//! buckets, so a lookup inspects at most two buckets. When both are full, a
//! bounded breadth-first search finds a chain of entries that can each move
//! to their own alternate bucket, and shifts them along to make room.
//!
//! Every stored key also occupies a stable [`Position`] in
//! `0..max_positions` that callers can use to index arrays of their own. In
//! single-writer mode that range is exactly `0..capacity`; multi-writer modes
//! add room for slots parked in per-worker caches.
//!
//! # Usage
//!
//! ```
//! use cuckoo_tab::{CuckooHash, Error, Parameters};
//!
//! let table: CuckooHash = CuckooHash::new(Parameters::new("sessions", 1024, 8)).unwrap();
//!
//! let key: [u8; 8] = 0x0a00_0001_0050_u64.to_be_bytes();
//!
//! // Insert returns the key's position; inserting again only updates data.
//! let position = table.add_with_data(&key, 7).unwrap();
//! assert_eq!(table.add_with_data(&key, 8), Ok(position));
//!
//! assert_eq!(table.lookup_with_data(&key), Ok((position, 8)));
//! assert_eq!(table.del(&key), Ok(position));
//! assert_eq!(table.lookup(&key), Err(Error::NotFound));
//! ```
//!
//! # Concurrency
//!
//! The concurrency [`Mode`] is chosen when the table is created:
//!
//! - [`Mode::SingleWriter`] takes no locks. The caller serializes mutations
//!   and keeps lookups away from them.
//! - [`Mode::MultiWriterExclusive`] serializes mutations from many workers
//!   with a table-wide writer lock. Each worker owns a cache of free slots
//!   and mutates through a [`Worker`] view.
//! - [`Mode::MultiWriterReaderConcurrent`] also lets lookups run alongside
//!   mutations by taking the lock in shared form.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::thread;
//!
//! use cuckoo_tab::config::Mode;
//! use cuckoo_tab::{CuckooHash, Parameters, WorkerId};
//!
//! let params = Parameters::new("flows", 1 << 16, 4).with_mode(Mode::MultiWriterReaderConcurrent);
//! let table: Arc<CuckooHash> = Arc::new(CuckooHash::new(params).unwrap());
//!
//! let handles: Vec<_> = (0..4_u32)
//!   .map(|id| {
//!     let table = Arc::clone(&table);
//!     thread::spawn(move || {
//!       let worker = table.worker(WorkerId::new(id)).unwrap();
//!       for value in 0..1000_u32 {
//!         worker.add(&(id * 1000 + value).to_le_bytes()).unwrap();
//!       }
//!     })
//!   })
//!   .collect();
//!
//! for handle in handles {
//!   handle.join().unwrap();
//! }
//!
//! assert_eq!(table.count(), 4000);
//! ```
//!
//! # Configuration
//!
//! Per-table settings (name, capacity, key length, hash function, mode) are
//! given through [`Parameters`]. Engine limits such as the search depth and
//! worker cache size are compile-time [`Params`]; the defaults are
//! [`DefaultParams`], and [`ConstParams`] overrides them:
//!
//! ```
//! use cuckoo_tab::{ConstParams, CuckooHash, Parameters};
//!
//! let table: CuckooHash<ConstParams<256, 16, 8>> =
//!   CuckooHash::new(Parameters::new("small", 100, 4)).unwrap();
//!
//! assert_eq!(table.capacity(), 128);
//! ```
//!
//! [`BUCKET_ENTRIES`]: crate::config::BUCKET_ENTRIES
//! [`Mode`]: crate::config::Mode
//! [`Mode::SingleWriter`]: crate::config::Mode::SingleWriter
//! [`Mode::MultiWriterExclusive`]: crate::config::Mode::MultiWriterExclusive
//! [`Mode::MultiWriterReaderConcurrent`]: crate::config::Mode::MultiWriterReaderConcurrent

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod array;
mod bucket;
mod cuckoo;
mod error;
mod index;
mod lock;
mod params;
mod public;
mod registry;
mod ring;
mod slots;
mod store;
mod table;
mod utils;

pub mod config;
pub mod signature;

pub(crate) use crate::utils::alloc;
pub(crate) use crate::utils::sync;

#[doc(inline)]
pub use self::config::Capacity;

#[doc(inline)]
pub use self::config::ConstParams;

#[doc(inline)]
pub use self::config::DefaultParams;

#[doc(inline)]
pub use self::config::Params;

#[doc(inline)]
pub use self::config::Parameters;

pub use self::error::Error;
pub use self::error::Result;

pub use self::index::Cursor;
pub use self::index::Position;
pub use self::index::WorkerId;

pub use self::public::CuckooHash;
pub use self::public::Entry;
pub use self::public::Hits;
pub use self::public::Iter;
pub use self::public::Worker;

pub use self::registry::Registry;
