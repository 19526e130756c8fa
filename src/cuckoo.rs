//! Cuckoo displacement.
//!
//! When both candidate buckets of a new key are full, a bounded breadth-first
//! search walks the graph whose edges lead from each occupied slot to that
//! entry's alternate bucket, looking for any bucket with an empty slot. The
//! chain of buckets from the root to that empty slot is a [`CuckooPath`].
//!
//! The search runs without the writer lock. Before a path is applied under
//! the lock, every hop is re-validated; if any other writer changed one of
//! them in between, the path is [`Stale`] and the search moves on to the next
//! candidate.

use core::marker::PhantomData;

use crate::bucket::Bucket;
use crate::bucket::Buckets;
use crate::bucket::EMPTY_SLOT;
use crate::params::BUCKET_ENTRIES;
use crate::params::Params;
use crate::params::ParamsExt;

const ROOT: u32 = u32::MAX;

/// The outcome of visiting a candidate path.
pub(crate) enum Visit<T> {
  /// The visitor finished; stop searching.
  Done(T),
  /// The path changed since it was found; keep searching.
  Stale,
}

/// Returned by [`CuckooPath::apply`] when the path no longer holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Stale;

#[derive(Clone, Copy)]
struct Node {
  bucket: u32,
  prev: u32,
  prev_slot: u8,
  prev_index: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Hop {
  bucket: u32,
  slot: usize,
  /// The key index observed in this slot during the search.
  index: u32,
}

// -----------------------------------------------------------------------------
// Search
// -----------------------------------------------------------------------------

/// A bounded breadth-first search for free space.
pub(crate) struct Search<'a, P>
where
  P: Params + ?Sized,
{
  buckets: &'a Buckets,
  queue: Vec<Node>,
  path: CuckooPath,
  marker: PhantomData<fn(P)>,
}

impl<'a, P> Search<'a, P>
where
  P: Params + ?Sized,
{
  pub(crate) fn new(buckets: &'a Buckets) -> Self {
    Self {
      buckets,
      queue: Vec::with_capacity(P::BFS_QUEUE_LEN),
      path: CuckooPath { hops: Vec::new() },
      marker: PhantomData,
    }
  }

  /// Searches outward from bucket `root`, passing every path that ends in an
  /// empty slot to `visit` until it returns [`Visit::Done`].
  ///
  /// Returns `None` when the search bound is reached first.
  pub(crate) fn run<T, F>(&mut self, root: u32, mut visit: F) -> Option<T>
  where
    F: FnMut(&CuckooPath) -> Visit<T>,
  {
    self.queue.clear();
    self.queue.push(Node {
      bucket: root,
      prev: ROOT,
      prev_slot: 0,
      prev_index: 0,
    });

    let buckets: &'a Buckets = self.buckets;
    let mut head: usize = 0;

    while head < self.queue.len() && self.queue.len() < P::BFS_LIMIT {
      let node: Node = self.queue[head];
      let bucket: &Bucket = buckets.at(node.bucket);

      for slot in 0..BUCKET_ENTRIES {
        let index: u32 = bucket.raw_index(slot);

        if index == EMPTY_SLOT {
          self.trace(head, slot);

          match visit(&self.path) {
            Visit::Done(output) => return Some(output),
            Visit::Stale => {
              tracing::trace!(root, depth = self.path.hops.len(), "stale cuckoo path");
            }
          }
        }

        self.queue.push(Node {
          bucket: buckets.index_of(bucket.alt(slot)),
          prev: head as u32,
          prev_slot: slot as u8,
          prev_index: index,
        });
      }

      head += 1;
    }

    tracing::trace!(root, visited = head, "cuckoo search exhausted");

    None
  }

  /// Rebuilds the path from the root to `slot` of the node at `leaf`, reusing
  /// the buffer of the previous candidate.
  fn trace(&mut self, leaf: usize, slot: usize) {
    let hops: &mut Vec<Hop> = &mut self.path.hops;
    let mut node: Node = self.queue[leaf];

    hops.clear();

    hops.push(Hop {
      bucket: node.bucket,
      slot,
      index: EMPTY_SLOT,
    });

    while node.prev != ROOT {
      let prev: Node = self.queue[node.prev as usize];

      hops.push(Hop {
        bucket: prev.bucket,
        slot: usize::from(node.prev_slot),
        index: node.prev_index,
      });

      node = prev;
    }

    hops.reverse();
  }
}

// -----------------------------------------------------------------------------
// Cuckoo Path
// -----------------------------------------------------------------------------

/// A chain of slots from a root bucket to an empty slot.
///
/// Each hop but the last holds an entry whose alternate bucket is the next
/// hop's bucket. Applying the path shifts every entry one hop forward,
/// starting from the empty end, which frees the slot in the root bucket.
#[derive(Debug)]
pub(crate) struct CuckooPath {
  hops: Vec<Hop>,
}

impl CuckooPath {
  /// Returns the number of entries displaced by applying this path.
  #[inline]
  pub(crate) fn displaced(&self) -> usize {
    self.hops.len() - 1
  }

  /// Checks that every hop still looks as it did during the search.
  fn validate(&self, buckets: &Buckets) -> Result<(), Stale> {
    let Some((tail, links)) = self.hops.split_last() else {
      return Err(Stale);
    };

    if !buckets.at(tail.bucket).is_empty(tail.slot) {
      return Err(Stale);
    }

    for (offset, (hop, next)) in links.iter().zip(&self.hops[1..]).enumerate() {
      let bucket: &Bucket = buckets.at(hop.bucket);

      // A path that revisits a slot would move one entry twice.
      if self.hops[offset + 1..]
        .iter()
        .any(|other| other.bucket == hop.bucket && other.slot == hop.slot)
      {
        return Err(Stale);
      }

      if bucket.raw_index(hop.slot) != hop.index {
        return Err(Stale);
      }

      if buckets.index_of(bucket.alt(hop.slot)) != next.bucket {
        return Err(Stale);
      }
    }

    Ok(())
  }

  /// Shifts the path and writes the new entry into the root slot.
  ///
  /// Moved entries swap their current and alternate signatures, so a later
  /// displacement may move them back.
  ///
  /// Callers must hold exclusive mutation rights.
  pub(crate) fn apply(
    &self,
    buckets: &Buckets,
    current: u32,
    alt: u32,
    index: u32,
  ) -> Result<(), Stale> {
    self.validate(buckets)?;

    for pair in self.hops.windows(2).rev() {
      let (from, to): (&Hop, &Hop) = (&pair[0], &pair[1]);
      let source: &Bucket = buckets.at(from.bucket);

      buckets.at(to.bucket).write(
        to.slot,
        source.alt(from.slot),
        source.current(from.slot),
        source.raw_index(from.slot),
      );
    }

    let root: &Hop = &self.hops[0];

    buckets.at(root.bucket).write(root.slot, current, alt, index);

    Ok(())
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
