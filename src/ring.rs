//! The shared free-index ring.
//!
//! A bounded multi-producer multi-consumer queue of free key-store indices.

#[cfg(not(loom))]
use crossbeam_queue::ArrayQueue;

#[cfg(loom)]
use std::collections::VecDeque;

#[cfg(loom)]
use crate::sync::Mutex;

pub(crate) struct FreeRing {
  #[cfg(not(loom))]
  queue: ArrayQueue<u32>,
  #[cfg(loom)]
  queue: Mutex<VecDeque<u32>>,
  #[cfg(loom)]
  capacity: usize,
}

impl FreeRing {
  /// Creates an empty ring able to hold `capacity` indices.
  #[cfg(not(loom))]
  pub(crate) fn new(capacity: usize) -> Self {
    Self {
      queue: ArrayQueue::new(capacity),
    }
  }

  #[cfg(loom)]
  pub(crate) fn new(capacity: usize) -> Self {
    Self {
      queue: Mutex::new(VecDeque::with_capacity(capacity)),
      capacity,
    }
  }

  /// Creates a ring pre-filled with the indices `1..=count`.
  pub(crate) fn filled(capacity: usize, count: u32) -> Self {
    let this: Self = Self::new(capacity);
    this.fill(count);
    this
  }

  /// Pushes the indices `1..=count`, stopping early if the ring is full.
  pub(crate) fn fill(&self, count: u32) {
    for index in 1..=count {
      if self.enqueue(index).is_err() {
        break;
      }
    }
  }

  /// Returns the index if the ring is full.
  #[cfg(not(loom))]
  #[inline]
  pub(crate) fn enqueue(&self, index: u32) -> Result<(), u32> {
    self.queue.push(index)
  }

  #[cfg(loom)]
  #[inline]
  pub(crate) fn enqueue(&self, index: u32) -> Result<(), u32> {
    let mut queue = self.queue.lock();

    if queue.len() == self.capacity {
      return Err(index);
    }

    queue.push_back(index);
    Ok(())
  }

  #[cfg(not(loom))]
  #[inline]
  pub(crate) fn dequeue(&self) -> Option<u32> {
    self.queue.pop()
  }

  #[cfg(loom)]
  #[inline]
  pub(crate) fn dequeue(&self) -> Option<u32> {
    self.queue.lock().pop_front()
  }

  /// Moves up to `count` indices into `output`, returning how many moved.
  pub(crate) fn dequeue_burst(&self, output: &mut Vec<u32>, count: usize) -> usize {
    let mut moved: usize = 0;

    while moved < count {
      let Some(index) = self.dequeue() else {
        break;
      };

      output.push(index);
      moved += 1;
    }

    moved
  }

  /// Pushes every index of `input`, leaving back the ones that did not fit.
  pub(crate) fn enqueue_burst(&self, input: &mut Vec<u32>) {
    while let Some(index) = input.pop() {
      if let Err(index) = self.enqueue(index) {
        input.push(index);
        break;
      }
    }
  }

  #[cfg(not(loom))]
  #[inline]
  pub(crate) fn len(&self) -> usize {
    self.queue.len()
  }

  #[cfg(loom)]
  #[inline]
  pub(crate) fn len(&self) -> usize {
    self.queue.lock().len()
  }

  /// Drops every queued index.
  pub(crate) fn clear(&self) {
    while self.dequeue().is_some() {}
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
