//! Fixed-capacity FIFO used to hold measurements while the sender is offline.
//!
//! One slot always stays free so that `head == tail` means empty and
//! `head == tail + 1` means full; a buffer built with `n` slots holds at most
//! `n - 1` records. Committing into a full buffer drops the oldest record.

#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Box<[T]>,
    head: usize,
    tail: usize,
}

impl<T: Default> RingBuffer<T> {
    pub fn new(slots: usize) -> Result<Self, anyhow::Error> {
        anyhow::ensure!(
            slots >= 2,
            "Ring buffer needs at least 2 slots, got {slots}"
        );

        Ok(Self {
            slots: std::iter::repeat_with(T::default).take(slots).collect(),
            head: 0,
            tail: 0,
        })
    }
}

impl<T> RingBuffer<T> {
    /// Number of records the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    /// Slot the next committed record will occupy. It may still hold a stale
    /// record, so the caller must overwrite it completely before `commit`.
    pub fn write_slot(&mut self) -> &mut T {
        &mut self.slots[self.tail]
    }

    /// Makes the write slot part of the queue, evicting the oldest record
    /// first when the buffer is full.
    pub fn commit(&mut self) {
        if self.is_full() {
            self.head = self.advance(self.head);
        }
        self.tail = self.advance(self.tail);
    }

    pub fn push(&mut self, item: T) {
        *self.write_slot() = item;
        self.commit();
    }

    /// Oldest record, left in place.
    pub fn peek(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        Some(&self.slots[self.head])
    }

    /// Removes the oldest record. The returned slot is reused by a later
    /// commit, so the borrow ends before the buffer can be written again.
    pub fn dequeue(&mut self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        let index = self.head;
        self.head = self.advance(self.head);
        Some(&self.slots[index])
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        self.head == self.advance(self.tail)
    }

    pub fn size(&self) -> usize {
        if self.tail >= self.head {
            self.tail - self.head
        } else {
            self.slots.len() - (self.head - self.tail)
        }
    }

    fn advance(&self, index: usize) -> usize {
        (index + 1) % self.slots.len()
    }
}
