// EnergyHistory - fixed-capacity ring buffer of recent RMS values
//
// The arena is allocated once per capacity; pushing on the per-frame hot path
// never allocates. Oldest entries are overwritten first.

/// Ring buffer of the most recent frame energies
#[derive(Debug, Clone)]
pub struct EnergyHistory {
    values: Vec<f32>,
    /// Index the next push writes to
    write: usize,
    len: usize,
}

impl EnergyHistory {
    /// Create an empty history holding at most `capacity` values
    pub fn new(capacity: usize) -> Self {
        Self {
            values: vec![0.0; capacity.max(1)],
            write: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Append a value, evicting the oldest one when full
    pub fn push(&mut self, value: f32) {
        let capacity = self.capacity();
        self.values[self.write] = value;
        self.write = (self.write + 1) % capacity;
        self.len = (self.len + 1).min(capacity);
    }

    /// Most recently pushed value
    pub fn newest(&self) -> Option<f32> {
        if self.len == 0 {
            return None;
        }
        let capacity = self.capacity();
        Some(self.values[(self.write + capacity - 1) % capacity])
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        let capacity = self.capacity();
        let start = (self.write + capacity - self.len) % capacity;
        (0..self.len).map(move |offset| self.values[(start + offset) % capacity])
    }

    /// Mean of every stored value except the newest one
    ///
    /// Returns `None` when fewer than two values are stored.
    pub fn mean_excluding_newest(&self) -> Option<f32> {
        if self.len < 2 {
            return None;
        }
        let older = self.len - 1;
        let sum: f32 = self.iter().take(older).sum();
        Some(sum / older as f32)
    }

    pub fn clear(&mut self) {
        self.write = 0;
        self.len = 0;
    }

    /// Change the capacity, keeping the newest values that still fit
    pub fn resize(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        if capacity == self.capacity() {
            return;
        }

        let keep = self.len.min(capacity);
        let mut values = vec![0.0; capacity];
        for (slot, value) in values.iter_mut().zip(self.iter().skip(self.len - keep)) {
            *slot = value;
        }

        self.values = values;
        self.len = keep;
        self.write = keep % capacity;
    }
}
