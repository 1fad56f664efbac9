use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;

/// Idle buffers kept per shape. Anything returned beyond this is freed.
const MAX_IDLE_PER_KEY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferFormat {
    /// One float per pixel.
    Scalar,
    /// One float per candidate offset per tile.
    TileDifferences,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferKey {
    pub width: usize,
    pub height: usize,
    pub format: BufferFormat,
}

impl BufferKey {
    pub fn new(width: usize, height: usize, format: BufferFormat) -> Self {
        Self { width, height, format }
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Recycles scratch storage between merge stages, keyed by shape and format.
///
/// Checked-out buffers are zeroed and go back to the pool when their
/// [`PooledBuffer`] guard drops, including on early returns.
#[derive(Debug, Default)]
pub struct BufferPool {
    idle: Mutex<HashMap<BufferKey, Vec<Vec<f32>>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, key: BufferKey) -> PooledBuffer<'_> {
        let reused = self.idle.lock().get_mut(&key).and_then(Vec::pop);
        let data = match reused {
            Some(mut data) => {
                data.fill(0.0);
                data
            }
            None => vec![0.0; key.len()],
        };

        PooledBuffer {
            pool: self,
            key,
            data,
        }
    }

    /// Number of idle buffers currently held for `key`.
    pub fn idle_count(&self, key: BufferKey) -> usize {
        self.idle.lock().get(&key).map_or(0, Vec::len)
    }

    fn release(&self, key: BufferKey, data: Vec<f32>) {
        let mut idle = self.idle.lock();
        let slot = idle.entry(key).or_default();
        if slot.len() < MAX_IDLE_PER_KEY {
            slot.push(data);
        }
    }
}

/// Exclusive handle on a pooled buffer.
pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    key: BufferKey,
    data: Vec<f32>,
}

impl Deref for PooledBuffer<'_> {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.data
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        if data.len() == self.key.len() {
            self.pool.release(self.key, data);
        }
    }
}
