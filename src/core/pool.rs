//! Best-fit freelist of reusable typed scratch buffers.
//!
//! The engine allocates and drops several large per-phase arrays every
//! round; the pool keeps released buffers alive and hands the best-fitting
//! one back on the next request instead of going to the allocator. Buffers
//! are typed (`Vec<T>` behind `Any`), capacity is measured in bytes for the
//! best-fit comparison, and `release` never frees.
//!
//! Not thread-safe by design: allocation and release happen only between
//! parallel phases.

use std::any::{Any, TypeId};
use std::mem::size_of;

/// One pooled buffer.
struct PoolSlot {
    type_id: TypeId,
    size_bytes: usize,
    buf: Box<dyn Any>,
}

/// A freelist of typed buffers with best-fit reuse.
#[derive(Default)]
pub struct BufferPool {
    free: Vec<PoolSlot>,
    /// Buffers handed out and returned over the pool's lifetime.
    allocations: usize,
    hits: usize,
}

impl BufferPool {
    /// An empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out a cleared `Vec<T>` with capacity for at least `len`
    /// elements, preferring the smallest free buffer that fits.
    pub fn allocate<T: 'static>(&mut self, len: usize) -> Vec<T> {
        self.allocations += 1;
        let want_bytes = len * size_of::<T>();
        let type_id = TypeId::of::<Vec<T>>();

        let mut best: Option<usize> = None;
        for (i, slot) in self.free.iter().enumerate() {
            if slot.type_id != type_id || slot.size_bytes < want_bytes {
                continue;
            }
            if best.map_or(true, |b| slot.size_bytes < self.free[b].size_bytes) {
                best = Some(i);
            }
        }

        if let Some(i) = best {
            self.hits += 1;
            let slot = self.free.swap_remove(i);
            let mut vec = *slot
                .buf
                .downcast::<Vec<T>>()
                .unwrap_or_else(|_| unreachable!("slot type id was checked"));
            vec.clear();
            return vec;
        }

        log::debug!("BufferPool: allocating {want_bytes} bytes");
        Vec::with_capacity(len)
    }

    /// Return a buffer to the pool without freeing it.
    pub fn release<T: 'static>(&mut self, vec: Vec<T>) {
        let size_bytes = vec.capacity() * size_of::<T>();
        self.free.push(PoolSlot {
            type_id: TypeId::of::<Vec<T>>(),
            size_bytes,
            buf: Box::new(vec),
        });
    }

    /// Number of free buffers currently held.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// `(allocations, reuse hits)` over the pool's lifetime.
    #[must_use]
    pub fn stats(&self) -> (usize, usize) {
        (self.allocations, self.hits)
    }

    /// Drop every held buffer, reporting any that are unusually large.
    pub fn clear(&mut self) {
        for slot in &self.free {
            log::debug!("BufferPool: dropping {} bytes", slot.size_bytes);
        }
        self.free.clear();
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("free", &self.free.len())
            .field("allocations", &self.allocations)
            .field("hits", &self.hits)
            .finish()
    }
}
