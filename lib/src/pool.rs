//! Fixed-capacity pools of reusable memory for sketch digests and
//! serialization buffers.
//!
//! A pool is a small array of preallocated slots, each guarded by an atomic
//! ownership flag. `acquire` claims the first free slot with a single
//! compare-and-exchange per slot and never waits: when every slot is taken,
//! or the request is larger than a slot, the lease is served from the heap
//! instead. Leases hand their slot back when dropped.
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::errors::{KmhError, KmhResult};
use crate::serialization::serialized_len;

pub const DEFAULT_POOL_SLOTS: usize = 4;
pub const DEFAULT_MAX_CAPACITY: usize = 1024;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    /// Number of slots in each of the two pools.
    pub slots: usize,
    /// Largest sketch capacity a pooled digest slot can hold.
    pub max_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            slots: DEFAULT_POOL_SLOTS,
            max_capacity: DEFAULT_MAX_CAPACITY,
        }
    }
}

struct Slot<T> {
    in_use: AtomicBool,
    payload: UnsafeCell<Box<[T]>>,
}

// The payload is only ever touched by the lease that won the `in_use` flag.
unsafe impl<T: Send> Sync for Slot<T> {}

impl<T: Copy + Default> Slot<T> {
    fn new(len: usize) -> Self {
        Slot {
            in_use: AtomicBool::new(false),
            payload: UnsafeCell::new(vec![T::default(); len].into_boxed_slice()),
        }
    }

    #[inline]
    fn claim(&self) -> bool {
        self.in_use
            .compare_exchange(false, true, Acquire, Relaxed)
            .is_ok()
    }
}

pub struct Pool<T> {
    kind: &'static str,
    slots: Box<[Slot<T>]>,
    slot_len: usize,
}

impl<T: Copy + Default + Send> Pool<T> {
    pub fn new(kind: &'static str, slots: usize, slot_len: usize) -> Self {
        Pool {
            kind,
            slots: (0..slots).map(|_| Slot::new(slot_len)).collect(),
            slot_len,
        }
    }

    /// Borrow `len` elements, from a free slot if one fits, else from the heap.
    ///
    /// The contents of a pooled lease are whatever the previous owner left
    /// behind; callers overwrite before reading.
    pub fn acquire(self: &Arc<Self>, len: usize) -> KmhResult<Lease<T>> {
        if len <= self.slot_len {
            for (index, slot) in self.slots.iter().enumerate() {
                if slot.claim() {
                    trace!(pool = self.kind, slot = index, "claimed slot");
                    return Ok(Lease {
                        storage: Storage::Pooled {
                            pool: Arc::clone(self),
                            index,
                        },
                        len,
                    });
                }
            }
            debug!(
                pool = self.kind,
                requested = len,
                "pool exhausted, falling back to heap"
            );
        } else {
            debug!(
                pool = self.kind,
                requested = len,
                slot_len = self.slot_len,
                "request exceeds slot size, falling back to heap"
            );
        }

        let mut heap = Vec::new();
        heap.try_reserve_exact(len)
            .map_err(|_| KmhError::Allocation { requested: len })?;
        heap.resize(len, T::default());
        Ok(Lease {
            storage: Storage::Heap(heap),
            len,
        })
    }

    /// Number of slots currently claimed.
    pub fn in_use(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.in_use.load(Acquire))
            .count()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_len(&self) -> usize {
        self.slot_len
    }
}

impl<T> Pool<T> {
    fn release(&self, index: usize) {
        trace!(pool = self.kind, slot = index, "released slot");
        self.slots[index].in_use.store(false, Release);
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("kind", &self.kind)
            .field("slots", &self.slots.len())
            .field("slot_len", &self.slot_len)
            .finish()
    }
}

enum Storage<T> {
    Pooled { pool: Arc<Pool<T>>, index: usize },
    Heap(Vec<T>),
}

/// Exclusive, scoped ownership of `len` elements from a [`Pool`].
pub struct Lease<T> {
    storage: Storage<T>,
    len: usize,
}

impl<T> Lease<T> {
    pub fn is_pooled(&self) -> bool {
        matches!(self.storage, Storage::Pooled { .. })
    }

    /// The slot index backing this lease, if any.
    pub fn slot(&self) -> Option<usize> {
        match self.storage {
            Storage::Pooled { index, .. } => Some(index),
            Storage::Heap(_) => None,
        }
    }
}

impl<T> Deref for Lease<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match &self.storage {
            // SAFETY: the slot's flag was claimed by this lease and is only
            // cleared in `Drop`, so no other reference to the payload exists.
            Storage::Pooled { pool, index } => unsafe {
                &(&*pool.slots[*index].payload.get())[..self.len]
            },
            Storage::Heap(heap) => &heap[..self.len],
        }
    }
}

impl<T> DerefMut for Lease<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        match &mut self.storage {
            // SAFETY: as in `deref`; `&mut self` makes this the only borrow.
            Storage::Pooled { pool, index } => unsafe {
                &mut (&mut *pool.slots[*index].payload.get())[..self.len]
            },
            Storage::Heap(heap) => &mut heap[..self.len],
        }
    }
}

impl<T> Drop for Lease<T> {
    fn drop(&mut self) {
        if let Storage::Pooled { pool, index } = &self.storage {
            pool.release(*index);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Lease<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("pooled", &self.is_pooled())
            .field("items", &self.deref())
            .finish()
    }
}

/// The two pools every sketch operation draws from: digest storage for
/// sketches and byte buffers for their serialized form.
#[derive(Clone, Debug)]
pub struct Pools {
    pub digests: Arc<Pool<u32>>,
    pub buffers: Arc<Pool<u8>>,
}

impl Pools {
    pub fn new(config: &PoolConfig) -> Self {
        Pools {
            digests: Arc::new(Pool::new("digests", config.slots, config.max_capacity)),
            buffers: Arc::new(Pool::new(
                "buffers",
                config.slots,
                serialized_len(config.max_capacity),
            )),
        }
    }
}

impl Default for Pools {
    fn default() -> Self {
        Pools::new(&PoolConfig::default())
    }
}
