use std::fmt;

use crate::errors::KmhResult;
use crate::pool::{Lease, Pools};
use crate::sketch_schemes::{ItemHash, SketchParams};

/// k-minimum-values estimate from the largest retained digest of a saturated
/// sketch.
#[inline]
pub(crate) fn kmv_estimate(space_size: u32, capacity: u32, max_digest: ItemHash) -> f64 {
    f64::from(space_size) * f64::from(capacity - 1) / (f64::from(max_digest) + 1.0)
}

/// Keeps the `capacity` smallest distinct digests seen so far, largest first.
///
/// Digest storage is a lease from the digest pool, sized to the capacity at
/// creation and handed back when the sketch is dropped.
pub struct KmvSketch {
    params: SketchParams,
    count: usize,
    digests: Lease<ItemHash>,
}

impl KmvSketch {
    pub fn new(params: SketchParams, pools: &Pools) -> KmhResult<Self> {
        params.validate()?;
        let digests = pools.digests.acquire(params.capacity as usize)?;
        Ok(KmvSketch {
            params,
            count: 0,
            digests,
        })
    }

    /// Build a sketch around an already-ordered digest sequence. Callers
    /// guarantee `retained` is strictly descending, within the space, and no
    /// longer than the capacity.
    pub(crate) fn from_digests(
        params: SketchParams,
        retained: &[ItemHash],
        pools: &Pools,
    ) -> KmhResult<Self> {
        debug_assert!(retained.len() <= params.capacity as usize);
        let mut sketch = KmvSketch::new(params, pools)?;
        sketch.digests[..retained.len()].copy_from_slice(retained);
        sketch.count = retained.len();
        Ok(sketch)
    }

    /// Copy this sketch into fresh storage drawn from `pools`.
    pub fn try_clone(&self, pools: &Pools) -> KmhResult<Self> {
        KmvSketch::from_digests(self.params, self.digests(), pools)
    }

    /// Mutable access to the whole digest buffer and the count, for builders
    /// that fill the storage directly.
    pub(crate) fn raw_parts_mut(&mut self) -> (&mut [ItemHash], &mut usize) {
        (&mut self.digests[..], &mut self.count)
    }

    pub fn params(&self) -> SketchParams {
        self.params
    }

    pub fn capacity(&self) -> u32 {
        self.params.capacity
    }

    pub fn space_size(&self) -> u32 {
        self.params.space_size
    }

    pub fn seed(&self) -> u32 {
        self.params.seed
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_saturated(&self) -> bool {
        self.count == self.params.capacity as usize
    }

    /// True if the digest storage came from a pool slot rather than the heap.
    pub fn is_pooled(&self) -> bool {
        self.digests.is_pooled()
    }

    /// The retained digests in strictly descending order.
    pub fn digests(&self) -> &[ItemHash] {
        &self.digests[..self.count]
    }

    /// The largest retained digest (the k-th minimum once saturated).
    pub fn max_digest(&self) -> Option<ItemHash> {
        self.digests().first().copied()
    }

    pub fn contains_digest(&self, digest: ItemHash) -> bool {
        self.position(digest).is_ok()
    }

    // binary search over a descending slice
    #[inline]
    fn position(&self, digest: ItemHash) -> Result<usize, usize> {
        self.digests().binary_search_by(|probe| digest.cmp(probe))
    }

    /// Hash `value` into the sketch. Returns whether the retained set changed.
    pub fn insert(&mut self, value: u32) -> bool {
        let digest = self.params.digest(value);
        self.insert_digest(digest)
    }

    pub(crate) fn insert_digest(&mut self, digest: ItemHash) -> bool {
        let pos = match self.position(digest) {
            Ok(_) => return false,
            Err(pos) => pos,
        };

        let count = self.count;
        if count < self.params.capacity as usize {
            self.digests.copy_within(pos..count, pos + 1);
            self.digests[pos] = digest;
            self.count += 1;
            return true;
        }

        // full: anything not below the current maximum isn't one of the k smallest
        if pos == 0 {
            return false;
        }
        // drop the maximum at index 0 and slide the larger neighbours down
        self.digests.copy_within(1..pos, 0);
        self.digests[pos - 1] = digest;
        true
    }

    pub fn extend<I: IntoIterator<Item = u32>>(&mut self, values: I) {
        for value in values {
            self.insert(value);
        }
    }

    pub fn cardinality(&self) -> f64 {
        match self.max_digest() {
            None => 0.0,
            Some(_) if !self.is_saturated() => self.count as f64,
            Some(max_digest) => {
                kmv_estimate(self.params.space_size, self.params.capacity, max_digest)
            }
        }
    }
}

impl PartialEq for KmvSketch {
    fn eq(&self, other: &KmvSketch) -> bool {
        self.params == other.params && self.digests() == other.digests()
    }
}

impl fmt::Debug for KmvSketch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KmvSketch")
            .field("params", &self.params)
            .field("count", &self.count)
            .field("digests", &self.digests())
            .finish()
    }
}
