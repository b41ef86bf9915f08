mod hashing;
pub mod kmv;

use serde::{Deserialize, Serialize};

use crate::errors::{KmhError, KmhResult};
pub use hashing::{digest, hash_f, ItemHash};

pub const DEFAULT_CAPACITY: u32 = 400;
pub const DEFAULT_SPACE_SIZE: u32 = 0xFFFF_FFFF;
pub const DEFAULT_SEED: u32 = 42;

/// The three values fixed at sketch creation. Two sketches can be merged or
/// compared only when all three agree.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SketchParams {
    pub capacity: u32,
    pub space_size: u32,
    pub seed: u32,
}

impl Default for SketchParams {
    fn default() -> Self {
        SketchParams {
            capacity: DEFAULT_CAPACITY,
            space_size: DEFAULT_SPACE_SIZE,
            seed: DEFAULT_SEED,
        }
    }
}

impl SketchParams {
    pub fn new(capacity: u32, space_size: u32, seed: u32) -> Self {
        SketchParams {
            capacity,
            space_size,
            seed,
        }
    }

    pub fn validate(&self) -> KmhResult<()> {
        if self.capacity == 0 {
            return Err(KmhError::InvalidParams(
                "capacity must be at least 1".to_string(),
            ));
        }
        if self.space_size == 0 {
            return Err(KmhError::InvalidParams(
                "space size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Return the first parameter difference that would make merges or
    /// comparisons between sketches built with these parameter sets invalid.
    pub fn check_compatibility(&self, other: &SketchParams) -> Option<(&'static str, String, String)> {
        if self.capacity != other.capacity {
            return Some((
                "capacity",
                self.capacity.to_string(),
                other.capacity.to_string(),
            ));
        }
        if self.space_size != other.space_size {
            return Some((
                "space size",
                self.space_size.to_string(),
                other.space_size.to_string(),
            ));
        }
        if self.seed != other.seed {
            return Some(("hash seed", self.seed.to_string(), other.seed.to_string()));
        }

        None
    }

    pub fn ensure_compatible(&self, other: &SketchParams) -> KmhResult<()> {
        match self.check_compatibility(other) {
            Some((param, left, right)) => Err(KmhError::Incompatible { param, left, right }),
            None => Ok(()),
        }
    }

    #[inline]
    pub fn digest(&self, value: u32) -> ItemHash {
        digest(value, self.seed, self.space_size)
    }
}
