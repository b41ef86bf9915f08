use serde::{Deserialize, Serialize};

use crate::errors::{KmhError, KmhResult};
use crate::pool::Pools;
use crate::sketch_schemes::kmv::KmvSketch;
use crate::sketch_schemes::{ItemHash, SketchParams};
use crate::serialization::MAX_DESERIALIZE_CAPACITY;

/// Human-readable form of a sketch, for inspection and hand-edited fixtures.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonSketch {
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub params: SketchParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<f64>,
    pub digests: Vec<ItemHash>,
}

impl JsonSketch {
    pub fn new(name: &str, sketch: &KmvSketch) -> Self {
        JsonSketch {
            name: String::from(name),
            params: sketch.params(),
            cardinality: Some(sketch.cardinality()),
            digests: sketch.digests().to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Rebuild the sketch. The digests must already form a valid retained
    /// set: strictly descending, inside the space, at most `capacity` long.
    pub fn to_sketch(&self, pools: &Pools) -> KmhResult<KmvSketch> {
        self.params
            .validate()
            .map_err(|e| KmhError::Corrupt(e.to_string()))?;
        if self.params.capacity > MAX_DESERIALIZE_CAPACITY {
            return Err(KmhError::Corrupt(format!(
                "{} has a capacity of {}, above the limit of {}",
                self.name, self.params.capacity, MAX_DESERIALIZE_CAPACITY
            )));
        }
        if self.digests.len() > self.params.capacity as usize {
            return Err(KmhError::Corrupt(format!(
                "{} has {} digests but a capacity of {}",
                self.name,
                self.digests.len(),
                self.params.capacity
            )));
        }
        if let Some(digest) = self.digests.iter().find(|d| **d >= self.params.space_size) {
            return Err(KmhError::Corrupt(format!(
                "{} has digest {} outside a space of {}",
                self.name, digest, self.params.space_size
            )));
        }
        if self.digests.windows(2).any(|pair| pair[0] <= pair[1]) {
            return Err(KmhError::Corrupt(format!(
                "{} digests are not strictly descending",
                self.name
            )));
        }
        KmvSketch::from_digests(self.params, &self.digests, pools)
    }
}
