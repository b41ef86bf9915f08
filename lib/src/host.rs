//! Sketch primitives shaped for an embedding host such as a SQL engine's
//! function registry.
//!
//! Every sketch crosses this boundary in its serialized form. Bad bytes,
//! non-integer inputs and incompatible parameters produce "no result"
//! (`Ok(None)`) rather than an error; only allocation failures and wrong
//! argument counts are surfaced as `Err`.
use crate::errors::{KmhError, KmhResult};
use crate::format_err;
use crate::merge::merge;
use crate::pool::{PoolConfig, Pools};
use crate::serialization::{cardinality_from_bytes, deserialize, to_bytes};
use crate::sketch_schemes::kmv::KmvSketch;
use crate::sketch_schemes::SketchParams;

/// A dynamically-typed argument as handed over by the host.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HostValue<'a> {
    Null,
    Integer(i64),
    Real(f64),
    Text(&'a str),
    Blob(&'a [u8]),
}

impl<'a> HostValue<'a> {
    /// Integers are truncated to their low 32 bits; anything else is ignored.
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            HostValue::Integer(i) => Some(i as u32),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&'a [u8]> {
        match *self {
            HostValue::Blob(bytes) => Some(bytes),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum HostResult {
    Null,
    Real(f64),
    Blob(Vec<u8>),
}

impl From<Option<Vec<u8>>> for HostResult {
    fn from(value: Option<Vec<u8>>) -> Self {
        value.map_or(HostResult::Null, HostResult::Blob)
    }
}

impl From<Option<f64>> for HostResult {
    fn from(value: Option<f64>) -> Self {
        value.map_or(HostResult::Null, HostResult::Real)
    }
}

fn or_no_result<T>(result: KmhResult<T>) -> KmhResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_no_result() => Ok(None),
        Err(e) => Err(e),
    }
}

fn check_arity(function: &'static str, expected: usize, args: &[HostValue]) -> KmhResult<()> {
    if args.len() != expected {
        return Err(KmhError::Arity {
            function,
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}

/// Pools plus the parameters new sketches are created with.
#[derive(Clone, Debug, Default)]
pub struct Engine {
    pools: Pools,
    params: SketchParams,
}

impl Engine {
    pub fn new(config: &PoolConfig) -> Self {
        Engine {
            pools: Pools::new(config),
            params: SketchParams::default(),
        }
    }

    pub fn with_params(mut self, params: SketchParams) -> KmhResult<Self> {
        params.validate()?;
        self.params = params;
        Ok(self)
    }

    pub fn pools(&self) -> &Pools {
        &self.pools
    }

    pub fn params(&self) -> SketchParams {
        self.params
    }

    pub fn new_sketch(&self) -> KmhResult<KmvSketch> {
        KmvSketch::new(self.params, &self.pools)
    }

    fn load(&self, value: &HostValue) -> KmhResult<Option<KmvSketch>> {
        match value.as_blob() {
            Some(bytes) => or_no_result(deserialize(bytes, &self.pools)),
            None => Ok(None),
        }
    }

    fn load_pair(&self, a: &HostValue, b: &HostValue) -> KmhResult<Option<KmvSketch>> {
        let (a, b) = match (self.load(a)?, self.load(b)?) {
            (Some(a), Some(b)) => (a, b),
            _ => return Ok(None),
        };
        or_no_result(merge(&a, &b, &self.pools))
    }

    /// A new sketch holding every integer among `values`.
    pub fn create(&self, values: &[HostValue]) -> KmhResult<Option<Vec<u8>>> {
        let mut sketch = self.new_sketch()?;
        sketch.extend(values.iter().filter_map(HostValue::as_u32));
        to_bytes(&sketch, &self.pools).map(Some)
    }

    pub fn add(&self, sketch: &HostValue, value: &HostValue) -> KmhResult<Option<Vec<u8>>> {
        let mut sketch = match self.load(sketch)? {
            Some(sketch) => sketch,
            None => return Ok(None),
        };
        if let Some(value) = value.as_u32() {
            sketch.insert(value);
        }
        to_bytes(&sketch, &self.pools).map(Some)
    }

    pub fn merge(&self, a: &HostValue, b: &HostValue) -> KmhResult<Option<Vec<u8>>> {
        match self.load_pair(a, b)? {
            Some(merged) => to_bytes(&merged, &self.pools).map(Some),
            None => Ok(None),
        }
    }

    pub fn cardinality(&self, sketch: &HostValue) -> KmhResult<Option<f64>> {
        match sketch.as_blob() {
            Some(bytes) => or_no_result(cardinality_from_bytes(bytes)),
            None => Ok(None),
        }
    }

    pub fn merge_cardinality(&self, a: &HostValue, b: &HostValue) -> KmhResult<Option<f64>> {
        Ok(self.load_pair(a, b)?.map(|merged| merged.cardinality()))
    }

    /// Fold that inserts each streamed value into one default sketch.
    pub fn group_create(&self) -> GroupCreate<'_> {
        GroupCreate {
            engine: self,
            sketch: None,
        }
    }

    /// Fold that merges each streamed serialized sketch into the first.
    pub fn group_merge(&self) -> GroupMerge<'_> {
        GroupMerge {
            engine: self,
            state: MergeState::Empty,
        }
    }

    /// Dispatch a scalar primitive by its registered name.
    pub fn call(&self, function: &str, args: &[HostValue]) -> KmhResult<HostResult> {
        Ok(match function {
            "kmh_create" => self.create(args)?.into(),
            "kmh_add" => {
                check_arity("kmh_add", 2, args)?;
                self.add(&args[0], &args[1])?.into()
            }
            "kmh_merge" => {
                check_arity("kmh_merge", 2, args)?;
                self.merge(&args[0], &args[1])?.into()
            }
            "kmh_cardinality" => {
                check_arity("kmh_cardinality", 1, args)?;
                self.cardinality(&args[0])?.into()
            }
            "kmh_merge_cardinality" => {
                check_arity("kmh_merge_cardinality", 2, args)?;
                self.merge_cardinality(&args[0], &args[1])?.into()
            }
            other => return Err(format_err!("unknown function {}", other)),
        })
    }
}

pub struct GroupCreate<'e> {
    engine: &'e Engine,
    sketch: Option<KmvSketch>,
}

impl<'e> GroupCreate<'e> {
    pub fn step(&mut self, value: &HostValue) -> KmhResult<()> {
        if self.sketch.is_none() {
            self.sketch = Some(self.engine.new_sketch()?);
        }
        if let (Some(sketch), Some(value)) = (&mut self.sketch, value.as_u32()) {
            sketch.insert(value);
        }
        Ok(())
    }

    /// The serialized sketch, or no result if nothing was ever stepped.
    pub fn finalize(self) -> KmhResult<Option<Vec<u8>>> {
        match self.sketch {
            Some(sketch) => to_bytes(&sketch, &self.engine.pools).map(Some),
            None => Ok(None),
        }
    }
}

enum MergeState {
    Empty,
    Merging(KmvSketch),
    // an incompatible input was seen; the fold has no result
    Poisoned,
}

pub struct GroupMerge<'e> {
    engine: &'e Engine,
    state: MergeState,
}

impl<'e> GroupMerge<'e> {
    /// Non-blob and malformed inputs are skipped.
    pub fn step(&mut self, value: &HostValue) -> KmhResult<()> {
        let input = match self.engine.load(value)? {
            Some(input) => input,
            None => return Ok(()),
        };
        self.state = match std::mem::replace(&mut self.state, MergeState::Poisoned) {
            MergeState::Empty => MergeState::Merging(input),
            MergeState::Merging(acc) => {
                match or_no_result(merge(&acc, &input, &self.engine.pools))? {
                    Some(merged) => MergeState::Merging(merged),
                    None => MergeState::Poisoned,
                }
            }
            MergeState::Poisoned => MergeState::Poisoned,
        };
        Ok(())
    }

    pub fn finalize(self) -> KmhResult<Option<Vec<u8>>> {
        match self.state {
            MergeState::Merging(sketch) => to_bytes(&sketch, &self.engine.pools).map(Some),
            MergeState::Empty | MergeState::Poisoned => Ok(None),
        }
    }

    pub fn finalize_cardinality(self) -> Option<f64> {
        match self.state {
            MergeState::Merging(sketch) => Some(sketch.cardinality()),
            MergeState::Empty | MergeState::Poisoned => None,
        }
    }
}
