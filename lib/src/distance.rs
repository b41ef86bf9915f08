use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::errors::KmhResult;
use crate::sketch_schemes::kmv::KmvSketch;
use crate::sketch_schemes::ItemHash;

/// Returned by [`jaccard_distance`] when the sketches can't be compared.
/// Valid distances are always within `[0, 1]`.
pub const INCOMPARABLE: f64 = -1.0;

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SketchDistance {
    pub jaccard: f64,
    pub distance: f64,
    pub matches: u64,
    pub compared: u64,
}

/// Walks two descending digest lists in lock-step, stepping past whichever
/// head is larger, for at most `limit` comparisons.
///
/// Returns `(matches, compared)`.
pub fn raw_distance(lhs: &[ItemHash], rhs: &[ItemHash], limit: usize) -> (u64, u64) {
    fn is_descending(digests: &[ItemHash]) -> bool {
        digests.windows(2).all(|pair| pair[0] > pair[1])
    }
    debug_assert!(is_descending(lhs));
    debug_assert!(is_descending(rhs));

    let mut i: usize = 0;
    let mut j: usize = 0;
    let mut matches: u64 = 0;
    let mut compared: u64 = 0;
    while compared < limit as u64 {
        let (left, right) = match (lhs.get(i), rhs.get(j)) {
            (Some(left), Some(right)) => (left, right),
            _ => break,
        };
        match left.cmp(right) {
            Ordering::Greater => i += 1,
            Ordering::Less => j += 1,
            Ordering::Equal => {
                matches += 1;
                i += 1;
                j += 1;
            }
        }
        compared += 1;
    }
    (matches, compared)
}

/// Estimated Jaccard distance between two compatible sketches.
pub fn distance(a: &KmvSketch, b: &KmvSketch) -> KmhResult<SketchDistance> {
    a.params().ensure_compatible(&b.params())?;

    let (matches, compared) = raw_distance(a.digests(), b.digests(), a.capacity() as usize);
    let distance = if compared == 0 {
        1.
    } else {
        1. - matches as f64 / compared as f64
    };
    Ok(SketchDistance {
        jaccard: 1. - distance,
        distance,
        matches,
        compared,
    })
}

/// [`distance`] collapsed to a scalar, with [`INCOMPARABLE`] standing in for
/// a parameter mismatch.
pub fn jaccard_distance(a: &KmvSketch, b: &KmvSketch) -> f64 {
    distance(a, b)
        .map(|dist| dist.distance)
        .unwrap_or(INCOMPARABLE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pools;
    use crate::sketch_schemes::SketchParams;
    use proptest::prelude::*;

    fn sketch(digests: &[ItemHash], pools: &Pools) -> KmvSketch {
        let mut sketch = KmvSketch::new(SketchParams::new(10, 1000, 42), pools).unwrap();
        for digest in digests {
            sketch.insert_digest(*digest);
        }
        sketch
    }

    #[test]
    fn test_raw_distance() {
        assert_eq!(raw_distance(&[5, 3, 1], &[5, 3, 1], 10), (3, 3));
        // 5 = 5, 3 > 2 so skip left, 1 < 2 so skip right, 1 = 1
        assert_eq!(raw_distance(&[5, 3, 1], &[5, 2, 1], 10), (2, 4));
        assert_eq!(raw_distance(&[9, 8], &[2, 1], 10), (0, 2));
        assert_eq!(raw_distance(&[], &[], 10), (0, 0));
        assert_eq!(raw_distance(&[], &[4], 10), (0, 0));
        // stops after the comparison limit
        assert_eq!(raw_distance(&[5, 3, 1], &[5, 3, 1], 2), (2, 2));
    }

    #[test]
    fn test_distance_edges() -> Result<(), Box<dyn std::error::Error>> {
        let pools = Pools::default();
        let empty = sketch(&[], &pools);
        let dist = distance(&empty, &empty)?;
        assert_eq!(dist.distance, 1.0);
        assert_eq!(dist.compared, 0);

        let kmh = sketch(&[700, 300, 20], &pools);
        let dist = distance(&kmh, &kmh)?;
        assert_eq!(dist.distance, 0.0);
        assert_eq!(dist.jaccard, 1.0);
        assert_eq!(dist.matches, 3);
        Ok(())
    }

    #[test]
    fn test_distance_partial_overlap() -> Result<(), Box<dyn std::error::Error>> {
        let pools = Pools::default();
        let a = sketch(&[5, 3, 1], &pools);
        let b = sketch(&[5, 2, 1], &pools);
        let dist = distance(&a, &b)?;
        assert_eq!(dist.distance, 0.5);
        assert_eq!(jaccard_distance(&a, &b), 0.5);
        Ok(())
    }

    #[test]
    fn test_incomparable_sentinel() {
        let pools = Pools::default();
        let a = sketch(&[5, 3], &pools);
        let b = KmvSketch::new(SketchParams::new(10, 1000, 43), &pools).unwrap();
        assert!(distance(&a, &b).is_err());
        assert_eq!(jaccard_distance(&a, &b), INCOMPARABLE);
    }

    #[test]
    fn test_serializes_report() -> Result<(), Box<dyn std::error::Error>> {
        let report = SketchDistance {
            jaccard: 0.5,
            distance: 0.5,
            matches: 2,
            compared: 4,
        };
        let json = serde_json::to_string(&report)?;
        assert_eq!(
            json,
            r#"{"jaccard":0.5,"distance":0.5,"matches":2,"compared":4}"#
        );
        Ok(())
    }

    proptest! {
        #[test]
        fn distance_in_unit_range(left: Vec<u32>, right: Vec<u32>) {
            let pools = Pools::default();
            let params = SketchParams::new(16, 2000, 42);
            let mut a = KmvSketch::new(params, &pools).unwrap();
            let mut b = KmvSketch::new(params, &pools).unwrap();
            a.extend(left);
            b.extend(right);
            let d = jaccard_distance(&a, &b);
            prop_assert!((0.0..=1.0).contains(&d));
            prop_assert_eq!(d, jaccard_distance(&b, &a));
            if !a.is_empty() {
                prop_assert_eq!(jaccard_distance(&a, &a), 0.0);
            }
        }
    }
}
