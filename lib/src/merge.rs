use rayon::prelude::*;

use crate::errors::KmhResult;
use crate::pool::Pools;
use crate::sketch_schemes::kmv::KmvSketch;

/// Union of two compatible sketches as a new sketch; neither input changes.
///
/// Both digest lists are descending, so the smallest values sit at the tails.
/// The output is filled smallest-first by walking both tails toward the
/// heads, collapsing digests present in both, and then reversed.
pub fn merge(a: &KmvSketch, b: &KmvSketch, pools: &Pools) -> KmhResult<KmvSketch> {
    let params = a.params();
    params.ensure_compatible(&b.params())?;

    let mut result = KmvSketch::new(params, pools)?;
    let capacity = params.capacity as usize;
    let (mut lhs, mut rhs) = (a.digests(), b.digests());
    let (out, count) = result.raw_parts_mut();

    while *count < capacity {
        let next = match (lhs.split_last(), rhs.split_last()) {
            (None, None) => break,
            (Some((&x, rest)), None) => {
                lhs = rest;
                x
            }
            (None, Some((&y, rest))) => {
                rhs = rest;
                y
            }
            (Some((&x, lrest)), Some((&y, rrest))) => {
                if x < y {
                    lhs = lrest;
                    x
                } else if y < x {
                    rhs = rrest;
                    y
                } else {
                    lhs = lrest;
                    rhs = rrest;
                    x
                }
            }
        };
        out[*count] = next;
        *count += 1;
    }
    out[..*count].reverse();

    Ok(result)
}

/// Merge any number of sketches, reducing pairs in parallel. Returns `None`
/// for an empty input.
pub fn merge_many(sketches: &[KmvSketch], pools: &Pools) -> Option<KmhResult<KmvSketch>> {
    match sketches {
        [] => None,
        [only] => Some(only.try_clone(pools)),
        _ => sketches
            .par_chunks(2)
            .map(|pair| match pair {
                [a, b] => merge(a, b, pools),
                odd => odd[0].try_clone(pools),
            })
            .try_reduce_with(|a, b| merge(&a, &b, pools)),
    }
}
