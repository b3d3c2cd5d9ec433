//! Lottery draw
//!
//! Proportional-share selection: every runnable entry holds as many
//! tickets as its weight, one ticket is drawn uniformly, and its holder
//! wins. Totals may exceed 2^31 when many processes hold large weights. The sum is recomputed on every draw since weights and the
//! runnable set change between decisions.

use crate::rand::Lcg;

/// Pick an index with probability `weight[i] / sum(weights)`.
///
/// Entries with weight 0 (not runnable) never win. Returns `None` when the
/// total weight is zero; no random value is consumed in that case.
pub fn draw<I>(weights: I, rng: &mut Lcg) -> Option<usize>
where
    I: IntoIterator<Item = u32>,
    I::IntoIter: Clone,
{
    let weights = weights.into_iter();
    let total: u64 = weights.clone().map(u64::from).sum();
    if total == 0 {
        return None;
    }

    let winner = rng.below(total);
    let mut counter = 0u64;
    for (index, weight) in weights.enumerate() {
        if weight == 0 {
            continue;
        }
        counter += u64::from(weight);
        if counter > winner {
            return Some(index);
        }
    }
    None
}
