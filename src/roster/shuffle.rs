//! Uniform random permutation of extracted records.

use rand::Rng;

/// Returns `items` in a uniformly random order.
///
/// Backward Fisher-Yates: for `i` from the last index down to 1, swap `i` with a
/// uniformly drawn `j` in `[0, i]`. The random source is supplied by the caller.
pub fn shuffle<T, R: Rng + ?Sized>(mut items: Vec<T>, rng: &mut R) -> Vec<T> {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
    items
}
