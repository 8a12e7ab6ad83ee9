use rand::Rng;

/// Return a uniformly shuffled copy of `items`.
///
/// Single-pass Fisher–Yates: walking from the last slot down, each slot is
/// swapped with a uniformly chosen slot in `[0, i]`. The input is left as is.
pub fn shuffle<T: Clone, R: Rng + ?Sized>(items: &[T], rng: &mut R) -> Vec<T> {
    let mut out = items.to_vec();
    for i in (1..out.len()).rev() {
        let j = rng.gen_range(0..=i);
        out.swap(i, j);
    }
    out
}
