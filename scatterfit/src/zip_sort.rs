/////////////////////////////////////////////////////////////////////////////////////////////
//
// Sorts two parallel sequences together and applies permutations in place.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use std::cmp::Ordering;

/// Sorts `a` and `b` together, ordering pairs `(&a[i], &b[i])` with `compare`.
///
/// The sort is stable. Returns the permutation that was applied, such that
/// `sorted[k] = original[perm[k]]` for both slices.
///
/// # Panics
/// If the slices have different lengths.
///
/// # Examples
///
/// ```
/// use scatterfit::zip_sort::zip_sort;
///
/// let mut ids = vec![10, 11, 12];
/// let mut dists: Vec<f64> = vec![0.3, 0.1, 0.2];
///
/// let perm = zip_sort(&mut ids, &mut dists, |a, b| a.1.total_cmp(b.1));
///
/// assert_eq!(ids, vec![11, 12, 10]);
/// assert_eq!(dists, vec![0.1, 0.2, 0.3]);
/// assert_eq!(perm, vec![1, 2, 0]);
/// ```
pub fn zip_sort<A, B, F>(a: &mut [A], b: &mut [B], mut compare: F) -> Vec<usize>
where
    F: FnMut((&A, &B), (&A, &B)) -> Ordering,
{
    assert_eq!(a.len(), b.len(), "zip_sort requires slices of equal length");

    let mut perm: Vec<usize> = (0..a.len()).collect();
    perm.sort_by(|&i, &j| compare((&a[i], &b[i]), (&a[j], &b[j])));

    inplace_permute(a, &perm);
    inplace_permute(b, &perm);

    perm
}

/// Reorders `data` so that `data_new[k] = data_old[perm[k]]`, following each cycle of
/// the permutation once.
///
/// # Panics
/// If `perm` is not a permutation of `0..data.len()`.
pub fn inplace_permute<T>(data: &mut [T], perm: &[usize]) {
    assert_eq!(data.len(), perm.len(), "permutation length mismatch");

    let mut done = vec![false; data.len()];

    for start in 0..data.len() {
        if done[start] {
            continue;
        }

        let mut current = start;
        loop {
            done[current] = true;
            let next = perm[current];
            if next == start {
                break;
            }
            data.swap(current, next);
            current = next;
        }
    }
}

/// Returns `inv` with `inv[perm[k]] = k`.
pub fn invert_permutation(perm: &[usize]) -> Vec<usize> {
    let mut inv = vec![0; perm.len()];
    for (k, &p) in perm.iter().enumerate() {
        inv[p] = k;
    }
    inv
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    #[test]
    fn inplace_permute_matches_gather() {
        let mut rng = StdRng::seed_from_u64(8);
        for n in [0usize, 1, 2, 7, 100] {
            let mut perm: Vec<usize> = (0..n).collect();
            perm.shuffle(&mut rng);

            let original: Vec<u32> = (0..n).map(|_| rng.random_range(0..1000)).collect();
            let gathered: Vec<u32> = perm.iter().map(|&p| original[p]).collect();

            let mut data = original.clone();
            inplace_permute(&mut data, &perm);
            assert_eq!(data, gathered);
        }
    }

    #[test]
    fn sort_is_stable_on_ties() {
        let mut keys = vec![2, 1, 2, 1, 0];
        let mut tags = vec!['a', 'b', 'c', 'd', 'e'];

        zip_sort(&mut keys, &mut tags, |x, y| x.0.cmp(y.0));

        assert_eq!(keys, vec![0, 1, 1, 2, 2]);
        assert_eq!(tags, vec!['e', 'b', 'd', 'a', 'c']);
    }

    #[test]
    fn sorted_input_is_left_unchanged() {
        let mut keys: Vec<f64> = vec![-1.0, 0.0, 0.0, 0.5, 0.5, 0.5, 2.0];
        let mut tags: Vec<usize> = (0..keys.len()).collect();
        let keys_before = keys.clone();
        let tags_before = tags.clone();

        let perm = zip_sort(&mut keys, &mut tags, |x, y| x.0.total_cmp(y.0));

        assert_eq!(perm, (0..7).collect::<Vec<_>>());
        assert_eq!(keys, keys_before);
        assert_eq!(tags, tags_before);
    }

    #[test]
    fn inverse_permutation_restores_order() {
        let mut rng = StdRng::seed_from_u64(21);
        let original: Vec<f64> = (0..50).map(|_| rng.random_range(-1.0..1.0)).collect();
        let mut values = original.clone();
        let mut ids: Vec<usize> = (0..50).collect();

        let perm = zip_sort(&mut values, &mut ids, |x, y| x.0.total_cmp(y.0));
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(ids, perm);

        inplace_permute(&mut values, &invert_permutation(&perm));
        assert_eq!(values, original);
    }

    #[test]
    fn sort_by_second_sequence() {
        let mut ids = vec![3usize, 1, 2];
        let mut dists: Vec<f64> = vec![0.5, 0.5, 0.1];

        zip_sort(&mut ids, &mut dists, |x, y| x.1.total_cmp(y.1).then(x.0.cmp(y.0)));

        assert_eq!(ids, vec![2, 1, 3]);
        assert_eq!(dists, vec![0.1, 0.5, 0.5]);
    }
}
