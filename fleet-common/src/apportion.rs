//! # Apportion
//!
//! Largest-remainder (Hamilton) apportionment of an integer number of seats
//! between a vector of weights.
use std::cmp::Ordering;

use rand::Rng;

use crate::error::InvalidArgument;

/// Distribute `seats` between `weights` so that the counts sum to exactly `seats`.
///
/// Every index first receives the integer part of its quota. The seats left over are
/// handed out one each to the indices with the largest fractional remainders. Exact
/// ties are broken by a value drawn from `rng` for every index on every call, so
/// repeated calls spread the extra seat fairly instead of favouring low indices.
pub fn apportion<R: Rng + ?Sized>(
    weights: &[f64],
    seats: usize,
    rng: &mut R,
) -> Result<Vec<usize>, InvalidArgument> {
    let quota = normalize(weights)?;

    let mut counts = Vec::with_capacity(quota.len());
    let mut remainders = Vec::with_capacity(quota.len());
    for (index, share) in quota.iter().enumerate() {
        let exact = share * seats as f64;
        let full = exact.floor();
        counts.push(full as usize);
        remainders.push((index, exact - full, rng.gen::<f64>()));
    }

    let allocated: usize = counts.iter().sum();
    let leftover = seats.saturating_sub(allocated);

    remainders.sort_by(|a, b| descending(a.1, b.1).then(descending(a.2, b.2)));
    for (index, _, _) in remainders.into_iter().take(leftover) {
        counts[index] += 1;
    }

    debug_assert_eq!(counts.iter().sum::<usize>(), seats);
    Ok(counts)
}

fn descending(a: f64, b: f64) -> Ordering {
    b.total_cmp(&a)
}

/// Scale weights to unit sum.
fn normalize(weights: &[f64]) -> Result<Vec<f64>, InvalidArgument> {
    if weights.is_empty() {
        return Err(InvalidArgument::EmptyWeights);
    }

    if let Some((index, value)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| !w.is_finite() || **w < 0.0)
    {
        return Err(InvalidArgument::InvalidWeight {
            index,
            value: *value,
        });
    }

    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(InvalidArgument::ZeroWeightSum);
    }

    Ok(weights.iter().map(|w| w / total).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sorted(mut counts: Vec<usize>) -> Vec<usize> {
        counts.sort();
        counts
    }

    #[test]
    fn test_apportion_is_exact() {
        let weight_sets: Vec<Vec<f64>> = vec![
            vec![1.0],
            vec![0.5, 0.5],
            vec![0.1, 0.2, 0.7],
            vec![3.0, 0.0, 1.0],
            vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
            vec![0.333, 0.333, 0.334],
            vec![1e-9, 1.0],
        ];

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            for weights in &weight_sets {
                for seats in 0..60 {
                    let counts = apportion(weights, seats, &mut rng).unwrap();
                    assert_eq!(counts.len(), weights.len());
                    assert_eq!(
                        counts.iter().sum::<usize>(),
                        seats,
                        "weights {weights:?} seats {seats}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_apportion_equal_weights_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let counts = apportion(&[1.0, 1.0, 1.0, 1.0, 1.0], 18, &mut rng).unwrap();
            assert_eq!(sorted(counts), vec![3, 3, 4, 4, 4]);
        }
    }

    #[test]
    fn test_apportion_zero_seats() {
        let mut rng = StdRng::seed_from_u64(1);
        let counts = apportion(&[0.2, 0.8], 0, &mut rng).unwrap();
        assert_eq!(counts, vec![0, 0]);
    }

    #[test]
    fn test_apportion_single_weight_takes_everything() {
        let mut rng = StdRng::seed_from_u64(1);
        let counts = apportion(&[42.0], 13, &mut rng).unwrap();
        assert_eq!(counts, vec![13]);
    }

    #[test]
    fn test_apportion_zero_weight_gets_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        let counts = apportion(&[0.0, 1.0], 9, &mut rng).unwrap();
        assert_eq!(counts, vec![0, 9]);
    }

    #[test]
    fn test_apportion_largest_remainder_wins() {
        // quotas are 1.4, 2.1 and 3.5
        let mut rng = StdRng::seed_from_u64(3);
        let counts = apportion(&[0.2, 0.3, 0.5], 7, &mut rng).unwrap();
        assert_eq!(counts, vec![1, 2, 4]);
    }

    #[test]
    fn test_apportion_ties_use_injected_rng() {
        // StepRng yields strictly increasing tiebreakers, so later indices win ties.
        let mut rng = StepRng::new(0, 1 << 11);
        let counts = apportion(&[1.0, 1.0, 1.0], 2, &mut rng).unwrap();
        assert_eq!(counts, vec![0, 1, 1]);

        let mut rng = StepRng::new(0, 1 << 11);
        let counts = apportion(&[1.0, 1.0, 1.0, 1.0], 1, &mut rng).unwrap();
        assert_eq!(counts, vec![0, 0, 0, 1]);
    }

    #[test]
    fn test_apportion_ties_are_spread_over_calls() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut wins = [0usize; 2];
        for _ in 0..400 {
            let counts = apportion(&[1.0, 1.0], 1, &mut rng).unwrap();
            wins[0] += counts[0];
            wins[1] += counts[1];
        }
        assert_eq!(wins[0] + wins[1], 400);
        assert!(wins[0] > 100, "first index won only {} ties", wins[0]);
        assert!(wins[1] > 100, "second index won only {} ties", wins[1]);
    }

    #[test]
    fn test_apportion_rejects_bad_weights() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            apportion(&[], 3, &mut rng),
            Err(InvalidArgument::EmptyWeights)
        );
        assert_eq!(
            apportion(&[0.0, 0.0], 3, &mut rng),
            Err(InvalidArgument::ZeroWeightSum)
        );
        assert!(matches!(
            apportion(&[1.0, -0.5], 3, &mut rng),
            Err(InvalidArgument::InvalidWeight { index: 1, .. })
        ));
        assert!(matches!(
            apportion(&[f64::NAN], 3, &mut rng),
            Err(InvalidArgument::InvalidWeight { index: 0, .. })
        ));
    }
}
