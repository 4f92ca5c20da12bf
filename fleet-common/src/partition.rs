//! # Partition
//!
//! Split a collection into a transfer group and a retain group according to a ratio.
//! The size of the transfer group comes from [`apportion`], which makes it exact;
//! the members of the transfer group are then sampled uniformly without replacement.
use std::collections::HashSet;

use rand::seq::index;
use rand::Rng;

use crate::apportion::apportion;
use crate::error::InvalidArgument;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition<T> {
    pub transfer: Vec<T>,
    pub retain: Vec<T>,
}

/// The number of items out of `len` that a `ratio` entitles to transfer.
pub fn transfer_count<R: Rng + ?Sized>(
    len: usize,
    ratio: f64,
    rng: &mut R,
) -> Result<usize, InvalidArgument> {
    if !ratio.is_finite() || !(0.0..=1.0).contains(&ratio) {
        return Err(InvalidArgument::InvalidRatio(ratio));
    }

    let counts = apportion(&[ratio, 1.0 - ratio], len, rng)?;
    Ok(counts[0])
}

/// Partition `items` so that `ratio` of them end up in the transfer group.
///
/// Both groups keep the relative order of `items`.
pub fn partition<T: Clone, R: Rng + ?Sized>(
    items: &[T],
    ratio: f64,
    rng: &mut R,
) -> Result<Partition<T>, InvalidArgument> {
    let count = transfer_count(items.len(), ratio, rng)?;
    let chosen: HashSet<usize> = index::sample(rng, items.len(), count).into_iter().collect();

    let mut transfer = Vec::with_capacity(count);
    let mut retain = Vec::with_capacity(items.len() - count);
    for (position, item) in items.iter().enumerate() {
        if chosen.contains(&position) {
            transfer.push(item.clone());
        } else {
            retain.push(item.clone());
        }
    }

    Ok(Partition { transfer, retain })
}
