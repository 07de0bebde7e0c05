use std::time::Duration;

use nback_core::Block;
use rand::seq::SliceRandom;
use rand::Rng;

/// Random presentation order: every block index exactly once.
pub fn plan_order<R: Rng + ?Sized>(block_count: usize, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..block_count).collect();
    order.shuffle(rng);
    order
}

/// Trials of a block as `(trial_index, letter)`, in file order.
pub fn block_trials(block: &Block) -> impl Iterator<Item = (usize, char)> + '_ {
    block.letters.iter().copied().enumerate()
}

/// Rest period between blocks, uniform over the inclusive range.
pub fn sample_ibi<R: Rng + ?Sized>(range_ms: (u64, u64), rng: &mut R) -> Duration {
    let (min, max) = range_ms;
    Duration::from_millis(rng.random_range(min..=max))
}
