//! Correctness decision for a single n-back trial.
//!
//! Scoring is a pure function of the trial's position, its rule, the letters
//! before it and the response. It never looks at the clock or the devices.

use crate::condition::Condition;
use crate::trial::Response;

/// Decides whether `response` was correct for the letter at `trial_index`.
///
/// Only `preceding[trial_index - lag]` is consulted, so `preceding` may be
/// either the letters before the current one or the whole block. Trials
/// without enough history are correct only when answered with
/// [`Response::NonTarget`]; a missing response is always incorrect.
pub fn score(
    condition: Condition,
    trial_index: usize,
    current: char,
    preceding: &[char],
    response: Response,
) -> bool {
    match lag_back_letter(condition, trial_index, preceding) {
        None => response == Response::NonTarget,
        Some(earlier) => {
            let repeated = same_letter(earlier, current);
            (repeated && response == Response::Target)
                || (!repeated && response == Response::NonTarget)
        }
    }
}

/// True when the letter at `index` repeats the one `lag` positions earlier.
pub fn is_target(condition: Condition, index: usize, letters: &[char]) -> bool {
    match (letters.get(index), lag_back_letter(condition, index, letters)) {
        (Some(&current), Some(earlier)) => same_letter(earlier, current),
        _ => false,
    }
}

fn lag_back_letter(condition: Condition, trial_index: usize, letters: &[char]) -> Option<char> {
    trial_index
        .checked_sub(condition.lag())
        .and_then(|i| letters.get(i))
        .copied()
}

fn same_letter(a: char, b: char) -> bool {
    a.to_lowercase().eq(b.to_lowercase())
}
