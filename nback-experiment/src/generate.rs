//! Builds letter blocks with a fixed number of planted targets.

use nback_core::{is_target, Condition};
use rand::seq::{index, SliceRandom};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub block_len: usize,
    pub targets_per_block: usize,
    pub blocks_per_condition: usize,
    /// Letters to draw from; drawn without repetition until exhausted.
    pub alphabet: String,
    pub uppercase_probability: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            block_len: 25,
            targets_per_block: 8,
            blocks_per_condition: 4,
            alphabet: "bcdfghklmnpqrstvwxyz".to_string(),
            uppercase_probability: 0.5,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> SessionResult<()> {
        if self.alphabet.is_empty() || !self.alphabet.chars().all(char::is_alphabetic) {
            return Err(SessionError::Generator(format!(
                "alphabet '{}' must be a non-empty run of letters",
                self.alphabet
            )));
        }
        if !(0.0..=1.0).contains(&self.uppercase_probability) {
            return Err(SessionError::Generator(format!(
                "uppercase probability {} is outside [0, 1]",
                self.uppercase_probability
            )));
        }
        if self.block_len == 0 {
            return Err(SessionError::Generator("blocks need at least one letter".into()));
        }
        for condition in Condition::ALL {
            let Some(room) = self.block_len.checked_sub(condition.lag()) else {
                return Err(SessionError::Generator(format!(
                    "a {}-letter block is shorter than the {condition} lag",
                    self.block_len
                )));
            };
            if self.targets_per_block > room {
                return Err(SessionError::Generator(format!(
                    "{} targets do not fit in a {}-letter {condition} block",
                    self.targets_per_block, self.block_len
                )));
            }
        }
        Ok(())
    }

    fn pool(&self) -> Vec<char> {
        self.alphabet.chars().flat_map(char::to_lowercase).collect()
    }
}

/// One block for `condition`. Targets are planted at distinct positions in
/// ascending order so that later copies never undo earlier ones.
pub fn generate_block<R: Rng + ?Sized>(
    config: &GeneratorConfig,
    condition: Condition,
    rng: &mut R,
) -> SessionResult<Vec<char>> {
    config.validate()?;
    let lag = condition.lag();
    let pool = config.pool();

    let mut letters = Vec::with_capacity(config.block_len);
    while letters.len() < config.block_len {
        let mut round = pool.clone();
        round.shuffle(rng);
        let take = (config.block_len - letters.len()).min(round.len());
        letters.extend_from_slice(&round[..take]);
    }

    let mut positions =
        index::sample(rng, config.block_len - lag, config.targets_per_block).into_vec();
    positions.sort_unstable();
    for i in positions {
        letters[i + lag] = letters[i];
    }

    let p = config.uppercase_probability;
    Ok(letters
        .into_iter()
        .map(|c| {
            if rng.random_bool(p) {
                c.to_ascii_uppercase()
            } else {
                c
            }
        })
        .collect())
}

pub fn generate_condition<R: Rng + ?Sized>(
    config: &GeneratorConfig,
    condition: Condition,
    rng: &mut R,
) -> SessionResult<Vec<Vec<char>>> {
    (0..config.blocks_per_condition)
        .map(|_| generate_block(config, condition, rng))
        .collect()
}

pub fn count_targets(condition: Condition, letters: &[char]) -> usize {
    (0..letters.len())
        .filter(|&i| is_target(condition, i, letters))
        .count()
}
