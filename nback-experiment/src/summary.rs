//! Offline views of a finished session: behaviour per condition and a replay
//! that re-scores the log against the stimulus files.

use nback_core::{score, Condition, StimulusSet, TrialRecord};
use serde::Serialize;

use crate::config::ResponseKeys;
use crate::error::{SessionError, SessionResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionSummary {
    /// `None` for the pooled row.
    pub condition: Option<Condition>,
    pub trials: usize,
    pub responses: usize,
    pub correct: usize,
    pub response_rate_percentage: f64,
    pub accuracy_percentage: f64,
    /// Mean reaction time over correct responses.
    pub mean_reaction_time_ms: Option<f64>,
}

impl ConditionSummary {
    fn from_records<'a>(
        condition: Option<Condition>,
        records: impl Iterator<Item = &'a TrialRecord>,
    ) -> Self {
        let mut trials = 0;
        let mut responses = 0;
        let mut correct = 0;
        let mut rt_sum = 0u64;
        let mut rt_count = 0u64;
        for record in records {
            trials += 1;
            if record.responded() {
                responses += 1;
            }
            if record.correct {
                correct += 1;
                if let Some(rt) = record.reaction_time_ms {
                    rt_sum += rt;
                    rt_count += 1;
                }
            }
        }
        let percent = |n: usize| {
            if trials == 0 {
                0.0
            } else {
                n as f64 / trials as f64 * 100.0
            }
        };
        ConditionSummary {
            condition,
            trials,
            responses,
            correct,
            response_rate_percentage: percent(responses),
            accuracy_percentage: percent(correct),
            mean_reaction_time_ms: (rt_count > 0).then(|| rt_sum as f64 / rt_count as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BehaviorSummary {
    pub block_order: Vec<usize>,
    pub overall: ConditionSummary,
    pub by_condition: Vec<ConditionSummary>,
}

pub fn summarize(records: &[TrialRecord]) -> BehaviorSummary {
    let by_condition = Condition::ALL
        .into_iter()
        .map(|c| {
            ConditionSummary::from_records(
                Some(c),
                records.iter().filter(move |r| r.condition == c),
            )
        })
        .filter(|s| s.trials > 0)
        .collect();
    BehaviorSummary {
        block_order: block_order(records),
        overall: ConditionSummary::from_records(None, records.iter()),
        by_condition,
    }
}

/// Block ids in the order their trials appear in the log.
pub fn block_order(records: &[TrialRecord]) -> Vec<usize> {
    let mut order: Vec<usize> = Vec::new();
    for record in records {
        if order.last() != Some(&record.block) {
            order.push(record.block);
        }
    }
    order
}

/// A logged correctness flag that the scorer does not reproduce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub block: usize,
    pub trial: usize,
    pub logged: bool,
    pub rescored: bool,
}

/// Rebuilds every logged trial from the stimulus files and scores it again.
///
/// Structural disagreements (unknown block, wrong condition, trials out of
/// order, different letter) are errors; scoring disagreements are returned.
pub fn rescore(
    records: &[TrialRecord],
    stimuli: &StimulusSet,
    keys: &ResponseKeys,
) -> SessionResult<Vec<Mismatch>> {
    let mut mismatches = Vec::new();
    let mut previous: Option<(usize, usize)> = None;

    for record in records {
        let fail = |reason: String| SessionError::Replay {
            block: record.block,
            trial: record.trial,
            reason,
        };
        let block = stimuli
            .block(record.block)
            .ok_or_else(|| fail("block is not in the stimulus files".into()))?;
        if block.condition != record.condition {
            return Err(fail(format!(
                "logged as {} but the stimulus file says {}",
                record.condition, block.condition
            )));
        }
        let expected_trial = match previous {
            Some((b, t)) if b == record.block => t + 1,
            _ => 0,
        };
        if record.trial != expected_trial {
            return Err(fail(format!("expected trial {expected_trial} next")));
        }
        let letter = *block
            .letters
            .get(record.trial)
            .ok_or_else(|| fail("trial is past the end of the block".into()))?;
        if let Some(logged) = record.letter {
            if logged != letter {
                return Err(fail(format!("logged letter '{logged}', file has '{letter}'")));
            }
        }

        let response = keys.classify(record.button);
        let rescored = score(
            block.condition,
            record.trial,
            letter,
            &block.letters[..record.trial],
            response,
        );
        if rescored != record.correct {
            mismatches.push(Mismatch {
                block: record.block,
                trial: record.trial,
                logged: record.correct,
                rescored,
            });
        }
        previous = Some((record.block, record.trial));
    }
    Ok(mismatches)
}
