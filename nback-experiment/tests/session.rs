//! Whole sessions driven on a virtual clock with scripted button presses.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use nback_core::{ButtonPress, Condition, Screen, StimulusSet};
use nback_experiment::summary::{rescore, summarize};
use nback_experiment::{
    plan_order, CancelFlag, NoTrigger, Presenter, ResponseDevice, SessionConfig, SessionError,
    SessionLog, SessionOutcome, SessionRunner, TriggerPort,
};
use nback_timing::{ManualTimer, Timer};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const SEED: u64 = 2014;

#[derive(Default)]
struct RecordingPresenter {
    screens: Vec<(Screen, Duration)>,
}

impl Presenter for RecordingPresenter {
    fn present(&mut self, screen: &Screen, duration: Duration) -> io::Result<()> {
        self.screens.push((screen.clone(), duration));
        Ok(())
    }
}

/// Plays back one planned press per trial, given as (code, time from onset).
struct ScriptedDevice {
    timer: ManualTimer,
    script: VecDeque<Option<(char, Duration)>>,
    in_iti: bool,
    elapsed_in_trial: Duration,
    keys_waited: usize,
    /// Cancels the session when this many trials have started.
    cancel_at_trial: Option<(usize, CancelFlag)>,
    trials_started: usize,
}

impl ScriptedDevice {
    fn new(timer: ManualTimer, script: Vec<Option<(char, u64)>>) -> Self {
        Self {
            timer,
            script: script
                .into_iter()
                .map(|p| p.map(|(c, ms)| (c, Duration::from_millis(ms))))
                .collect(),
            in_iti: false,
            elapsed_in_trial: Duration::ZERO,
            keys_waited: 0,
            cancel_at_trial: None,
            trials_started: 0,
        }
    }
}

impl ResponseDevice for ScriptedDevice {
    fn wait_for_response(
        &mut self,
        valid: &[char],
        window: Duration,
    ) -> io::Result<Option<ButtonPress>> {
        if !self.in_iti {
            self.trials_started += 1;
            self.elapsed_in_trial = Duration::ZERO;
            if let Some((at, flag)) = &self.cancel_at_trial {
                if self.trials_started == *at {
                    flag.cancel();
                }
            }
        }

        let planned = self
            .script
            .front()
            .copied()
            .flatten()
            .filter(|(code, _)| valid.contains(code));
        let press = planned.and_then(|(code, at)| {
            let latency = at.checked_sub(self.elapsed_in_trial)?;
            (latency < window).then_some(ButtonPress { code, latency })
        });

        match press {
            Some(press) => {
                self.timer.advance(press.latency);
                self.script.pop_front();
                self.in_iti = false;
            }
            None => {
                self.timer.advance(window);
                self.elapsed_in_trial += window;
                if self.in_iti {
                    self.script.pop_front();
                }
                self.in_iti = !self.in_iti;
            }
        }
        Ok(press)
    }

    fn wait_for_key(&mut self) -> io::Result<()> {
        self.keys_waited += 1;
        Ok(())
    }
}

/// Reports every press just after the window it was asked to wait for.
struct LateDevice {
    timer: ManualTimer,
}

impl ResponseDevice for LateDevice {
    fn wait_for_response(
        &mut self,
        valid: &[char],
        window: Duration,
    ) -> io::Result<Option<ButtonPress>> {
        self.timer.advance(window);
        Ok(Some(ButtonPress {
            code: valid[1],
            latency: window + Duration::from_millis(1),
        }))
    }

    fn wait_for_key(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct FailingTrigger;

impl TriggerPort for FailingTrigger {
    fn send_trigger(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::NotFound, "no such serial port"))
    }
}

fn config() -> SessionConfig {
    SessionConfig {
        show_instructions: false,
        settle_delay_ms: 2500,
        ..Default::default()
    }
}

fn stimuli() -> StimulusSet {
    StimulusSet::from_groups(
        vec!["bTtf".chars().collect()],
        vec!["TbtX".chars().collect()],
    )
}

/// Presses for both blocks, arranged in the order the seeded runner will use.
fn script_for_seed() -> (Vec<usize>, Vec<Option<(char, u64)>>) {
    let order = plan_order(2, &mut ChaCha8Rng::seed_from_u64(SEED));
    let one_back = vec![
        Some(('2', 300)),
        Some(('2', 350)),
        Some(('3', 420)),
        Some(('2', 310)),
    ];
    // the last two land during the fixation cross
    let two_back = vec![Some(('2', 300)), Some(('2', 450)), Some(('3', 800)), Some(('2', 1200))];
    let script = order
        .iter()
        .flat_map(|&id| if id == 0 { one_back.clone() } else { two_back.clone() })
        .collect();
    (order, script)
}

type TestRunner<G> =
    SessionRunner<ManualTimer, ChaCha8Rng, RecordingPresenter, ScriptedDevice, G>;

fn runner<G: TriggerPort>(
    config: SessionConfig,
    script: Vec<Option<(char, u64)>>,
    trigger: G,
    cancel: CancelFlag,
) -> TestRunner<G> {
    let timer = ManualTimer::new();
    let device = ScriptedDevice::new(timer.clone(), script);
    SessionRunner::new(
        config,
        timer,
        ChaCha8Rng::seed_from_u64(SEED),
        RecordingPresenter::default(),
        device,
        trigger,
        cancel,
    )
}

#[test]
fn full_session_scores_and_times_every_trial() {
    let (order, script) = script_for_seed();
    let mut runner = runner(config(), script, NoTrigger, CancelFlag::new());
    let mut log = SessionLog::default();

    let outcome = runner.run(&stimuli(), &mut log).unwrap();
    assert_eq!(outcome, SessionOutcome::Completed { trials: 8 });
    assert_eq!(runner.block_order(), order.as_slice());
    assert!(runner.phase.is_finished());

    let records = log.records();
    assert!(records.iter().all(|r| r.correct), "{records:#?}");

    let first_block: Vec<usize> = records[..4].iter().map(|r| r.block).collect();
    assert_eq!(first_block, vec![order[0]; 4]);

    let two_back: Vec<_> = records
        .iter()
        .filter(|r| r.condition == Condition::TwoBack)
        .collect();
    let rts: Vec<Option<u64>> = two_back.iter().map(|r| r.reaction_time_ms).collect();
    assert_eq!(rts, vec![Some(300), Some(450), Some(800), Some(1200)]);
    let buttons: Vec<Option<char>> = two_back.iter().map(|r| r.button).collect();
    assert_eq!(buttons, vec![Some('2'), Some('2'), Some('3'), Some('2')]);

    // settle delay, then the cue, then one trial every stimulus + ITI
    assert!((records[0].block_start_s - 2.5).abs() < 1e-9);
    for (i, record) in records[..4].iter().enumerate() {
        assert_eq!(record.trial, i);
        assert!((record.trial_start_s - (4.5 + 3.0 * i as f64)).abs() < 1e-9);
    }
    let gap = records[4].block_start_s - 16.5;
    assert!((8.0..=10.0).contains(&gap), "rest between blocks was {gap}s");
    assert!((records[4].trial_start_s - records[4].block_start_s - 2.0).abs() < 1e-9);
}

#[test]
fn presents_countdown_cues_letters_and_one_rest() {
    let (order, script) = script_for_seed();
    let mut runner = runner(config(), script, NoTrigger, CancelFlag::new());
    runner.run(&stimuli(), &mut SessionLog::default()).unwrap();
    let screens = &runner.presenter.screens;

    let countdown: Vec<(u64, Duration)> = screens
        .iter()
        .filter_map(|(s, d)| match s {
            Screen::Countdown { seconds_left } => Some((*seconds_left, *d)),
            _ => None,
        })
        .collect();
    assert_eq!(
        countdown,
        vec![
            (3, Duration::from_millis(500)),
            (2, Duration::from_secs(1)),
            (1, Duration::from_secs(1)),
        ]
    );

    let cues: Vec<&Screen> = screens
        .iter()
        .map(|(s, _)| s)
        .filter(|s| matches!(s, Screen::Cue(_)))
        .collect();
    let first_condition = stimuli().block(order[0]).unwrap().condition;
    assert_eq!(cues.len(), 2);
    assert_eq!(cues[0], &Screen::Cue(first_condition));

    assert_eq!(screens.iter().filter(|(s, _)| s.is_letter()).count(), 8);
    assert_eq!(screens.iter().filter(|(s, _)| *s == Screen::Fixation).count(), 8);
    assert_eq!(screens.iter().filter(|(s, _)| *s == Screen::Rest).count(), 1);
    assert_eq!(screens.last().map(|(s, _)| s), Some(&Screen::Goodbye));
}

#[test]
fn silence_and_foreign_keys_are_scored_as_no_response() {
    let mut script = vec![None; 8];
    script[0] = Some(('x', 200));
    let config = SessionConfig {
        ibi_range_ms: (1000, 1000),
        ..config()
    };
    let mut runner = runner(config, script, NoTrigger, CancelFlag::new());
    let mut log = SessionLog::default();
    runner.run(&stimuli(), &mut log).unwrap();

    for record in log.records() {
        assert_eq!(record.button, None);
        assert_eq!(record.reaction_time_ms, None);
        assert!(!record.correct);
    }
    // each trial still takes its full budget
    let last = &log.records()[7];
    assert!((last.trial_start_s - last.block_start_s - (2.0 + 9.0)).abs() < 1e-9);
}

#[test]
fn abort_keeps_completed_trials_and_discards_the_interrupted_one() {
    let (_, script) = script_for_seed();
    let cancel = CancelFlag::new();
    let mut runner = runner(config(), script, NoTrigger, cancel.clone());
    runner.device.cancel_at_trial = Some((3, cancel));
    let mut log = SessionLog::default();

    let outcome = runner.run(&stimuli(), &mut log).unwrap();
    assert_eq!(outcome, SessionOutcome::Aborted { trials: 2 });
    assert_eq!(log.len(), 2);
    assert!(!runner.phase.is_finished());

    let path = std::env::temp_dir().join(format!("nback-abort-{}.csv", std::process::id()));
    log.flush(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(text.lines().count(), 3);
}

#[test]
fn trigger_failure_stops_before_any_trial() {
    let (_, script) = script_for_seed();
    let mut runner = runner(config(), script, FailingTrigger, CancelFlag::new());
    let mut log = SessionLog::default();

    let err = runner.run(&stimuli(), &mut log).unwrap_err();
    assert!(matches!(err, SessionError::Trigger(_)));
    assert!(log.is_empty());
    assert!(!runner.presenter.screens.iter().any(|(s, _)| s.is_letter()));
}

#[test]
fn instructions_wait_for_a_key_per_page() {
    let (_, script) = script_for_seed();
    let config = SessionConfig {
        show_instructions: true,
        ..config()
    };
    let mut runner = runner(config, script, NoTrigger, CancelFlag::new());
    runner.run(&stimuli(), &mut SessionLog::default()).unwrap();

    assert_eq!(runner.device.keys_waited, 3);
    let pages: Vec<(usize, usize)> = runner
        .presenter
        .screens
        .iter()
        .filter_map(|(s, _)| match s {
            Screen::Instructions { page, total, .. } => Some((*page, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(pages, vec![(1, 3), (2, 3), (3, 3)]);
}

#[test]
fn abort_during_instructions_never_triggers() {
    let cancel = CancelFlag::new();
    cancel.cancel();
    let config = SessionConfig {
        show_instructions: true,
        ..config()
    };
    let mut runner = runner(config, Vec::new(), FailingTrigger, cancel);
    let outcome = runner.run(&stimuli(), &mut SessionLog::default()).unwrap();
    assert_eq!(outcome, SessionOutcome::Aborted { trials: 0 });
    assert_eq!(runner.device.keys_waited, 1);
    assert_eq!(runner.timer.now(), 0);
}

#[test]
fn empty_stimulus_set_is_rejected() {
    let mut runner = runner(config(), Vec::new(), NoTrigger, CancelFlag::new());
    let err = runner
        .run(&StimulusSet::default(), &mut SessionLog::default())
        .unwrap_err();
    assert!(matches!(err, SessionError::EmptyStimulusSet));
}

#[test]
fn flushed_log_replays_against_the_stimuli() {
    let (order, script) = script_for_seed();
    let mut runner = runner(config(), script, NoTrigger, CancelFlag::new());
    let mut log = SessionLog::default();
    runner.run(&stimuli(), &mut log).unwrap();

    let mut bytes = Vec::new();
    log.write_to(&mut bytes).unwrap();
    let parsed = SessionLog::read_from(bytes.as_slice()).unwrap();
    assert_eq!(parsed.len(), 8);

    let keys = runner.config.keys;
    assert!(rescore(parsed.records(), &stimuli(), &keys).unwrap().is_empty());

    let summary = summarize(parsed.records());
    assert_eq!(summary.block_order, order);
    assert_eq!(summary.overall.accuracy_percentage, 100.0);
}

#[test]
fn presses_after_the_trial_budget_are_no_response() {
    // one press exactly at stimulus + ITI, and one just past it
    let mut script = vec![None; 8];
    script[0] = Some(('3', 3000));
    script[1] = Some(('3', 3001));
    let mut runner = runner(config(), script, NoTrigger, CancelFlag::new());
    let mut log = SessionLog::default();
    runner.run(&stimuli(), &mut log).unwrap();
    assert!(log.records().iter().all(|r| r.button.is_none()));

    let timer = ManualTimer::new();
    let mut late = SessionRunner::new(
        config(),
        timer.clone(),
        ChaCha8Rng::seed_from_u64(SEED),
        RecordingPresenter::default(),
        LateDevice { timer },
        NoTrigger,
        CancelFlag::new(),
    );
    let mut log = SessionLog::default();
    let outcome = late.run(&stimuli(), &mut log).unwrap();
    assert_eq!(outcome, SessionOutcome::Completed { trials: 8 });
    for record in log.records() {
        assert_eq!(record.button, None);
        assert_eq!(record.reaction_time_ms, None);
    }
    let first = &log.records()[0];
    let second = &log.records()[1];
    assert!((second.trial_start_s - first.trial_start_s - 3.0).abs() < 1e-9);
}

#[test]
fn invalid_config_is_rejected_before_the_trigger() {
    let config = SessionConfig {
        ibi_range_ms: (10_000, 8_000),
        ..config()
    };
    let mut runner = runner(config, Vec::new(), FailingTrigger, CancelFlag::new());
    let err = runner.run(&stimuli(), &mut SessionLog::default()).unwrap_err();
    assert!(matches!(err, SessionError::Config(_)));
    assert!(runner.presenter.screens.is_empty());
}
