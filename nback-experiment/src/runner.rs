use std::time::Duration;

use nback_core::{score, Block, Screen, SessionPhase, StimulusSet, TrialRecord};
use nback_timing::Timer;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::devices::{CancelFlag, Presenter, ResponseDevice, TriggerPort};
use crate::error::{SessionError, SessionResult};
use crate::log::SessionLog;
use crate::sequencer::{block_trials, plan_order, sample_ibi};

const INSTRUCTIONS: [&str; 3] = [
    "Letters will appear one at a time in the middle of the screen. For each \
     letter, decide whether it matches the letter shown 1 or 2 letters earlier. \
     Before every block you will be told which rule applies.\n\n\
     In 1-back blocks a target is a letter that repeats the one right before it. \
     In the stream 'b T t' the first two letters are not targets and the third \
     is, since it repeats the letter just before it. Upper and lower case count \
     as the same letter.\n\nPress any key to continue.",
    "In 2-back blocks a target repeats the letter from two positions back. In the \
     stream 'T b t' the third letter is a target because it matches the first.\n\n\
     Press the left button when the letter is not a target and the right button \
     when it is. Answer as quickly as you can, and answer every letter, \
     including the first ones of a block.\n\nPress any key to continue.",
    "A fixation cross appears between letters. There is a short rest between \
     blocks; please keep still during it.\n\nPress any key to start.",
];

/// Slice used when waiting on long pauses so an abort is noticed quickly.
const PAUSE_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed { trials: usize },
    Aborted { trials: usize },
}

/// Drives one live session: instructions, trigger, settle delay, then every
/// block in a random order.
pub struct SessionRunner<T, R, P, D, G>
where
    T: Timer,
    R: Rng,
    P: Presenter,
    D: ResponseDevice,
    G: TriggerPort,
{
    pub config: SessionConfig,
    pub phase: SessionPhase,
    pub timer: T,
    pub rng: R,
    pub presenter: P,
    pub device: D,
    pub trigger: G,
    cancel: CancelFlag,
    /// Timer reading at the moment the trigger was sent.
    zero: u64,
    order: Vec<usize>,
}

impl<T, R, P, D, G> SessionRunner<T, R, P, D, G>
where
    T: Timer,
    R: Rng,
    P: Presenter,
    D: ResponseDevice,
    G: TriggerPort,
{
    pub fn new(
        config: SessionConfig,
        timer: T,
        rng: R,
        presenter: P,
        device: D,
        trigger: G,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            config,
            phase: SessionPhase::default(),
            timer,
            rng,
            presenter,
            device,
            trigger,
            cancel,
            zero: 0,
            order: Vec::new(),
        }
    }

    /// Block ids in the order they were (or are being) presented.
    pub fn block_order(&self) -> &[usize] {
        &self.order
    }

    /// Runs the session, appending every scored trial to `log`. The caller
    /// owns the log and should flush it whatever this returns. An invalid
    /// config is rejected before anything is shown.
    pub fn run(
        &mut self,
        stimuli: &StimulusSet,
        log: &mut SessionLog,
    ) -> SessionResult<SessionOutcome> {
        self.config.validate()?;
        if stimuli.is_empty() {
            return Err(SessionError::EmptyStimulusSet);
        }
        let logged_before = log.len();
        let aborted = |log: &SessionLog| SessionOutcome::Aborted {
            trials: log.len() - logged_before,
        };

        if self.config.show_instructions {
            self.show_instructions()?;
            if self.cancel.is_cancelled() {
                return Ok(aborted(log));
            }
        }

        self.advance_phase();
        self.trigger
            .send_trigger()
            .map_err(SessionError::Trigger)?;
        self.zero = self.timer.now();
        info!(payload = %self.config.trigger.payload, "scanner trigger sent");

        self.advance_phase();
        if !self.settle()? {
            return Ok(aborted(log));
        }

        self.advance_phase();
        self.order = plan_order(stimuli.len(), &mut self.rng);
        info!(order = ?self.order, "block order planned");

        let order = self.order.clone();
        for (n, &id) in order.iter().enumerate() {
            let Some(block) = stimuli.block(id) else {
                continue;
            };
            if self.cancel.is_cancelled() || !self.run_block(block, log)? {
                return Ok(aborted(log));
            }
            if n + 1 < order.len() && !self.rest()? {
                return Ok(aborted(log));
            }
        }

        self.advance_phase();
        self.show(&Screen::Goodbye, Duration::ZERO)?;
        let trials = log.len() - logged_before;
        info!(trials, "session completed");
        Ok(SessionOutcome::Completed { trials })
    }

    fn advance_phase(&mut self) {
        if let Some(next) = self.phase.next() {
            debug!(from = ?self.phase, to = ?next, "phase change");
            self.phase = next;
        }
    }

    fn show_instructions(&mut self) -> SessionResult<()> {
        let total = INSTRUCTIONS.len();
        for (i, text) in INSTRUCTIONS.into_iter().enumerate() {
            let screen = Screen::Instructions {
                page: i + 1,
                total,
                text,
            };
            self.show(&screen, Duration::ZERO)?;
            self.device.wait_for_key().map_err(SessionError::Input)?;
            if self.cancel.is_cancelled() {
                break;
            }
        }
        Ok(())
    }

    /// Counts down the settle delay once per second. Returns false on abort.
    fn settle(&mut self) -> SessionResult<bool> {
        let total = self.config.settle_delay_ms;
        let mut shown = 0;
        while shown < total {
            let remaining = total - shown;
            let seconds_left = remaining.div_ceil(1000);
            // the first step absorbs any fraction of a second
            let step = remaining - (seconds_left - 1) * 1000;
            self.show(
                &Screen::Countdown { seconds_left },
                Duration::from_millis(step),
            )?;
            if !self.pause(Duration::from_millis(step)) {
                return Ok(false);
            }
            shown += step;
        }
        Ok(true)
    }

    fn rest(&mut self) -> SessionResult<bool> {
        let ibi = sample_ibi(self.config.ibi_range_ms, &mut self.rng);
        debug!(ibi_ms = ibi.as_millis() as u64, "rest between blocks");
        self.show(&Screen::Rest, ibi)?;
        Ok(self.pause(ibi))
    }

    /// Sleeps for `d` in short slices; returns false if an abort arrived.
    fn pause(&mut self, d: Duration) -> bool {
        let deadline = self.timer.now() + d.as_nanos() as u64;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let now = self.timer.now();
            if now >= deadline {
                return true;
            }
            let left = Duration::from_nanos(deadline - now);
            self.timer.sleep(left.min(PAUSE_SLICE));
        }
    }

    fn run_block(&mut self, block: &Block, log: &mut SessionLog) -> SessionResult<bool> {
        let block_start = self.since_zero();
        info!(
            block = block.id,
            condition = %block.condition,
            trials = block.len(),
            "block started"
        );

        self.show(&Screen::Cue(block.condition), self.config.cue())?;
        if !self.pause(self.config.cue()) {
            return Ok(false);
        }

        for (index, letter) in block_trials(block) {
            if self.cancel.is_cancelled() {
                return Ok(false);
            }
            match self.run_trial(block, index, letter, block_start)? {
                Some(record) => log.append(record),
                None => {
                    warn!(block = block.id, trial = index, "trial interrupted by abort");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Presents one letter and collects at most one response. Returns `None`
    /// if the session was aborted while waiting.
    fn run_trial(
        &mut self,
        block: &Block,
        index: usize,
        letter: char,
        block_start: f64,
    ) -> SessionResult<Option<TrialRecord>> {
        let onset = self.timer.now();
        let trial_start = self.since_zero();
        let stimulus_end = onset + self.config.stimulus().as_nanos() as u64;
        let trial_end = onset + self.config.trial_budget().as_nanos() as u64;

        self.show(&Screen::Letter(letter), self.config.stimulus())?;
        let mut press = self.collect_response(onset, stimulus_end)?;
        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        self.timer.sleep_until(stimulus_end);

        // a missed letter can still be answered while the cross is up
        self.show(&Screen::Fixation, self.config.iti())?;
        if press.is_none() {
            press = self.collect_response(onset, trial_end)?;
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
        }
        self.timer.sleep_until(trial_end);

        let button = press.map(|(code, _)| code);
        let response = self.config.keys.classify(button);
        let correct = score(
            block.condition,
            index,
            letter,
            &block.letters[..index],
            response,
        );
        let record = TrialRecord {
            block: block.id,
            condition: block.condition,
            trial: index,
            letter: Some(letter),
            button,
            reaction_time_ms: press.map(|(_, rt)| rt.as_millis() as u64),
            correct,
            block_start_s: block_start,
            trial_start_s: trial_start,
        };
        debug!(
            block = block.id,
            trial = index,
            %letter,
            ?response,
            rt_ms = ?record.reaction_time_ms,
            correct,
            "trial scored"
        );
        Ok(Some(record))
    }

    /// Waits for a valid press until `deadline`; the reaction time is
    /// measured from `onset`.
    fn collect_response(
        &mut self,
        onset: u64,
        deadline: u64,
    ) -> SessionResult<Option<(char, Duration)>> {
        if !self.phase.accepts_responses() {
            return Ok(None);
        }
        let valid = self.config.keys.codes();
        let started = self.timer.elapsed(onset);
        let window = Duration::from_nanos(deadline.saturating_sub(self.timer.now()));
        let press = self
            .device
            .wait_for_response(&valid, window)
            .map_err(SessionError::Input)?;
        let keys = self.config.keys;
        Ok(press
            .filter(|p| keys.is_valid(p.code) && p.latency <= window)
            .map(|p| (p.code, started + p.latency)))
    }

    fn show(&mut self, screen: &Screen, duration: Duration) -> SessionResult<()> {
        self.presenter
            .present(screen, duration)
            .map_err(SessionError::Presenter)
    }

    fn since_zero(&self) -> f64 {
        self.timer.elapsed(self.zero).as_secs_f64()
    }
}
