pub mod config;
pub mod devices;
pub mod error;
pub mod generate;
pub mod log;
pub mod runner;
pub mod sequencer;
pub mod stimfile;
pub mod summary;

pub use config::{ResponseKeys, SessionConfig, TriggerConfig};
pub use devices::{CancelFlag, NoTrigger, Presenter, ResponseDevice, TriggerPort};
pub use error::{SessionError, SessionResult};
pub use generate::GeneratorConfig;
pub use log::{Column, SessionLog};
pub use runner::{SessionOutcome, SessionRunner};
pub use sequencer::{block_trials, plan_order};
pub use stimfile::load_stimulus_set;
pub use summary::{BehaviorSummary, ConditionSummary, Mismatch};
