pub mod condition;
pub mod phase;
pub mod scoring;
pub mod stimulus;
pub mod trial;

pub use condition::Condition;
pub use phase::SessionPhase;
pub use scoring::{is_target, score};
pub use stimulus::{Block, Screen, StimulusSet};
pub use trial::{ButtonPress, Response, TrialRecord};
