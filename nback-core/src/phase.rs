/// Stages a live session moves through, in order.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Instructions,
    Trigger,
    Settle,
    Blocks,
    Finished,
}

impl SessionPhase {
    pub fn next(&self) -> Option<Self> {
        use SessionPhase::*;
        Some(match self {
            Instructions => Trigger,
            Trigger => Settle,
            Settle => Blocks,
            Blocks => Finished,
            Finished => return None,
        })
    }

    /// Button presses are only scored while blocks are running.
    pub fn accepts_responses(&self) -> bool {
        matches!(self, SessionPhase::Blocks)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, SessionPhase::Finished)
    }
}
