use crate::condition::Condition;

/// One contiguous run of letters presented under a single rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Global index of the block within its stimulus set.
    pub id: usize,
    pub condition: Condition,
    pub letters: Vec<char>,
}

impl Block {
    pub fn new(id: usize, condition: Condition, letters: impl Into<Vec<char>>) -> Self {
        Self {
            id,
            condition,
            letters: letters.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.letters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.is_empty()
    }
}

/// All blocks available to a session: 1-back blocks first, then 2-back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StimulusSet {
    blocks: Vec<Block>,
}

impl StimulusSet {
    /// Builds a set from per-condition letter rows, numbering blocks in the
    /// order they are given.
    pub fn from_groups(one_back: Vec<Vec<char>>, two_back: Vec<Vec<char>>) -> Self {
        let rows = one_back
            .into_iter()
            .map(|letters| (Condition::OneBack, letters))
            .chain(two_back.into_iter().map(|letters| (Condition::TwoBack, letters)));
        let blocks = rows
            .enumerate()
            .map(|(id, (condition, letters))| Block::new(id, condition, letters))
            .collect();
        Self { blocks }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, id: usize) -> Option<&Block> {
        self.blocks.get(id)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn count(&self, condition: Condition) -> usize {
        self.blocks
            .iter()
            .filter(|b| b.condition == condition)
            .count()
    }
}

/// Everything the presenter can be asked to put on screen.
#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    Instructions {
        page: usize,
        total: usize,
        text: &'static str,
    },
    Countdown {
        seconds_left: u64,
    },
    Cue(Condition),
    Letter(char),
    Fixation,
    Rest,
    Goodbye,
}

impl Screen {
    pub fn is_letter(&self) -> bool {
        matches!(self, Screen::Letter(_))
    }
}
