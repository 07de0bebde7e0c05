//! Stimulus files: one block per line, letters separated (and usually
//! terminated) by commas. Letter case is kept for display only.

use std::io::{self, Write};
use std::path::Path;

use nback_core::StimulusSet;
use tracing::info;

use crate::error::{SessionError, SessionResult};

pub fn parse_blocks(text: &str, path: &Path) -> SessionResult<Vec<Vec<char>>> {
    let mut blocks = Vec::new();
    for (n, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let malformed = |reason: String| SessionError::MalformedStimulus {
            path: path.to_path_buf(),
            line: n + 1,
            reason,
        };

        let body = line.strip_suffix(',').unwrap_or(line);
        let mut letters = Vec::new();
        for (col, field) in body.split(',').enumerate() {
            let field = field.trim();
            let mut chars = field.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_alphabetic() => letters.push(c),
                (None, _) => return Err(malformed(format!("field {} is empty", col + 1))),
                _ => {
                    return Err(malformed(format!(
                        "field {} is '{field}', expected a single letter",
                        col + 1
                    )));
                }
            }
        }
        blocks.push(letters);
    }
    Ok(blocks)
}

/// Reads one condition's stimulus file; a file without blocks is an error.
pub fn load_blocks(path: &Path) -> SessionResult<Vec<Vec<char>>> {
    let text = std::fs::read_to_string(path).map_err(|source| SessionError::StimulusIo {
        path: path.to_path_buf(),
        source,
    })?;
    let blocks = parse_blocks(&text, path)?;
    if blocks.is_empty() {
        return Err(SessionError::EmptyStimulus {
            path: path.to_path_buf(),
        });
    }
    Ok(blocks)
}

pub fn load_stimulus_set(one_back: &Path, two_back: &Path) -> SessionResult<StimulusSet> {
    let set = StimulusSet::from_groups(load_blocks(one_back)?, load_blocks(two_back)?);
    info!(
        blocks = set.len(),
        one_back = %one_back.display(),
        two_back = %two_back.display(),
        "stimuli loaded"
    );
    Ok(set)
}

/// Writes blocks in the same layout `parse_blocks` reads, each letter
/// followed by a comma.
pub fn write_blocks<W: Write>(mut w: W, blocks: &[Vec<char>]) -> io::Result<()> {
    for block in blocks {
        for letter in block {
            write!(w, "{letter},")?;
        }
        writeln!(w)?;
    }
    w.flush()
}
