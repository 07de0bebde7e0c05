use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::Path;

use nback_core::{Condition, TrialRecord};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{SessionError, SessionResult};

/// A column of the session log, named as it appears in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Column {
    #[serde(rename = "block")]
    Block,
    #[serde(rename = "cond")]
    Cond,
    #[serde(rename = "trial")]
    Trial,
    #[serde(rename = "resp")]
    Resp,
    #[serde(rename = "RT")]
    Rt,
    #[serde(rename = "correct")]
    Correct,
    #[serde(rename = "blctime")]
    BlockTime,
    #[serde(rename = "trltime")]
    TrialTime,
    #[serde(rename = "letter")]
    Letter,
}

impl Column {
    pub const DEFAULT: [Column; 8] = [
        Column::Block,
        Column::Cond,
        Column::Trial,
        Column::Resp,
        Column::Rt,
        Column::Correct,
        Column::BlockTime,
        Column::TrialTime,
    ];

    const ALL: [Column; 9] = [
        Column::Block,
        Column::Cond,
        Column::Trial,
        Column::Resp,
        Column::Rt,
        Column::Correct,
        Column::BlockTime,
        Column::TrialTime,
        Column::Letter,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Column::Block => "block",
            Column::Cond => "cond",
            Column::Trial => "trial",
            Column::Resp => "resp",
            Column::Rt => "RT",
            Column::Correct => "correct",
            Column::BlockTime => "blctime",
            Column::TrialTime => "trltime",
            Column::Letter => "letter",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Column::ALL.into_iter().find(|c| c.name() == name)
    }

    fn format(self, record: &TrialRecord) -> String {
        match self {
            Column::Block => record.block.to_string(),
            Column::Cond => record.condition.code().to_string(),
            Column::Trial => record.trial.to_string(),
            Column::Resp => record.button.map(String::from).unwrap_or_default(),
            Column::Rt => record
                .reaction_time_ms
                .map(|ms| ms.to_string())
                .unwrap_or_default(),
            Column::Correct => u8::from(record.correct).to_string(),
            Column::BlockTime => format!("{:.6}", record.block_start_s),
            Column::TrialTime => format!("{:.6}", record.trial_start_s),
            Column::Letter => record.letter.map(String::from).unwrap_or_default(),
        }
    }
}

/// Scored trials in presentation order.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionLog {
    columns: Vec<Column>,
    records: Vec<TrialRecord>,
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new(Column::DEFAULT.to_vec())
    }
}

impl SessionLog {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            records: Vec::new(),
        }
    }

    pub fn append(&mut self, record: TrialRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> io::Result<()> {
        let header: Vec<&str> = self.columns.iter().map(|c| c.name()).collect();
        writeln!(w, "{}", header.join(","))?;
        for record in &self.records {
            let fields: Vec<String> = self.columns.iter().map(|c| c.format(record)).collect();
            writeln!(w, "{}", fields.join(","))?;
        }
        w.flush()
    }

    /// Rewrites `path` with the full log. Calling it again with the same
    /// records produces the same file.
    pub fn flush(&self, path: &Path) -> SessionResult<()> {
        let write_err = |source| SessionError::LogWrite {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(write_err)?;
        self.write_to(BufWriter::new(file)).map_err(write_err)?;
        info!(path = %path.display(), trials = self.records.len(), "session log written");
        Ok(())
    }

    /// Parses a log written by [`SessionLog::write_to`]. The header decides
    /// the column layout; `block`, `cond`, `trial` and `correct` are required.
    pub fn read_from<R: BufRead>(reader: R) -> SessionResult<Self> {
        let mut lines = reader.lines();
        let header = match lines.next() {
            Some(line) => line.map_err(SessionError::LogRead)?,
            None => {
                return Err(SessionError::MalformedLog {
                    line: 1,
                    reason: "missing header".into(),
                });
            }
        };
        let columns = header
            .trim()
            .split(',')
            .map(|name| {
                Column::from_name(name.trim()).ok_or_else(|| SessionError::MalformedLog {
                    line: 1,
                    reason: format!("unknown column '{name}'"),
                })
            })
            .collect::<SessionResult<Vec<_>>>()?;
        for required in [Column::Block, Column::Cond, Column::Trial, Column::Correct] {
            if !columns.contains(&required) {
                return Err(SessionError::MalformedLog {
                    line: 1,
                    reason: format!("column '{}' is missing", required.name()),
                });
            }
        }

        let mut log = SessionLog::new(columns);
        for (n, line) in lines.enumerate() {
            let line = line.map_err(SessionError::LogRead)?;
            if line.trim().is_empty() {
                continue;
            }
            let record = parse_record(&log.columns, &line).map_err(|reason| {
                SessionError::MalformedLog {
                    line: n + 2,
                    reason,
                }
            })?;
            log.append(record);
        }
        Ok(log)
    }

    pub fn load(path: &Path) -> SessionResult<Self> {
        let file = File::open(path).map_err(SessionError::LogRead)?;
        Self::read_from(io::BufReader::new(file))
    }
}

fn parse_record(columns: &[Column], line: &str) -> Result<TrialRecord, String> {
    let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
    if fields.len() != columns.len() {
        return Err(format!(
            "expected {} fields, found {}",
            columns.len(),
            fields.len()
        ));
    }

    let mut record = TrialRecord {
        block: 0,
        condition: Condition::OneBack,
        trial: 0,
        letter: None,
        button: None,
        reaction_time_ms: None,
        correct: false,
        block_start_s: 0.0,
        trial_start_s: 0.0,
    };
    for (column, raw) in columns.iter().zip(fields) {
        let value = raw.trim();
        let bad = || format!("bad {} value '{value}'", column.name());
        match column {
            Column::Block => record.block = value.parse().map_err(|_| bad())?,
            Column::Cond => {
                record.condition = value
                    .parse()
                    .ok()
                    .and_then(Condition::from_code)
                    .ok_or_else(bad)?
            }
            Column::Trial => record.trial = value.parse().map_err(|_| bad())?,
            Column::Resp => record.button = single_char(value).map_err(|_| bad())?,
            Column::Rt => {
                record.reaction_time_ms = if value.is_empty() {
                    None
                } else {
                    Some(value.parse().map_err(|_| bad())?)
                }
            }
            Column::Correct => {
                record.correct = match value {
                    "1" => true,
                    "0" => false,
                    _ => return Err(bad()),
                }
            }
            Column::BlockTime => record.block_start_s = value.parse().map_err(|_| bad())?,
            Column::TrialTime => record.trial_start_s = value.parse().map_err(|_| bad())?,
            Column::Letter => record.letter = single_char(value).map_err(|_| bad())?,
        }
    }
    Ok(record)
}

fn single_char(value: &str) -> Result<Option<char>, ()> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (None, _) => Ok(None),
        (Some(c), None) => Ok(Some(c)),
        _ => Err(()),
    }
}
