use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nback_core::Response;
use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};
use crate::log::Column;

/// Immutable session parameters, fixed before the first trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long each letter stays on screen.
    pub stimulus_ms: u64,
    /// Fixation period after the letter; a late response is still taken here.
    pub iti_ms: u64,
    /// Inclusive range the rest period between blocks is drawn from.
    pub ibi_range_ms: (u64, u64),
    /// Wait between the scanner trigger and the first block.
    pub settle_delay_ms: u64,
    /// How long the "Get ready" cue is shown at the start of each block.
    pub cue_ms: u64,
    pub keys: ResponseKeys,
    pub show_instructions: bool,
    pub log_columns: Vec<Column>,
    pub trigger: TriggerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stimulus_ms: 500,
            iti_ms: 2500,
            ibi_range_ms: (8000, 10000),
            settle_delay_ms: 10_000,
            cue_ms: 2000,
            keys: ResponseKeys::default(),
            show_instructions: true,
            log_columns: Column::DEFAULT.to_vec(),
            trigger: TriggerConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Reads a JSON config; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> SessionResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| SessionError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SessionConfig =
            serde_json::from_str(&text).map_err(|source| SessionError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SessionResult<()> {
        if self.stimulus_ms == 0 {
            return Err(SessionError::Config("stimulus_ms must be positive".into()));
        }
        let (min, max) = self.ibi_range_ms;
        if min > max {
            return Err(SessionError::Config(format!(
                "ibi_range_ms lower bound {min} exceeds upper bound {max}"
            )));
        }
        self.keys.validate()?;
        if self.log_columns.is_empty() {
            return Err(SessionError::Config("log_columns is empty".into()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.log_columns.iter().find(|c| !seen.insert(**c)) {
            return Err(SessionError::Config(format!(
                "log column '{}' listed twice",
                dup.name()
            )));
        }
        self.trigger.validate()
    }

    pub fn stimulus(&self) -> Duration {
        Duration::from_millis(self.stimulus_ms)
    }

    pub fn iti(&self) -> Duration {
        Duration::from_millis(self.iti_ms)
    }

    pub fn cue(&self) -> Duration {
        Duration::from_millis(self.cue_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Full response budget of a trial, from letter onset.
    pub fn trial_budget(&self) -> Duration {
        self.stimulus() + self.iti()
    }
}

/// The two buttons a participant can answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseKeys {
    pub non_target: char,
    pub target: char,
}

impl Default for ResponseKeys {
    fn default() -> Self {
        Self {
            non_target: '2',
            target: '3',
        }
    }
}

impl ResponseKeys {
    /// Keys the keyboard reserves for aborting a session.
    pub const ABORT_KEYS: [char; 2] = ['\x1b', 'q'];

    /// Both keys must be distinct printable ASCII, must not be the log's field
    /// separator and must not be an abort key.
    pub fn validate(&self) -> SessionResult<()> {
        if self.non_target == self.target {
            return Err(SessionError::Config(format!(
                "target and non-target keys are both '{}'",
                self.target
            )));
        }
        for key in self.codes() {
            if !key.is_ascii_graphic() {
                return Err(SessionError::Config(format!(
                    "response key {key:?} is not a printable ASCII character"
                )));
            }
            if key == ',' {
                return Err(SessionError::Config(
                    "',' separates log fields and cannot be a response key".into(),
                ));
            }
            if Self::ABORT_KEYS.contains(&key) {
                return Err(SessionError::Config(format!(
                    "response key '{key}' is reserved for aborting"
                )));
            }
        }
        Ok(())
    }

    pub fn codes(&self) -> [char; 2] {
        [self.non_target, self.target]
    }

    /// Maps a raw button code to a response; unknown codes count as silence.
    pub fn classify(&self, code: Option<char>) -> Response {
        match code {
            Some(c) if c == self.target => Response::Target,
            Some(c) if c == self.non_target => Response::NonTarget,
            _ => Response::NoResponse,
        }
    }

    pub fn is_valid(&self, code: char) -> bool {
        code == self.target || code == self.non_target
    }
}

/// Serial line used to start the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// No port means no trigger is sent (behavioural-only runs).
    pub port: Option<PathBuf>,
    pub baud: u32,
    pub payload: String,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: 57_600,
            payload: "[t]".to_string(),
        }
    }
}

impl TriggerConfig {
    fn validate(&self) -> SessionResult<()> {
        if self.payload.is_empty() {
            return Err(SessionError::Config("trigger payload is empty".into()));
        }
        if self.baud == 0 {
            return Err(SessionError::Config("trigger baud rate is zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SessionConfig::default();
        config.validate().unwrap();
        assert_eq!(config.trial_budget(), Duration::from_millis(3000));
        assert_eq!(config.log_columns.len(), 8);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "stimulus_ms": 400, "keys": { "non_target": "f", "target": "j" } }"#)
                .unwrap();
        assert_eq!(config.stimulus_ms, 400);
        assert_eq!(config.iti_ms, 2500);
        assert_eq!(config.keys.target, 'j');
        assert_eq!(config.trigger.payload, "[t]");
    }

    #[test]
    fn rejects_inverted_ibi_range() {
        let config = SessionConfig {
            ibi_range_ms: (10, 5),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SessionError::Config(_))));
    }

    #[test]
    fn rejects_shared_keys_and_duplicate_columns() {
        let config = SessionConfig {
            keys: ResponseKeys {
                non_target: 'x',
                target: 'x',
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SessionConfig {
            log_columns: vec![Column::Block, Column::Block],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_keys_that_clash_with_the_log_or_abort() {
        for bad in [',', 'q', '\x1b', '\x03', ' ', 'é'] {
            let config = SessionConfig {
                keys: ResponseKeys {
                    non_target: bad,
                    target: '3',
                },
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(SessionError::Config(_))),
                "{bad:?} accepted"
            );
        }
        let keys = ResponseKeys {
            non_target: 'f',
            target: 'j',
        };
        keys.validate().unwrap();
    }

    #[test]
    fn classifies_codes() {
        let keys = ResponseKeys::default();
        assert_eq!(keys.classify(Some('3')), Response::Target);
        assert_eq!(keys.classify(Some('2')), Response::NonTarget);
        assert_eq!(keys.classify(Some('9')), Response::NoResponse);
        assert_eq!(keys.classify(None), Response::NoResponse);
    }

    #[test]
    fn reads_config_file() {
        let path = std::env::temp_dir().join(format!("nback-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "ibi_range_ms": [1000, 2000], "show_instructions": false }"#)
            .unwrap();
        let config = SessionConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.ibi_range_ms, (1000, 2000));
        assert!(!config.show_instructions);
    }

    #[test]
    fn missing_config_file_is_reported() {
        let err = SessionConfig::from_json_file(Path::new("/nonexistent/nback.json")).unwrap_err();
        assert!(matches!(err, SessionError::ConfigIo { .. }));
    }
}
