use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can stop a session or one of the offline tools.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("cannot read stimulus file {path}: {source}")]
    StimulusIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("stimulus file {path}, line {line}: {reason}")]
    MalformedStimulus {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("stimulus file {path} contains no blocks")]
    EmptyStimulus { path: PathBuf },

    #[error("no stimulus blocks to run")]
    EmptyStimulusSet,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot read configuration {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse configuration {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The scanner never saw its start signal; the session timing is useless.
    #[error("scanner trigger failed: {0}")]
    Trigger(#[source] io::Error),

    #[error("presentation failed: {0}")]
    Presenter(#[source] io::Error),

    #[error("response device failed: {0}")]
    Input(#[source] io::Error),

    #[error("cannot write session log {path}: {source}")]
    LogWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot read session log: {0}")]
    LogRead(#[source] io::Error),

    #[error("session log line {line}: {reason}")]
    MalformedLog { line: usize, reason: String },

    #[error("replay failed for block {block}, trial {trial}: {reason}")]
    Replay {
        block: usize,
        trial: usize,
        reason: String,
    },

    #[error("generator error: {0}")]
    Generator(String),
}

pub type SessionResult<T> = Result<T, SessionError>;
