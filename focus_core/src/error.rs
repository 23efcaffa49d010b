use thiserror::Error;

/// Errors raised by a focus session.
///
/// `InvalidFrame` is absorbed per call and never ends a session; every other
/// variant is fatal to the session that produced it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FocusError {
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("actuator fault: {0}")]
    ActuatorFault(String),
    #[error("actuator timeout")]
    ActuatorTimeout,
    #[error("degenerate scan window: start {start} > end {end}")]
    DegenerateScan { start: i32, end: i32 },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("timeout waiting for frames")]
    FrameTimeout,
    #[error("focus session cancelled")]
    Cancelled,
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing focuser")]
    MissingFocuser,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
