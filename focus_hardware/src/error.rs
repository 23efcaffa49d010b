use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("i2c bus error: {0}")]
    Bus(String),
    #[error("lens controller busy timeout")]
    BusyTimeout,
    #[error("focus position {position} outside [{min}, {max}]")]
    OutOfRange { position: i32, min: i32, max: i32 },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
