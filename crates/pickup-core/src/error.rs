use thiserror::Error;

/// Invalid schedule input handed to the conflict detector.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("game duration must not be negative (got {0} minutes)")]
    NegativeDuration(i64),

    #[error("game time is out of the representable range")]
    OutOfRange,
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
