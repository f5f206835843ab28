use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScheduleError};

/// The block of time a game occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledInterval {
    pub start: DateTime<Utc>,
    pub duration_minutes: i64,
}

impl ScheduledInterval {
    /// Build an interval, rejecting negative durations.
    pub fn new(start: DateTime<Utc>, duration_minutes: i64) -> Result<Self> {
        let interval = ScheduledInterval {
            start,
            duration_minutes,
        };
        interval.validate()?;
        Ok(interval)
    }

    pub fn validate(&self) -> Result<()> {
        if self.duration_minutes < 0 {
            return Err(ScheduleError::NegativeDuration(self.duration_minutes));
        }
        Ok(())
    }

    pub fn end(&self) -> Result<DateTime<Utc>> {
        self.validate()?;
        let length = Duration::try_minutes(self.duration_minutes).ok_or(ScheduleError::OutOfRange)?;
        self.start
            .checked_add_signed(length)
            .ok_or(ScheduleError::OutOfRange)
    }

    /// `[start - pad, end + pad)`.
    pub fn padded(&self, pad_minutes: i64) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let pad = Duration::try_minutes(pad_minutes).ok_or(ScheduleError::OutOfRange)?;
        let start = self
            .start
            .checked_sub_signed(pad)
            .ok_or(ScheduleError::OutOfRange)?;
        let end = self
            .end()?
            .checked_add_signed(pad)
            .ok_or(ScheduleError::OutOfRange)?;
        Ok((start, end))
    }
}

/// Anything that can be placed on a user's calendar.
///
/// Implemented by wire summaries and stored game rows so both the join gate
/// and the listing pre-check feed the same detector.
pub trait Scheduled {
    fn interval(&self) -> ScheduledInterval;

    /// Name shown to the user when this entry is reported as a conflict.
    fn label(&self) -> &str;
}

impl<T: Scheduled + ?Sized> Scheduled for &T {
    fn interval(&self) -> ScheduledInterval {
        (**self).interval()
    }

    fn label(&self) -> &str {
        (**self).label()
    }
}

impl Scheduled for ScheduledInterval {
    fn interval(&self) -> ScheduledInterval {
        *self
    }

    fn label(&self) -> &str {
        "another game"
    }
}
