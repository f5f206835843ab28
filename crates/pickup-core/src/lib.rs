pub mod conflict;
pub mod error;
pub mod game;
pub mod protocol;
pub mod schedule;

pub use conflict::{BUFFER_MINUTES, ConflictResult, check_conflict};
pub use error::ScheduleError;
pub use game::{GameStatus, GameType, SignupStatus, SkillLevel};
pub use schedule::{Scheduled, ScheduledInterval};
