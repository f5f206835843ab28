//! Scheduling conflicts between games a user plays in.
//!
//! Two games conflict when the idle time between them is shorter than
//! [`BUFFER_MINUTES`]. The target is widened by the buffer on both sides and
//! tested against each candidate's own interval; touching intervals do not
//! overlap, so a gap of exactly the buffer is allowed. The test is symmetric
//! in its two arguments.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::schedule::{Scheduled, ScheduledInterval};

/// Minimum idle time between two games of the same player.
pub const BUFFER_MINUTES: i64 = 30;

/// Outcome of checking one game against a player's confirmed games.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictResult<'a, T> {
    pub has_conflict: bool,
    /// First entry of the candidate list (input order) that overlaps.
    pub conflicting_game: Option<&'a T>,
    pub message: Option<String>,
}

impl<'a, T> ConflictResult<'a, T> {
    pub fn none() -> Self {
        ConflictResult {
            has_conflict: false,
            conflicting_game: None,
            message: None,
        }
    }
}

impl<'a, T: Scheduled> ConflictResult<'a, T> {
    fn found(game: &'a T) -> Self {
        let start = game.interval().start;
        ConflictResult {
            has_conflict: true,
            conflicting_game: Some(game),
            message: Some(format!(
                "Conflicts with \"{}\" on {} at {}",
                game.label(),
                format_date(start),
                format_time(start)
            )),
        }
    }
}

/// Check whether joining `target` would clash with any of `candidates`.
///
/// Candidates are the games the user already holds a confirmed signup for.
/// The target's own signup is not excluded here; callers drop it first.
/// Every input is validated before scanning, so a negative duration anywhere
/// is an error even when an earlier candidate would have conflicted.
pub fn check_conflict<'a, T: Scheduled>(
    target: &ScheduledInterval,
    candidates: &'a [T],
) -> Result<ConflictResult<'a, T>> {
    let window = target.padded(BUFFER_MINUTES)?;
    let spans = candidates
        .iter()
        .map(|game| span(&game.interval()))
        .collect::<Result<Vec<_>>>()?;

    let hit = candidates
        .iter()
        .zip(spans)
        .find(|(_, other)| overlaps(window, *other));

    Ok(match hit {
        Some((game, _)) => ConflictResult::found(game),
        None => ConflictResult::none(),
    })
}

/// Pairwise form of the buffered overlap test.
pub fn conflicts_with(a: &ScheduledInterval, b: &ScheduledInterval) -> Result<bool> {
    Ok(overlaps(a.padded(BUFFER_MINUTES)?, span(b)?))
}

/// Every candidate that clashes with `target`, in input order.
pub fn find_all_conflicts<'a, T: Scheduled>(
    target: &ScheduledInterval,
    candidates: &'a [T],
) -> Result<Vec<&'a T>> {
    let mut conflicts = Vec::new();
    for game in candidates {
        if conflicts_with(target, &game.interval())? {
            conflicts.push(game);
        }
    }
    Ok(conflicts)
}

/// Long-form warning shown when a join is refused.
pub fn format_conflict_message<T: Scheduled>(result: &ConflictResult<'_, T>) -> String {
    match result.conflicting_game {
        Some(game) if result.has_conflict => {
            let start = game.interval().start;
            format!(
                "Time conflict with \"{}\" ({} at {}). Games must have at least {} minutes between them.",
                game.label(),
                format_date(start),
                format_time(start),
                BUFFER_MINUTES
            )
        }
        _ => String::new(),
    }
}

fn span(interval: &ScheduledInterval) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    interval.padded(0)
}

fn overlaps(a: (DateTime<Utc>, DateTime<Utc>), b: (DateTime<Utc>, DateTime<Utc>)) -> bool {
    a.0 < b.1 && a.1 > b.0
}

fn format_date(at: DateTime<Utc>) -> String {
    at.format("%a %b %-d, %Y").to_string()
}

fn format_time(at: DateTime<Utc>) -> String {
    at.format("%H:%M UTC").to_string()
}
