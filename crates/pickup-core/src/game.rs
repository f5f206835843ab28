use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default length of a game in minutes.
pub const DEFAULT_GAME_DURATION: i64 = 90;
pub const MIN_GAME_DURATION: i64 = 30;
/// Four hours.
pub const MAX_GAME_DURATION: i64 = 240;

pub const MIN_PLAYERS: i64 = 2;
pub const MAX_PLAYERS: i64 = 50;
pub const DEFAULT_MAX_PLAYERS: i64 = 22;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Enums stored as `SCREAMING_SNAKE_CASE` text in the database and on the wire.
macro_rules! stored_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal, { $($variant:ident => ($db:literal, $label:literal)),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $db),+
                }
            }

            pub fn all() -> &'static [$name] {
                &[$($name::$variant),+]
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($db => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

stored_enum!(
    /// Kind of game being organized.
    GameType, "game type", {
        Casual => ("CASUAL", "Casual"),
        Competitive => ("COMPETITIVE", "Competitive"),
        Pickup => ("PICKUP", "Pickup"),
        Tournament => ("TOURNAMENT", "Tournament"),
    }
);

stored_enum!(
    SkillLevel, "skill level", {
        Beginner => ("BEGINNER", "Beginner"),
        Intermediate => ("INTERMEDIATE", "Intermediate"),
        Advanced => ("ADVANCED", "Advanced"),
        Expert => ("EXPERT", "Expert"),
    }
);

stored_enum!(
    /// Only `Open` games accept new players.
    GameStatus, "game status", {
        Open => ("OPEN", "Open"),
        Full => ("FULL", "Full"),
        Cancelled => ("CANCELLED", "Cancelled"),
        Completed => ("COMPLETED", "Completed"),
    }
);

stored_enum!(
    /// Only `Confirmed` signups take part in conflict checks.
    SignupStatus, "signup status", {
        Pending => ("PENDING", "Pending"),
        Confirmed => ("CONFIRMED", "Confirmed"),
        Cancelled => ("CANCELLED", "Cancelled"),
    }
);

impl Default for GameType {
    fn default() -> Self {
        GameType::Pickup
    }
}

impl Default for SkillLevel {
    fn default() -> Self {
        SkillLevel::Intermediate
    }
}
