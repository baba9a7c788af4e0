use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;
use strum_macros::EnumString;

/// One level of the ownership hierarchy.
///
/// `Top` is the analyst (consultant), `Mid` the client and `Leaf` the farm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum Level {
    #[strum(to_string = "top", serialize = "analyst")]
    Top,
    #[strum(to_string = "mid", serialize = "client")]
    Mid,
    #[strum(to_string = "leaf", serialize = "farm")]
    Leaf,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Top, Level::Mid, Level::Leaf];

    pub fn parent(self) -> Option<Level> {
        match self {
            Level::Top => None,
            Level::Mid => Some(Level::Top),
            Level::Leaf => Some(Level::Mid),
        }
    }

    pub fn child(self) -> Option<Level> {
        match self {
            Level::Top => Some(Level::Mid),
            Level::Mid => Some(Level::Leaf),
            Level::Leaf => None,
        }
    }

    /// Domain noun used in log lines and CLI output.
    pub fn noun(self) -> &'static str {
        match self {
            Level::Top => "analyst",
            Level::Mid => "client",
            Level::Leaf => "farm",
        }
    }

    /// Levels strictly below `self`, nearest first.
    pub fn descendants(self) -> impl Iterator<Item = Level> {
        std::iter::successors(self.child(), |level| level.child())
    }
}
