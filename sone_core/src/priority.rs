use serde::{Deserialize, Serialize};

/// Urgency tier of a network request.
///
/// Variants are ordered from most to least urgent, so `Priority::Maximum <
/// Priority::Prefetch`.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Maximum,
    /// Requests a user is actively waiting for.
    Interactive,
    ImmediateSplitfile,
    Update,
    Bulk,
    /// Background work that may be delayed arbitrarily.
    Prefetch,
    Paused,
}

impl Priority {
    /// Numeric class, `0` being the most urgent.
    pub fn class(&self) -> u8 {
        *self as u8
    }
}
