use std::fmt;

use crate::accounts::UserId;

/// Canonical key for the channel shared by exactly two users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomKey {
    low: UserId,
    high: UserId,
}

impl RoomKey {
    /// Order-insensitive: `resolve(a, b) == resolve(b, a)`.
    pub fn resolve(a: UserId, b: UserId) -> RoomKey {
        RoomKey {
            low: a.min(b),
            high: a.max(b),
        }
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "chat_{}_{}", self.low, self.high)
    }
}
