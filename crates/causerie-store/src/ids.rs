//! Typed identifiers for the domain models.
//!
//! Every id is a thin newtype over [`uuid::Uuid`] so the compiler catches
//! a user id handed where a conversation id belongs.  All ids serialize as
//! their canonical UUID string.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for deriving deterministic direct-conversation ids.
const DIRECT_CONVERSATION_NS: Uuid = Uuid::from_u128(0x8f3c1d2a_6b4e_4a0f_9c57_21e5a3b8d4f6);

/// Identity of a registered user, assigned by the auth provider at sign-up.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Generate a fresh random user id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Identity of a conversation (direct or group).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    /// Generate a fresh random conversation id (used for groups).
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Deterministic id of the direct conversation between two users.
    ///
    /// The pair is canonicalized by sorting, so the result does not depend
    /// on argument order: `direct_between(a, b) == direct_between(b, a)`.
    /// Both sides of a chat therefore converge on the same conversation
    /// without coordination.
    pub fn direct_between(a: UserId, b: UserId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };

        let mut pair = [0u8; 32];
        pair[..16].copy_from_slice(lo.0.as_bytes());
        pair[16..].copy_from_slice(hi.0.as_bytes());

        Self(Uuid::new_v5(&DIRECT_CONVERSATION_NS, &pair))
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConversationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Identity of a single message, assigned by the store at send time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub Uuid);

impl MessageId {
    /// Generate a fresh random message id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for MessageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_pair_is_order_independent() {
        let a = UserId::new();
        let b = UserId::new();

        assert_eq!(
            ConversationId::direct_between(a, b),
            ConversationId::direct_between(b, a)
        );
    }

    #[test]
    fn direct_pair_is_stable() {
        let a = UserId::new();
        let b = UserId::new();

        let first = ConversationId::direct_between(a, b);
        let second = ConversationId::direct_between(a, b);
        assert_eq!(first, second);
    }

    #[test]
    fn distinct_pairs_get_distinct_ids() {
        let a = UserId::new();
        let b = UserId::new();
        let c = UserId::new();

        assert_ne!(
            ConversationId::direct_between(a, b),
            ConversationId::direct_between(a, c)
        );
    }

    #[test]
    fn ids_round_trip_through_display() {
        let id = MessageId::new();
        let parsed: MessageId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
