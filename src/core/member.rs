use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a member of a community.
///
/// A member can lend to and borrow from any other member of the same
/// community. The id is opaque to the engine; callers typically use the
/// chat platform's stable user id rendered as a string.
///
/// # Examples
///
/// ```
/// use debtbook::core::member::MemberId;
///
/// let alice = MemberId::new("alice");
/// let bob = MemberId::new("bob");
/// assert_ne!(alice, bob);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation of this member id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MemberId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier for a community (guild, server, room).
///
/// Every loan lives inside exactly one community; loans in different
/// communities are fully independent even between the same two members.
///
/// # Examples
///
/// ```
/// use debtbook::core::member::CommunityId;
///
/// let guild = CommunityId::new("guild-1024");
/// assert_eq!(guild.as_str(), "guild-1024");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommunityId(String);

impl CommunityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CommunityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_equality() {
        let a = MemberId::new("alice");
        let b = MemberId::new("alice");
        let c = MemberId::new("bob");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_member_display() {
        let m = MemberId::new("carol");
        assert_eq!(format!("{}", m), "carol");
    }

    #[test]
    fn test_member_ordering() {
        let a = MemberId::new("alice");
        let b = MemberId::new("bob");
        assert!(a < b);
    }

    #[test]
    fn test_community_equality() {
        let a = CommunityId::new("guild-1");
        let b = CommunityId::new("guild-1");
        assert_eq!(a, b);
    }
}
