//! Domain model structs persisted in the local SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to an embedding UI layer.  Field names serialize in camelCase,
//! matching the document shape the rest of the system expects.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{ConversationId, MessageId, UserId};

// ---------------------------------------------------------------------------
// User profile
// ---------------------------------------------------------------------------

/// Self-reported gender of a registered user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
    Other,
}

impl Gender {
    /// Canonical lowercase form, as stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Female => "female",
            Gender::Male => "male",
            Gender::Other => "other",
        }
    }
}

/// Error returned when a stored gender string is unrecognized.
#[derive(Debug, Error)]
#[error("unrecognized gender: {0}")]
pub struct ParseGenderError(String);

impl std::str::FromStr for Gender {
    type Err = ParseGenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "female" => Ok(Gender::Female),
            "male" => Ok(Gender::Male),
            "other" => Ok(Gender::Other),
            unknown => Err(ParseGenderError(unknown.to_string())),
        }
    }
}

/// A directory entry for a registered user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Identity assigned by the auth provider.
    pub id: UserId,
    /// Display name shown to other users.
    pub full_name: String,
    /// Self-reported gender.
    pub gender: Gender,
    /// Contact email.  Uniqueness is the auth provider's concern.
    pub email: String,
    /// Whether the user currently has an active session.
    pub online: bool,
    /// Last presence transition, if any.
    pub last_seen: Option<DateTime<Utc>>,
    /// When the profile was registered.
    pub created_at: DateTime<Utc>,
}

/// Input for registering a new directory entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewProfile {
    /// Identity assigned by the auth provider.
    pub id: UserId,
    /// Display name; must be non-empty.
    pub full_name: String,
    /// Self-reported gender.
    pub gender: Gender,
    /// Contact email; must be non-empty.
    pub email: String,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A conversation between two users (direct) or several (group).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique conversation identifier.  Deterministic for direct
    /// conversations, random for groups.
    pub id: ConversationId,
    /// Whether this is a group conversation.
    pub is_group: bool,
    /// Group name.  Always `None` for direct conversations.
    pub name: Option<String>,
    /// Member set.  Non-empty, at least two at creation, only ever grows.
    pub members: BTreeSet<UserId>,
    /// When the conversation was created.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent message, used as the monotonicity
    /// high-water mark and for ordering conversation listings.
    pub last_message_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message identifier.
    pub id: MessageId,
    /// The conversation this message belongs to.
    pub conversation_id: ConversationId,
    /// Who sent it.
    pub sender_id: UserId,
    /// Message text.  May be empty when `image_url` is present, and is
    /// cleared when the message is deleted.
    pub text: String,
    /// Optional already-resolved image URL.  Cleared on deletion.
    pub image_url: Option<String>,
    /// Store-assigned timestamp, strictly monotonic per conversation.
    pub created_at: DateTime<Utc>,
    /// Tombstone flag.  Deleted messages keep their ordering position.
    pub deleted: bool,
    /// Whether the text has been edited after sending.
    pub edited: bool,
    /// When the last edit happened, if any.
    pub edited_at: Option<DateTime<Utc>>,
}

/// Content of a message about to be sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    /// Message text.  May be empty when an image is attached.
    pub text: String,
    /// Optional image URL.
    pub image_url: Option<String>,
}

impl MessageDraft {
    /// Draft containing only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image_url: None,
        }
    }

    /// Draft containing only an image.
    pub fn image(url: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            image_url: Some(url.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gender_round_trips_through_storage_form() {
        for gender in [Gender::Female, Gender::Male, Gender::Other] {
            let parsed: Gender = gender.as_str().parse().unwrap();
            assert_eq!(gender, parsed);
        }
        assert!("unknown".parse::<Gender>().is_err());
    }

    #[test]
    fn message_serializes_in_camel_case() {
        let message = Message {
            id: MessageId::new(),
            conversation_id: ConversationId::new(),
            sender_id: UserId::new(),
            text: "hello".to_string(),
            image_url: Some("https://example.com/cat.png".to_string()),
            created_at: Utc::now(),
            deleted: false,
            edited: false,
            edited_at: None,
        };

        let json = serde_json::to_value(&message).unwrap();
        assert!(json.get("senderId").is_some());
        assert!(json.get("imageUrl").is_some());
        assert!(json.get("createdAt").is_some());
        assert!(json.get("sender_id").is_none());
    }

    #[test]
    fn profile_serializes_in_camel_case() {
        let profile = UserProfile {
            id: UserId::new(),
            full_name: "Ada Lovelace".to_string(),
            gender: Gender::Female,
            email: "ada@example.com".to_string(),
            online: true,
            last_seen: Some(Utc::now()),
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&profile).unwrap();
        assert!(json.get("fullName").is_some());
        assert!(json.get("lastSeen").is_some());
        assert_eq!(json.get("gender").unwrap(), "female");
    }
}
