//! CRUD operations for [`Message`] records.
//!
//! Message timestamps are assigned here, not by callers: each send takes
//! `max(now, last_message_at + 1µs)` so timestamps within a conversation are
//! strictly monotonic in commit order even when the wall clock stalls or
//! steps backwards.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::ids::{ConversationId, MessageId, UserId};
use crate::models::{Message, MessageDraft};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Append a message to a conversation.
    ///
    /// Guards, in order: the conversation must exist ([`StoreError::NotFound`]),
    /// the sender must be a member ([`StoreError::Forbidden`]), and the draft
    /// must carry text or an image ([`StoreError::Validation`]).  The message
    /// row and the conversation's `last_message_at` high-water mark commit in
    /// one transaction.
    pub fn send_message(
        &mut self,
        conversation: ConversationId,
        sender: UserId,
        draft: &MessageDraft,
    ) -> Result<Message> {
        let conv = self.conversation(conversation)?;
        if !conv.members.contains(&sender) {
            return Err(StoreError::Forbidden(
                "sender is not a member of this conversation".into(),
            ));
        }

        let image_url = draft
            .image_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty());
        if draft.text.trim().is_empty() && image_url.is_none() {
            return Err(StoreError::Validation(
                "a message needs text or an image".into(),
            ));
        }

        let id = MessageId::new();
        let created_at = next_timestamp(conv.last_message_at);
        let ts = created_at.to_rfc3339_opts(SecondsFormat::Micros, true);

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO messages (id, conversation_id, sender_id, text, image_url, created_at, deleted, edited, edited_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, NULL)",
            params![
                id.to_string(),
                conversation.to_string(),
                sender.to_string(),
                draft.text,
                image_url,
                ts,
            ],
        )?;
        tx.execute(
            "UPDATE conversations SET last_message_at = ?2 WHERE id = ?1",
            params![conversation.to_string(), ts],
        )?;
        tx.commit()?;

        tracing::debug!(conversation = %conversation, message = %id, "message stored");

        self.message(id)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Replace a message's text, marking it as edited.
    ///
    /// Only the original sender may edit ([`StoreError::Forbidden`]); deleted
    /// messages reject edits ([`StoreError::Conflict`]); the new text must be
    /// non-empty ([`StoreError::Validation`]).  The store timestamp, and with
    /// it the message's position, never changes.
    pub fn edit_message(
        &mut self,
        id: MessageId,
        editor: UserId,
        new_text: &str,
    ) -> Result<Message> {
        let message = self.message(id)?;
        if message.sender_id != editor {
            return Err(StoreError::Forbidden(
                "only the sender can edit a message".into(),
            ));
        }
        if message.deleted {
            return Err(StoreError::Conflict("cannot edit a deleted message".into()));
        }
        if new_text.trim().is_empty() {
            return Err(StoreError::Validation(
                "edited text must not be empty".into(),
            ));
        }

        let edited_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        self.conn().execute(
            "UPDATE messages SET text = ?2, edited = 1, edited_at = ?3 WHERE id = ?1",
            params![id.to_string(), new_text, edited_at],
        )?;

        tracing::debug!(message = %id, "message edited");

        self.message(id)
    }

    /// Soft-delete a message: clear its content and set the tombstone flag.
    ///
    /// Only the original sender may delete ([`StoreError::Forbidden`]).
    /// Idempotent: deleting an already-deleted message returns the tombstone
    /// unchanged.  The row keeps its ordering position.
    pub fn soft_delete_message(&mut self, id: MessageId, requester: UserId) -> Result<Message> {
        let message = self.message(id)?;
        if message.sender_id != requester {
            return Err(StoreError::Forbidden(
                "only the sender can delete a message".into(),
            ));
        }
        if message.deleted {
            return Ok(message);
        }

        self.conn().execute(
            "UPDATE messages SET text = '', image_url = NULL, deleted = 1 WHERE id = ?1",
            params![id.to_string()],
        )?;

        tracing::debug!(message = %id, "message soft-deleted");

        self.message(id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single message by id.
    pub fn message(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                "SELECT id, conversation_id, sender_id, text, image_url, created_at, deleted, edited, edited_at
                 FROM messages WHERE id = ?1",
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// The full message log of a conversation in ascending timestamp order.
    ///
    /// This is the snapshot shape the sync layer delivers.  An unknown
    /// conversation yields an empty list (range-query semantics; subscribing
    /// before the first write is legitimate).
    pub fn messages_for_conversation(&self, conversation: ConversationId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, conversation_id, sender_id, text, image_url, created_at, deleted, edited, edited_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![conversation.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// A newest-first window over a conversation's log.
    pub fn recent_messages(
        &self,
        conversation: ConversationId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, conversation_id, sender_id, text, image_url, created_at, deleted, edited, edited_at
             FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2 OFFSET ?3",
        )?;

        let rows = stmt.query_map(
            params![conversation.to_string(), limit, offset],
            row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Next store timestamp for a conversation: the current instant, floored to
/// one microsecond past the previous message so the sequence is strictly
/// increasing.
fn next_timestamp(last_message_at: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match last_message_at {
        Some(last) => {
            let floor = last + Duration::microseconds(1);
            if floor > now {
                floor
            } else {
                now
            }
        }
        None => now,
    }
}

/// Map a `rusqlite::Row` to a [`Message`].
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let conversation_str: String = row.get(1)?;
    let sender_str: String = row.get(2)?;
    let text: String = row.get(3)?;
    let image_url: Option<String> = row.get(4)?;
    let created_str: String = row.get(5)?;
    let deleted: bool = row.get(6)?;
    let edited: bool = row.get(7)?;
    let edited_str: Option<String> = row.get(8)?;

    let id = id_str
        .parse::<MessageId>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?;

    let conversation_id = conversation_str
        .parse::<ConversationId>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e)))?;

    let sender_id = sender_str
        .parse::<UserId>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e)))?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e)))?;

    let edited_at: Option<DateTime<Utc>> = edited_str
        .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e)))?;

    Ok(Message {
        id,
        conversation_id,
        sender_id,
        text,
        image_url,
        created_at,
        deleted,
        edited,
        edited_at,
    })
}
