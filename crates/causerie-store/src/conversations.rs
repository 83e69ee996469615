//! CRUD operations for [`Conversation`] records and their membership sets.

use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::ids::{ConversationId, UserId};
use crate::models::Conversation;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Return the direct conversation between two users, creating it on
    /// first use.
    ///
    /// The conversation id is a deterministic function of the unordered
    /// pair, so both argument orders (and both participants) converge on
    /// the same record.  Fails with [`StoreError::Validation`] when the two
    /// ids are equal.
    pub fn get_or_create_direct(&mut self, a: UserId, b: UserId) -> Result<Conversation> {
        if a == b {
            return Err(StoreError::Validation(
                "a direct conversation needs two distinct users".into(),
            ));
        }

        let id = ConversationId::direct_between(a, b);
        match self.conversation(id) {
            Ok(existing) => return Ok(existing),
            Err(StoreError::NotFound) => {}
            Err(other) => return Err(other),
        }

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO conversations (id, is_group, name, created_at, last_message_at)
             VALUES (?1, 0, NULL, ?2, NULL)",
            params![id.to_string(), now],
        )?;
        for member in [a, b] {
            tx.execute(
                "INSERT INTO conversation_members (conversation_id, user_id, joined_at)
                 VALUES (?1, ?2, ?3)",
                params![id.to_string(), member.to_string(), now],
            )?;
        }
        tx.commit()?;

        tracing::info!(conversation = %id, "created direct conversation");

        self.conversation(id)
    }

    /// Create a group conversation.
    ///
    /// Membership is the set union of the creator and `member_ids`;
    /// duplicates collapse.  Fails with [`StoreError::Validation`] when the
    /// name trims empty or when fewer than two members besides the creator
    /// are given.
    pub fn create_group(
        &mut self,
        creator: UserId,
        name: &str,
        member_ids: &[UserId],
    ) -> Result<Conversation> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("group name must not be empty".into()));
        }

        let mut members: BTreeSet<UserId> = member_ids.iter().copied().collect();
        members.remove(&creator);
        if members.len() < 2 {
            return Err(StoreError::Validation(
                "a group needs at least two members besides the creator".into(),
            ));
        }
        members.insert(creator);

        let id = ConversationId::new();
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "INSERT INTO conversations (id, is_group, name, created_at, last_message_at)
             VALUES (?1, 1, ?2, ?3, NULL)",
            params![id.to_string(), name, now],
        )?;
        for member in &members {
            tx.execute(
                "INSERT INTO conversation_members (conversation_id, user_id, joined_at)
                 VALUES (?1, ?2, ?3)",
                params![id.to_string(), member.to_string(), now],
            )?;
        }
        tx.commit()?;

        tracing::info!(conversation = %id, members = members.len(), "created group conversation");

        self.conversation(id)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Merge new members into a group conversation (set union).
    ///
    /// Already-present ids and duplicates are no-ops, as is an empty input.
    /// Fails with [`StoreError::NotFound`] for an unknown conversation and
    /// [`StoreError::Conflict`] for a direct conversation, whose two-party
    /// membership is fixed.
    pub fn add_members(
        &mut self,
        id: ConversationId,
        new_member_ids: &[UserId],
    ) -> Result<Conversation> {
        let conversation = self.conversation(id)?;
        if !conversation.is_group {
            return Err(StoreError::Conflict(
                "cannot add members to a direct conversation".into(),
            ));
        }
        if new_member_ids.is_empty() {
            return Ok(conversation);
        }

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let tx = self.conn_mut().transaction()?;
        for member in new_member_ids {
            tx.execute(
                "INSERT OR IGNORE INTO conversation_members (conversation_id, user_id, joined_at)
                 VALUES (?1, ?2, ?3)",
                params![id.to_string(), member.to_string(), now],
            )?;
        }
        tx.commit()?;

        tracing::info!(conversation = %id, "merged members into group");

        self.conversation(id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single conversation (with its member set) by id.
    pub fn conversation(&self, id: ConversationId) -> Result<Conversation> {
        let mut conversation = self
            .conn()
            .query_row(
                "SELECT id, is_group, name, created_at, last_message_at
                 FROM conversations
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_conversation,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;

        conversation.members = self.members_of(id)?;
        Ok(conversation)
    }

    /// List every conversation the user is a member of, most recently
    /// active first.
    pub fn conversations_for_user(&self, user: UserId) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn().prepare(
            "SELECT c.id, c.is_group, c.name, c.created_at, c.last_message_at
             FROM conversations c
             JOIN conversation_members m ON m.conversation_id = c.id
             WHERE m.user_id = ?1
             ORDER BY COALESCE(c.last_message_at, c.created_at) DESC",
        )?;

        let rows = stmt.query_map(params![user.to_string()], row_to_conversation)?;

        let mut conversations = Vec::new();
        for row in rows {
            let mut conversation = row?;
            conversation.members = self.members_of(conversation.id)?;
            conversations.push(conversation);
        }
        Ok(conversations)
    }

    /// Whether the user belongs to the conversation's member set.
    pub fn is_member(&self, id: ConversationId, user: UserId) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM conversation_members
                 WHERE conversation_id = ?1 AND user_id = ?2",
                params![id.to_string(), user.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Load the member set of a conversation.
    fn members_of(&self, id: ConversationId) -> Result<BTreeSet<UserId>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id FROM conversation_members WHERE conversation_id = ?1",
        )?;

        let rows = stmt.query_map(params![id.to_string()], |row| {
            let user_str: String = row.get(0)?;
            user_str.parse::<UserId>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
            })
        })?;

        let mut members = BTreeSet::new();
        for row in rows {
            members.insert(row?);
        }
        Ok(members)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Conversation`] with an empty member set;
/// callers fill the members in afterwards.
fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let id_str: String = row.get(0)?;
    let is_group: bool = row.get(1)?;
    let name: Option<String> = row.get(2)?;
    let created_str: String = row.get(3)?;
    let last_message_str: Option<String> = row.get(4)?;

    let id = id_str
        .parse::<ConversationId>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e)))?;

    let last_message_at: Option<DateTime<Utc>> = last_message_str
        .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e)))?;

    Ok(Conversation {
        id,
        is_group,
        name,
        members: BTreeSet::new(),
        created_at,
        last_message_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageDraft;

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn direct_conversation_is_idempotent_across_argument_order() {
        let (_dir, mut db) = test_db();
        let (a, b) = (UserId::new(), UserId::new());

        let first = db.get_or_create_direct(a, b).unwrap();
        let second = db.get_or_create_direct(b, a).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert!(!first.is_group);
        assert!(first.name.is_none());
        assert_eq!(first.members, BTreeSet::from([a, b]));

        // Still exactly one row.
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn direct_conversation_rejects_self_pair() {
        let (_dir, mut db) = test_db();
        let a = UserId::new();

        assert!(matches!(
            db.get_or_create_direct(a, a),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn group_requires_name_and_two_other_members() {
        let (_dir, mut db) = test_db();
        let creator = UserId::new();
        let (x, y) = (UserId::new(), UserId::new());

        assert!(matches!(
            db.create_group(creator, "  ", &[x, y]),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            db.create_group(creator, "team", &[x]),
            Err(StoreError::Validation(_))
        ));
        // The creator's own id and duplicates do not count toward the two.
        assert!(matches!(
            db.create_group(creator, "team", &[creator, x, x]),
            Err(StoreError::Validation(_))
        ));

        let group = db.create_group(creator, "team", &[x, y]).unwrap();
        assert!(group.is_group);
        assert_eq!(group.name.as_deref(), Some("team"));
        assert_eq!(group.members, BTreeSet::from([creator, x, y]));
    }

    #[test]
    fn add_members_is_set_union() {
        let (_dir, mut db) = test_db();
        let creator = UserId::new();
        let (x, y, z) = (UserId::new(), UserId::new(), UserId::new());

        let group = db.create_group(creator, "team", &[x, y]).unwrap();

        let updated = db.add_members(group.id, &[y, z, z]).unwrap();
        assert_eq!(updated.members, BTreeSet::from([creator, x, y, z]));

        // Repeating the same merge changes nothing.
        let repeated = db.add_members(group.id, &[y, z]).unwrap();
        assert_eq!(repeated.members, updated.members);

        // Empty input is a no-op.
        let unchanged = db.add_members(group.id, &[]).unwrap();
        assert_eq!(unchanged.members, updated.members);
    }

    #[test]
    fn add_members_rejects_direct_conversations() {
        let (_dir, mut db) = test_db();
        let (a, b) = (UserId::new(), UserId::new());

        let direct = db.get_or_create_direct(a, b).unwrap();

        assert!(matches!(
            db.add_members(direct.id, &[UserId::new()]),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn add_members_to_unknown_conversation_is_not_found() {
        let (_dir, mut db) = test_db();

        assert!(matches!(
            db.add_members(ConversationId::new(), &[UserId::new()]),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn conversations_for_user_orders_by_recent_activity() {
        let (_dir, mut db) = test_db();
        let me = UserId::new();
        let (x, y) = (UserId::new(), UserId::new());

        let older = db.get_or_create_direct(me, x).unwrap();
        // Creation timestamps have microsecond precision; keep them distinct.
        std::thread::sleep(std::time::Duration::from_millis(2));
        let newer = db.get_or_create_direct(me, y).unwrap();

        // Most recently created first.
        let listed = db.conversations_for_user(me).unwrap();
        assert_eq!(
            listed.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![newer.id, older.id]
        );

        // A message bumps the older conversation to the front.
        db.send_message(older.id, me, &MessageDraft::text("hi")).unwrap();
        let listed = db.conversations_for_user(me).unwrap();
        assert_eq!(
            listed.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![older.id, newer.id]
        );

        // Non-members see nothing.
        assert!(db.conversations_for_user(UserId::new()).unwrap().is_empty());
    }
}
