//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `users`, `conversations`,
//! `conversation_members`, and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (directory entries)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY NOT NULL,    -- UUID, assigned by the auth provider
    full_name  TEXT NOT NULL,
    gender     TEXT NOT NULL,                -- 'female' | 'male' | 'other'
    email      TEXT NOT NULL,
    online     INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1
    last_seen  TEXT,                         -- ISO-8601 / RFC-3339, NULL until first transition
    created_at TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Conversations
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id              TEXT PRIMARY KEY NOT NULL,  -- deterministic UUID for direct, v4 for groups
    is_group        INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    name            TEXT,                       -- NULL for direct conversations
    created_at      TEXT NOT NULL,
    last_message_at TEXT                        -- high-water mark for message timestamps
);

-- ----------------------------------------------------------------
-- Conversation membership (set semantics via composite PK)
-- ----------------------------------------------------------------
-- user_id is a weak reference: the directory may not (yet) hold a
-- profile for every member, so there is deliberately no FK to users.
CREATE TABLE IF NOT EXISTS conversation_members (
    conversation_id TEXT NOT NULL,
    user_id         TEXT NOT NULL,
    joined_at       TEXT NOT NULL,

    PRIMARY KEY (conversation_id, user_id),
    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_members_user_id
    ON conversation_members(user_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    conversation_id TEXT NOT NULL,              -- FK -> conversations(id)
    sender_id       TEXT NOT NULL,              -- weak reference, no FK
    text            TEXT NOT NULL DEFAULT '',
    image_url       TEXT,
    created_at      TEXT NOT NULL,              -- store-assigned, monotonic per conversation
    deleted         INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    edited          INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    edited_at       TEXT,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
    ON messages(conversation_id, created_at ASC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
