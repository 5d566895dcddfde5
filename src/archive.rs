/// Archive database
///
/// SQLite-backed persistence for the chat, reaction and user tables, plus the
/// "update pending" flag the ingestion job raises when tables changed on
/// disk. A missing database file is the valid "no data yet" state: opening
/// creates an empty schema and every loader returns an empty table.
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::model::{MessageKind, MessageRecord, ReactionRecord, UserRecord, UserTable};

const UPDATE_FLAG_KEY: &str = "update_required";

/// Database handle for archive table operations.
pub struct ArchiveDb {
    conn: Connection,
}

impl ArchiveDb {
    /// Open or create the archive database inside the data directory.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
        let db_path = data_dir.join("archive.sqlite");
        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                message_id INTEGER NOT NULL PRIMARY KEY,
                username TEXT NOT NULL,
                ts INTEGER NOT NULL,
                kind TEXT NOT NULL,
                text TEXT NOT NULL DEFAULT '',
                reaction_emojis TEXT NOT NULL DEFAULT '[]'
            )",
            [],
        )
        .context("Failed to create messages table")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS reactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                reacting_username TEXT NOT NULL,
                reacted_to_username TEXT NOT NULL,
                emoji TEXT NOT NULL,
                ts INTEGER NOT NULL
            )",
            [],
        )
        .context("Failed to create reactions table")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER NOT NULL PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                nicknames TEXT NOT NULL DEFAULT '[]'
            )",
            [],
        )
        .context("Failed to create users table")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT NOT NULL PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create meta table")?;

        Ok(Self { conn })
    }

    fn timestamp_from_millis(millis: i64) -> Result<DateTime<Utc>> {
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| anyhow!("Invalid timestamp in archive: {}", millis))
    }

    /// Load the chat table, chronologically ordered. The order is
    /// load-bearing: ranking tie-breaks fall back to it.
    pub fn load_messages(&self) -> Result<Vec<MessageRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT message_id, username, ts, kind, text, reaction_emojis
             FROM messages ORDER BY ts, message_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (message_id, username, ts, kind, text, emojis) =
                row.context("Failed to read message row")?;
            messages.push(MessageRecord {
                message_id,
                username,
                timestamp: Self::timestamp_from_millis(ts)?,
                kind: kind
                    .parse::<MessageKind>()
                    .map_err(|e| anyhow!("Corrupt message row {}: {}", message_id, e))?,
                text,
                reaction_emojis: serde_json::from_str(&emojis).with_context(|| {
                    format!("Corrupt reaction emoji list on message {}", message_id)
                })?,
            });
        }
        Ok(messages)
    }

    /// Load the reaction event table, chronologically ordered.
    pub fn load_reactions(&self) -> Result<Vec<ReactionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT reacting_username, reacted_to_username, emoji, ts
             FROM reactions ORDER BY ts, id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut reactions = Vec::new();
        for row in rows {
            let (reacting_username, reacted_to_username, emoji, ts) =
                row.context("Failed to read reaction row")?;
            reactions.push(ReactionRecord {
                reacting_username,
                reacted_to_username,
                emoji,
                timestamp: Self::timestamp_from_millis(ts)?,
            });
        }
        Ok(reactions)
    }

    /// Load the user table in persisted row order.
    pub fn load_users(&self) -> Result<UserTable> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id, username, nicknames FROM users ORDER BY user_id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut users = Vec::new();
        for row in rows {
            let (user_id, username, nicknames) = row.context("Failed to read user row")?;
            users.push(UserRecord {
                user_id,
                username,
                nicknames: serde_json::from_str(&nicknames)
                    .with_context(|| format!("Corrupt nickname list for user {}", user_id))?,
            });
        }
        Ok(UserTable::new(users))
    }

    /// Persist the full user table (upsert by id).
    pub fn save_users(&self, users: &UserTable) -> Result<()> {
        for user in users.iter() {
            self.conn
                .execute(
                    "INSERT INTO users (user_id, username, nicknames)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(user_id) DO UPDATE SET
                        username = excluded.username,
                        nicknames = excluded.nicknames",
                    params![
                        user.user_id,
                        user.username,
                        serde_json::to_string(&user.nicknames)?
                    ],
                )
                .with_context(|| format!("Failed to save user {}", user.user_id))?;
        }
        Ok(())
    }

    /// Insert one message row (ingestion-side entry point).
    pub fn insert_message(&self, message: &MessageRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO messages
                    (message_id, username, ts, kind, text, reaction_emojis)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.message_id,
                    message.username,
                    message.timestamp.timestamp_millis(),
                    message.kind.as_str(),
                    message.text,
                    serde_json::to_string(&message.reaction_emojis)?
                ],
            )
            .with_context(|| format!("Failed to insert message {}", message.message_id))?;
        Ok(())
    }

    /// Insert one reaction event row (ingestion-side entry point).
    pub fn insert_reaction(&self, reaction: &ReactionRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO reactions (reacting_username, reacted_to_username, emoji, ts)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    reaction.reacting_username,
                    reaction.reacted_to_username,
                    reaction.emoji,
                    reaction.timestamp.timestamp_millis()
                ],
            )
            .context("Failed to insert reaction")?;
        Ok(())
    }

    /// Whether the ingestion job has flagged the tables as changed.
    pub fn update_pending(&self) -> Result<bool> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![UPDATE_FLAG_KEY],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read update flag")?;
        Ok(value.as_deref() == Some("1"))
    }

    /// Raise or clear the update flag.
    pub fn set_update_pending(&self, pending: bool) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO meta (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![UPDATE_FLAG_KEY, if pending { "1" } else { "0" }],
            )
            .context("Failed to write update flag")?;
        Ok(())
    }
}
