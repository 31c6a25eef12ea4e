use crate::models::{ConversationRow, MessageRow};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, Row};

const MESSAGE_COLUMNS: &str =
    "id, sender_id, receiver_id, content, is_read, created_at, updated_at";

impl Database {
    // -- Messages --

    pub fn insert_message(&self, row: &MessageRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, content, is_read, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    row.id,
                    row.sender_id,
                    row.receiver_id,
                    row.content,
                    row.is_read,
                    row.created_at,
                    row.updated_at
                ],
            )?;
            Ok(())
        })
    }

    /// Most recent `limit` messages between the pair, newest first.
    pub fn get_messages_between(&self, a: &str, b: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages_between(conn, a, b, limit))
    }

    /// Flip unread messages from `sender` to `receiver`. Returns rows changed.
    pub fn mark_read(&self, receiver: &str, sender: &str, now: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_read = 1, updated_at = ?3
                 WHERE receiver_id = ?1 AND sender_id = ?2 AND is_read = 0",
                (receiver, sender, now),
            )?;
            Ok(changed as u64)
        })
    }

    pub fn get_conversations(&self, user: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| query_conversations(conn, user))
    }

    /// Delete every message in both directions between the pair.
    pub fn delete_conversation(&self, a: &str, b: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)",
                (a, b),
            )?;
            Ok(deleted as u64)
        })
    }

    pub fn count_unread(&self, user: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE receiver_id = ?1 AND is_read = 0",
                [user],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        is_read: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn query_messages_between(
    conn: &Connection,
    a: &str,
    b: &str,
    limit: u32,
) -> Result<Vec<MessageRow>> {
    // rowid breaks ties between messages stored within the same millisecond
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS}
         FROM messages
         WHERE (sender_id = ?1 AND receiver_id = ?2)
            OR (sender_id = ?2 AND receiver_id = ?1)
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt
        .query_map(rusqlite::params![a, b, limit], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_conversations(conn: &Connection, user: &str) -> Result<Vec<ConversationRow>> {
    // One row per counterparty: its latest message plus the unread tally.
    let mut stmt = conn.prepare(
        "WITH mine AS (
             SELECT rowid AS rid, id, sender_id, receiver_id, content, is_read, created_at, updated_at,
                    CASE WHEN sender_id = ?1 THEN receiver_id ELSE sender_id END AS other
             FROM messages
             WHERE sender_id = ?1 OR receiver_id = ?1
         ),
         ranked AS (
             SELECT *,
                    ROW_NUMBER() OVER (PARTITION BY other ORDER BY created_at DESC, rid DESC) AS rn,
                    SUM(CASE WHEN receiver_id = ?1 AND is_read = 0 THEN 1 ELSE 0 END)
                        OVER (PARTITION BY other) AS unread
             FROM mine
         )
         SELECT id, sender_id, receiver_id, content, is_read, created_at, updated_at, other, unread
         FROM ranked
         WHERE rn = 1
         ORDER BY created_at DESC, other ASC",
    )?;

    let rows = stmt
        .query_map([user], |row| {
            Ok(ConversationRow {
                last_message: message_from_row(row)?,
                counterparty: row.get(7)?,
                unread_count: row.get::<_, i64>(8)? as u64,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
