use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use tracing::{debug, error, info};
use uuid::Uuid;

use murmur_types::models::normalize_content;
use murmur_types::{Conversation, Message, UserId};

use crate::Database;
use crate::error::{StoreError, invalid_id};
use crate::models::{ConversationRow, MessageRow};

pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
pub const MAX_HISTORY_LIMIT: u32 = 200;

/// Durable direct-message persistence.
///
/// All SQL runs on the blocking pool so callers on the async runtime never
/// stall on SQLite.
#[derive(Clone)]
pub struct MessageStore {
    db: Arc<Database>,
}

impl MessageStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Validate and persist a new unread message.
    pub async fn send(
        &self,
        sender: &str,
        receiver: &str,
        content: &str,
    ) -> Result<Message, StoreError> {
        let sender = UserId::parse(sender).map_err(|e| invalid_id("sender", e))?;
        let receiver = UserId::parse(receiver).map_err(|e| invalid_id("receiver", e))?;
        let content = normalize_content(content)?;

        // stored with millisecond precision; keep the returned copy identical
        let now = Utc::now().trunc_subsecs(3);
        let message = Message {
            id: Uuid::new_v4(),
            sender_id: sender,
            receiver_id: receiver,
            content,
            is_read: false,
            created_at: now,
            updated_at: now,
        };

        let row = to_row(&message);
        self.blocking(move |db| db.insert_message(&row)).await?;

        debug!(
            "Stored message {} from {} to {}",
            message.id, message.sender_id, message.receiver_id
        );
        Ok(message)
    }

    /// The most recent `limit` messages between the pair, oldest first.
    pub async fn history(
        &self,
        a: &str,
        b: &str,
        limit: u32,
    ) -> Result<Vec<Message>, StoreError> {
        let a = UserId::parse(a).map_err(|e| invalid_id("user", e))?;
        let b = UserId::parse(b).map_err(|e| invalid_id("conversation partner", e))?;
        let limit = limit.clamp(1, MAX_HISTORY_LIMIT);

        let rows = self
            .blocking(move |db| db.get_messages_between(a.as_str(), b.as_str(), limit))
            .await?;

        // Query returns newest first so LIMIT keeps the tail; flip for display.
        let mut messages = rows
            .into_iter()
            .map(from_row)
            .collect::<anyhow::Result<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// Mark everything `counterparty` sent to `me` as read. Returns how many
    /// messages changed; a repeat call returns 0.
    pub async fn mark_read(&self, me: &str, counterparty: &str) -> Result<u64, StoreError> {
        let me = UserId::parse(me).map_err(|e| invalid_id("user", e))?;
        let counterparty = UserId::parse(counterparty).map_err(|e| invalid_id("sender", e))?;
        let now = timestamp(Utc::now());

        let updated = self
            .blocking(move |db| db.mark_read(me.as_str(), counterparty.as_str(), &now))
            .await?;
        Ok(updated)
    }

    /// One entry per counterparty, most recent activity first.
    pub async fn conversations_for(&self, me: &str) -> Result<Vec<Conversation>, StoreError> {
        let me = UserId::parse(me).map_err(|e| invalid_id("user", e))?;

        let rows = self
            .blocking(move |db| db.get_conversations(me.as_str()))
            .await?;

        let conversations = rows
            .into_iter()
            .map(conversation_from_row)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(conversations)
    }

    /// Irreversibly remove every message between the pair.
    pub async fn delete_conversation(
        &self,
        me: &str,
        counterparty: &str,
    ) -> Result<u64, StoreError> {
        let me = UserId::parse(me).map_err(|e| invalid_id("user", e))?;
        let counterparty = UserId::parse(counterparty)
            .map_err(|e| invalid_id("conversation partner", e))?;

        let log_me = me.clone();
        let log_other = counterparty.clone();
        let deleted = self
            .blocking(move |db| db.delete_conversation(me.as_str(), counterparty.as_str()))
            .await?;

        info!(
            "Deleted {} messages between users {} and {}",
            deleted, log_me, log_other
        );
        Ok(deleted)
    }

    /// Total unread messages addressed to `me` across all conversations.
    pub async fn unread_total(&self, me: &str) -> Result<u64, StoreError> {
        let me = UserId::parse(me).map_err(|e| invalid_id("user", e))?;
        let total = self.blocking(move |db| db.count_unread(me.as_str())).await?;
        Ok(total)
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                StoreError::Storage(anyhow!("database task failed: {}", e))
            })?
            .map_err(|e| {
                error!("Database error: {:#}", e);
                StoreError::Storage(e)
            })
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("corrupt timestamp '{}'", raw))?
        .with_timezone(&Utc))
}

fn to_row(message: &Message) -> MessageRow {
    MessageRow {
        id: message.id.to_string(),
        sender_id: message.sender_id.to_string(),
        receiver_id: message.receiver_id.to_string(),
        content: message.content.clone(),
        is_read: message.is_read,
        created_at: timestamp(message.created_at),
        updated_at: timestamp(message.updated_at),
    }
}

fn from_row(row: MessageRow) -> anyhow::Result<Message> {
    Ok(Message {
        id: row
            .id
            .parse::<Uuid>()
            .with_context(|| format!("corrupt message id '{}'", row.id))?,
        sender_id: UserId::parse(&row.sender_id)
            .with_context(|| format!("corrupt sender_id on message '{}'", row.id))?,
        receiver_id: UserId::parse(&row.receiver_id)
            .with_context(|| format!("corrupt receiver_id on message '{}'", row.id))?,
        content: row.content,
        is_read: row.is_read,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
    })
}

fn conversation_from_row(row: ConversationRow) -> anyhow::Result<Conversation> {
    Ok(Conversation {
        counterparty: UserId::parse(&row.counterparty)
            .with_context(|| format!("corrupt counterparty '{}'", row.counterparty))?,
        last_message: from_row(row.last_message)?,
        unread_count: row.unread_count,
    })
}
