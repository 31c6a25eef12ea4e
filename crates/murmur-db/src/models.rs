//! Database row types. These map directly to SQLite rows and stay
//! independent of the murmur-types API models.

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: String,
    pub updated_at: String,
}

pub struct ConversationRow {
    pub counterparty: String,
    pub last_message: MessageRow,
    pub unread_count: u64,
}
