use std::sync::Arc;
use std::time::Duration;

use chrono::{SubsecRound, Utc};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use murmur_types::events::{GatewayCommand, GatewayEvent};
use murmur_types::models::normalize_content;
use murmur_types::{Conversation, Message, UserId};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::rest::MessageApi;
use crate::session::ChannelHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Shown optimistically, not yet confirmed by the server
    Pending,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadEntry {
    pub message: Message,
    pub status: DeliveryStatus,
}

impl ThreadEntry {
    fn delivered(message: Message) -> Self {
        Self {
            message,
            status: DeliveryStatus::Delivered,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == DeliveryStatus::Pending
    }
}

#[derive(Debug)]
enum ViewTask {
    RefetchHistory(UserId),
}

/// In-memory model behind a chat screen: the conversation list plus the
/// thread of the selected counterparty.
pub struct ConversationView<A: MessageApi> {
    api: Arc<A>,
    channel: ChannelHandle,
    me: UserId,
    refetch_delay: Duration,
    history_limit: u32,

    conversations: Vec<Conversation>,
    selected: Option<UserId>,
    thread: Vec<ThreadEntry>,
    error: Option<ClientError>,

    tasks_tx: mpsc::UnboundedSender<ViewTask>,
    tasks_rx: mpsc::UnboundedReceiver<ViewTask>,
    undelivered: broadcast::Receiver<GatewayCommand>,
}

impl<A: MessageApi> ConversationView<A> {
    pub fn new(config: &ClientConfig, api: Arc<A>, channel: ChannelHandle) -> Self {
        let (tasks_tx, tasks_rx) = mpsc::unbounded_channel();
        Self {
            api,
            me: channel.user().clone(),
            undelivered: channel.subscribe_undelivered(),
            channel,
            refetch_delay: config.refetch_delay,
            history_limit: config.history_limit,
            conversations: Vec::new(),
            selected: None,
            thread: Vec::new(),
            error: None,
            tasks_tx,
            tasks_rx,
        }
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn selected(&self) -> Option<&UserId> {
        self.selected.as_ref()
    }

    pub fn thread(&self) -> &[ThreadEntry] {
        &self.thread
    }

    pub fn error(&self) -> Option<&ClientError> {
        self.error.as_ref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub async fn refresh_conversations(&mut self) -> Result<(), ClientError> {
        self.conversations = self.api.conversations().await?;
        Ok(())
    }

    /// Open a conversation: load its history, mark it read and refresh the
    /// unread badge.
    pub async fn select(&mut self, counterparty: UserId) -> Result<(), ClientError> {
        self.error = None;
        self.selected = Some(counterparty.clone());
        self.thread.clear();
        self.channel.set_active_conversation(Some(counterparty.clone()));

        let result = self.open(&counterparty).await;
        if let Err(e) = &result {
            self.error = Some(e.clone());
        }
        result
    }

    async fn open(&mut self, counterparty: &UserId) -> Result<(), ClientError> {
        self.load_history(counterparty).await?;

        let updated = self.api.mark_read(counterparty).await?;
        debug!("Marked {} messages from {} as read", updated, counterparty);
        if let Some(conv) = self.conversation_mut(counterparty) {
            conv.unread_count = 0;
        }

        self.refresh_unread().await
    }

    /// Send to the selected counterparty over the live channel, or over REST
    /// when the channel is down.
    pub async fn send(&mut self, content: &str) -> Result<(), ClientError> {
        let content = normalize_content(content).map_err(|e| ClientError::Validation(e.to_string()))?;
        let Some(to) = self.selected.clone() else {
            return Err(ClientError::Validation("no conversation selected".into()));
        };

        let now = Utc::now().trunc_subsecs(3);
        let local_id = Uuid::new_v4();
        self.thread.push(ThreadEntry {
            message: Message {
                id: local_id,
                sender_id: self.me.clone(),
                receiver_id: to.clone(),
                content: content.clone(),
                is_read: false,
                created_at: now,
                updated_at: now,
            },
            status: DeliveryStatus::Pending,
        });

        let emitted = self.channel.emit(GatewayCommand::SendMessage {
            receiver_id: to.to_string(),
            content: content.clone(),
            sender_id: None,
        });
        if emitted {
            return Ok(());
        }

        debug!("Channel down, sending to {} over REST", to);
        self.send_over_rest(local_id, to, &content).await
    }

    async fn send_over_rest(&mut self, local_id: Uuid, to: UserId, content: &str) -> Result<(), ClientError> {
        match self.api.send(&to, content).await {
            Ok(stored) => {
                self.confirm(local_id, stored.clone());
                self.touch_summary(&stored, false);
                self.schedule_refetch(to);
                Ok(())
            }
            Err(e) => {
                warn!("REST send to {} failed: {}", to, e);
                self.mark_failed(local_id);
                self.error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Retry over REST any send the channel dropped after accepting it.
    async fn resend_undelivered(&mut self) -> usize {
        let mut resent = 0;
        loop {
            let cmd = match self.undelivered.try_recv() {
                Ok(cmd) => cmd,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Missed {} undelivered commands", skipped);
                    continue;
                }
                Err(_) => break,
            };
            let GatewayCommand::SendMessage { receiver_id, content, .. } = cmd else {
                continue;
            };

            let local = self.thread.iter().find(|e| {
                e.is_pending() && e.message.receiver_id.as_str() == receiver_id && e.message.content == content
            });
            let Some((local_id, to)) = local.map(|e| (e.message.id, e.message.receiver_id.clone())) else {
                continue;
            };

            debug!("Live send to {} was dropped, retrying over REST", to);
            // failure is recorded on the entry and in `error`
            let _ = self.send_over_rest(local_id, to, &content).await;
            resent += 1;
        }
        resent
    }

    /// Fold one inbound gateway event into the model.
    pub fn apply_event(&mut self, event: &GatewayEvent) {
        match event {
            GatewayEvent::ReceiveMessage(message) => {
                let counterparty = message.counterparty(&self.me).clone();
                let open = self.selected.as_ref() == Some(&counterparty);
                if open && !self.contains(message.id) {
                    // a self-message arrives here before its ack
                    let local = if message.sender_id == self.me {
                        self.oldest_pending_matching(message)
                    } else {
                        None
                    };
                    match local {
                        Some(local_id) => self.confirm(local_id, message.clone()),
                        None => self.thread.push(ThreadEntry::delivered(message.clone())),
                    }
                }
                let unread = !open && message.receiver_id == self.me;
                self.touch_summary(message, unread);
            }

            GatewayEvent::MessageSent(message) => {
                let counterparty = message.counterparty(&self.me).clone();
                if self.selected.as_ref() == Some(&counterparty) && !self.contains(message.id) {
                    match self.oldest_pending_matching(message) {
                        Some(local_id) => self.confirm(local_id, message.clone()),
                        None => self.thread.push(ThreadEntry::delivered(message.clone())),
                    }
                }
                self.touch_summary(message, false);
            }

            GatewayEvent::MessageError { error } => {
                warn!("Server refused a message: {}", error);
                self.error = Some(ClientError::Validation(error.clone()));
                if let Some(entry) = self.thread.iter_mut().find(|e| e.is_pending()) {
                    entry.status = DeliveryStatus::Failed;
                }
            }

            _ => {}
        }
    }

    /// Remove a conversation for both participants.
    pub async fn delete_conversation(&mut self, counterparty: &UserId) -> Result<u64, ClientError> {
        let deleted = match self.api.delete_conversation(counterparty).await {
            Ok(deleted) => deleted,
            Err(e) => {
                self.error = Some(e.clone());
                return Err(e);
            }
        };

        if self.selected.as_ref() == Some(counterparty) {
            self.selected = None;
            self.thread.clear();
            self.channel.set_active_conversation(None);
        }

        self.refresh_conversations().await?;
        self.refresh_unread().await?;
        Ok(deleted)
    }

    /// Resend dropped live sends over REST, then run any scheduled re-fetches
    /// that have come due. Returns how many tasks ran.
    pub async fn run_due_tasks(&mut self) -> Result<usize, ClientError> {
        let mut ran = self.resend_undelivered().await;
        while let Ok(task) = self.tasks_rx.try_recv() {
            match task {
                ViewTask::RefetchHistory(counterparty) => {
                    // Selection moved on; nothing to reconcile
                    if self.selected.as_ref() != Some(&counterparty) {
                        continue;
                    }
                    self.load_history(&counterparty).await?;
                    ran += 1;
                }
            }
        }
        Ok(ran)
    }

    async fn load_history(&mut self, counterparty: &UserId) -> Result<(), ClientError> {
        let history = self.api.history(counterparty, self.history_limit).await?;

        // Unconfirmed local entries survive a reload
        let local: Vec<ThreadEntry> = self
            .thread
            .drain(..)
            .filter(|e| e.status != DeliveryStatus::Delivered)
            .filter(|e| !history.iter().any(|m| m.id == e.message.id))
            .collect();

        self.thread = history.into_iter().map(ThreadEntry::delivered).collect();
        self.thread.extend(local);
        Ok(())
    }

    async fn refresh_unread(&mut self) -> Result<(), ClientError> {
        let total = self.api.unread_total().await?;
        self.channel.set_unread_count(total);
        Ok(())
    }

    fn schedule_refetch(&self, counterparty: UserId) {
        let tx = self.tasks_tx.clone();
        let delay = self.refetch_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ViewTask::RefetchHistory(counterparty));
        });
    }

    fn contains(&self, id: Uuid) -> bool {
        self.thread.iter().any(|e| e.message.id == id)
    }

    fn oldest_pending_matching(&self, message: &Message) -> Option<Uuid> {
        self.thread
            .iter()
            .find(|e| {
                e.is_pending()
                    && e.message.receiver_id == message.receiver_id
                    && e.message.content == message.content
            })
            .map(|e| e.message.id)
    }

    fn confirm(&mut self, local_id: Uuid, stored: Message) {
        if let Some(entry) = self.thread.iter_mut().find(|e| e.message.id == local_id) {
            *entry = ThreadEntry::delivered(stored);
        }
    }

    fn mark_failed(&mut self, local_id: Uuid) {
        if let Some(entry) = self.thread.iter_mut().find(|e| e.message.id == local_id) {
            entry.status = DeliveryStatus::Failed;
        }
    }

    fn conversation_mut(&mut self, counterparty: &UserId) -> Option<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|c| &c.counterparty == counterparty)
    }

    /// Move the conversation to the top with `message` as its last message.
    fn touch_summary(&mut self, message: &Message, count_unread: bool) {
        let counterparty = message.counterparty(&self.me).clone();

        let mut conv = match self
            .conversations
            .iter()
            .position(|c| c.counterparty == counterparty)
        {
            Some(pos) => self.conversations.remove(pos),
            None => Conversation {
                counterparty,
                last_message: message.clone(),
                unread_count: 0,
            },
        };

        conv.last_message = message.clone();
        if count_unread {
            conv.unread_count += 1;
        }
        self.conversations.insert(0, conv);
    }
}
