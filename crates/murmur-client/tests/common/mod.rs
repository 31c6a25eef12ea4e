#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{SubsecRound, Utc};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use murmur_client::{
    Channel, ChannelCommand, ChannelEnd, ClientConfig, ClientError, Connector, MessageApi,
    SessionController, SessionState,
};
use murmur_types::{Conversation, Message, UserId};

pub fn user(id: &str) -> UserId {
    UserId::parse(id).unwrap()
}

pub fn config(me: &str) -> ClientConfig {
    ClientConfig::new("http://murmur.test", user(me), format!("token-for-{}", me))
}

pub fn message(from: &str, to: &str, content: &str) -> Message {
    let now = Utc::now().trunc_subsecs(3);
    Message {
        id: Uuid::new_v4(),
        sender_id: user(from),
        receiver_id: user(to),
        content: content.into(),
        is_read: false,
        created_at: now,
        updated_at: now,
    }
}

/// Hands out in-process channels and keeps their driver ends for the test.
#[derive(Clone, Default)]
pub struct FakeConnector {
    ends: Arc<Mutex<Vec<ChannelEnd>>>,
    opened: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn take_end(&self) -> ChannelEnd {
        self.ends.lock().unwrap().pop().expect("no channel was opened")
    }
}

impl Connector for FakeConnector {
    fn open(&self) -> Channel {
        let (channel, end) = Channel::pair();
        self.ends.lock().unwrap().push(end);
        self.opened.fetch_add(1, Ordering::SeqCst);
        channel
    }
}

/// Message store stand-in seen from one user's side.
pub struct FakeApi {
    me: UserId,
    messages: Mutex<Vec<Message>>,
    pub fail_sends: AtomicBool,
    pub history_calls: AtomicUsize,
}

impl FakeApi {
    pub fn new(me: &str) -> Arc<Self> {
        Arc::new(Self {
            me: user(me),
            messages: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            history_calls: AtomicUsize::new(0),
        })
    }

    pub fn seed(&self, from: &str, to: &str, content: &str) -> Message {
        let m = message(from, to, content);
        self.messages.lock().unwrap().push(m.clone());
        m
    }

    pub fn stored(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }
}

impl MessageApi for FakeApi {
    async fn history(&self, with: &UserId, limit: u32) -> Result<Vec<Message>, ClientError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let all: Vec<Message> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.involves(&self.me, with))
            .cloned()
            .collect();
        let skip = all.len().saturating_sub(limit as usize);
        Ok(all.into_iter().skip(skip).collect())
    }

    async fn conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        let messages = self.messages.lock().unwrap();
        let mut out: Vec<Conversation> = Vec::new();
        for m in messages.iter().rev() {
            let other = m.counterparty(&self.me).clone();
            let unread = u64::from(m.receiver_id == self.me && !m.is_read);
            match out.iter_mut().find(|c| c.counterparty == other) {
                Some(c) => c.unread_count += unread,
                None => out.push(Conversation {
                    counterparty: other,
                    last_message: m.clone(),
                    unread_count: unread,
                }),
            }
        }
        Ok(out)
    }

    async fn send(&self, receiver: &UserId, content: &str) -> Result<Message, ClientError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("connection refused".into()));
        }
        let m = message(self.me.as_str(), receiver.as_str(), content);
        self.messages.lock().unwrap().push(m.clone());
        Ok(m)
    }

    async fn mark_read(&self, sender: &UserId) -> Result<u64, ClientError> {
        let mut updated = 0;
        for m in self.messages.lock().unwrap().iter_mut() {
            if &m.sender_id == sender && m.receiver_id == self.me && !m.is_read {
                m.is_read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_conversation(&self, with: &UserId) -> Result<u64, ClientError> {
        let mut messages = self.messages.lock().unwrap();
        let before = messages.len();
        messages.retain(|m| !m.involves(&self.me, with));
        Ok((before - messages.len()) as u64)
    }

    async fn unread_total(&self) -> Result<u64, ClientError> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.receiver_id == self.me && !m.is_read)
            .count() as u64)
    }
}

pub async fn wait_for_state(mut rx: watch::Receiver<SessionState>, state: SessionState) {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
        .await
        .expect("timed out waiting for session state")
        .expect("session dropped");
}

pub async fn next_command(end: &mut ChannelEnd) -> ChannelCommand {
    tokio::time::timeout(Duration::from_secs(5), end.commands.recv())
        .await
        .expect("timed out waiting for a command")
        .expect("channel closed")
}

pub fn no_command(end: &mut ChannelEnd) -> bool {
    matches!(end.commands.try_recv(), Err(mpsc::error::TryRecvError::Empty))
}

/// Started session whose channel has reported `Connected`, with the
/// automatic authenticate already drained.
pub async fn connected_session(
    me: &str,
    api: Arc<FakeApi>,
) -> (SessionController<FakeConnector, FakeApi>, FakeConnector, ChannelEnd) {
    let connector = FakeConnector::default();
    let mut session = SessionController::new(&config(me), connector.clone(), api);
    session.start().await;

    let mut end = connector.take_end();
    end.events.send(murmur_client::ChannelEvent::Connected).unwrap();
    wait_for_state(session.watch_state(), SessionState::Connected).await;
    assert!(matches!(
        next_command(&mut end).await,
        ChannelCommand::Emit(murmur_types::events::GatewayCommand::Authenticate { .. })
    ));

    (session, connector, end)
}
