use std::collections::HashMap;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use murmur_types::UserId;
use murmur_types::events::{GatewayCommand, GatewayEvent};

use crate::config::ClientConfig;
use crate::session::ChannelHandle;

/// Debounces local keystrokes for one counterparty into one
/// `typing_start` / `typing_stop` pair per burst.
pub struct TypingNotifier {
    handle: ChannelHandle,
    counterparty: UserId,
    idle: Duration,
    timer: Option<JoinHandle<()>>,
}

impl TypingNotifier {
    pub fn new(handle: ChannelHandle, counterparty: UserId, idle: Duration) -> Self {
        Self {
            handle,
            counterparty,
            idle,
            timer: None,
        }
    }

    /// Notifier using the configured `typing_idle`.
    pub fn from_config(config: &ClientConfig, handle: ChannelHandle, counterparty: UserId) -> Self {
        Self::new(handle, counterparty, config.typing_idle)
    }

    pub fn counterparty(&self) -> &UserId {
        &self.counterparty
    }

    /// True while a burst is open, i.e. the trailing stop has not fired yet.
    pub fn is_typing(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Record a keystroke. Returns whether this opened a burst.
    pub fn keystroke(&mut self) -> bool {
        let opened = !self.is_typing();
        if opened {
            self.handle.emit(GatewayCommand::TypingStart {
                receiver_id: self.counterparty.to_string(),
            });
        }

        if let Some(timer) = self.timer.take() {
            timer.abort();
        }

        let handle = self.handle.clone();
        let receiver_id = self.counterparty.to_string();
        let idle = self.idle;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            handle.emit(GatewayCommand::TypingStop { receiver_id });
        }));

        opened
    }

    /// The message went out: close the burst now instead of waiting.
    pub fn sent(&mut self) {
        let open = self.is_typing();
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if open {
            self.handle.emit(GatewayCommand::TypingStop {
                receiver_id: self.counterparty.to_string(),
            });
        }
    }
}

impl Drop for TypingNotifier {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Which counterparties are currently shown as typing.
///
/// Entries expire on their own so a lost `user_stopped_typing` does not
/// leave the indicator on forever.
#[derive(Debug)]
pub struct TypingTracker {
    expiry: Duration,
    typing: HashMap<UserId, Instant>,
}

impl TypingTracker {
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            typing: HashMap::new(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.typing_expiry)
    }

    /// Feed an inbound event. Returns whether the visible set changed.
    pub fn apply(&mut self, event: &GatewayEvent) -> bool {
        match event {
            GatewayEvent::UserTyping { user_id } => {
                let was = self.is_typing(user_id);
                self.typing.insert(user_id.clone(), Instant::now() + self.expiry);
                !was
            }
            GatewayEvent::UserStoppedTyping { user_id } => {
                let was = self.is_typing(user_id);
                self.typing.remove(user_id);
                was
            }
            // A message from them ends their burst
            GatewayEvent::ReceiveMessage(message) => {
                let was = self.is_typing(&message.sender_id);
                self.typing.remove(&message.sender_id);
                was
            }
            _ => false,
        }
    }

    pub fn is_typing(&self, user: &UserId) -> bool {
        self.typing
            .get(user)
            .is_some_and(|deadline| *deadline > Instant::now())
    }

    /// Currently typing counterparties, sorted.
    pub fn typing_users(&self) -> Vec<UserId> {
        let now = Instant::now();
        let mut users: Vec<UserId> = self
            .typing
            .iter()
            .filter(|(_, deadline)| **deadline > now)
            .map(|(user, _)| user.clone())
            .collect();
        users.sort();
        users
    }

    /// Forget expired entries.
    pub fn prune(&mut self) {
        let now = Instant::now();
        self.typing.retain(|_, deadline| *deadline > now);
    }
}
