use tokio::sync::broadcast;
use tracing::debug;

use super::models::SessionUser;

const SESSION_CHANNEL_CAPACITY: usize = 32;

/// Session lifecycle notifications for the application shell
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LoggedIn { user: SessionUser },
    LoggedOut,
    TokenRefreshed,
    /// Credentials could not be renewed; the shell should send the user to login
    Expired,
}

/// Broadcast bus for session events
#[derive(Debug, Clone)]
pub struct SessionEvents {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SESSION_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Emits an event to all current subscribers
    pub fn emit(&self, event: SessionEvent) {
        match self.sender.send(event) {
            Ok(receivers) => debug!(receivers, "Session event emitted"),
            Err(_) => debug!("Session event emitted with no receivers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}
