use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bluest::Uuid;
use tokio::sync::mpsc::{self, UnboundedSender};

use super::{channel_notifications, Notifications, Transport};
use crate::error::TransportError;

#[derive(Default)]
pub(crate) struct MockState {
    pub connected: bool,
    pub connects: usize,
    pub disconnects: usize,
    pub subscribes: usize,
    pub writes: Vec<Vec<u8>>,
    /// Notifications to emit when a command is written
    pub responses: HashMap<Vec<u8>, Vec<Vec<u8>>>,
    /// Number of connect attempts that fail before one succeeds
    pub failing_connects: usize,
    pub fail_disconnect: bool,
    sender: Option<UnboundedSender<Vec<u8>>>,
}

/// Scripted device. Clones share state, so a test keeps one to inspect calls.
#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn respond(self, command: &[u8], notifications: Vec<Vec<u8>>) -> Self {
        self.state()
            .responses
            .insert(command.to_vec(), notifications);
        self
    }

    pub fn failing_connects(self, count: usize) -> Self {
        self.state().failing_connects = count;
        self
    }

    pub fn failing_disconnect(self) -> Self {
        self.state().fail_disconnect = true;
        self
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Emit a notification outside of any command.
    pub fn notify(&self, data: &[u8]) {
        if let Some(sender) = &self.state().sender {
            let _ = sender.send(data.to_vec());
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn is_connected(&self) -> bool {
        self.state().connected
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state();
        state.connects += 1;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(TransportError::Connect("device out of range".to_string()));
        }
        state.connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, _characteristic: Uuid) -> Result<Notifications, TransportError> {
        let mut state = self.state();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribes += 1;
        state.sender = Some(tx);
        Ok(channel_notifications(rx))
    }

    async fn unsubscribe(&mut self, _characteristic: Uuid) -> Result<(), TransportError> {
        self.state().sender = None;
        Ok(())
    }

    async fn write(&mut self, _characteristic: Uuid, data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        state.writes.push(data.to_vec());
        if let (Some(sender), Some(responses)) = (&state.sender, state.responses.get(data)) {
            for response in responses {
                let _ = sender.send(response.clone());
            }
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state();
        state.disconnects += 1;
        state.sender = None;
        if state.fail_disconnect {
            return Err(TransportError::Disconnect("link busy".to_string()));
        }
        state.connected = false;
        Ok(())
    }
}
