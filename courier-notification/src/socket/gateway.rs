use async_trait::async_trait;
use socketioxide::SocketIo;

use super::connection_room;
use crate::services::push::{PushError, PushEvent, PushGateway};

/// Emits on the connection's private room, with the topic as the event name.
#[derive(Clone)]
pub struct SocketIoPushGateway {
    io: SocketIo,
}

impl SocketIoPushGateway {
    pub fn new(io: SocketIo) -> Self {
        Self { io }
    }
}

#[async_trait]
impl PushGateway for SocketIoPushGateway {
    async fn send(&self, connection_id: &str, event: &PushEvent) -> Result<(), PushError> {
        self.io
            .to(connection_room(connection_id))
            .emit(event.topic(), event)
            .map_err(|e| PushError::Transport(e.to_string()))
    }
}
