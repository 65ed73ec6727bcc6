//! Handle to the shared Realtime connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use super::connection::ConnectionTask;
use super::types::{ChannelConfig, RealtimeCommand, RealtimeConfig, RealtimeEvent};

const EVENT_BUFFER: usize = 256;
const COMMAND_BUFFER: usize = 64;

/// Cheaply cloneable handle; every clone drives the same socket.
///
/// Commands are queued to the background connection task. The task stops
/// after [`RealtimeClient::disconnect`] or once every handle is dropped.
#[derive(Clone)]
pub struct RealtimeClient {
    commands: mpsc::Sender<RealtimeCommand>,
    connected: Arc<AtomicBool>,
}

impl RealtimeClient {
    /// Spawn the connection task. Events arrive on the returned receiver.
    pub fn connect(config: RealtimeConfig) -> (Self, mpsc::Receiver<RealtimeEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let connected = Arc::new(AtomicBool::new(false));

        let task = ConnectionTask::new(config, Arc::clone(&connected), event_tx, command_rx);
        tokio::spawn(task.run());

        (
            Self {
                commands,
                connected,
            },
            event_rx,
        )
    }

    async fn send(&self, command: RealtimeCommand) {
        if self.commands.send(command).await.is_err() {
            debug!("Realtime connection task has stopped, command dropped");
        }
    }

    /// Join `topic`. Joined topics are re-joined after every reconnect.
    pub async fn join_channel(&self, topic: &str, config: ChannelConfig) {
        self.send(RealtimeCommand::JoinChannel {
            topic: topic.to_string(),
            config,
        })
        .await;
    }

    pub async fn leave_channel(&self, topic: &str) {
        self.send(RealtimeCommand::LeaveChannel {
            topic: topic.to_string(),
        })
        .await;
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Leave every channel and close the socket.
    pub async fn disconnect(&self) {
        self.send(RealtimeCommand::Disconnect).await;
    }
}
