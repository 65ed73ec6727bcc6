//! The task that owns the Realtime WebSocket.
//!
//! One task reads frames, sends heartbeats and applies client commands on
//! the same socket. Joined channels are remembered and re-joined after a
//! reconnect. Commands sent while offline are recorded and take effect on
//! the next connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::handler::interpret;
use super::types::{ChannelConfig, PhoenixMessage, RealtimeCommand, RealtimeConfig, RealtimeEvent};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a connected socket stopped being served.
#[derive(Debug, PartialEq, Eq)]
enum SocketEnd {
    /// Lost the socket; reconnect.
    Dropped,
    /// Disconnect requested or every client handle dropped.
    Stopped,
}

pub(crate) fn next_backoff(current: u64, max: u64) -> u64 {
    current.saturating_mul(2).min(max)
}

pub(crate) struct ConnectionTask {
    config: RealtimeConfig,
    connected: Arc<AtomicBool>,
    events: mpsc::Sender<RealtimeEvent>,
    commands: mpsc::Receiver<RealtimeCommand>,
    joined: HashMap<String, ChannelConfig>,
    last_ref: u64,
}

impl ConnectionTask {
    pub(crate) fn new(
        config: RealtimeConfig,
        connected: Arc<AtomicBool>,
        events: mpsc::Sender<RealtimeEvent>,
        commands: mpsc::Receiver<RealtimeCommand>,
    ) -> Self {
        Self {
            config,
            connected,
            events,
            commands,
            joined: HashMap::new(),
            last_ref: 0,
        }
    }

    fn next_ref(&mut self) -> String {
        self.last_ref += 1;
        self.last_ref.to_string()
    }

    async fn emit(&self, event: RealtimeEvent) {
        let _ = self.events.send(event).await;
    }

    pub(crate) async fn run(mut self) {
        let mut delay = self.config.reconnect_delay_secs;
        loop {
            let url = self.config.ws_url();
            let host = url.split('?').next().unwrap_or_default().to_string();
            info!(url = %host, "Connecting to Supabase Realtime");

            match tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(&url)).await {
                Ok(Ok((socket, _))) => {
                    delay = self.config.reconnect_delay_secs;
                    self.connected.store(true, Ordering::Release);
                    self.emit(RealtimeEvent::Connected).await;

                    let end = self.serve(socket).await;

                    self.connected.store(false, Ordering::Release);
                    self.emit(RealtimeEvent::Disconnected).await;
                    if end == SocketEnd::Stopped {
                        info!("Realtime connection stopped");
                        return;
                    }
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Realtime connect failed");
                    self.emit(RealtimeEvent::Error(format!("connect failed: {e}"))).await;
                }
                Err(_) => {
                    error!(timeout = ?CONNECT_TIMEOUT, "Realtime connect timed out");
                    self.emit(RealtimeEvent::Error("connect timed out".to_string())).await;
                }
            }

            if self.events.is_closed() {
                debug!("No realtime listeners left, not reconnecting");
                return;
            }
            info!(delay_secs = delay, "Reconnecting to Supabase Realtime");
            if !self.wait_offline(Duration::from_secs(delay)).await {
                return;
            }
            delay = next_backoff(delay, self.config.max_reconnect_delay_secs);
        }
    }

    /// Sleep out a reconnect delay while still recording join/leave
    /// commands. `false` once the client asked to stop.
    async fn wait_offline(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(RealtimeCommand::JoinChannel { topic, config }) => {
                        self.joined.insert(topic, config);
                    }
                    Some(RealtimeCommand::LeaveChannel { topic }) => {
                        self.joined.remove(&topic);
                    }
                    Some(RealtimeCommand::Disconnect) | None => return false,
                },
            }
        }
    }

    async fn send(&mut self, socket: &mut Socket, msg: PhoenixMessage) -> bool {
        let text = match serde_json::to_string(&msg) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, event = %msg.event, "Could not encode Phoenix frame");
                return true;
            }
        };
        match socket.send(WsMessage::Text(text.into())).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Realtime send failed");
                false
            }
        }
    }

    async fn serve(&mut self, mut socket: Socket) -> SocketEnd {
        let rejoin: Vec<(String, ChannelConfig)> = self
            .joined
            .iter()
            .map(|(topic, config)| (topic.clone(), config.clone()))
            .collect();
        for (topic, config) in rejoin {
            let msg_ref = self.next_ref();
            if !self.send(&mut socket, PhoenixMessage::join(&topic, &config, msg_ref)).await {
                return SocketEnd::Dropped;
            }
        }

        let period = Duration::from_secs(self.config.heartbeat_interval_secs);
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = socket.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<PhoenixMessage>(&text) {
                            Ok(msg) => {
                                if let Some(event) = interpret(&msg) {
                                    self.emit(event).await;
                                }
                            }
                            Err(_) => debug!(frame = %text, "Unrecognised Realtime frame"),
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!("Supabase Realtime closed the socket");
                        return SocketEnd::Dropped;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Realtime socket error");
                        return SocketEnd::Dropped;
                    }
                    Some(Ok(_)) => {}
                },
                _ = heartbeat.tick() => {
                    let msg_ref = self.next_ref();
                    if !self.send(&mut socket, PhoenixMessage::heartbeat(msg_ref)).await {
                        return SocketEnd::Dropped;
                    }
                }
                command = self.commands.recv() => match command {
                    Some(RealtimeCommand::JoinChannel { topic, config }) => {
                        let msg_ref = self.next_ref();
                        let frame = PhoenixMessage::join(&topic, &config, msg_ref);
                        self.joined.insert(topic, config);
                        if !self.send(&mut socket, frame).await {
                            return SocketEnd::Dropped;
                        }
                    }
                    Some(RealtimeCommand::LeaveChannel { topic }) => {
                        self.joined.remove(&topic);
                        let msg_ref = self.next_ref();
                        if !self.send(&mut socket, PhoenixMessage::leave(&topic, msg_ref)).await {
                            return SocketEnd::Dropped;
                        }
                    }
                    Some(RealtimeCommand::Disconnect) | None => {
                        let topics: Vec<String> = self.joined.drain().map(|(topic, _)| topic).collect();
                        for topic in topics {
                            let msg_ref = self.next_ref();
                            self.send(&mut socket, PhoenixMessage::leave(&topic, msg_ref)).await;
                        }
                        let _ = socket.close(None).await;
                        return SocketEnd::Stopped;
                    }
                },
            }
        }
    }
}
