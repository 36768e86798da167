use std::future::Future;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};
use uuid::Uuid;

use agora_types::events::{GatewayCommand, GatewayEvent};
use agora_types::models::StreamId;

use crate::config::SyncConfig;
use crate::error::ClientError;

/// Why the client should refetch.
#[derive(Debug, Clone)]
pub enum RefreshTrigger {
    Tick,
    Focus,
    Push(GatewayEvent),
}

/// Where refresh triggers come from. The state machine only ever sees
/// triggers, so a timer and a push subscription are interchangeable.
pub trait RefreshSource: Send + 'static {
    /// Next trigger; `None` means the source is exhausted.
    fn next(&mut self) -> impl Future<Output = Option<RefreshTrigger>> + Send;

    /// Called when the viewed stream changes.
    fn retarget(&mut self, _stream: Option<StreamId>) {}
}

/// Fixed-interval polling.
pub struct IntervalSource {
    interval: Interval,
}

impl IntervalSource {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

impl RefreshSource for IntervalSource {
    async fn next(&mut self) -> Option<RefreshTrigger> {
        self.interval.tick().await;
        Some(RefreshTrigger::Tick)
    }

    /// A new stream starts a fresh period instead of inheriting the old timer.
    fn retarget(&mut self, _stream: Option<StreamId>) {
        self.interval.reset();
    }
}

/// Gateway events pushed by the server, with subscription updates sent back.
pub struct PushSource {
    events: mpsc::Receiver<GatewayEvent>,
    commands: mpsc::Sender<GatewayCommand>,
}

impl PushSource {
    pub fn new(events: mpsc::Receiver<GatewayEvent>, commands: mpsc::Sender<GatewayCommand>) -> Self {
        Self { events, commands }
    }

    /// Open the `/gateway` WebSocket, identify, and wait for `Ready`.
    pub async fn connect(config: &SyncConfig) -> Result<Self, ClientError> {
        let url = config.gateway_url();
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        let identify = GatewayCommand::Identify {
            token: config.token.clone(),
        };
        send_command(&mut sink, &identify).await?;

        loop {
            match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<GatewayEvent>(text.as_str()) {
                    Ok(GatewayEvent::Ready { user_id, name }) => {
                        info!("Gateway ready for {} ({})", name, user_id);
                        break;
                    }
                    Ok(other) => debug!("Ignoring pre-Ready event: {:?}", other),
                    Err(e) => warn!("Malformed gateway frame: {}", e),
                },
                Some(Ok(WsMessage::Close(_))) | None => return Err(ClientError::Unauthorized),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(ClientError::Network(e.to_string())),
            }
        }

        let (event_tx, event_rx) = mpsc::channel(64);
        let (command_tx, mut command_rx) = mpsc::channel::<GatewayCommand>(8);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = stream.next() => match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            match serde_json::from_str::<GatewayEvent>(text.as_str()) {
                                Ok(event) => {
                                    if event_tx.send(event).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => warn!("Malformed gateway frame: {}", e),
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("Gateway read failed: {}", e);
                            break;
                        }
                    },
                    command = command_rx.recv() => match command {
                        Some(command) => {
                            if send_command(&mut sink, &command).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            debug!("Gateway connection closed");
        });

        Ok(Self::new(event_rx, command_tx))
    }
}

async fn send_command<S>(sink: &mut S, command: &GatewayCommand) -> Result<(), ClientError>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = serde_json::to_string(command).map_err(|e| ClientError::Network(e.to_string()))?;
    sink.send(WsMessage::Text(json.into()))
        .await
        .map_err(|e| ClientError::Network(e.to_string()))
}

impl RefreshSource for PushSource {
    async fn next(&mut self) -> Option<RefreshTrigger> {
        self.events.recv().await.map(RefreshTrigger::Push)
    }

    fn retarget(&mut self, stream: Option<StreamId>) {
        let stream_ids: Vec<Uuid> = stream.map(|s| s.id()).into_iter().collect();
        if self
            .commands
            .try_send(GatewayCommand::Subscribe { stream_ids })
            .is_err()
        {
            warn!("Gateway subscription update dropped");
        }
    }
}
