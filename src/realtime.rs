use crate::remote::{RemoteClient, TABLE};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle, time};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const JOIN_REF: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Unsubscribed,
    Subscribing,
    Active,
}

#[derive(Debug, Error)]
enum ChannelError {
    #[error("websocket: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("join rejected: {0}")]
    Rejected(String),
    #[error("channel closed by server")]
    Closed,
}

/// Exponential reconnect delay: 1s doubling up to 30s.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    base: Duration,
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            current: base,
            base,
            max,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Incoming {
    Joined,
    JoinFailed(String),
    Change,
    Closed,
    Ignored,
}

fn classify(text: &str, topic: &str) -> Incoming {
    let Ok(message) = serde_json::from_str::<Value>(text) else {
        return Incoming::Ignored;
    };
    if message["topic"] != topic {
        return Incoming::Ignored;
    }
    match message["event"].as_str().unwrap_or_default() {
        "phx_reply" if message["ref"] == JOIN_REF => {
            if message["payload"]["status"] == "ok" {
                Incoming::Joined
            } else {
                Incoming::JoinFailed(message["payload"]["response"].to_string())
            }
        }
        "postgres_changes" | "INSERT" | "UPDATE" | "DELETE" => Incoming::Change,
        "phx_close" | "phx_error" => Incoming::Closed,
        _ => Incoming::Ignored,
    }
}

fn topic() -> String {
    format!("realtime:public:{TABLE}")
}

fn join_message(topic: &str, access_token: Option<String>) -> Value {
    let mut payload = json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": [
                { "event": "*", "schema": "public", "table": TABLE }
            ]
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = json!(token);
    }
    json!({
        "topic": topic,
        "event": "phx_join",
        "payload": payload,
        "ref": JOIN_REF,
        "join_ref": JOIN_REF
    })
}

fn heartbeat_message(sequence: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": format!("hb-{sequence}")
    })
}

/// Live subscription to table changes. The background task stops when this
/// handle is dropped.
pub struct RealtimeSubscription {
    state: watch::Receiver<ChannelState>,
    task: JoinHandle<()>,
}

impl RealtimeSubscription {
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }
}

impl Drop for RealtimeSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Subscribes to insert/update/delete notifications on the transactions
/// table. `on_change` runs once per event and once after every rejoin that
/// follows a dropped connection.
pub fn subscribe_to_changes<F>(client: Arc<RemoteClient>, on_change: F) -> RealtimeSubscription
where
    F: Fn() + Send + Sync + 'static,
{
    let (state_tx, state_rx) = watch::channel(ChannelState::Unsubscribed);
    let task = tokio::spawn(async move {
        let mut backoff = Backoff::default();
        let mut dropped_before = false;
        loop {
            state_tx.send_replace(ChannelState::Subscribing);
            let result = run_channel(&client, &state_tx, &on_change, dropped_before).await;
            if *state_tx.borrow() == ChannelState::Active {
                backoff.reset();
            }
            match result {
                Ok(()) => info!("realtime channel closed"),
                Err(err) => warn!("realtime channel dropped: {err}"),
            }
            dropped_before = true;
            state_tx.send_replace(ChannelState::Subscribing);
            let delay = backoff.next_delay();
            debug!(?delay, "reconnecting realtime channel");
            time::sleep(delay).await;
        }
    });
    RealtimeSubscription {
        state: state_rx,
        task,
    }
}

async fn run_channel<F>(
    client: &RemoteClient,
    state: &watch::Sender<ChannelState>,
    on_change: &F,
    catch_up: bool,
) -> Result<(), ChannelError>
where
    F: Fn() + Send + Sync,
{
    let topic = topic();
    let (socket, _) = connect_async(client.realtime_url()).await?;
    let (mut write, mut read) = socket.split();

    let join = join_message(&topic, client.access_token());
    write.send(Message::Text(join.to_string())).await?;

    let mut heartbeat = time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut sequence = 0u64;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                sequence += 1;
                write.send(Message::Text(heartbeat_message(sequence).to_string())).await?;
            }
            frame = read.next() => {
                let Some(frame) = frame else {
                    return Ok(());
                };
                match frame? {
                    Message::Text(text) => match classify(&text, &topic) {
                        Incoming::Joined => {
                            info!(%topic, "realtime channel active");
                            state.send_replace(ChannelState::Active);
                            if catch_up {
                                on_change();
                            }
                        }
                        Incoming::JoinFailed(reason) => return Err(ChannelError::Rejected(reason)),
                        Incoming::Change => {
                            debug!(%topic, "table changed");
                            on_change();
                        }
                        Incoming::Closed => return Err(ChannelError::Closed),
                        Incoming::Ignored => {}
                    },
                    Message::Close(_) => return Ok(()),
                    _ => {}
                }
            }
        }
    }
}
