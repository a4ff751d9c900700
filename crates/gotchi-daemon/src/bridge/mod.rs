mod messages;

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{broadcast, mpsc},
};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{Message, handshake::server::Request},
};
use tracing::{debug, error, info, warn};

use crate::{
    activity::{ActivityEvent, ActivityLogger},
    config::BridgeConfig,
};

pub use messages::{ClientMessage, DaemonMessage};

const INCOMING_BUFFER: usize = 256;
const BROADCAST_BUFFER: usize = 64;

/// WebSocket front door for classifiers and displays. Inbound messages are
/// queued for the driver; outbound ones fan out to every client.
pub struct Bridge {
    incoming_rx: mpsc::Receiver<ClientMessage>,
    outgoing_tx: broadcast::Sender<DaemonMessage>,
}

impl Bridge {
    pub async fn bind(config: BridgeConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)
            .await
            .with_context(|| format!("binding bridge to {}", config.listen_addr))?;
        info!("Bridge listening on {}", config.listen_addr);

        let (incoming_tx, incoming_rx) = mpsc::channel(INCOMING_BUFFER);
        let (outgoing_tx, _) = broadcast::channel(BROADCAST_BUFFER);

        let acceptor = BridgeAcceptor {
            listener,
            incoming_tx,
            outgoing_tx: outgoing_tx.clone(),
            max_clients: config.max_clients,
        };

        tokio::spawn(async move {
            if let Err(err) = acceptor.run().await {
                error!(?err, "bridge acceptor exited");
            }
        });

        Ok(Self {
            incoming_rx,
            outgoing_tx,
        })
    }

    pub fn broadcast(&self, message: DaemonMessage) {
        // Ignore send errors - they just mean no clients are connected
        let _ = self.outgoing_tx.send(message);
    }

    pub fn log(&self, level: &str, message: impl Into<String>) {
        self.broadcast(DaemonMessage::Log {
            level: level.to_string(),
            message: message.into(),
            timestamp: chrono::Utc::now().timestamp(),
        });
    }

    pub async fn next_message(&mut self) -> Option<ClientMessage> {
        self.incoming_rx.recv().await
    }

    pub fn activity_feed(&self) -> ActivityFeed {
        ActivityFeed {
            outgoing_tx: self.outgoing_tx.clone(),
        }
    }
}

/// Mirrors activity events to connected clients as `log` messages.
#[derive(Clone)]
pub struct ActivityFeed {
    outgoing_tx: broadcast::Sender<DaemonMessage>,
}

impl ActivityLogger for ActivityFeed {
    fn record(&self, event: ActivityEvent) {
        let Ok(message) = serde_json::to_string(&event) else {
            return;
        };
        let _ = self.outgoing_tx.send(DaemonMessage::Log {
            level: "activity".into(),
            message,
            timestamp: chrono::Utc::now().timestamp(),
        });
    }
}

struct BridgeAcceptor {
    listener: TcpListener,
    incoming_tx: mpsc::Sender<ClientMessage>,
    outgoing_tx: broadcast::Sender<DaemonMessage>,
    max_clients: usize,
}

impl BridgeAcceptor {
    async fn run(self) -> Result<()> {
        let active = Arc::new(AtomicUsize::new(0));

        loop {
            let (stream, addr) = self.listener.accept().await?;
            let current = active.load(Ordering::SeqCst);
            if current >= self.max_clients {
                warn!("Rejecting {addr}: max clients reached ({current})");
                continue;
            }

            let incoming_tx = self.incoming_tx.clone();
            let outgoing_rx = self.outgoing_tx.subscribe();
            let active_count = active.clone();

            active_count.fetch_add(1, Ordering::SeqCst);

            tokio::spawn(async move {
                if let Err(err) = handle_connection(stream, addr, incoming_tx, outgoing_rx).await {
                    warn!(?err, "Bridge client error");
                }
                active_count.fetch_sub(1, Ordering::SeqCst);
                info!("Client {addr} disconnected");
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    incoming_tx: mpsc::Sender<ClientMessage>,
    mut outgoing_rx: broadcast::Receiver<DaemonMessage>,
) -> Result<()> {
    let callback =
        |req: &Request, response: tokio_tungstenite::tungstenite::handshake::server::Response| {
            debug!("Bridge connection from {addr}: {req:?}");
            Ok(response)
        };
    let ws_stream = accept_hdr_async(stream, callback).await?;
    let (mut writer, mut reader) = ws_stream.split();

    // hello goes to this client only
    let hello = DaemonMessage::Hello {
        version: env!("CARGO_PKG_VERSION").into(),
        capabilities: vec!["signal".into(), "quests".into(), "state".into()],
    };
    writer
        .send(Message::Text(serde_json::to_string(&hello)?))
        .await?;

    let writer_task = tokio::spawn(async move {
        loop {
            match outgoing_rx.recv().await {
                Ok(msg) => {
                    let payload = serde_json::to_string(&msg)?;
                    writer.send(Message::Text(payload)).await?;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Slow bridge client skipped messages");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    });

    // Let the driver answer with a fresh state for the newcomer.
    let _ = incoming_tx.send(ClientMessage::GetState).await;

    while let Some(message) = reader.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(parsed) => {
                    if let Err(err) = incoming_tx.send(parsed).await {
                        warn!(?err, "Dropping client message");
                    }
                }
                Err(err) => warn!(?err, "Invalid client payload {text}"),
            },
            Ok(Message::Binary(_)) => {
                warn!("Binary payloads are not supported");
            }
            Ok(Message::Close(frame)) => {
                info!("Client {addr} closed: {frame:?}");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(?err, "Bridge read error");
                break;
            }
        }
    }

    writer_task.abort();
    let _ = writer_task.await;
    Ok(())
}
