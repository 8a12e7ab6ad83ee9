use crate::core::CoreEvent;
use rmradio_core::protocol::{Broadcast, Message, SessionState, StationEvent, PROTOCOL_VERSION};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{error, info, warn};

/// Everything a connected client needs.
#[derive(Clone)]
pub struct SocketContext {
    pub snapshot: Arc<RwLock<SessionState>>,
    pub core_tx: mpsc::Sender<CoreEvent>,
    pub station_tx: broadcast::Sender<StationEvent>,
    pub log_tx: broadcast::Sender<String>,
}

pub fn start_server(
    bind_address: String,
    port: u16,
    ctx: SocketContext,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);

        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind TCP socket {}: {}", addr, e);
                return;
            }
        };

        info!("TCP server listening at {}", addr);

        let mut client_id = 0usize;

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    client_id += 1;
                    let id = client_id;
                    info!("Client {} connected from {}", id, peer);

                    let ctx = ctx.clone();
                    tokio::spawn(async move {
                        handle_client(stream, id, ctx).await;
                        info!("Client {} disconnected", id);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    })
}

async fn handle_client(stream: TcpStream, client_id: usize, ctx: SocketContext) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut station_rx = ctx.station_tx.subscribe();
    let mut log_rx = ctx.log_tx.subscribe();
    let mut tmp = [0u8; 4096];
    let mut read_buf: Vec<u8> = Vec::new();

    // Send Hello with current state snapshot on connect
    if let Ok(encoded) = encode_hello(&ctx.snapshot).await {
        if write_half.write_all(&encoded).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            result = read_half.read(&mut tmp) => {
                match result {
                    Ok(0) => {
                        info!("Client {} closed connection", client_id);
                        break;
                    }
                    Ok(n) => {
                        read_buf.extend_from_slice(&tmp[..n]);

                        loop {
                            if read_buf.len() < 4 { break; }
                            match Message::decode(&read_buf) {
                                Ok((Message::Command(cmd), consumed)) => {
                                    read_buf.drain(..consumed);
                                    info!("Client {} sent command: {:?}", client_id, cmd);

                                    if ctx.core_tx.send(CoreEvent::Command(cmd)).await.is_err() {
                                        warn!("CoreEvent channel closed");
                                        return;
                                    }
                                }
                                Ok((_, consumed)) => {
                                    read_buf.drain(..consumed);
                                }
                                Err(_) => break,
                            }
                        }
                    }
                    Err(e) => {
                        error!("Read error from client {}: {}", client_id, e);
                        break;
                    }
                }
            }

            msg = station_rx.recv() => {
                let encoded = match msg {
                    Ok(StationEvent::StateUpdated { .. }) => encode_state(&ctx.snapshot).await,
                    Ok(event) => Message::Broadcast(Broadcast::Diagnostic { event }).encode(),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client {} missed {} station events", client_id, n);
                        encode_state(&ctx.snapshot).await
                    }
                    Err(_) => break,
                };
                if let Ok(encoded) = encoded {
                    if write_half.write_all(&encoded).await.is_err() {
                        break;
                    }
                }
            }

            line = log_rx.recv() => {
                match line {
                    Ok(message) => {
                        if let Ok(encoded) = Message::Broadcast(Broadcast::Log { message }).encode() {
                            let _ = write_half.write_all(&encoded).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(_) => break,
                }
            }
        }
    }
}

async fn encode_hello(snapshot: &RwLock<SessionState>) -> anyhow::Result<Vec<u8>> {
    let state = snapshot.read().await.clone();
    Message::Broadcast(Broadcast::Hello {
        protocol_version: PROTOCOL_VERSION,
        rev: state.rev,
        state,
    })
    .encode()
}

async fn encode_state(snapshot: &RwLock<SessionState>) -> anyhow::Result<Vec<u8>> {
    let data = snapshot.read().await.clone();
    Message::Broadcast(Broadcast::State { data }).encode()
}
