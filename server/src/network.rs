//! UDP transport for the game.
//!
//! The server speaks [`Packet`]s. `Connect` opens a session, `Message`
//! carries one encoded [`shared::SocketMessage`] in either direction,
//! `Heartbeat` keeps a quiet client alive, and `Disconnect` or five seconds
//! of silence end the session. Everything the game does happens in the
//! [`ConnectionHandler`]; this module only maps datagrams to its callbacks.
//!
//! Outgoing packets go through a single sender task fed by an unbounded
//! channel, so the simulation thread never waits on the socket.

use crate::client_manager::{ClientManager, CLIENT_TIMEOUT};
use crate::session::{ConnectionHandler, Session, Transport};
use log::{debug, error, info, warn};
use shared::Packet;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

pub type NetResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { session_id: String },
    Shutdown,
}

/// A packet waiting for the sender task.
#[derive(Debug)]
pub struct Outgoing {
    pub packet: Packet,
    pub addr: SocketAddr,
}

/// Session of one UDP peer. Sends are queued, never awaited.
#[derive(Debug)]
pub struct UdpSession {
    id: String,
    addr: SocketAddr,
    open: Arc<AtomicBool>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

impl UdpSession {
    pub fn new(
        id: String,
        addr: SocketAddr,
        open: Arc<AtomicBool>,
        outgoing: mpsc::UnboundedSender<Outgoing>,
    ) -> Self {
        Self {
            id,
            addr,
            open,
            outgoing,
        }
    }

    fn queue(&self, packet: Packet) -> io::Result<()> {
        self.outgoing
            .send(Outgoing {
                packet,
                addr: self.addr,
            })
            .map_err(|_| io::Error::new(io::ErrorKind::NotConnected, "sender task has stopped"))
    }
}

impl Transport for UdpSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send(&self, bytes: &[u8]) -> io::Result<()> {
        self.queue(Packet::Message {
            payload: bytes.to_vec(),
        })
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.queue(Packet::Disconnected {
                reason: "Session closed".to_string(),
            });
        }
    }
}

/// UDP front end of the game server.
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    handler: ConnectionHandler,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    outgoing_tx: mpsc::UnboundedSender<Outgoing>,
    outgoing_rx: Option<mpsc::UnboundedReceiver<Outgoing>>,
}

impl Server {
    pub async fn new(addr: &str, handler: ConnectionHandler, max_clients: usize) -> NetResult<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            handler,
            server_tx,
            server_rx,
            outgoing_tx,
            outgoing_rx: Some(outgoing_rx),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Channel for stopping [`Server::run`] from elsewhere.
    pub fn control(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; 8192];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match shared::deserialize::<Packet>(&buffer[..len]) {
                        Some(packet) => {
                            if server_tx
                                .send(ServerMessage::PacketReceived { packet, addr })
                                .is_err()
                            {
                                break;
                            }
                        }
                        None => warn!("Failed to deserialize packet from {}", addr),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let Some(mut outgoing_rx) = self.outgoing_rx.take() else {
            return;
        };
        let socket = Arc::clone(&self.socket);

        tokio::spawn(async move {
            while let Some(Outgoing { packet, addr }) = outgoing_rx.recv().await {
                if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                    error!("Failed to send packet to {}: {}", addr, e);
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients = clients.write().await;
                    clients.check_timeouts(CLIENT_TIMEOUT)
                };

                for peer in timed_out {
                    let message = ServerMessage::ClientTimeout {
                        session_id: peer.session_id,
                    };
                    if server_tx.send(message).is_err() {
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(socket: &UdpSocket, packet: &Packet, addr: SocketAddr) -> NetResult<()> {
        let data = shared::serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.outgoing_tx.send(Outgoing { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Hands a game message to the handler on the blocking pool. A join can
    /// start a game, which joins the previous game's threads.
    async fn dispatch_message(&self, session_id: String, payload: Vec<u8>) {
        let handler = self.handler.clone();
        let id = session_id.clone();
        let result =
            tokio::task::spawn_blocking(move || handler.on_binary_message(&id, &payload)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Failed to handle message from {}: {}", session_id, e),
            Err(e) => error!("Message handler for {} failed: {}", session_id, e),
        }
    }

    /// Maps one datagram to the handler callbacks.
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                // a reconnect replaces the old session
                let existing = self.clients.write().await.remove_peer(addr);
                if let Some(peer) = existing {
                    self.handler.on_disconnect(&peer.session_id);
                }

                let added = self.clients.write().await.add_peer(addr);
                match added {
                    Some((session_id, open)) => {
                        let session =
                            UdpSession::new(session_id.clone(), addr, open, self.outgoing_tx.clone());
                        self.handler.on_connect(Arc::new(Session::new(session)));
                        self.send_packet(Packet::Connected { session_id }, addr);
                    }
                    None => {
                        let reason = "Server full".to_string();
                        self.send_packet(Packet::Disconnected { reason }, addr);
                    }
                }
            }

            Packet::Message { payload } => {
                let peer = self.clients.write().await.touch(addr);
                match peer {
                    Some((session_id, true)) => self.dispatch_message(session_id, payload).await,
                    Some((session_id, false)) => {
                        debug!("Dropping message for closed session {}", session_id);
                        self.clients.write().await.remove_peer(addr);
                        self.handler.on_disconnect(&session_id);
                    }
                    None => warn!("Message from unknown client at {}", addr),
                }
            }

            Packet::Heartbeat => {
                if self.clients.write().await.touch(addr).is_none() {
                    debug!("Heartbeat from unknown client at {}", addr);
                }
            }

            Packet::Disconnect => {
                let removed = self.clients.write().await.remove_peer(addr);
                if let Some(peer) = removed {
                    self.handler.on_disconnect(&peer.session_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Main server loop. Returns on [`ServerMessage::Shutdown`].
    pub async fn run(&mut self) -> NetResult<()> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        info!("Server started successfully");

        while let Some(message) = self.server_rx.recv().await {
            match message {
                ServerMessage::PacketReceived { packet, addr } => {
                    self.handle_packet(packet, addr).await;
                }
                ServerMessage::ClientTimeout { session_id } => {
                    self.handler.on_disconnect(&session_id);
                }
                ServerMessage::Shutdown => break,
            }
        }

        info!("Server shutting down");
        Ok(())
    }
}
