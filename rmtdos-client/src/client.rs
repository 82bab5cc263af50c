//! The client's end of the link: one UDP socket speaking frames through
//! [`FrameCodec`].

use std::net::SocketAddr;
use std::process;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use futures::{SinkExt, StreamExt};
use tokio::net::UdpSocket;
use tokio_util::udp::UdpFramed;
use tracing::{debug, trace};

use rmtdos_core::protocol::KEYSTROKE_LEN;
use rmtdos_core::{
    Frame, FrameCodec, Keystroke, LinkHeader, MAX_PAYLOAD_LEN, MacAddr, MessageType, RmtError,
    StatusResponse,
};

use crate::config::ClientConfig;

/// Keystrokes that fit in one InjectKeystroke frame.
pub const KEYS_PER_FRAME: usize = MAX_PAYLOAD_LEN / KEYSTROKE_LEN;

/// A server that answered a StatusRequest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discovered {
    pub identity: MacAddr,
    pub addr: SocketAddr,
    pub status: StatusResponse,
}

pub struct RmtClient {
    framed: UdpFramed<FrameCodec>,
    identity: MacAddr,
    server: SocketAddr,
    broadcast: SocketAddr,
    ethertype: u16,
    timeout: Duration,
    nonce: u32,
}

impl RmtClient {
    /// Bind the local socket described by `config`.
    pub async fn bind(config: &ClientConfig) -> Result<Self, RmtError> {
        let identity = config.identity()?;
        let server = config.server_addr()?;
        let broadcast = config.broadcast_addr()?;

        let socket = UdpSocket::bind(config.bind_addr()?).await?;
        socket.set_broadcast(true)?;
        debug!(local = %socket.local_addr()?, %identity, "client socket bound");

        Ok(Self {
            framed: UdpFramed::new(socket, FrameCodec::new(config.network.ethertype)),
            identity,
            server,
            broadcast,
            ethertype: config.network.ethertype,
            timeout: config.timeout(),
            nonce: initial_nonce(),
        })
    }

    pub fn identity(&self) -> MacAddr {
        self.identity
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.framed.get_ref().local_addr()
    }

    /// Send unicast frames to `addr` from now on.
    pub fn set_server(&mut self, addr: SocketAddr) {
        self.server = addr;
    }

    /// A nonce not used by any earlier request from this client.
    pub fn next_nonce(&mut self) -> u32 {
        self.nonce = self.nonce.wrapping_add(1);
        self.nonce
    }

    /// Send one frame. Broadcast destinations go to the broadcast address,
    /// everything else to the server.
    pub async fn send(
        &mut self,
        destination: MacAddr,
        message_type: MessageType,
        nonce: u32,
        payload: Vec<u8>,
    ) -> Result<(), RmtError> {
        let link = LinkHeader {
            destination,
            source: self.identity,
            ethertype: self.ethertype,
        };
        let frame = Frame::new(link, nonce, message_type, payload)?;
        let addr = if destination.is_broadcast() {
            self.broadcast
        } else {
            self.server
        };
        trace!(%destination, %addr, %message_type, nonce, "send");
        self.framed.send((frame, addr)).await
    }

    /// Next frame addressed to this client. `None` if the socket closed.
    pub async fn recv(&mut self) -> Result<Option<(Frame, SocketAddr)>, RmtError> {
        while let Some(item) = self.framed.next().await {
            let (frame, from) = item?;
            if frame.link.destination == self.identity || frame.link.destination.is_broadcast() {
                return Ok(Some((frame, from)));
            }
            trace!(destination = %frame.link.destination, "frame for another station");
        }
        Ok(None)
    }

    /// Like [`recv`](Self::recv), giving up at `deadline`.
    pub async fn recv_until(&mut self, deadline: Instant) -> Result<Option<(Frame, SocketAddr)>, RmtError> {
        let deadline = tokio::time::Instant::from_std(deadline);
        tokio::time::timeout_at(deadline, self.recv())
            .await
            .unwrap_or(Ok(None))
    }

    /// Broadcast a StatusRequest and collect every answer that arrives
    /// within the configured timeout.
    pub async fn discover(&mut self) -> Result<Vec<Discovered>, RmtError> {
        let nonce = self.next_nonce();
        self.send(MacAddr::BROADCAST, MessageType::StatusRequest, nonce, Vec::new())
            .await?;

        let deadline = Instant::now() + self.timeout;
        let mut found = Vec::new();
        while let Some((frame, addr)) = self.recv_until(deadline).await? {
            if frame.message_type != MessageType::StatusResponse || frame.nonce != nonce {
                continue;
            }
            let status = StatusResponse::decode(&frame.payload)?;
            let identity = frame.link.source;
            if found.iter().any(|d: &Discovered| d.identity == identity) {
                continue;
            }
            debug!(%identity, %addr, "server answered");
            found.push(Discovered {
                identity,
                addr,
                status,
            });
        }
        Ok(found)
    }

    /// Ping `target`; returns the round trip time, or `None` on timeout.
    pub async fn ping(&mut self, target: MacAddr, payload: &[u8]) -> Result<Option<Duration>, RmtError> {
        let nonce = self.next_nonce();
        let sent = Instant::now();
        self.send(target, MessageType::Ping, nonce, payload.to_vec())
            .await?;

        let deadline = sent + self.timeout;
        while let Some((frame, _)) = self.recv_until(deadline).await? {
            if frame.message_type == MessageType::Pong
                && frame.nonce == nonce
                && frame.link.source == target
            {
                return Ok(Some(sent.elapsed()));
            }
        }
        Ok(None)
    }

    /// Ask `target` to start or refresh the session named by `nonce`.
    pub async fn start_session(&mut self, target: MacAddr, nonce: u32) -> Result<(), RmtError> {
        self.send(target, MessageType::SessionStart, nonce, Vec::new())
            .await
    }

    /// Send `keys`, split over as many frames as needed.
    pub async fn send_keys(&mut self, target: MacAddr, nonce: u32, keys: &[Keystroke]) -> Result<usize, RmtError> {
        let mut frames = 0;
        for batch in keys.chunks(KEYS_PER_FRAME) {
            let mut payload = vec![0u8; batch.len() * KEYSTROKE_LEN];
            Keystroke::encode_all(batch, &mut payload)?;
            self.send(target, MessageType::InjectKeystroke, nonce, payload)
                .await?;
            frames += 1;
        }
        Ok(frames)
    }
}

/// Start the nonce sequence somewhere unlikely to collide with an earlier
/// run of this client or another client on the same host.
fn initial_nonce() -> u32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() ^ d.as_secs() as u32)
        .unwrap_or_default();
    nanos ^ process::id().rotate_left(16)
}

/// Keystrokes for a line of text typed at a console.
pub fn keys_for_line(line: &str, newline: bool) -> Vec<Keystroke> {
    let mut keys: Vec<Keystroke> = line
        .bytes()
        .filter(|b| b.is_ascii() && !b.is_ascii_control())
        .map(Keystroke::ascii)
        .collect();
    if newline {
        keys.push(Keystroke::ascii(b'\r'));
    }
    keys
}
