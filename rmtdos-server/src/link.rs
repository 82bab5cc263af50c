//! UDP stand-in for the raw Ethernet packet driver.
//!
//! Every datagram carries one complete frame, link header included. The
//! adapter learns which socket address each link identity sends from and
//! routes unicast frames back there; frames for the broadcast identity go
//! to the configured broadcast address.
//!
//! ```text
//!  UdpSocket ──recv_from──► LinkReceiver ──receive_into──► BufferPool
//!      ▲                         │ learn                        │
//!      │                         ▼                              ▼
//!      └────try_send_to──── UdpLink ◄──── Engine::transmit ◄── mainline
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use rmtdos_core::header::LINK_HEADER_LEN;
use rmtdos_core::{BufferPool, Link, LinkHeader, MAX_FRAME_LEN, MacAddr, RmtError};

/// Link identities remembered at once. The oldest entry is overwritten
/// when the table is full.
pub const PEER_SLOTS: usize = 16;

// ── PeerTable ────────────────────────────────────────────────────

/// Fixed-size map from link identity to socket address.
#[derive(Debug)]
pub struct PeerTable {
    entries: [Option<(MacAddr, SocketAddr)>; PEER_SLOTS],
    next: usize,
}

impl Default for PeerTable {
    fn default() -> Self {
        Self {
            entries: [None; PEER_SLOTS],
            next: 0,
        }
    }
}

impl PeerTable {
    pub fn learn(&mut self, identity: MacAddr, addr: SocketAddr) {
        if let Some(entry) = self.entries.iter_mut().flatten().find(|(id, _)| *id == identity) {
            entry.1 = addr;
            return;
        }
        self.entries[self.next] = Some((identity, addr));
        self.next = (self.next + 1) % PEER_SLOTS;
    }

    pub fn lookup(&self, identity: MacAddr) -> Option<SocketAddr> {
        self.entries
            .iter()
            .flatten()
            .find(|(id, _)| *id == identity)
            .map(|(_, addr)| *addr)
    }

    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── UdpLink ──────────────────────────────────────────────────────

/// Transmit half of the adapter.
#[derive(Debug, Clone)]
pub struct UdpLink {
    socket: Arc<UdpSocket>,
    identity: MacAddr,
    broadcast: SocketAddr,
    peers: Arc<Mutex<PeerTable>>,
}

impl UdpLink {
    pub fn new(
        socket: Arc<UdpSocket>,
        identity: MacAddr,
        broadcast: SocketAddr,
        peers: Arc<Mutex<PeerTable>>,
    ) -> Self {
        Self {
            socket,
            identity,
            broadcast,
            peers,
        }
    }
}

impl Link for UdpLink {
    fn transmit(&mut self, frame: &[u8]) -> Result<(), RmtError> {
        let link = LinkHeader::decode(frame)?;
        let addr = if link.destination.is_broadcast() {
            self.broadcast
        } else {
            self.peers.lock().lookup(link.destination).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no route to {}", link.destination),
                )
            })?
        };
        self.socket.try_send_to(frame, addr)?;
        Ok(())
    }

    fn identity(&self) -> MacAddr {
        self.identity
    }
}

// ── LinkReceiver ─────────────────────────────────────────────────

/// Receive half of the adapter: the producer side of the buffer pool.
pub struct LinkReceiver {
    socket: Arc<UdpSocket>,
    identity: MacAddr,
    ethertype: u16,
    peers: Arc<Mutex<PeerTable>>,
    pool: Arc<BufferPool>,
    ready: Arc<Notify>,
}

impl LinkReceiver {
    pub fn new(
        socket: Arc<UdpSocket>,
        identity: MacAddr,
        ethertype: u16,
        peers: Arc<Mutex<PeerTable>>,
        pool: Arc<BufferPool>,
        ready: Arc<Notify>,
    ) -> Self {
        Self {
            socket,
            identity,
            ethertype,
            peers,
            pool,
            ready,
        }
    }

    /// Receive until `running` goes false or the socket fails.
    pub async fn run(self, running: Arc<AtomicBool>) -> io::Result<()> {
        let mut scratch = [0u8; MAX_FRAME_LEN];
        while running.load(Ordering::SeqCst) {
            let (n, from) = self.socket.recv_from(&mut scratch).await?;
            self.on_datagram(&scratch[..n], from);
        }
        Ok(())
    }

    /// Filter, learn the sender's route, and hand the frame to the pool.
    /// Never blocks and never allocates.
    fn on_datagram(&self, datagram: &[u8], from: SocketAddr) {
        if datagram.len() < LINK_HEADER_LEN {
            trace!(len = datagram.len(), %from, "runt datagram");
            return;
        }
        let link = match LinkHeader::decode(datagram) {
            Ok(link) => link,
            Err(e) => {
                trace!(%from, "undecodable link header: {e}");
                return;
            }
        };
        if link.ethertype != self.ethertype {
            trace!(ethertype = link.ethertype, %from, "foreign ethertype");
            return;
        }
        if link.source == self.identity {
            return;
        }

        self.peers.lock().learn(link.source, from);

        match self.pool.receive_into(datagram) {
            Ok(()) => self.ready.notify_one(),
            Err(e) if e.is_exhaustion() => {
                debug!(dropped = self.pool.dropped(), "frame dropped: {e}");
            }
            Err(e) => warn!(%from, "frame dropped: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn mac(n: u8) -> MacAddr {
        MacAddr([0x02, 0, 0, 0, 0, n])
    }

    #[test]
    fn peer_table_updates_in_place() {
        let mut peers = PeerTable::default();
        peers.learn(mac(1), addr(1000));
        peers.learn(mac(1), addr(2000));
        assert_eq!(peers.len(), 1);
        assert_eq!(peers.lookup(mac(1)), Some(addr(2000)));
        assert_eq!(peers.lookup(mac(2)), None);
    }

    #[test]
    fn peer_table_overwrites_oldest_when_full() {
        let mut peers = PeerTable::default();
        for n in 0..=PEER_SLOTS as u8 {
            peers.learn(mac(n), addr(1000 + n as u16));
        }
        assert_eq!(peers.len(), PEER_SLOTS);
        assert_eq!(peers.lookup(mac(0)), None);
        assert_eq!(peers.lookup(mac(PEER_SLOTS as u8)), Some(addr(1000 + PEER_SLOTS as u16)));
    }

    #[tokio::test]
    async fn unknown_destination_is_a_transmit_error() {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let mut link = UdpLink::new(socket, mac(1), addr(9), Arc::default());
        let frame = [0x02u8, 0, 0, 0, 0, 7, 0x02, 0, 0, 0, 0, 1, 0x80, 0xab];
        assert!(matches!(link.transmit(&frame), Err(RmtError::Transmit(_))));
    }

    #[tokio::test]
    async fn receiver_filters_and_learns() {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let peers: Arc<Mutex<PeerTable>> = Arc::default();
        let pool = Arc::new(BufferPool::new(2).unwrap());
        let receiver = LinkReceiver::new(
            socket,
            mac(1),
            0x80ab,
            Arc::clone(&peers),
            Arc::clone(&pool),
            Arc::new(Notify::new()),
        );

        let mut frame = [0u8; 26];
        LinkHeader {
            destination: mac(1),
            source: mac(5),
            ethertype: 0x88b5,
        }
        .encode_into(&mut frame);
        receiver.on_datagram(&frame, addr(4000));
        assert!(peers.lock().is_empty());
        assert_eq!(pool.accepted(), 0);

        frame[12..14].copy_from_slice(&0x80abu16.to_be_bytes());
        receiver.on_datagram(&frame, addr(4000));
        assert_eq!(peers.lock().lookup(mac(5)), Some(addr(4000)));
        assert_eq!(pool.census().ready, 1);

        // Our own frames looped back by a broadcast are ignored.
        frame[6..12].copy_from_slice(&mac(1).0);
        receiver.on_datagram(&frame, addr(4001));
        assert_eq!(pool.census().ready, 1);
    }
}
