//! Server lifecycle.
//!
//! Binds the link adapter, spawns the receive producer, and runs the
//! mainline: drain the pool whenever the producer signals, and run the
//! streamer on every tick.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use rmtdos_core::{BufferPool, Engine, EngineStats, MacAddr, MonotonicClock, TextScreen};

use crate::config::ServerConfig;
use crate::link::{LinkReceiver, PeerTable, UdpLink};
use crate::screen::SharedScreen;

/// Error type for the server's async entry points.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// ── RmtServer ────────────────────────────────────────────────────

pub struct RmtServer {
    config: ServerConfig,
    identity: MacAddr,
    socket: Arc<UdpSocket>,
    screen: SharedScreen,
    running: Arc<AtomicBool>,
}

impl RmtServer {
    /// Validate `config`, bind the link socket and paint the banner.
    pub async fn bind(config: ServerConfig) -> Result<Self, BoxError> {
        let identity = config.identity()?;
        let bind = config.bind_addr()?;
        // Fail early rather than at the first broadcast.
        config.broadcast_addr()?;

        let socket = UdpSocket::bind(bind).await?;
        socket.set_broadcast(true)?;

        let mut text = TextScreen::new(config.screen.rows, config.screen.cols)?;
        text.set_mode(config.screen.mode);
        text.write_str(&config.screen.banner);

        Ok(Self {
            config,
            identity,
            socket: Arc::new(socket),
            screen: SharedScreen::new(text),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn identity(&self) -> MacAddr {
        self.identity
    }

    /// Handle to the served display.
    pub fn screen(&self) -> SharedScreen {
        self.screen.clone()
    }

    /// Obtain a handle that can be used to stop the server from another
    /// task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run until stopped. Returns the engine's final counters.
    pub async fn run(&self) -> Result<EngineStats, BoxError> {
        self.running.store(true, Ordering::SeqCst);

        let pool = Arc::new(BufferPool::new(self.config.buffers())?);
        let peers = Arc::new(Mutex::new(PeerTable::default()));
        let ready = Arc::new(Notify::new());
        let engine_config = self.config.to_engine_config();

        let link = UdpLink::new(
            Arc::clone(&self.socket),
            self.identity,
            self.config.broadcast_addr()?,
            Arc::clone(&peers),
        );
        let mut engine = Engine::new(
            engine_config.clone(),
            Arc::clone(&pool),
            link,
            self.screen.clone(),
            self.screen.clone(),
            MonotonicClock::new(),
        )?;

        let receiver = LinkReceiver::new(
            Arc::clone(&self.socket),
            self.identity,
            engine_config.ethertype,
            peers,
            Arc::clone(&pool),
            Arc::clone(&ready),
        );
        let rx_task = spawn_receiver(receiver.run(Arc::clone(&self.running)), Arc::clone(&self.running));

        let addr = self.local_addr()?;
        info!(
            identity = %self.identity,
            %addr,
            ethertype = engine_config.ethertype,
            buffers = pool.capacity(),
            sessions = engine_config.sessions,
            mtu = engine_config.effective_mtu(),
            "rmtdos server running"
        );

        let mut tick = tokio::time::interval(Duration::from_millis(self.config.tick_interval_ms()));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                _ = ready.notified() => {
                    engine.process_ready_buffers();
                }
                _ = tick.tick() => {
                    engine.process_ready_buffers();
                    if let Err(e) = engine.streamer_tick() {
                        warn!("screen update incomplete: {e}");
                    }
                }
                _ = Self::wait_for_stop(&self.running) => break,
            }
        }

        rx_task.abort();
        self.running.store(false, Ordering::SeqCst);

        let stats = engine.stats();
        info!(
            processed = stats.processed,
            rejected = stats.rejected,
            chunks_sent = stats.chunks_sent,
            dropped = pool.dropped(),
            "rmtdos server stopped"
        );
        Ok(stats)
    }

    /// Async helper: resolves when `running` becomes false.
    async fn wait_for_stop(running: &Arc<AtomicBool>) {
        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Drive the link receiver. A receive failure leaves nothing feeding the
/// pool, so it clears `running` and the mainline winds down.
fn spawn_receiver<F>(receive: F, running: Arc<AtomicBool>) -> JoinHandle<()>
where
    F: Future<Output = io::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = receive.await {
            error!("link receive failed: {e}");
            running.store(false, Ordering::SeqCst);
        }
    })
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.network.bind = "127.0.0.1:0".into();
        config.network.broadcast = "127.0.0.1:9".into();
        config
    }

    #[tokio::test]
    async fn bind_paints_banner() {
        let server = RmtServer::bind(local_config()).await.unwrap();
        assert!(!server.is_running());
        assert!(server.screen().row_text(0).starts_with("rmtdos server ready"));
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn bind_rejects_bad_identity() {
        let mut config = local_config();
        config.network.identity = "00:00:00:00:00:00".into();
        assert!(RmtServer::bind(config).await.is_err());
    }

    #[tokio::test]
    async fn stop_handle_ends_run() {
        let server = Arc::new(RmtServer::bind(local_config()).await.unwrap());
        let stop = server.stop_handle();
        let task = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.run().await.map_err(|e| e.to_string()) }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(server.is_running());
        stop.store(false, Ordering::SeqCst);

        let stats = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(stats.processed, 0);
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn receive_failure_clears_running() {
        let running = Arc::new(AtomicBool::new(true));
        let task = spawn_receiver(
            async { Err(io::Error::other("socket closed")) },
            Arc::clone(&running),
        );
        task.await.unwrap();
        assert!(!running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn clean_receiver_exit_leaves_running_alone() {
        let running = Arc::new(AtomicBool::new(true));
        spawn_receiver(async { Ok(()) }, Arc::clone(&running))
            .await
            .unwrap();
        assert!(running.load(Ordering::SeqCst));
    }
}
