//! Watch mode: hold a session open, mirror the remote screen and type
//! stdin lines into it.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use rmtdos_core::{Frame, MacAddr, MessageType, RmtError, ScreenChunk, ScreenMirror};

use crate::client::{RmtClient, keys_for_line};

// ── Watcher ──────────────────────────────────────────────────────

/// Session state on the client side.
#[derive(Debug)]
pub struct Watcher {
    target: MacAddr,
    nonce: u32,
    mirror: ScreenMirror,
    chunks: u64,
}

impl Watcher {
    pub fn new(target: MacAddr, nonce: u32) -> Self {
        Self {
            target,
            nonce,
            mirror: ScreenMirror::new(),
            chunks: 0,
        }
    }

    pub fn target(&self) -> MacAddr {
        self.target
    }

    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    pub fn mirror(&self) -> &ScreenMirror {
        &self.mirror
    }

    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    /// Apply a received frame. Returns `true` when the frame ended a pass
    /// over the screen. The server only streams passes that changed.
    ///
    /// Frames from other stations or for other sessions are ignored.
    pub fn on_frame(&mut self, frame: &Frame) -> Result<bool, RmtError> {
        if frame.message_type != MessageType::ScreenChunk
            || frame.link.source != self.target
            || frame.nonce != self.nonce
        {
            return Ok(false);
        }

        let chunk = ScreenChunk::parse(&frame.payload)?;
        let written = self.mirror.apply(&chunk)?;
        self.chunks += 1;
        Ok(written.end == self.mirror.cells().len())
    }

    /// The mirrored screen as text, under a one-line status header.
    pub fn render(&self) -> String {
        let (row, col) = self.mirror.cursor();
        let mut out = format!(
            "── {} {}x{} cursor {},{} ──\n",
            self.target,
            self.mirror.cols(),
            self.mirror.rows(),
            row,
            col
        );
        for line in self.mirror.text_lines() {
            out.push_str(line.trim_end());
            out.push('\n');
        }
        out
    }
}

// ── Loop ─────────────────────────────────────────────────────────

/// Settings for [`run`].
#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    pub keepalive: Duration,
    pub newline: bool,
    /// Forward stdin lines as keystrokes.
    pub forward_stdin: bool,
}

/// Run until `running` goes false or the socket closes. Every completed
/// pass is written to `out`.
pub async fn run(
    client: &mut RmtClient,
    target: MacAddr,
    options: WatchOptions,
    running: Arc<AtomicBool>,
    mut out: impl Write,
) -> Result<Watcher, RmtError> {
    let nonce = client.next_nonce();
    let mut watcher = Watcher::new(target, nonce);
    let mut stdin = options
        .forward_stdin
        .then(|| BufReader::new(tokio::io::stdin()).lines());

    let mut keepalive = tokio::time::interval(options.keepalive);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(%target, nonce, "watching");

    while running.load(Ordering::SeqCst) {
        tokio::select! {
            _ = keepalive.tick() => {
                client.start_session(target, nonce).await?;
            }
            received = client.recv() => {
                let Some((frame, _)) = received? else {
                    break;
                };
                match watcher.on_frame(&frame) {
                    Ok(true) => {
                        out.write_all(watcher.render().as_bytes())?;
                        out.flush()?;
                    }
                    Ok(false) => {}
                    Err(e) => warn!("bad screen chunk: {e}"),
                }
            }
            line = next_line(&mut stdin) => {
                match line? {
                    Some(line) => {
                        let keys = keys_for_line(&line, options.newline);
                        let frames = client.send_keys(target, nonce, &keys).await?;
                        debug!(keys = keys.len(), frames, "keystrokes sent");
                    }
                    None => {
                        debug!("stdin closed; still watching");
                        stdin = None;
                    }
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {}
        }
    }

    Ok(watcher)
}

async fn next_line(lines: &mut Option<Lines<BufReader<Stdin>>>) -> io::Result<Option<String>> {
    match lines {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rmtdos_core::protocol::SCREEN_CHUNK_HEADER_LEN;
    use rmtdos_core::{DEFAULT_ETHERTYPE, LinkHeader, ScreenChunkHeader};

    const SERVER: MacAddr = MacAddr([0x02, 0, 0, 0, 0x80, 0xab]);
    const ME: MacAddr = MacAddr([0x02, 0, 0, 0, 0x42, 0x01]);

    /// A chunk of a 2x4 screen covering `rows` starting at `first_row`.
    fn chunk(source: MacAddr, nonce: u32, first_row: u16, rows: &[&[u8; 4]]) -> Frame {
        let hdr = ScreenChunkHeader {
            rows: 2,
            cols: 4,
            cursor_row: 1,
            cursor_col: 3,
            offset: first_row * 8,
            count: rows.len() as u16 * 8,
        };
        let mut payload = vec![0u8; SCREEN_CHUNK_HEADER_LEN];
        hdr.encode_into(&mut payload);
        for row in rows {
            for &ch in row.iter() {
                payload.extend_from_slice(&[ch, 0x07]);
            }
        }
        let link = LinkHeader {
            destination: ME,
            source,
            ethertype: DEFAULT_ETHERTYPE,
        };
        Frame::new(link, nonce, MessageType::ScreenChunk, payload).unwrap()
    }

    #[test]
    fn redraws_once_per_completed_pass() {
        let mut watcher = Watcher::new(SERVER, 9);
        assert!(!watcher.on_frame(&chunk(SERVER, 9, 0, &[b"C:\\>"])).unwrap());
        assert!(watcher.on_frame(&chunk(SERVER, 9, 1, &[b"dir "])).unwrap());
        assert_eq!(watcher.chunks(), 2);

        let text = watcher.render();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), "── 02:00:00:00:80:ab 4x2 cursor 1,3 ──");
        assert_eq!(lines.next().unwrap(), "C:\\>");
        assert_eq!(lines.next().unwrap(), "dir");
    }

    #[test]
    fn single_chunk_pass() {
        let mut watcher = Watcher::new(SERVER, 1);
        assert!(watcher.on_frame(&chunk(SERVER, 1, 0, &[b"ab  ", b"cd  "])).unwrap());
        assert_eq!(watcher.mirror().cell(1, 1), Some((b'd', 0x07)));
    }

    #[test]
    fn ignores_other_sessions_and_stations() {
        let other = MacAddr([0x02, 0, 0, 0, 0, 0x99]);
        let mut watcher = Watcher::new(SERVER, 1);
        assert!(!watcher.on_frame(&chunk(other, 1, 0, &[b"xxxx", b"xxxx"])).unwrap());
        assert!(!watcher.on_frame(&chunk(SERVER, 2, 0, &[b"xxxx", b"xxxx"])).unwrap());
        assert_eq!(watcher.chunks(), 0);
        assert_eq!(watcher.mirror().rows(), 0);
    }
}
