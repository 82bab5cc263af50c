//! Draining the ready list and routing each frame to its handler.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::Engine;
use crate::display::TextDisplay;
use crate::error::RmtError;
use crate::host::{Clock, KeyInjector, Link};
use crate::message::MessageType;
use crate::packet::{FrameView, build_reply};
use crate::protocol::{Keystrokes, StatusResponse};
use crate::session::StartOutcome;

impl<L, D, K, C> Engine<L, D, K, C>
where
    L: Link,
    D: TextDisplay,
    K: KeyInjector,
    C: Clock,
{
    /// Handle every ready buffer and release it. Returns how many buffers
    /// were taken.
    pub fn process_ready_buffers(&mut self) -> usize {
        let pool = Arc::clone(&self.pool);
        let mut taken = 0;
        while let Some(buffer) = pool.take_ready() {
            self.dispatch(buffer.as_slice());
            buffer.release();
            taken += 1;
        }
        taken
    }

    /// Validate and route one raw frame.
    fn dispatch(&mut self, raw: &[u8]) {
        let frame = match FrameView::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.rejected += 1;
                trace!("rejected frame: {e}");
                return;
            }
        };

        if frame.link.ethertype != self.config.ethertype {
            self.stats.rejected += 1;
            trace!(ethertype = frame.link.ethertype, "rejected frame for another ethertype");
            return;
        }
        let destination = frame.link.destination;
        if destination != self.identity && !destination.is_broadcast() {
            self.stats.rejected += 1;
            trace!(%destination, "rejected frame for another station");
            return;
        }

        let message_type = match frame.message_type() {
            Ok(t) => t,
            Err(e) => {
                self.stats.rejected += 1;
                trace!(source = %frame.source(), "rejected frame: {e}");
                return;
            }
        };

        self.stats.processed += 1;
        trace!(?frame, %message_type, "dispatching");

        let result = self.route(message_type, &frame);

        match result {
            Ok(()) => {}
            Err(e @ RmtError::SessionTableFull(_)) => {
                self.stats.sessions_rejected += 1;
                debug!(source = %frame.source(), nonce = frame.nonce(), "session refused: {e}");
            }
            Err(e @ RmtError::UnknownSession(_)) => {
                self.stats.rejected += 1;
                trace!(source = %frame.source(), "{e}");
            }
            Err(e @ RmtError::Transmit(_)) => {
                self.stats.transmit_errors += 1;
                warn!(%message_type, "reply not sent: {e}");
            }
            Err(e) => warn!(%message_type, "handler failed: {e}"),
        }
    }

    fn route(&mut self, message_type: MessageType, frame: &FrameView<'_>) -> Result<(), RmtError> {
        if message_type.is_server_originated() {
            trace!(%message_type, "ignoring server-originated message");
            return Ok(());
        }
        if message_type.requires_session() && self.sessions.find(frame.source(), frame.nonce()).is_none() {
            return Err(RmtError::UnknownSession(frame.nonce()));
        }
        match message_type {
            MessageType::Ping => self.handle_ping(frame),
            MessageType::StatusRequest => self.handle_status_request(frame),
            MessageType::SessionStart => self.handle_session_start(frame),
            MessageType::InjectKeystroke => self.handle_inject(frame),
            _ => Ok(()),
        }
    }

    // ── Handlers ─────────────────────────────────────────────────

    /// Echo the payload back as Pong. The reply is as long as the frame
    /// that was received, so any link padding is echoed as zeros.
    fn handle_ping(&mut self, frame: &FrameView<'_>) -> Result<(), RmtError> {
        let len = build_reply(
            &mut self.send_buf,
            frame,
            self.identity,
            self.config.ethertype,
            MessageType::Pong,
            frame.payload(),
        )?;
        let wire_len = len.max(frame.received_len()).min(self.send_buf.len());
        self.link.transmit(&self.send_buf[..wire_len])?;
        trace!(source = %frame.source(), len = wire_len, "pong");
        Ok(())
    }

    fn handle_status_request(&mut self, frame: &FrameView<'_>) -> Result<(), RmtError> {
        let status = StatusResponse::from(self.display.state()).encode();
        let len = build_reply(
            &mut self.send_buf,
            frame,
            self.identity,
            self.config.ethertype,
            MessageType::StatusResponse,
            &status,
        )?;
        self.link.transmit(&self.send_buf[..len])?;
        debug!(source = %frame.source(), "status sent");
        Ok(())
    }

    fn handle_session_start(&mut self, frame: &FrameView<'_>) -> Result<(), RmtError> {
        let now = self.clock.now();
        match self.sessions.start_or_refresh(frame.source(), frame.nonce(), now)? {
            StartOutcome::Created => {
                // A new viewer has nothing yet, so the next pass must go out
                // even if the screen is unchanged.
                self.last_checksum = None;
            }
            StartOutcome::Refreshed => {
                trace!(source = %frame.source(), nonce = frame.nonce(), "session refreshed");
            }
        }
        Ok(())
    }

    fn handle_inject(&mut self, frame: &FrameView<'_>) -> Result<(), RmtError> {
        for key in Keystrokes::new(frame.payload()) {
            self.injector.inject(key)?;
            self.stats.keystrokes += 1;
        }
        Ok(())
    }
}
