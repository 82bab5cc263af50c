//! Bounded session table.
//!
//! Slots are fixed at construction. A full table rejects new sessions
//! outright; slots only come back when [`SessionTable::reap`] finds a
//! session that has been idle longer than the lifetime.

use tracing::debug;

use crate::error::RmtError;
use crate::header::MacAddr;

/// Table capacity when nothing else is configured.
pub const DEFAULT_SESSIONS: usize = 4;

// ── Session ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub identity: MacAddr,
    pub nonce: u32,
    /// Clock reading at the last SessionStart.
    pub last_activity: u64,
}

impl Session {
    pub fn matches(&self, identity: MacAddr, nonce: u32) -> bool {
        self.identity == identity && self.nonce == nonce
    }

    /// Idle for strictly longer than `lifetime` as of `now`.
    pub fn is_expired(&self, now: u64, lifetime: u64) -> bool {
        now.wrapping_sub(self.last_activity) > lifetime
    }
}

/// What [`SessionTable::start_or_refresh`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Created,
    Refreshed,
}

// ── SessionTable ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionTable {
    slots: Box<[Option<Session>]>,
}

impl SessionTable {
    pub fn new(capacity: usize) -> Result<Self, RmtError> {
        if capacity == 0 {
            return Err(RmtError::InvalidConfig(
                "session table capacity must be at least 1".into(),
            ));
        }
        Ok(Self {
            slots: vec![None; capacity].into_boxed_slice(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn find(&self, identity: MacAddr, nonce: u32) -> Option<&Session> {
        self.iter().find(|s| s.matches(identity, nonce))
    }

    /// Refresh the session for `(identity, nonce)`, or create it in the
    /// first empty slot. Fails with [`RmtError::SessionTableFull`] when
    /// neither is possible.
    pub fn start_or_refresh(
        &mut self,
        identity: MacAddr,
        nonce: u32,
        now: u64,
    ) -> Result<StartOutcome, RmtError> {
        let mut vacant = None;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            match slot {
                Some(session) if session.matches(identity, nonce) => {
                    session.last_activity = now;
                    return Ok(StartOutcome::Refreshed);
                }
                None if vacant.is_none() => vacant = Some(i),
                _ => {}
            }
        }

        let i = vacant.ok_or(RmtError::SessionTableFull(self.slots.len()))?;
        self.slots[i] = Some(Session {
            identity,
            nonce,
            last_activity: now,
        });
        debug!(%identity, nonce, slot = i, "session created");
        Ok(StartOutcome::Created)
    }

    /// Clear every session idle longer than `lifetime`; returns how many
    /// were cleared.
    pub fn reap(&mut self, now: u64, lifetime: u64) -> usize {
        let mut reaped = 0;
        for slot in self.slots.iter_mut() {
            if slot.is_some_and(|s| s.is_expired(now, lifetime)) {
                if let Some(s) = slot.take() {
                    debug!(identity = %s.identity, nonce = s.nonce, "session expired");
                }
                reaped += 1;
            }
        }
        reaped
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.active_count() == 0
    }

    /// Active sessions in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Session> + '_ {
        self.slots.iter().flatten()
    }
}
