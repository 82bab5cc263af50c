//! Link-layer and protocol headers.
//!
//! ## Wire format
//!
//! All multi-byte integers are network byte order.
//!
//! **Link header** (14 bytes):
//! ```text
//! destination:  [u8; 6]
//! source:       [u8; 6]
//! ethertype:    u16
//! ```
//!
//! **Protocol header** (12 bytes):
//! ```text
//! signature:    u32  (always SIGNATURE)
//! nonce:        u32  (peer-chosen session id, echoed by the server)
//! payload_len:  u16  (bytes following this header)
//! message_type: u16
//! ```

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut};

use crate::error::RmtError;

// ── Constants ────────────────────────────────────────────────────

/// Bytes in a link identity (an IEEE MAC address).
pub const IDENTITY_LEN: usize = 6;

/// Encoded size of [`LinkHeader`].
pub const LINK_HEADER_LEN: usize = 14;

/// Encoded size of [`ProtocolHeader`].
pub const PROTOCOL_HEADER_LEN: usize = 12;

/// Link header plus protocol header.
pub const COMBINED_HEADER_LEN: usize = LINK_HEADER_LEN + PROTOCOL_HEADER_LEN;

/// Largest frame the link carries (802.3 without FCS).
pub const MAX_FRAME_LEN: usize = 1514;

/// Largest payload that fits one frame.
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - COMBINED_HEADER_LEN;

/// Largest frame on links configured for jumbo frames. Only the transmit
/// side ever uses more than [`MAX_FRAME_LEN`].
pub const MAX_JUMBO_FRAME_LEN: usize = 9014;

/// Default link type tag registered with the link layer.
pub const DEFAULT_ETHERTYPE: u16 = 0x80ab;

/// Constant carried by every rmtdos frame. Rejects traffic from other
/// systems that happen to share the link type tag.
pub const SIGNATURE: u32 = 0x7b6e_05b0;

// ── MacAddr ──────────────────────────────────────────────────────

/// A six-byte link identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; IDENTITY_LEN]);

impl MacAddr {
    /// The link broadcast identity.
    pub const BROADCAST: MacAddr = MacAddr([0xff; IDENTITY_LEN]);

    /// The all-zero identity; never a valid peer.
    pub const ZERO: MacAddr = MacAddr([0; IDENTITY_LEN]);

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = RmtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; IDENTITY_LEN];
        let mut parts = s.split([':', '-']);
        for byte in out.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| RmtError::InvalidConfig(format!("link identity too short: {s}")))?;
            *byte = u8::from_str_radix(part, 16)
                .map_err(|e| RmtError::InvalidConfig(format!("link identity {s}: {e}")))?;
        }
        if parts.next().is_some() {
            return Err(RmtError::InvalidConfig(format!(
                "link identity too long: {s}"
            )));
        }
        Ok(Self(out))
    }
}

/// Parse a link type tag given as hex, with or without `0x`.
pub fn parse_ethertype(text: &str) -> Result<u16, RmtError> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u16::from_str_radix(digits, 16)
        .map_err(|e| RmtError::InvalidConfig(format!("ethertype {text:?}: {e}")))
}

// ── LinkHeader ───────────────────────────────────────────────────

/// 802.3 header without VLAN tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkHeader {
    pub destination: MacAddr,
    pub source: MacAddr,
    pub ethertype: u16,
}

impl LinkHeader {
    /// Write into the first [`LINK_HEADER_LEN`] bytes of `dst`.
    ///
    /// # Panics
    ///
    /// Panics if `dst` is shorter than [`LINK_HEADER_LEN`].
    pub fn encode_into(&self, dst: &mut [u8]) {
        let mut buf = &mut dst[..LINK_HEADER_LEN];
        buf.put_slice(&self.destination.0);
        buf.put_slice(&self.source.0);
        buf.put_u16(self.ethertype);
    }

    pub fn decode(src: &[u8]) -> Result<Self, RmtError> {
        if src.len() < LINK_HEADER_LEN {
            return Err(RmtError::FrameTooShort {
                needed: LINK_HEADER_LEN,
                actual: src.len(),
            });
        }
        let mut buf = &src[..LINK_HEADER_LEN];
        let mut destination = [0u8; IDENTITY_LEN];
        let mut source = [0u8; IDENTITY_LEN];
        buf.copy_to_slice(&mut destination);
        buf.copy_to_slice(&mut source);
        Ok(Self {
            destination: MacAddr(destination),
            source: MacAddr(source),
            ethertype: buf.get_u16(),
        })
    }
}

// ── ProtocolHeader ───────────────────────────────────────────────

/// Header that follows the link header in every rmtdos frame.
///
/// `message_type` is kept raw so that frames with unknown types can still
/// be parsed (and then ignored by the dispatcher).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolHeader {
    pub signature: u32,
    pub nonce: u32,
    pub payload_len: u16,
    pub message_type: u16,
}

impl ProtocolHeader {
    pub fn new(nonce: u32, payload_len: u16, message_type: u16) -> Self {
        Self {
            signature: SIGNATURE,
            nonce,
            payload_len,
            message_type,
        }
    }

    /// Write into the first [`PROTOCOL_HEADER_LEN`] bytes of `dst`.
    ///
    /// # Panics
    ///
    /// Panics if `dst` is shorter than [`PROTOCOL_HEADER_LEN`].
    pub fn encode_into(&self, dst: &mut [u8]) {
        let mut buf = &mut dst[..PROTOCOL_HEADER_LEN];
        buf.put_u32(self.signature);
        buf.put_u32(self.nonce);
        buf.put_u16(self.payload_len);
        buf.put_u16(self.message_type);
    }

    /// Decode without judging the contents; see [`Self::validate`].
    pub fn decode(src: &[u8]) -> Result<Self, RmtError> {
        if src.len() < PROTOCOL_HEADER_LEN {
            return Err(RmtError::FrameTooShort {
                needed: PROTOCOL_HEADER_LEN,
                actual: src.len(),
            });
        }
        let mut buf = &src[..PROTOCOL_HEADER_LEN];
        Ok(Self {
            signature: buf.get_u32(),
            nonce: buf.get_u32(),
            payload_len: buf.get_u16(),
            message_type: buf.get_u16(),
        })
    }

    pub fn validate(&self) -> Result<(), RmtError> {
        if self.signature != SIGNATURE {
            return Err(RmtError::InvalidSignature(self.signature));
        }
        Ok(())
    }
}
