//! Whole-frame parsing and building.
//!
//! The server side never allocates here: [`FrameView`] borrows the pool
//! buffer it was parsed from and [`FrameWriter`] writes into a send buffer
//! allocated once at startup. [`Frame`] is the owned form used by clients.

use std::fmt::Debug;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::RmtError;
use crate::header::{
    COMBINED_HEADER_LEN, LINK_HEADER_LEN, LinkHeader, MAX_JUMBO_FRAME_LEN, MAX_PAYLOAD_LEN,
    MacAddr, ProtocolHeader,
};
use crate::message::MessageType;

// ── FrameView ────────────────────────────────────────────────────

/// A validated frame borrowed from a receive buffer.
///
/// The payload slice is clamped to the smallest of the declared payload
/// length, the bytes actually received after the headers, and
/// [`MAX_PAYLOAD_LEN`]. The declared length is otherwise trusted: a
/// sender that declares less than it sent simply has the tail ignored.
#[derive(Clone, Copy)]
pub struct FrameView<'a> {
    pub link: LinkHeader,
    pub header: ProtocolHeader,
    payload: &'a [u8],
    received: usize,
}

impl<'a> FrameView<'a> {
    pub fn parse(raw: &'a [u8]) -> Result<Self, RmtError> {
        Self::parse_with_limit(raw, MAX_PAYLOAD_LEN)
    }

    /// Parse with a payload ceiling other than [`MAX_PAYLOAD_LEN`], for
    /// peers of a server sending jumbo frames.
    pub fn parse_with_limit(raw: &'a [u8], max_payload: usize) -> Result<Self, RmtError> {
        if raw.len() < COMBINED_HEADER_LEN {
            return Err(RmtError::FrameTooShort {
                needed: COMBINED_HEADER_LEN,
                actual: raw.len(),
            });
        }
        let link = LinkHeader::decode(raw)?;
        let header = ProtocolHeader::decode(&raw[LINK_HEADER_LEN..])?;
        header.validate()?;

        let available = raw.len() - COMBINED_HEADER_LEN;
        let len = (header.payload_len as usize)
            .min(available)
            .min(max_payload);

        Ok(Self {
            link,
            header,
            payload: &raw[COMBINED_HEADER_LEN..COMBINED_HEADER_LEN + len],
            received: raw.len(),
        })
    }

    pub fn message_type(&self) -> Result<MessageType, RmtError> {
        MessageType::try_from(self.header.message_type)
    }

    pub fn source(&self) -> MacAddr {
        self.link.source
    }

    pub fn nonce(&self) -> u32 {
        self.header.nonce
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Bytes handed over by the link layer, padding included.
    pub fn received_len(&self) -> usize {
        self.received
    }
}

impl Debug for FrameView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameView")
            .field("source", &self.link.source)
            .field("destination", &self.link.destination)
            .field("nonce", &format_args!("{:#010x}", self.header.nonce))
            .field("message_type", &self.header.message_type)
            .field("payload_len", &self.payload.len())
            .field("received", &self.received)
            .finish()
    }
}

// ── FrameWriter ──────────────────────────────────────────────────

/// Builds a frame in place inside a caller-owned send buffer.
pub struct FrameWriter<'a> {
    buf: &'a mut [u8],
}

impl<'a> FrameWriter<'a> {
    /// Wrap `buf`, which must at least hold both headers.
    pub fn new(buf: &'a mut [u8]) -> Result<Self, RmtError> {
        if buf.len() < COMBINED_HEADER_LEN {
            return Err(RmtError::FrameTooShort {
                needed: COMBINED_HEADER_LEN,
                actual: buf.len(),
            });
        }
        Ok(Self { buf })
    }

    /// Stamp both headers. The payload length field is written later by
    /// [`finish`](Self::finish).
    pub fn write_headers(&mut self, link: &LinkHeader, nonce: u32) {
        link.encode_into(self.buf);
        ProtocolHeader::new(nonce, 0, MessageType::Noop as u16)
            .encode_into(&mut self.buf[LINK_HEADER_LEN..]);
    }

    /// Retarget an already built frame; used to fan one frame out to
    /// several sessions without rebuilding the payload.
    pub fn retarget(&mut self, destination: MacAddr, nonce: u32) {
        self.buf[..6].copy_from_slice(&destination.0);
        self.buf[LINK_HEADER_LEN + 4..LINK_HEADER_LEN + 8].copy_from_slice(&nonce.to_be_bytes());
    }

    /// Room for payload. The caller sizes the buffer to its MTU.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buf[COMBINED_HEADER_LEN..]
    }

    /// Zero the payload area so stale bytes never leak into a reply.
    pub fn clear_payload(&mut self) {
        self.buf[COMBINED_HEADER_LEN..].fill(0);
    }

    /// Write type and payload length; returns the total frame length.
    pub fn finish(&mut self, message_type: MessageType, payload_len: usize) -> Result<usize, RmtError> {
        let max = self.payload_mut().len();
        if payload_len > max {
            return Err(RmtError::PayloadTooLarge {
                size: payload_len,
                max,
            });
        }
        let mut field = &mut self.buf[LINK_HEADER_LEN + 8..COMBINED_HEADER_LEN];
        field.put_u16(payload_len as u16);
        field.put_u16(message_type as u16);
        Ok(COMBINED_HEADER_LEN + payload_len)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf
    }
}

/// Begin a reply to `template`: destination is the template's source,
/// source is `own`, the nonce is echoed unchanged and the payload area is
/// zeroed.
pub fn prepare_reply<'a>(
    buf: &'a mut [u8],
    template: &FrameView<'_>,
    own: MacAddr,
    ethertype: u16,
) -> Result<FrameWriter<'a>, RmtError> {
    let mut writer = FrameWriter::new(buf)?;
    let link = LinkHeader {
        destination: template.source(),
        source: own,
        ethertype,
    };
    writer.write_headers(&link, template.nonce());
    writer.clear_payload();
    Ok(writer)
}

/// Build a complete reply carrying `payload`; returns the frame length.
pub fn build_reply(
    buf: &mut [u8],
    template: &FrameView<'_>,
    own: MacAddr,
    ethertype: u16,
    message_type: MessageType,
    payload: &[u8],
) -> Result<usize, RmtError> {
    let mut writer = prepare_reply(buf, template, own, ethertype)?;
    let room = writer.payload_mut();
    if payload.len() > room.len() {
        return Err(RmtError::PayloadTooLarge {
            size: payload.len(),
            max: room.len(),
        });
    }
    room[..payload.len()].copy_from_slice(payload);
    writer.finish(message_type, payload.len())
}

// ── Frame ────────────────────────────────────────────────────────

/// An owned frame, as exchanged by clients through
/// [`FrameCodec`](crate::codec::FrameCodec).
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub link: LinkHeader,
    pub nonce: u32,
    pub message_type: MessageType,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(
        link: LinkHeader,
        nonce: u32,
        message_type: MessageType,
        payload: impl Into<Bytes>,
    ) -> Result<Self, RmtError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(RmtError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(Self {
            link,
            nonce,
            message_type,
            payload,
        })
    }

    /// Parse and copy out of `raw`. Accepts jumbo frames.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, RmtError> {
        let view = FrameView::parse_with_limit(raw, MAX_JUMBO_FRAME_LEN - COMBINED_HEADER_LEN)?;
        Ok(Self {
            link: view.link,
            nonce: view.nonce(),
            message_type: view.message_type()?,
            payload: Bytes::copy_from_slice(view.payload()),
        })
    }

    pub fn encoded_len(&self) -> usize {
        COMBINED_HEADER_LEN + self.payload.len()
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        let start = dst.len();
        dst.resize(start + COMBINED_HEADER_LEN, 0);
        self.link.encode_into(&mut dst[start..]);
        ProtocolHeader::new(self.nonce, self.payload.len() as u16, self.message_type as u16)
            .encode_into(&mut dst[start + LINK_HEADER_LEN..]);
        dst.put_slice(&self.payload);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }
}

impl Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("link", &self.link)
            .field("nonce", &format_args!("{:#010x}", self.nonce))
            .field("message_type", &self.message_type)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{DEFAULT_ETHERTYPE, MAX_FRAME_LEN, SIGNATURE};

    const PEER: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x10]);
    const SERVER: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x01]);

    fn raw_frame(message_type: MessageType, nonce: u32, payload: &[u8]) -> Vec<u8> {
        let link = LinkHeader {
            destination: MacAddr::BROADCAST,
            source: PEER,
            ethertype: DEFAULT_ETHERTYPE,
        };
        Frame::new(link, nonce, message_type, payload.to_vec())
            .unwrap()
            .to_bytes()
            .to_vec()
    }

    #[test]
    fn parse_valid_frame() {
        let raw = raw_frame(MessageType::Ping, 0xabcd, b"PING");
        let view = FrameView::parse(&raw).unwrap();
        assert_eq!(view.source(), PEER);
        assert_eq!(view.nonce(), 0xabcd);
        assert_eq!(view.message_type().unwrap(), MessageType::Ping);
        assert_eq!(view.payload(), b"PING");
    }

    #[test]
    fn parse_rejects_foreign_signature() {
        let mut raw = raw_frame(MessageType::Ping, 1, b"");
        raw[LINK_HEADER_LEN] ^= 0xff;
        assert!(matches!(
            FrameView::parse(&raw),
            Err(RmtError::InvalidSignature(_))
        ));
    }

    #[test]
    fn parse_rejects_runt() {
        assert!(matches!(
            FrameView::parse(&[0u8; 20]),
            Err(RmtError::FrameTooShort { needed: 26, .. })
        ));
    }

    #[test]
    fn declared_length_is_clamped_to_received() {
        let mut raw = raw_frame(MessageType::Ping, 1, b"abcd");
        // Claim far more than was sent.
        raw[LINK_HEADER_LEN + 8..LINK_HEADER_LEN + 10].copy_from_slice(&1400u16.to_be_bytes());
        let view = FrameView::parse(&raw).unwrap();
        assert_eq!(view.payload(), b"abcd");
    }

    #[test]
    fn declared_length_shorter_than_padding_wins() {
        let mut raw = raw_frame(MessageType::Ping, 1, b"ab");
        raw.resize(60, 0);
        let view = FrameView::parse(&raw).unwrap();
        assert_eq!(view.payload(), b"ab");
        assert_eq!(view.received_len(), 60);
    }

    #[test]
    fn jumbo_payload_needs_a_raised_limit() {
        let link = LinkHeader {
            destination: PEER,
            source: SERVER,
            ethertype: DEFAULT_ETHERTYPE,
        };
        let mut raw = vec![0u8; COMBINED_HEADER_LEN + 2000];
        link.encode_into(&mut raw);
        ProtocolHeader::new(9, 2000, MessageType::ScreenChunk as u16)
            .encode_into(&mut raw[LINK_HEADER_LEN..]);

        assert_eq!(FrameView::parse(&raw).unwrap().payload().len(), MAX_PAYLOAD_LEN);
        assert_eq!(Frame::from_bytes(&raw).unwrap().payload.len(), 2000);
    }

    #[test]
    fn unknown_type_parses_but_does_not_map() {
        let mut raw = raw_frame(MessageType::Ping, 1, b"");
        raw[LINK_HEADER_LEN + 10..LINK_HEADER_LEN + 12].copy_from_slice(&99u16.to_be_bytes());
        let view = FrameView::parse(&raw).unwrap();
        assert!(view.message_type().is_err());
    }

    #[test]
    fn reply_swaps_identities_and_echoes_nonce() {
        let raw = raw_frame(MessageType::Ping, 0x1122_3344, b"xyz");
        let view = FrameView::parse(&raw).unwrap();

        let mut out = [0xeeu8; MAX_FRAME_LEN];
        let len = build_reply(&mut out, &view, SERVER, DEFAULT_ETHERTYPE, MessageType::Pong, b"xyz").unwrap();
        assert_eq!(len, COMBINED_HEADER_LEN + 3);

        let reply = FrameView::parse(&out[..len]).unwrap();
        assert_eq!(reply.link.destination, PEER);
        assert_eq!(reply.link.source, SERVER);
        assert_eq!(reply.header.signature, SIGNATURE);
        assert_eq!(reply.nonce(), 0x1122_3344);
        assert_eq!(reply.message_type().unwrap(), MessageType::Pong);
        assert_eq!(reply.payload(), b"xyz");
        // Stale bytes past the payload were cleared.
        assert!(out[len..].iter().all(|&b| b == 0));
    }

    #[test]
    fn retarget_rewrites_destination_and_nonce_only() {
        let mut out = [0u8; 64];
        let mut writer = FrameWriter::new(&mut out).unwrap();
        let link = LinkHeader {
            destination: MacAddr::ZERO,
            source: SERVER,
            ethertype: DEFAULT_ETHERTYPE,
        };
        writer.write_headers(&link, 0);
        writer.payload_mut()[..2].copy_from_slice(b"hi");
        let len = writer.finish(MessageType::ScreenChunk, 2).unwrap();
        writer.retarget(PEER, 77);

        let view = FrameView::parse(&out[..len]).unwrap();
        assert_eq!(view.link.destination, PEER);
        assert_eq!(view.link.source, SERVER);
        assert_eq!(view.nonce(), 77);
        assert_eq!(view.payload(), b"hi");
    }

    #[test]
    fn finish_rejects_oversized_payload() {
        let mut out = [0u8; 40];
        let mut writer = FrameWriter::new(&mut out).unwrap();
        assert!(matches!(
            writer.finish(MessageType::Pong, 20),
            Err(RmtError::PayloadTooLarge { size: 20, max: 14 })
        ));
    }

    #[test]
    fn owned_frame_rejects_oversized_payload() {
        let link = LinkHeader {
            destination: SERVER,
            source: PEER,
            ethertype: DEFAULT_ETHERTYPE,
        };
        assert!(Frame::new(link, 1, MessageType::Ping, vec![0u8; MAX_PAYLOAD_LEN + 1]).is_err());
    }
}
