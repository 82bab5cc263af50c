//! `tokio_util` codec for owned [`Frame`]s.
//!
//! Every datagram is one frame, so the decoder always consumes its whole
//! input. Frames with another link type tag, a foreign signature or an
//! unknown message type are dropped without surfacing an error; the
//! protocol has no way to report them anyway.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::error::RmtError;
use crate::header::{DEFAULT_ETHERTYPE, MAX_FRAME_LEN, MAX_JUMBO_FRAME_LEN};
use crate::packet::Frame;

#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    ethertype: u16,
}

impl FrameCodec {
    pub fn new(ethertype: u16) -> Self {
        Self { ethertype }
    }

    pub fn ethertype(&self) -> u16 {
        self.ethertype
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_ETHERTYPE)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = RmtError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        let raw = src.split_to(src.len());
        if raw.len() > MAX_JUMBO_FRAME_LEN {
            trace!(len = raw.len(), "dropping oversized datagram");
            return Ok(None);
        }

        match Frame::from_bytes(&raw) {
            Ok(frame) if frame.link.ethertype == self.ethertype => Ok(Some(frame)),
            Ok(frame) => {
                trace!(ethertype = frame.link.ethertype, "dropping frame for another ethertype");
                Ok(None)
            }
            Err(e) => {
                trace!("dropping frame: {e}");
                Ok(None)
            }
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = RmtError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.encoded_len() > MAX_FRAME_LEN {
            return Err(RmtError::FrameTooLarge {
                size: item.encoded_len(),
                max: MAX_FRAME_LEN,
            });
        }
        dst.reserve(item.encoded_len());
        item.encode(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{LinkHeader, MacAddr};
    use crate::message::MessageType;

    fn frame(ethertype: u16) -> Frame {
        let link = LinkHeader {
            destination: MacAddr::BROADCAST,
            source: MacAddr([2, 0, 0, 0, 0, 9]),
            ethertype,
        };
        Frame::new(link, 5, MessageType::StatusRequest, Vec::new()).unwrap()
    }

    #[test]
    fn encode_then_decode() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(frame(DEFAULT_ETHERTYPE), &mut buf).unwrap();
        assert_eq!(buf.len(), 26);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.message_type, MessageType::StatusRequest);
        assert_eq!(decoded.nonce, 5);
        assert!(buf.is_empty());
    }

    #[test]
    fn other_ethertype_is_dropped_and_consumed() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        frame(0x0800).encode(&mut buf);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn garbage_is_dropped_and_consumed() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&[0x55u8; 40][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn framed_read_skips_foreign_datagrams() {
        use futures::StreamExt;
        use tokio_util::codec::FramedRead;

        let ours = frame(DEFAULT_ETHERTYPE).to_bytes();
        let foreign = frame(0x0800).to_bytes();
        let reader = tokio_test::io::Builder::new()
            .read(&ours)
            .read(&foreign)
            .read(&ours)
            .build();

        let frames: Vec<_> =
            tokio_test::block_on(FramedRead::new(reader, FrameCodec::default()).collect());
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.as_ref().is_ok_and(|f| f.nonce == 5)));
    }

    #[test]
    fn custom_ethertype_accepted() {
        let mut codec = FrameCodec::new(0x88b5);
        let mut buf = BytesMut::new();
        frame(0x88b5).encode(&mut buf);
        assert!(codec.decode(&mut buf).unwrap().is_some());
    }
}
