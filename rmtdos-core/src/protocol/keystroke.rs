//! Remote keyboard input.
//!
//! ```text
//! Peer ──[InjectKeystroke]──► Server
//!   Payload: Keystroke × n, n = payload_len / 4
//! ```
//!
//! Each record is the argument triple of BIOS int 16h AH=05h plus the
//! modifier state to place in the keyboard flag byte.

use crate::error::RmtError;
use crate::flags::KeyFlags;

/// Encoded size of one [`Keystroke`].
pub const KEYSTROKE_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Keystroke {
    pub scan_code: u8,
    pub ascii: u8,
    /// Raw modifier field; see [`KeyFlags`].
    pub flags: u16,
}

impl Keystroke {
    pub fn new(scan_code: u8, ascii: u8, modifiers: KeyFlags) -> Self {
        Self {
            scan_code,
            ascii,
            flags: modifiers.bits(),
        }
    }

    /// A plain ASCII key with no scan code.
    pub fn ascii(ch: u8) -> Self {
        Self::new(0, ch, KeyFlags::empty())
    }

    pub fn modifiers(&self) -> KeyFlags {
        KeyFlags::from_bits_truncate(self.flags)
    }

    pub fn encode(&self) -> [u8; KEYSTROKE_LEN] {
        let flags = self.flags.to_be_bytes();
        [self.scan_code, self.ascii, flags[0], flags[1]]
    }

    pub fn decode(data: &[u8]) -> Result<Self, RmtError> {
        if data.len() < KEYSTROKE_LEN {
            return Err(RmtError::FrameTooShort {
                needed: KEYSTROKE_LEN,
                actual: data.len(),
            });
        }
        Ok(Self {
            scan_code: data[0],
            ascii: data[1],
            flags: u16::from_be_bytes([data[2], data[3]]),
        })
    }

    /// Encode a batch into one payload; returns the bytes written.
    pub fn encode_all(keys: &[Keystroke], dst: &mut [u8]) -> Result<usize, RmtError> {
        let len = keys.len() * KEYSTROKE_LEN;
        if len > dst.len() {
            return Err(RmtError::PayloadTooLarge {
                size: len,
                max: dst.len(),
            });
        }
        for (key, slot) in keys.iter().zip(dst.chunks_exact_mut(KEYSTROKE_LEN)) {
            slot.copy_from_slice(&key.encode());
        }
        Ok(len)
    }
}

/// Iterator over the records of an InjectKeystroke payload. A trailing
/// partial record is ignored.
pub struct Keystrokes<'a> {
    records: std::slice::ChunksExact<'a, u8>,
}

impl<'a> Keystrokes<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self {
            records: payload.chunks_exact(KEYSTROKE_LEN),
        }
    }
}

impl Iterator for Keystrokes<'_> {
    type Item = Keystroke;

    fn next(&mut self) -> Option<Self::Item> {
        // Records are exactly KEYSTROKE_LEN, so decode cannot fail.
        self.records.next().and_then(|r| Keystroke::decode(r).ok())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout() {
        let key = Keystroke::new(0x1e, b'a', KeyFlags::SHIFT | KeyFlags::ALT);
        assert_eq!(key.encode(), [0x1e, b'a', 0x00, 0x09]);
        assert_eq!(Keystroke::decode(&key.encode()).unwrap(), key);
    }

    #[test]
    fn iterator_ignores_trailing_partial_record() {
        let mut payload = [0u8; 10];
        let n = Keystroke::encode_all(&[Keystroke::ascii(b'x'), Keystroke::ascii(b'y')], &mut payload).unwrap();
        assert_eq!(n, 8);
        let keys: Vec<_> = Keystrokes::new(&payload).collect();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1].ascii, b'y');
    }

    #[test]
    fn encode_all_checks_room() {
        let mut payload = [0u8; 6];
        assert!(Keystroke::encode_all(&[Keystroke::default(); 2], &mut payload).is_err());
    }

    #[test]
    fn modifiers_drop_unknown_bits() {
        let key = Keystroke {
            scan_code: 0,
            ascii: 0,
            flags: 0x0104,
        };
        assert_eq!(key.modifiers(), KeyFlags::CONTROL);
    }
}
