use bitflags::bitflags;

bitflags! {
    /// Modifier keys held during a keystroke.
    ///
    /// Bit positions follow the BIOS keyboard flag byte at 0040:0017.
    /// Left and right modifiers are not distinguished.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct KeyFlags: u16 {
        const SHIFT = 0x0001;
        const CONTROL = 0x0004;
        const ALT = 0x0008;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_bits_are_dropped() {
        let flags = KeyFlags::from_bits_truncate(0xfff0 | 0x0005);
        assert_eq!(flags, KeyFlags::SHIFT | KeyFlags::CONTROL);
    }
}
