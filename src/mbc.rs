//! Cartridge header decoding: MBC kind and external-RAM sizing.

/// Memory bank controller fitted to the cartridge, from header byte 0x147.
///
/// Only MBC1 register semantics are implemented by the bus; the other
/// variants are recognized so ERAM sizing and diagnostics stay correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcKind {
    None,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
    Unknown(u8),
}

impl MbcKind {
    pub fn from_header(code: u8) -> Self {
        match code {
            0x00 | 0x08 | 0x09 => MbcKind::None,
            0x01..=0x03 => MbcKind::Mbc1,
            0x05 | 0x06 => MbcKind::Mbc2,
            0x0F..=0x13 => MbcKind::Mbc3,
            0x19..=0x1E => MbcKind::Mbc5,
            other => {
                log::warn!("Unknown cartridge type {:02X}, treating as MBC1", other);
                MbcKind::Unknown(other)
            }
        }
    }

    /// MBC2 carries its own 512-byte RAM regardless of header byte 0x149.
    pub fn builtin_ram(self) -> Option<usize> {
        match self {
            MbcKind::Mbc2 => Some(512),
            _ => None,
        }
    }
}

/// External RAM size from header byte 0x149.
pub fn eram_size(ram_code: u8, mbc: MbcKind) -> usize {
    if let Some(size) = mbc.builtin_ram() {
        return size;
    }
    match ram_code {
        0x00 => 0,
        0x01 => 2 * 1024,
        0x02 => 8 * 1024,
        0x03 => 32 * 1024,
        0x04 => 128 * 1024,
        0x05 => 64 * 1024,
        other => {
            log::warn!("Unknown RAM size code {:02X}, assuming no external RAM", other);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_codes_map_to_controllers() {
        assert_eq!(MbcKind::from_header(0x00), MbcKind::None);
        assert_eq!(MbcKind::from_header(0x01), MbcKind::Mbc1);
        assert_eq!(MbcKind::from_header(0x03), MbcKind::Mbc1);
        assert_eq!(MbcKind::from_header(0x06), MbcKind::Mbc2);
        assert_eq!(MbcKind::from_header(0x13), MbcKind::Mbc3);
        assert_eq!(MbcKind::from_header(0x1B), MbcKind::Mbc5);
        assert_eq!(MbcKind::from_header(0xFC), MbcKind::Unknown(0xFC));
    }

    #[test]
    fn ram_size_table() {
        assert_eq!(eram_size(0x00, MbcKind::Mbc1), 0);
        assert_eq!(eram_size(0x01, MbcKind::Mbc1), 2 * 1024);
        assert_eq!(eram_size(0x02, MbcKind::Mbc1), 8 * 1024);
        assert_eq!(eram_size(0x03, MbcKind::Mbc1), 32 * 1024);
        assert_eq!(eram_size(0x04, MbcKind::Mbc1), 128 * 1024);
        assert_eq!(eram_size(0x05, MbcKind::Mbc1), 64 * 1024);
    }

    #[test]
    fn mbc2_overrides_header_ram_size() {
        assert_eq!(eram_size(0x00, MbcKind::Mbc2), 512);
        assert_eq!(eram_size(0x03, MbcKind::Mbc2), 512);
    }
}
