use core::fmt::{self, Display};

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// I2C 从设备地址（8-bit 写地址形式，例如 MAX9286 的 `0x94`）
///
/// 芯片手册和寄存器表里都使用 8-bit 形式，总线上实际发送的是高 7 位，
/// 见 [`SlaveAddr::seven_bit`]。串行器在 bring-up 过程中会被改址，
/// 所以地址是值类型而不是常量。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SlaveAddr(pub u16);

impl SlaveAddr {
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    /// 7-bit 总线地址
    pub const fn seven_bit(self) -> u8 {
        (self.0 >> 1) as u8
    }

    /// 串行器的地址寄存器里保存的是 8-bit 形式的低字节
    pub const fn as_reg_value(self) -> u8 {
        self.0 as u8
    }
}

impl From<u8> for SlaveAddr {
    fn from(value: u8) -> Self {
        Self(value as u16)
    }
}

impl Display for SlaveAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Sub-address width of a target chip family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum RegWidth {
    /// Deserializer and serializer registers
    Byte = 1,
    /// Page + register, used by the downstream ISPs
    Word = 2,
}

impl RegWidth {
    pub const fn len(self) -> usize {
        self as usize
    }
}

/// Register sub-address sent before the value byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegPath {
    bytes: [u8; 2],
    width: RegWidth,
}

impl RegPath {
    pub const fn byte(reg: u8) -> Self {
        Self {
            bytes: [reg, 0],
            width: RegWidth::Byte,
        }
    }

    pub const fn word(page: u8, reg: u8) -> Self {
        Self {
            bytes: [page, reg],
            width: RegWidth::Word,
        }
    }

    /// 从 16-bit 寄存器地址构造（高字节为 page）
    pub const fn from_u16(reg: u16) -> Self {
        Self::word((reg >> 8) as u8, reg as u8)
    }

    pub const fn width(&self) -> RegWidth {
        self.width
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.width.len()]
    }

    pub const fn first(&self) -> u8 {
        self.bytes[0]
    }
}

impl Display for RegPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.width {
            RegWidth::Byte => write!(f, "{:#04x}", self.bytes[0]),
            RegWidth::Word => write!(f, "{:#06x}", u16::from_be_bytes(self.bytes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seven_bit_address_drops_rw_bit() {
        assert_eq!(SlaveAddr(0x94).seven_bit(), 0x4A);
        assert_eq!(SlaveAddr(0x80).seven_bit(), 0x40);
    }

    #[test]
    fn reg_path_width_matches_bytes() {
        assert_eq!(RegPath::byte(0x1E).as_bytes(), &[0x1E]);
        assert_eq!(RegPath::word(0xFF, 0xFD).as_bytes(), &[0xFF, 0xFD]);
        assert_eq!(RegPath::from_u16(0x5000), RegPath::word(0x50, 0x00));
        assert_eq!(RegWidth::try_from(2u8).ok(), Some(RegWidth::Word));
        assert!(RegWidth::try_from(3u8).is_err());
    }
}
