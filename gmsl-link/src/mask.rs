use core::fmt;

bitflags::bitflags! {
    /// 检测到物理链路的通道集合（最多 4 路）
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChannelMask: u8 {
        const CH0 = 1;
        const CH1 = 1 << 1;
        const CH2 = 1 << 2;
        const CH3 = 1 << 3;
    }
}

impl ChannelMask {
    pub const CHANNELS: u8 = 4;

    /// 取状态寄存器的低 4 位，高位忽略
    pub const fn from_status(status: u8) -> Self {
        Self::from_bits_truncate(status & 0x0F)
    }

    pub const fn channel(ch: u8) -> Self {
        Self::from_bits_truncate(1 << (ch & 0x03))
    }

    pub const fn count(self) -> u8 {
        self.bits().count_ones() as u8
    }

    pub const fn contains_channel(self, ch: u8) -> bool {
        ch < Self::CHANNELS && self.bits() & (1 << ch) != 0
    }

    /// 按通道号升序
    pub fn channels(self) -> impl Iterator<Item = u8> {
        (0..Self::CHANNELS).filter(move |&ch| self.contains_channel(ch))
    }
}

impl fmt::Debug for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelMask({:#06b})", self.bits())
    }
}

impl fmt::Display for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06b}", self.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_high_nibble_ignored() {
        let mask = ChannelMask::from_status(0xF5);
        assert_eq!(mask, ChannelMask::CH0 | ChannelMask::CH2);
        assert_eq!(mask.count(), 2);
        assert_eq!(mask.channels().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn channel_bounds() {
        assert!(ChannelMask::all().contains_channel(3));
        assert!(!ChannelMask::all().contains_channel(4));
        assert_eq!(ChannelMask::channel(2), ChannelMask::CH2);
    }
}
