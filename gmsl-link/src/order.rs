use crate::ChannelMask;

/// CSI-2 输出数据 lane 数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CsiLanes {
    One,
    Four,
}

impl CsiLanes {
    pub const fn count(self) -> u8 {
        match self {
            CsiLanes::One => 1,
            CsiLanes::Four => 4,
        }
    }
}

/// 单路 / 多路拓扑下的输出 lane 配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneSettings {
    pub lanes: CsiLanes,
    /// 输出 lane 寄存器的值
    pub outlane: u8,
    /// 帧同步寄存器的值
    pub frame_sync: u8,
}

/// 由通道掩码算出的解串器配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputOrderConfig {
    pub mask: ChannelMask,
    /// 每个物理通道占 2 bit（通道 i 在 bit `2i`），值为输出槽位
    pub order: u8,
    pub link_enable: u8,
    pub forward_all: u8,
    pub lanes: CsiLanes,
    pub outlane: u8,
    pub frame_sync: u8,
}

impl OutputOrderConfig {
    /// 物理通道 `ch` 被分配到的输出槽位
    pub const fn slot_of(&self, ch: u8) -> u8 {
        (self.order >> (ch * 2)) & 0x03
    }
}

/// 输出顺序计算
///
/// 接收端期望固定、连续的通道排布，所以未连接的通道也必须分到确定的槽位。
/// 已连接的通道按通道号升序依次取 `linked_slots`，未连接的通道依次取
/// `unlinked_slots`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfigurator {
    linked_slots: [u8; 4],
    unlinked_slots: [u8; 4],
    single: LaneSettings,
    multi: LaneSettings,
}

impl LinkConfigurator {
    pub const fn new(
        linked_slots: [u8; 4],
        unlinked_slots: [u8; 4],
        single: LaneSettings,
        multi: LaneSettings,
    ) -> Self {
        Self {
            linked_slots,
            unlinked_slots,
            single,
            multi,
        }
    }

    pub const fn lane_settings(&self, link_count: u8) -> LaneSettings {
        if link_count == 1 {
            self.single
        } else {
            self.multi
        }
    }

    pub fn compute_output_order(&self, mask: ChannelMask) -> OutputOrderConfig {
        let mut order = 0u8;
        let mut linked = 0usize;
        let mut unlinked = 0usize;

        for ch in 0..ChannelMask::CHANNELS {
            let slot = if mask.contains_channel(ch) {
                linked += 1;
                self.linked_slots[linked - 1]
            } else {
                unlinked += 1;
                self.unlinked_slots[unlinked - 1]
            };
            order |= (slot & 0x03) << (ch * 2);
        }

        let bits = mask.bits();
        let lane = self.lane_settings(mask.count());

        OutputOrderConfig {
            mask,
            order,
            link_enable: 0xEF & (bits | 0xF0),
            forward_all: bits | 0xF0,
            lanes: lane.lanes,
            outlane: lane.outlane,
            frame_sync: lane.frame_sync,
        }
    }
}

impl Default for LinkConfigurator {
    fn default() -> Self {
        Self::new(
            [0, 1, 2, 3],
            [3, 2, 1, 0],
            LaneSettings {
                lanes: CsiLanes::One,
                outlane: 0x33,
                frame_sync: 0xE2,
            },
            LaneSettings {
                lanes: CsiLanes::Four,
                outlane: 0xF3,
                frame_sync: 0x02,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn single_channel() {
        let cfg = LinkConfigurator::default().compute_output_order(ChannelMask::CH0);

        assert_eq!(cfg.order, 0x6C);
        assert_eq!(cfg.slot_of(0), 0);
        assert_eq!(cfg.lanes, CsiLanes::One);
        assert_eq!(cfg.outlane, 0x33);
        assert_eq!(cfg.frame_sync, 0xE2);
        assert_eq!(cfg.link_enable, 0xE1);
        assert_eq!(cfg.forward_all, 0xF1);
    }

    #[test]
    fn four_channels() {
        let cfg = LinkConfigurator::default().compute_output_order(ChannelMask::all());

        assert_eq!(cfg.order, 0xE4);
        assert_eq!(cfg.lanes, CsiLanes::Four);
        assert_eq!(cfg.outlane, 0xF3);
        assert_eq!(cfg.frame_sync, 0x02);
        assert_eq!(cfg.link_enable, 0xEF);
        assert_eq!(cfg.forward_all, 0xFF);
    }

    #[test]
    fn no_channel_uses_multi_lane() {
        let cfg = LinkConfigurator::default().compute_output_order(ChannelMask::empty());
        assert_eq!(cfg.order, 0x1B);
        assert_eq!(cfg.lanes, CsiLanes::Four);
    }

    #[test]
    fn every_mask_is_deterministic_and_distinct() {
        let conf = LinkConfigurator::default();
        let mut seen = HashSet::new();

        for bits in 0..16u8 {
            let mask = ChannelMask::from_bits_truncate(bits);
            let a = conf.compute_output_order(mask);
            let b = conf.compute_output_order(mask);
            assert_eq!(a, b);

            // 已连接通道占据前 popcount 个槽位
            let mut slots: Vec<u8> = mask.channels().map(|ch| a.slot_of(ch)).collect();
            slots.sort();
            assert_eq!(slots, (0..mask.count()).collect::<Vec<_>>());

            assert!(seen.insert((a.order, a.link_enable)));
        }
    }
}
