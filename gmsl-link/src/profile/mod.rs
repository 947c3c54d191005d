//! 解串器芯片描述
//!
//! ## 概述
//!
//! MAX9286 和 MAX9288 的 bring-up 流程几乎一样，区别只在地址、ID、
//! 锁定寄存器和各阶段写入的寄存器表。[`ChipProfile`] 提供这些差异，
//! 通用部分（输出顺序、通道选择、改址、使能）由默认方法按
//! [`ChipLayout`] 生成。
//!
//! ## 寄存器布局（解串器侧）
//! ```text
//! 0x00 LINK_ENABLE   0xEF & (0xF0 | mask)
//! 0x01 FRAME_SYNC    单路 0xE2 / 多路 0x02
//! 0x0A FORWARD       0xF0 | mask，选择单路时只置一位
//! 0x0B OUT_ORDER     每通道 2 bit
//! 0x12 OUTLANE       单路 0x33 / 多路 0xF3
//! 0x15 CSI_OUT       0x13 关闭 / 0x9B 使能
//! ```

use alloc::vec::Vec;

use enum_dispatch::enum_dispatch;
use gmsl_if::{RegPath, SlaveAddr};
use tock_registers::{LocalRegisterCopy, register_bitfields};

use crate::{
    BringupError, ChannelMask, ChannelSlot, LinkConfigurator, MediaBusFormat, OutputOrderConfig,
    RegisterOp, Result,
};

mod max9286;
mod max9288;

pub use max9286::Max9286;
pub use max9288::Max9288;

pub mod regs {
    use gmsl_if::RegPath;

    pub const LINK_ENABLE: RegPath = RegPath::byte(0x00);
    pub const FRAME_SYNC: RegPath = RegPath::byte(0x01);
    pub const FORWARD: RegPath = RegPath::byte(0x0A);
    pub const OUT_ORDER: RegPath = RegPath::byte(0x0B);
    pub const OUTLANE: RegPath = RegPath::byte(0x12);
    pub const CSI_OUT: RegPath = RegPath::byte(0x15);

    pub const CSI_OUT_OFF: u8 = 0x13;
    pub const CSI_OUT_ON: u8 = 0x9B;
}

/// 串行器侧寄存器
pub mod ser {
    use gmsl_if::RegPath;

    /// 读出即为当前 8-bit 地址
    pub const ADDRESS: RegPath = RegPath::byte(0x00);
    pub const MAIN_CONTROL: RegPath = RegPath::byte(0x04);
    pub const FSYNC_PERIOD: RegPath = RegPath::byte(0x07);
    pub const ISP_MAP: RegPath = RegPath::byte(0x09);
    pub const ISP_SOURCE: RegPath = RegPath::byte(0x0A);
    pub const BROADCAST: RegPath = RegPath::byte(0x0B);
    pub const ALIAS: RegPath = RegPath::byte(0x0C);

    pub const FSYNC_PERIOD_VALUE: u8 = 0x84;
    /// 打开串行链路
    pub const SERIAL_ENABLE: u8 = 0x83;
    /// 关闭串行链路，保留配置通道
    pub const SERIAL_CONFIG: u8 = 0x43;
}

register_bitfields![u8,
    pub LINK_STATUS [
        /// 每条链路一位
        VIDEO_LINK OFFSET(0) NUMBITS(4) []
    ],
    pub LOCK_STATUS [
        LOCKED OFFSET(7) NUMBITS(1) []
    ]
];

pub fn decode_link_status(value: u8) -> ChannelMask {
    let reg = LocalRegisterCopy::<u8, LINK_STATUS::Register>::new(value);
    ChannelMask::from_status(reg.read(LINK_STATUS::VIDEO_LINK))
}

pub fn is_locked(value: u8) -> bool {
    LocalRegisterCopy::<u8, LOCK_STATUS::Register>::new(value).is_set(LOCK_STATUS::LOCKED)
}

/// 一款芯片组合的固定参数
#[derive(Debug)]
pub struct ChipLayout {
    pub name: &'static str,
    /// 设备树 compatible
    pub compatible: &'static str,
    pub deser: SlaveAddr,
    pub id_reg: RegPath,
    pub id_value: u8,
    pub link_reg: RegPath,
    pub lock_reg: RegPath,
    pub ser_init: SlaveAddr,
    pub ser_all: SlaveAddr,
    pub ser_targets: [SlaveAddr; 4],
    /// ISP 共用地址，由串行器转换到 `isp_map_base + 2 * ch`
    pub isp_init: SlaveAddr,
    pub isp_map_base: u8,
    pub width: u32,
    /// 单路高度，总高度乘以链路数
    pub height: u32,
    pub formats: &'static [MediaBusFormat],
}

#[enum_dispatch]
pub trait ChipProfile {
    fn layout(&self) -> &'static ChipLayout;

    /// 解串器预初始化，读操作只是为了清状态计数器
    fn pre_init_ops(&self) -> Vec<RegisterOp>;

    /// 拓扑相关寄存器之后的解串器初始化
    fn init_ops(&self) -> Vec<RegisterOp>;

    /// 通道改址之后在目标地址上执行的配置
    fn configure_ops(&self, ch: u8, target: SlaveAddr) -> Vec<RegisterOp>;

    /// 像素 cross-bar，不需要时为空
    fn cross_bar_ops(&self, target: SlaveAddr) -> Vec<RegisterOp>;

    /// 测试图样开关，写到 ISP
    fn test_pattern_ops(&self, mask: ChannelMask, enable: bool) -> Result<Vec<RegisterOp>>;

    fn name(&self) -> &'static str {
        self.layout().name
    }

    fn deser_addr(&self) -> SlaveAddr {
        self.layout().deser
    }

    fn supports(&self, mask: ChannelMask) -> bool {
        matches!(mask.count(), 1 | 4)
    }

    fn configurator(&self) -> LinkConfigurator {
        LinkConfigurator::default()
    }

    fn output_order_ops(&self, cfg: &OutputOrderConfig) -> Vec<RegisterOp> {
        let deser = self.deser_addr();
        Vec::from([
            RegisterOp::write(deser, regs::OUT_ORDER, cfg.order),
            RegisterOp::write(deser, regs::LINK_ENABLE, cfg.link_enable),
        ])
    }

    fn forward_ops(&self, mask: ChannelMask) -> Vec<RegisterOp> {
        Vec::from([RegisterOp::write(
            self.deser_addr(),
            regs::FORWARD,
            mask.bits() | 0xF0,
        )])
    }

    /// lane、帧同步、初始化表、链路使能、转发、串行器帧同步周期
    fn topology_ops(&self, cfg: &OutputOrderConfig) -> Vec<RegisterOp> {
        let l = self.layout();
        let mut ops = Vec::from([
            RegisterOp::write(l.deser, regs::OUTLANE, cfg.outlane),
            RegisterOp::write(l.deser, regs::FRAME_SYNC, cfg.frame_sync),
        ]);
        ops.extend(self.init_ops());
        ops.push(RegisterOp::write(l.deser, regs::LINK_ENABLE, cfg.link_enable));
        ops.push(RegisterOp::write(l.deser, regs::FORWARD, cfg.forward_all));
        ops.push(RegisterOp::write(
            l.ser_init,
            ser::FSYNC_PERIOD,
            ser::FSYNC_PERIOD_VALUE,
        ));
        ops
    }

    fn channel_slot(&self, ch: u8) -> ChannelSlot {
        let l = self.layout();
        let ch = ch & 0x03;
        let target = l.ser_targets[ch as usize];
        ChannelSlot {
            index: ch,
            deser_addr: l.deser,
            select_reg: regs::FORWARD,
            select_value: 0xF0 | (1 << ch),
            init_address: l.ser_init,
            target_address: target,
            address_reg: ser::ADDRESS,
            configure_ops: self.configure_ops(ch, target),
            cross_bar_ops: self.cross_bar_ops(target),
        }
    }

    /// 打开所有串行器的高速输出和解串器 CSI 输出
    fn enable_ops(&self) -> Vec<RegisterOp> {
        let l = self.layout();
        Vec::from([
            RegisterOp::write(l.ser_all, ser::MAIN_CONTROL, ser::SERIAL_ENABLE),
            RegisterOp::write(l.deser, regs::CSI_OUT, regs::CSI_OUT_ON),
        ])
    }

    fn frame_size(&self, mask: ChannelMask) -> (u32, u32) {
        let l = self.layout();
        (l.width, l.height * mask.count() as u32)
    }
}

#[enum_dispatch(ChipProfile)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnyChip {
    Max9286,
    Max9288,
}

impl AnyChip {
    pub fn from_compatible(compatible: &str) -> Option<Self> {
        [AnyChip::from(Max9286), AnyChip::from(Max9288)]
            .into_iter()
            .find(|chip| chip.layout().compatible == compatible)
    }
}

/// ISP 寄存器页切换 + 图样寄存器 + 提交
pub(crate) fn isp_pattern_block(isp: SlaveAddr, pattern: u8, commit: u8) -> [RegisterOp; 5] {
    [
        RegisterOp::write(isp, RegPath::from_u16(0xFFFD), 0x80),
        RegisterOp::write(isp, RegPath::from_u16(0xFFFE), 0x19),
        RegisterOp::write(isp, RegPath::from_u16(0x5000), pattern),
        RegisterOp::write(isp, RegPath::from_u16(0xFFFE), 0x80),
        RegisterOp::write(isp, RegPath::from_u16(0x00C0), commit),
    ]
}

pub(crate) fn unsupported(mask: ChannelMask) -> BringupError {
    error!("no recipe for {} link(s), mask {mask}", mask.count());
    BringupError::InvalidTopology { mask }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_decoding() {
        assert_eq!(decode_link_status(0xA3), ChannelMask::CH0 | ChannelMask::CH1);
        assert!(is_locked(0x80));
        assert!(is_locked(0xFF));
        assert!(!is_locked(0x7F));
    }

    #[test]
    fn compatible_lookup() {
        assert_eq!(
            AnyChip::from_compatible("maxim,max9286"),
            Some(AnyChip::Max9286(Max9286))
        );
        assert_eq!(
            AnyChip::from_compatible("maxim,max9288"),
            Some(AnyChip::Max9288(Max9288))
        );
        assert_eq!(AnyChip::from_compatible("maxim,max9296"), None);
    }

    #[test]
    fn slot_is_parameterized_by_channel() {
        let chip = Max9286;
        for ch in 0..4u8 {
            let slot = chip.channel_slot(ch);
            assert_eq!(slot.select_value, 0xF0 | (1 << ch));
            assert_eq!(slot.target_address, SlaveAddr(0x82 + 2 * ch as u16));
            assert!(
                slot.configure_ops
                    .iter()
                    .chain(&slot.cross_bar_ops)
                    .filter_map(RegisterOp::target)
                    .all(|(addr, _)| addr == slot.target_address)
            );
        }
    }

    #[test]
    fn topology_follows_lane_settings() {
        let chip = Max9288;
        let cfg = chip.configurator().compute_output_order(ChannelMask::CH0);
        let ops = chip.topology_ops(&cfg);
        assert_eq!(ops[0], RegisterOp::write(SlaveAddr(0xD0), regs::OUTLANE, 0x33));
        assert_eq!(ops[1], RegisterOp::write(SlaveAddr(0xD0), regs::FRAME_SYNC, 0xE2));
        assert_eq!(
            ops.last(),
            Some(&RegisterOp::write(SlaveAddr(0x80), ser::FSYNC_PERIOD, 0x84))
        );
    }

    #[test]
    fn frame_height_scales_with_links() {
        assert_eq!(Max9286.frame_size(ChannelMask::all()), (1280, 3200));
        assert_eq!(Max9288.frame_size(ChannelMask::CH2), (1280, 800));
    }
}
