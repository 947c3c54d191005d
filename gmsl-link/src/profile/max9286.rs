//! MAX9286 解串器 + MAX96705 串行器 + ISX016 ISP

use alloc::vec::Vec;

use gmsl_if::{RegPath, SlaveAddr};

use super::{ChipLayout, ChipProfile, isp_pattern_block, regs, ser, unsupported};
use crate::{ChannelMask, MediaBusFormat, RegisterOp, Result};

const DESER: SlaveAddr = SlaveAddr(0x94);
const SER_INIT: SlaveAddr = SlaveAddr(0x80);
const ISP_INIT: SlaveAddr = SlaveAddr(0x34);

/// ISP 图样寄存器取值
const TP_OFF: u8 = 0x00;
const TP_HALF: u8 = 0x01;
const TP_BARS: u8 = 0x03;
const TP_COMMIT: u8 = 0xD6;

static LAYOUT: ChipLayout = ChipLayout {
    name: "max9286",
    compatible: "maxim,max9286",
    deser: DESER,
    id_reg: RegPath::byte(0x1E),
    id_value: 0x40,
    link_reg: RegPath::byte(0x49),
    lock_reg: RegPath::byte(0x27),
    ser_init: SER_INIT,
    ser_all: SER_INIT,
    ser_targets: [
        SlaveAddr(0x82),
        SlaveAddr(0x84),
        SlaveAddr(0x86),
        SlaveAddr(0x88),
    ],
    isp_init: ISP_INIT,
    isp_map_base: 0x60,
    width: 1280,
    height: 800,
    formats: &[MediaBusFormat::Uyvy8_2x8, MediaBusFormat::Yuyv8_2x8],
};

/// MAX96705 像素 cross-bar，从寄存器 0x20 开始连续写
const CROSS_BAR: [u8; 31] = [
    0x17, 0x16, 0x15, 0x14, 0x13, 0x12, 0x11, 0x10, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x0d, 0x0e,
    0x0f, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01, 0x00, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d,
    0x0e,
];

/// 串行器输入格式和视频时序，目标地址上依次写入
const SER_SETUP: [(u8, u8); 17] = [
    (0x06, 0x80),
    (0x0E, 0x00),
    (0x3F, 0x0D),
    (0x41, 0x0E),
    (0x43, 0x01),
    (0x44, 0x23),
    (0x45, 0xA9),
    (0x46, 0xD4),
    (0x47, 0x01),
    (0x48, 0x00),
    (0x49, 0x00),
    (0x4A, 0x24),
    (0x4B, 0xD7),
    (0x4C, 0x80),
    (0x43, 0x21),
    (0x4D, 0x00),
    (0x67, 0xC4),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Max9286;

impl ChipProfile for Max9286 {
    fn layout(&self) -> &'static ChipLayout {
        &LAYOUT
    }

    fn pre_init_ops(&self) -> Vec<RegisterOp> {
        let w = |addr, reg, value| RegisterOp::write(addr, RegPath::byte(reg), value);
        let r = |reg| RegisterOp::read(DESER, RegPath::byte(reg));

        let mut ops = Vec::from([
            w(DESER, 0x0D, 0x03),
            w(DESER, 0x3F, 0x4F),
            RegisterOp::delay(2),
            w(DESER, 0x3B, 0x1E),
            RegisterOp::delay(2),
            w(SER_INIT, 0x04, ser::SERIAL_CONFIG),
            w(SER_INIT, 0x03, 0x80),
            RegisterOp::delay(5),
        ]);
        // 错误计数器读两次清零
        for reg in 0x28..=0x2B {
            ops.extend([r(reg), r(reg)]);
        }
        ops.extend([
            w(SER_INIT, 0x08, 0x01),
            w(SER_INIT, 0x97, 0xAF),
            RegisterOp::delay(2),
            w(DESER, 0x3B, 0x19),
            RegisterOp::delay(2),
            r(0x34),
            r(0x1B),
            RegisterOp::write(DESER, regs::CSI_OUT, regs::CSI_OUT_OFF),
        ]);
        ops
    }

    fn init_ops(&self) -> Vec<RegisterOp> {
        [(0x19, 0xA3), (0x41, 0x10), (0x02, 0x00), (0x63, 0x00), (0x64, 0x00)]
            .into_iter()
            .map(|(reg, value)| RegisterOp::write(DESER, RegPath::byte(reg), value))
            .collect()
    }

    fn configure_ops(&self, ch: u8, target: SlaveAddr) -> Vec<RegisterOp> {
        let mut ops: Vec<RegisterOp> = SER_SETUP
            .iter()
            .map(|&(reg, value)| RegisterOp::write(target, RegPath::byte(reg), value))
            .collect();
        ops.extend([
            RegisterOp::write(target, ser::FSYNC_PERIOD, ser::FSYNC_PERIOD_VALUE),
            RegisterOp::write(target, ser::ISP_MAP, LAYOUT.isp_map_base + 2 * ch),
            RegisterOp::write(target, ser::ISP_SOURCE, ISP_INIT.as_reg_value()),
            RegisterOp::write(target, ser::BROADCAST, LAYOUT.ser_all.as_reg_value()),
            RegisterOp::write(target, ser::ALIAS, target.as_reg_value()),
            RegisterOp::delay(2),
        ]);
        ops
    }

    fn cross_bar_ops(&self, target: SlaveAddr) -> Vec<RegisterOp> {
        (0x20u8..)
            .zip(CROSS_BAR)
            .map(|(reg, value)| RegisterOp::write(target, RegPath::byte(reg), value))
            .collect()
    }

    fn test_pattern_ops(&self, mask: ChannelMask, enable: bool) -> Result<Vec<RegisterOp>> {
        let patterns: &[u8] = match (mask.count(), enable) {
            (1, true) => &[TP_BARS],
            (4, true) => &[TP_OFF, TP_HALF],
            (1, false) => &[TP_OFF],
            (4, false) => &[TP_BARS, TP_OFF],
            _ => return Err(unsupported(mask)),
        };
        Ok(patterns
            .iter()
            .flat_map(|&tp| isp_pattern_block(ISP_INIT, tp, TP_COMMIT))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BringupError;

    #[test]
    fn cross_bar_covers_0x20_to_0x3e() {
        let ops = Max9286.cross_bar_ops(SlaveAddr(0x84));
        assert_eq!(ops.len(), 31);
        assert_eq!(ops[0], RegisterOp::write(SlaveAddr(0x84), RegPath::byte(0x20), 0x17));
        assert_eq!(ops[30], RegisterOp::write(SlaveAddr(0x84), RegPath::byte(0x3E), 0x0E));
    }

    #[test]
    fn configure_maps_isp_per_channel() {
        let ops = Max9286.configure_ops(2, SlaveAddr(0x86));
        assert!(ops.contains(&RegisterOp::write(SlaveAddr(0x86), ser::ISP_MAP, 0x64)));
        assert!(ops.contains(&RegisterOp::write(SlaveAddr(0x86), ser::ALIAS, 0x86)));
        assert_eq!(ops.last(), Some(&RegisterOp::delay(2)));
    }

    #[test]
    fn test_pattern_recipes() {
        let on = Max9286.test_pattern_ops(ChannelMask::all(), true).unwrap();
        assert_eq!(on.len(), 10);
        assert_eq!(on[2].value(), Some(TP_OFF));
        assert_eq!(on[7].value(), Some(TP_HALF));
        for op in &on {
            let (addr, reg) = op.target().unwrap();
            assert_eq!(addr, ISP_INIT);
            assert_eq!(reg.width(), gmsl_if::RegWidth::Word);
        }

        let off = Max9286.test_pattern_ops(ChannelMask::CH1, false).unwrap();
        assert_eq!(off.len(), 5);

        let mask = ChannelMask::CH0 | ChannelMask::CH1;
        assert_eq!(
            Max9286.test_pattern_ops(mask, true).unwrap_err(),
            BringupError::InvalidTopology { mask }
        );
    }
}
