//! MAX9288 解串器 + MAX9271 串行器 + OV490 ISP

use alloc::vec::Vec;

use gmsl_if::{RegPath, SlaveAddr};

use super::{ChipLayout, ChipProfile, isp_pattern_block, regs, ser, unsupported};
use crate::{ChannelMask, MediaBusFormat, RegisterOp, Result};

const DESER: SlaveAddr = SlaveAddr(0xD0);
const SER_INIT: SlaveAddr = SlaveAddr(0x80);
const ISP_INIT: SlaveAddr = SlaveAddr(0x48);
/// 单路拓扑下 OV490 映射后的地址
const ISP_SINGLE: SlaveAddr = SlaveAddr(0x62);

static LAYOUT: ChipLayout = ChipLayout {
    name: "max9288",
    compatible: "maxim,max9288",
    deser: DESER,
    id_reg: RegPath::byte(0x1E),
    id_value: 0x2A,
    link_reg: RegPath::byte(0x49),
    lock_reg: RegPath::byte(0x04),
    ser_init: SER_INIT,
    ser_all: SER_INIT,
    ser_targets: [
        SlaveAddr(0xA2),
        SlaveAddr(0xA4),
        SlaveAddr(0x86),
        SlaveAddr(0x88),
    ],
    isp_init: ISP_INIT,
    isp_map_base: 0x60,
    width: 1280,
    height: 800,
    formats: &[MediaBusFormat::Yuyv8_2x8],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Max9288;

impl ChipProfile for Max9288 {
    fn layout(&self) -> &'static ChipLayout {
        &LAYOUT
    }

    fn pre_init_ops(&self) -> Vec<RegisterOp> {
        let w = |addr, reg, value| RegisterOp::write(addr, RegPath::byte(reg), value);
        let r = |reg| RegisterOp::read(DESER, RegPath::byte(reg));

        let mut ops = Vec::from([
            w(DESER, 0x3F, 0x4F),
            RegisterOp::delay(2),
            w(DESER, 0x3B, 0x1E),
            RegisterOp::delay(2),
            w(SER_INIT, 0x04, ser::SERIAL_CONFIG),
            RegisterOp::delay(5),
        ]);
        for reg in 0x28..=0x2B {
            ops.extend([r(reg), r(reg)]);
        }
        ops.extend([
            w(SER_INIT, 0x08, 0x01),
            RegisterOp::delay(2),
            w(DESER, 0x3B, 0x19),
            RegisterOp::delay(2),
            r(0x34),
            RegisterOp::write(DESER, regs::CSI_OUT, regs::CSI_OUT_OFF),
        ]);
        ops
    }

    fn init_ops(&self) -> Vec<RegisterOp> {
        [(0x02, 0x20), (0x63, 0x00), (0x64, 0x00), (0x05, 0x19)]
            .into_iter()
            .map(|(reg, value)| RegisterOp::write(DESER, RegPath::byte(reg), value))
            .collect()
    }

    fn configure_ops(&self, ch: u8, target: SlaveAddr) -> Vec<RegisterOp> {
        Vec::from([
            RegisterOp::write(target, ser::FSYNC_PERIOD, ser::FSYNC_PERIOD_VALUE),
            RegisterOp::write(target, ser::ISP_MAP, LAYOUT.isp_map_base + 2 * ch),
            RegisterOp::write(target, ser::ISP_SOURCE, ISP_INIT.as_reg_value()),
            RegisterOp::write(target, ser::BROADCAST, LAYOUT.ser_all.as_reg_value()),
            RegisterOp::write(target, ser::ALIAS, target.as_reg_value()),
        ])
    }

    /// MAX9271 不需要重排像素位
    fn cross_bar_ops(&self, _target: SlaveAddr) -> Vec<RegisterOp> {
        Vec::new()
    }

    fn test_pattern_ops(&self, mask: ChannelMask, enable: bool) -> Result<Vec<RegisterOp>> {
        let blocks: &[(SlaveAddr, u8, u8)] = match (mask.count(), enable) {
            (1, true) => &[(ISP_SINGLE, 0x03, 0xD6)],
            (4, true) => &[(ISP_INIT, 0x00, 0xD7), (ISP_INIT, 0x01, 0xD6)],
            (1, false) => &[(ISP_SINGLE, 0x00, 0xD6)],
            (4, false) => &[(ISP_INIT, 0x00, 0xD6)],
            _ => return Err(unsupported(mask)),
        };
        Ok(blocks
            .iter()
            .flat_map(|&(isp, tp, commit)| isp_pattern_block(isp, tp, commit))
            .collect())
    }
}
