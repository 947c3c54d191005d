use alloc::vec::Vec;

use gmsl_if::{RegPath, SlaveAddr, TransportPort};

use crate::{BringupError, ChannelMask, RegisterOp, Result, SequenceExecutor};

/// 解串器当前把 I2C 转发到哪些链路
///
/// 这是芯片内部的隐式状态，软件这里只是镜像。任何绕过
/// [`crate::LinkBringupController`] 的总线访问都可能让它失效，
/// 此时应当重新 bring-up（镜像会回到 `Unknown`）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusSelection {
    #[default]
    Unknown,
    All(ChannelMask),
    Single(u8),
}

impl BusSelection {
    pub fn reaches(&self, ch: u8) -> bool {
        match *self {
            BusSelection::Unknown => false,
            BusSelection::All(mask) => mask.contains_channel(ch),
            BusSelection::Single(sel) => sel == ch,
        }
    }

    /// 由转发控制寄存器的值还原（低 4 位为链路位）
    pub fn from_forward_value(value: u8) -> Self {
        let mask = ChannelMask::from_status(value);
        match mask.count() {
            0 => BusSelection::Unknown,
            1 => BusSelection::Single(mask.bits().trailing_zeros() as u8),
            _ => BusSelection::All(mask),
        }
    }
}

/// 单个物理通道的 bring-up 记录
#[derive(Debug, Clone)]
pub struct ChannelSlot {
    pub index: u8,
    /// 解串器地址，用于选择通道
    pub deser_addr: SlaveAddr,
    pub select_reg: RegPath,
    pub select_value: u8,
    /// 所有未配置串行器共用的地址
    pub init_address: SlaveAddr,
    /// 改址后的唯一地址
    pub target_address: SlaveAddr,
    /// 串行器的地址寄存器，读出来就是当前地址
    pub address_reg: RegPath,
    pub configure_ops: Vec<RegisterOp>,
    pub cross_bar_ops: Vec<RegisterOp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOutcome {
    /// 串行器已经在目标地址上，跳过了改址
    AlreadyAddressed,
    Reassigned,
}

/// 单通道状态机：Select -> ProbeCurrent -> (ProbeInit -> Reassign) -> Configure
///
/// 改址依赖 Select 让共享的 init 地址只落到这一路，所以多个通道的
/// bring-up 不能在同一条总线上交错进行。
pub struct ChannelBringup<'a, T: TransportPort + ?Sized> {
    bus: &'a mut T,
    selection: &'a mut BusSelection,
}

impl<'a, T: TransportPort + ?Sized> ChannelBringup<'a, T> {
    pub fn new(bus: &'a mut T, selection: &'a mut BusSelection) -> Self {
        Self { bus, selection }
    }

    pub fn bring_up(&mut self, slot: &mut ChannelSlot) -> Result<ChannelOutcome> {
        let ch = slot.index;
        self.select(slot)?;

        let outcome = if self.answers_at_target(slot)? {
            info!("ch{ch}: serializer already at {}", slot.target_address);
            ChannelOutcome::AlreadyAddressed
        } else {
            self.probe_init(slot)?;
            self.reassign(slot)?;
            info!(
                "ch{ch}: serializer moved {} -> {}",
                slot.init_address, slot.target_address
            );
            ChannelOutcome::Reassigned
        };

        self.configure(slot)?;
        Ok(outcome)
    }

    /// 让解串器只转发到 `slot` 这一路
    pub fn select(&mut self, slot: &ChannelSlot) -> Result {
        debug!("ch{}: select ({:#04x})", slot.index, slot.select_value);
        // 写之前状态就已经不确定了
        *self.selection = BusSelection::Unknown;
        self.bus
            .write(slot.deser_addr, &slot.select_reg, slot.select_value)?;
        *self.selection = BusSelection::Single(slot.index);
        Ok(())
    }

    /// 只读探测：串行器是否已在目标地址上应答，不选择通道
    pub fn probe(&mut self, slot: &ChannelSlot) -> Result<bool> {
        if !self.selection.reaches(slot.index) {
            return Err(BringupError::ChannelNotSelected { channel: slot.index });
        }
        Ok(self.read_matches(slot.target_address, slot))
    }

    /// 把仍占着目标地址的串行器退回 init 地址
    pub fn release(&mut self, slot: &ChannelSlot) -> Result {
        self.select(slot)?;
        info!(
            "ch{}: release {} -> {}",
            slot.index, slot.target_address, slot.init_address
        );
        self.bus.write(
            slot.target_address,
            &slot.address_reg,
            slot.init_address.as_reg_value(),
        )?;
        Ok(())
    }

    /// 执行通道配置和 cross-bar 序列
    pub fn configure(&mut self, slot: &mut ChannelSlot) -> Result {
        self.ensure_selected(slot)?;
        let mut exec = SequenceExecutor::new(&mut *self.bus);
        exec.execute(&mut slot.configure_ops)?;
        exec.execute(&mut slot.cross_bar_ops)?;
        debug!(
            "ch{}: {} configure + {} cross-bar ops done",
            slot.index,
            slot.configure_ops.len(),
            slot.cross_bar_ops.len()
        );
        Ok(())
    }

    fn ensure_selected(&self, slot: &ChannelSlot) -> Result {
        if *self.selection == BusSelection::Single(slot.index) {
            Ok(())
        } else {
            error!("ch{}: bus selection is {:?}", slot.index, self.selection);
            Err(BringupError::ChannelNotSelected { channel: slot.index })
        }
    }

    fn answers_at_target(&mut self, slot: &ChannelSlot) -> Result<bool> {
        self.ensure_selected(slot)?;
        Ok(self.read_matches(slot.target_address, slot))
    }

    fn read_matches(&mut self, addr: SlaveAddr, slot: &ChannelSlot) -> bool {
        match self.bus.read(addr, &slot.address_reg) {
            Ok(v) if v == slot.target_address.as_reg_value() => true,
            Ok(v) => {
                debug!("ch{}: {addr} answers with address {v:#04x}", slot.index);
                false
            }
            Err(e) => {
                debug!("ch{}: no answer at {addr}: {e}", slot.index);
                false
            }
        }
    }

    fn probe_init(&mut self, slot: &ChannelSlot) -> Result {
        self.ensure_selected(slot)?;
        self.bus
            .read(slot.init_address, &slot.address_reg)
            .map_err(|e| {
                error!(
                    "ch{}: serializer not responding at {}: {e}",
                    slot.index, slot.init_address
                );
                BringupError::NotResponding { channel: slot.index }
            })?;
        Ok(())
    }

    fn reassign(&mut self, slot: &ChannelSlot) -> Result {
        let target = slot.target_address;
        self.bus
            .write(slot.init_address, &slot.address_reg, target.as_reg_value())?;

        if self.read_matches(target, slot) {
            Ok(())
        } else {
            error!("ch{}: address {target} not confirmed", slot.index);
            Err(BringupError::AddressConflict {
                channel: slot.index,
                addr: target,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use gmsl_if::TransportError;

    use super::*;
    use crate::testing::{Call, ScriptBus};

    const DESER: SlaveAddr = SlaveAddr(0x94);
    const INIT: SlaveAddr = SlaveAddr(0x80);
    const REG0: RegPath = RegPath::byte(0x00);

    fn slot(ch: u8) -> ChannelSlot {
        let target = SlaveAddr(0x82 + 2 * ch as u16);
        ChannelSlot {
            index: ch,
            deser_addr: DESER,
            select_reg: RegPath::byte(0x0A),
            select_value: 0xF0 | (1 << ch),
            init_address: INIT,
            target_address: target,
            address_reg: REG0,
            configure_ops: vec![RegisterOp::write(target, RegPath::byte(0x07), 0x84)],
            cross_bar_ops: vec![RegisterOp::write(target, RegPath::byte(0x20), 0x17)],
        }
    }

    #[test]
    fn fresh_serializer_is_reassigned() {
        let mut bus = ScriptBus::new();
        bus.script(
            0x84,
            REG0,
            [Err(TransportError::Nack { addr: SlaveAddr(0x84) }), Ok(0x84)],
        );
        let mut sel = BusSelection::Unknown;
        let mut slot = slot(1);

        let outcome = ChannelBringup::new(&mut bus, &mut sel)
            .bring_up(&mut slot)
            .unwrap();

        assert_eq!(outcome, ChannelOutcome::Reassigned);
        assert_eq!(sel, BusSelection::Single(1));
        assert_eq!(
            bus.calls,
            vec![
                Call::Write(DESER, RegPath::byte(0x0A), 0xF2),
                Call::Read(SlaveAddr(0x84), REG0),
                Call::Read(INIT, REG0),
                Call::Write(INIT, REG0, 0x84),
                Call::Read(SlaveAddr(0x84), REG0),
                Call::Write(SlaveAddr(0x84), RegPath::byte(0x07), 0x84),
                Call::Write(SlaveAddr(0x84), RegPath::byte(0x20), 0x17),
            ]
        );
    }

    #[test]
    fn addressed_serializer_skips_reassign() {
        let mut bus = ScriptBus::new();
        bus.set(0x82, REG0, 0x82);
        let mut sel = BusSelection::Unknown;

        let outcome = ChannelBringup::new(&mut bus, &mut sel)
            .bring_up(&mut slot(0))
            .unwrap();

        assert_eq!(outcome, ChannelOutcome::AlreadyAddressed);
        assert_eq!(bus.reads_of(0x80, REG0), 0);
        assert_eq!(bus.writes(), 3);
    }

    #[test]
    fn silent_serializer() {
        let mut bus = ScriptBus::new();
        bus.absent(0x80).absent(0x86);
        let mut sel = BusSelection::Unknown;

        let err = ChannelBringup::new(&mut bus, &mut sel)
            .bring_up(&mut slot(2))
            .unwrap_err();

        assert_eq!(err, BringupError::NotResponding { channel: 2 });
        // 只有选择通道的那一次写
        assert_eq!(bus.writes(), 1);
    }

    #[test]
    fn reassign_not_confirmed() {
        let mut bus = ScriptBus::new();
        bus.script(0x88, REG0, [Err(TransportError::Timeout), Ok(0x80)]);
        let mut sel = BusSelection::Unknown;

        let err = ChannelBringup::new(&mut bus, &mut sel)
            .bring_up(&mut slot(3))
            .unwrap_err();

        assert_eq!(
            err,
            BringupError::AddressConflict {
                channel: 3,
                addr: SlaveAddr(0x88)
            }
        );
    }

    #[test]
    fn configure_requires_selection() {
        let mut bus = ScriptBus::new();
        let mut sel = BusSelection::All(ChannelMask::all());

        let err = ChannelBringup::new(&mut bus, &mut sel)
            .configure(&mut slot(0))
            .unwrap_err();

        assert_eq!(err, BringupError::ChannelNotSelected { channel: 0 });
        assert!(bus.calls.is_empty());
    }

    #[test]
    fn probe_is_read_only() {
        let mut bus = ScriptBus::new();
        bus.set(0x82, REG0, 0x82);
        let mut sel = BusSelection::All(ChannelMask::CH0 | ChannelMask::CH1);

        let mut cb = ChannelBringup::new(&mut bus, &mut sel);
        assert!(cb.probe(&slot(0)).unwrap());
        assert!(!cb.probe(&slot(1)).unwrap());
        assert!(cb.probe(&slot(2)).is_err());
        assert_eq!(bus.writes(), 0);
    }

    #[test]
    fn release_moves_back_to_init() {
        let mut bus = ScriptBus::new();
        let mut sel = BusSelection::Unknown;

        ChannelBringup::new(&mut bus, &mut sel)
            .release(&slot(1))
            .unwrap();

        assert_eq!(bus.get(0x84, REG0), Some(0x80));
        assert_eq!(sel, BusSelection::Single(1));
    }

    #[test]
    fn forward_value_decoding() {
        assert_eq!(
            BusSelection::from_forward_value(0xFF),
            BusSelection::All(ChannelMask::all())
        );
        assert_eq!(
            BusSelection::from_forward_value(0xF4),
            BusSelection::Single(2)
        );
        assert_eq!(BusSelection::from_forward_value(0xF0), BusSelection::Unknown);
    }
}
