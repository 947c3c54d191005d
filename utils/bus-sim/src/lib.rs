//! GMSL 总线行为模型
//!
//! ## 概述
//!
//! 一个解串器加最多四个串行器，按芯片描述 ([`ChipProfile`]) 搭建：
//!
//! - 解串器的 ID、链路状态、锁定状态由模型计算，其余寄存器按写入保存，
//!   转发寄存器上电为 `0xFF`；
//! - 串行器只有在链路已连接、且转发寄存器对应位置位时才能被访问；
//! - 写事务落到地址或广播地址匹配的所有串行器，读事务由第一个地址匹配的串行器应答；
//! - 串行器寄存器 0x00 读出当前地址，写入即改址；0x0B 设置广播地址；
//! - ISP 等下游设备总是应答，寄存器按写入保存。
//!
//! 所有事务都记录在日志里，可以按序号或按寄存器注入故障，时钟是虚拟的。

#[macro_use]
extern crate log;

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt::{self, Display},
};

use gmsl_if::{RegPath, RegWidth, SlaveAddr, TransportError, TransportPort};
use gmsl_link::{
    ChannelMask, ChipProfile,
    profile::{regs, ser},
};

const CHANNELS: usize = ChannelMask::CHANNELS as usize;
const FORWARD_POWER_ON: u8 = 0xFF;
const LOCKED: u8 = 0x80;

/// 一次总线访问
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Write {
        addr: SlaveAddr,
        reg: RegPath,
        value: u8,
        result: Result<(), TransportError>,
    },
    Read {
        addr: SlaveAddr,
        reg: RegPath,
        result: Result<u8, TransportError>,
    },
    Delay(u8),
}

impl Transaction {
    pub fn is_write(&self) -> bool {
        matches!(self, Transaction::Write { .. })
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Transaction::Read { .. })
    }

    pub fn addr(&self) -> Option<SlaveAddr> {
        match self {
            Transaction::Write { addr, .. } | Transaction::Read { addr, .. } => Some(*addr),
            Transaction::Delay(_) => None,
        }
    }
}

impl Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transaction::Write {
                addr,
                reg,
                value,
                result,
            } => {
                write!(f, "W {addr} {reg} <- {value:#04x}")?;
                if let Err(e) = result {
                    write!(f, "  !! {e}")?;
                }
                Ok(())
            }
            Transaction::Read { addr, reg, result } => match result {
                Ok(v) => write!(f, "R {addr} {reg} -> {v:#04x}"),
                Err(e) => write!(f, "R {addr} {reg}  !! {e}"),
            },
            Transaction::Delay(ms) => write!(f, "D {ms}ms"),
        }
    }
}

/// 链路另一端的串行器
#[derive(Debug, Clone)]
pub struct Serializer {
    linked: bool,
    address: u8,
    broadcast: Option<u8>,
    regs: BTreeMap<u8, u8>,
}

impl Serializer {
    fn power_on(linked: bool, address: u8) -> Self {
        Self {
            linked,
            address,
            broadcast: None,
            regs: BTreeMap::new(),
        }
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }

    pub fn address(&self) -> SlaveAddr {
        SlaveAddr::from(self.address)
    }

    pub fn broadcast(&self) -> Option<SlaveAddr> {
        self.broadcast.map(SlaveAddr::from)
    }

    pub fn reg(&self, reg: u8) -> Option<u8> {
        self.regs.get(&reg).copied()
    }

    fn write(&mut self, reg: u8, value: u8) {
        if reg == ser::ADDRESS.first() {
            self.address = value;
        } else if reg == ser::BROADCAST.first() {
            self.broadcast = Some(value);
        }
        self.regs.insert(reg, value);
    }

    fn read(&self, reg: u8) -> u8 {
        if reg == ser::ADDRESS.first() {
            self.address
        } else {
            self.reg(reg).unwrap_or(0)
        }
    }
}

#[derive(Debug, Clone)]
enum FaultAt {
    /// 第 n 次读写事务（从 0 开始，不含 delay）
    Index(usize),
    /// 对该寄存器的后续访问
    Reg { addr: SlaveAddr, reg: RegPath },
    /// 只匹配写入该值的写事务
    Write {
        addr: SlaveAddr,
        reg: RegPath,
        value: u8,
    },
}

#[derive(Debug, Clone)]
struct Fault {
    at: FaultAt,
    remaining: usize,
    error: TransportError,
}

pub struct SimBus {
    name: &'static str,
    deser: SlaveAddr,
    id_reg: u8,
    id_value: u8,
    link_reg: u8,
    lock_reg: u8,
    init_address: u8,
    targets: [SlaveAddr; CHANNELS],
    broadcast: u8,
    locked: bool,
    deser_regs: BTreeMap<u8, u8>,
    serializers: [Serializer; CHANNELS],
    devices: HashSet<u16>,
    device_regs: HashMap<(u16, RegPath), u8>,
    faults: Vec<Fault>,
    log: Vec<Transaction>,
    transactions: usize,
    clock_ms: u64,
    cost_ms: u64,
}

impl SimBus {
    /// 按芯片描述搭建，`linked` 中的通道有串行器接在链路上
    pub fn new<P: ChipProfile + ?Sized>(profile: &P, linked: ChannelMask) -> Self {
        let l = profile.layout();
        let init = l.ser_init.as_reg_value();

        let mut devices = HashSet::new();
        devices.insert(l.isp_init.raw());
        for ch in 0..ChannelMask::CHANNELS {
            devices.insert((l.isp_map_base + 2 * ch) as u16);
        }

        let mut sim = Self {
            name: l.name,
            deser: l.deser,
            id_reg: l.id_reg.first(),
            id_value: l.id_value,
            link_reg: l.link_reg.first(),
            lock_reg: l.lock_reg.first(),
            init_address: init,
            targets: l.ser_targets,
            broadcast: l.ser_all.as_reg_value(),
            locked: true,
            deser_regs: BTreeMap::new(),
            serializers: core::array::from_fn(|ch| {
                Serializer::power_on(linked.contains_channel(ch as u8), init)
            }),
            devices,
            device_regs: HashMap::new(),
            faults: Vec::new(),
            log: Vec::new(),
            transactions: 0,
            clock_ms: 0,
            cost_ms: 0,
        };
        sim.deser_regs.insert(regs::FORWARD.first(), FORWARD_POWER_ON);
        sim
    }

    /// 解串器和串行器回到上电状态，日志和故障保留
    pub fn power_cycle(&mut self) {
        info!("sim {}: power cycle", self.name);
        self.deser_regs.clear();
        self.deser_regs.insert(regs::FORWARD.first(), FORWARD_POWER_ON);
        for s in self.serializers.iter_mut() {
            *s = Serializer::power_on(s.linked, self.init_address);
        }
        self.device_regs.clear();
    }

    /// 模拟上一次 bring-up 留下的状态：串行器已在目标地址上
    pub fn preconfigure(&mut self, ch: u8) -> &mut Self {
        let target = self.targets[ch as usize & (CHANNELS - 1)].as_reg_value();
        let broadcast = self.broadcast;
        let s = &mut self.serializers[ch as usize & (CHANNELS - 1)];
        s.address = target;
        s.broadcast = Some(broadcast);
        self
    }

    pub fn set_locked(&mut self, locked: bool) -> &mut Self {
        self.locked = locked;
        self
    }

    pub fn set_id(&mut self, id: u8) -> &mut Self {
        self.id_value = id;
        self
    }

    /// 第 `n` 次读写事务返回 `err`
    pub fn fail_at(&mut self, n: usize, err: TransportError) -> &mut Self {
        self.faults.push(Fault {
            at: FaultAt::Index(n),
            remaining: 1,
            error: err,
        });
        self
    }

    /// 对 `addr`/`reg` 的后续 `times` 次访问返回 `err`
    pub fn fail_next(
        &mut self,
        addr: SlaveAddr,
        reg: RegPath,
        times: usize,
        err: TransportError,
    ) -> &mut Self {
        self.faults.push(Fault {
            at: FaultAt::Reg { addr, reg },
            remaining: times,
            error: err,
        });
        self
    }

    /// 后续 `times` 次向 `addr`/`reg` 写入 `value` 时返回 `err`，读和其他值不受影响
    pub fn fail_write(
        &mut self,
        addr: SlaveAddr,
        reg: RegPath,
        value: u8,
        times: usize,
        err: TransportError,
    ) -> &mut Self {
        self.faults.push(Fault {
            at: FaultAt::Write { addr, reg, value },
            remaining: times,
            error: err,
        });
        self
    }

    /// 每次读写事务推进虚拟时钟
    pub fn with_transaction_cost(&mut self, ms: u64) -> &mut Self {
        self.cost_ms = ms;
        self
    }

    pub fn log(&self) -> &[Transaction] {
        &self.log
    }

    pub fn take_log(&mut self) -> Vec<Transaction> {
        core::mem::take(&mut self.log)
    }

    pub fn writes(&self) -> usize {
        self.log.iter().filter(|t| t.is_write()).count()
    }

    pub fn reads(&self) -> usize {
        self.log.iter().filter(|t| t.is_read()).count()
    }

    pub fn reads_of(&self, addr: SlaveAddr, reg: RegPath) -> usize {
        self.log
            .iter()
            .filter(|t| matches!(t, Transaction::Read { addr: a, reg: r, .. } if *a == addr && *r == reg))
            .count()
    }

    pub fn serializer(&self, ch: u8) -> &Serializer {
        &self.serializers[ch as usize & (CHANNELS - 1)]
    }

    pub fn deser_reg(&self, reg: RegPath) -> Option<u8> {
        self.deser_regs.get(&reg.first()).copied()
    }

    pub fn device_reg(&self, addr: SlaveAddr, reg: RegPath) -> Option<u8> {
        self.device_regs.get(&(addr.raw(), reg)).copied()
    }

    pub fn linked(&self) -> ChannelMask {
        self.serializers
            .iter()
            .enumerate()
            .filter(|(_, s)| s.linked)
            .fold(ChannelMask::empty(), |m, (ch, _)| m | ChannelMask::channel(ch as u8))
    }

    fn forward(&self) -> ChannelMask {
        let value = self
            .deser_regs
            .get(&regs::FORWARD.first())
            .copied()
            .unwrap_or(FORWARD_POWER_ON);
        ChannelMask::from_status(value)
    }

    /// 链路已连接且转发已打开的通道
    fn reachable(&self) -> impl Iterator<Item = usize> + '_ {
        let forward = self.forward();
        (0..CHANNELS).filter(move |&ch| {
            self.serializers[ch].linked && forward.contains_channel(ch as u8)
        })
    }

    fn short_addr(addr: SlaveAddr) -> Option<u8> {
        u8::try_from(addr.raw()).ok()
    }

    /// `written` 为写事务的数据，读事务为 `None`
    fn begin(
        &mut self,
        addr: SlaveAddr,
        reg: &RegPath,
        written: Option<u8>,
    ) -> Result<(), TransportError> {
        let n = self.transactions;
        self.transactions += 1;
        self.clock_ms += self.cost_ms;

        let hit = self.faults.iter_mut().find(|f| {
            f.remaining > 0
                && match &f.at {
                    FaultAt::Index(i) => *i == n,
                    FaultAt::Reg { addr: a, reg: r } => *a == addr && r == reg,
                    FaultAt::Write {
                        addr: a,
                        reg: r,
                        value,
                    } => *a == addr && r == reg && written == Some(*value),
                }
        });
        if let Some(fault) = hit {
            fault.remaining -= 1;
            return Err(fault.error.clone());
        }
        Ok(())
    }

    fn deser_read(&self, reg: u8) -> u8 {
        let linked = self.linked();
        if reg == self.id_reg {
            self.id_value
        } else if reg == self.link_reg {
            linked.bits()
        } else if reg == self.lock_reg {
            if self.locked && !linked.is_empty() {
                LOCKED
            } else {
                0
            }
        } else {
            self.deser_regs.get(&reg).copied().unwrap_or(0)
        }
    }

    fn do_write(&mut self, addr: SlaveAddr, reg: &RegPath, value: u8) -> Result<(), TransportError> {
        self.begin(addr, reg, Some(value))?;

        if addr == self.deser {
            if reg.width() != RegWidth::Byte {
                return Err(TransportError::Malformed {
                    len: reg.as_bytes().len() + 1,
                });
            }
            self.deser_regs.insert(reg.first(), value);
            return Ok(());
        }

        if let Some(short) = Self::short_addr(addr) {
            let hits: Vec<usize> = self
                .reachable()
                .filter(|&ch| {
                    let s = &self.serializers[ch];
                    s.address == short || s.broadcast == Some(short)
                })
                .collect();
            if !hits.is_empty() {
                for ch in hits {
                    self.serializers[ch].write(reg.first(), value);
                }
                return Ok(());
            }
        }

        if self.devices.contains(&addr.raw()) {
            self.device_regs.insert((addr.raw(), *reg), value);
            return Ok(());
        }
        Err(TransportError::Nack { addr })
    }

    fn do_read(&mut self, addr: SlaveAddr, reg: &RegPath) -> Result<u8, TransportError> {
        self.begin(addr, reg, None)?;

        if addr == self.deser {
            return Ok(self.deser_read(reg.first()));
        }

        if let Some(short) = Self::short_addr(addr)
            && let Some(ch) = self
                .reachable()
                .find(|&ch| self.serializers[ch].address == short)
        {
            return Ok(self.serializers[ch].read(reg.first()));
        }

        if self.devices.contains(&addr.raw()) {
            return Ok(self.device_regs.get(&(addr.raw(), *reg)).copied().unwrap_or(0));
        }
        Err(TransportError::Nack { addr })
    }
}

impl TransportPort for SimBus {
    fn write(&mut self, addr: SlaveAddr, reg: &RegPath, value: u8) -> Result<(), TransportError> {
        let result = self.do_write(addr, reg, value);
        trace!("sim {}: W {addr} {reg} <- {value:#04x} {result:?}", self.name);
        self.log.push(Transaction::Write {
            addr,
            reg: *reg,
            value,
            result: result.clone(),
        });
        result
    }

    fn read(&mut self, addr: SlaveAddr, reg: &RegPath) -> Result<u8, TransportError> {
        let result = self.do_read(addr, reg);
        trace!("sim {}: R {addr} {reg} {result:?}", self.name);
        self.log.push(Transaction::Read {
            addr,
            reg: *reg,
            result: result.clone(),
        });
        result
    }

    fn delay(&mut self, ms: u8) {
        self.log.push(Transaction::Delay(ms));
        self.clock_ms += ms as u64;
    }

    fn now_ms(&self) -> Option<u64> {
        Some(self.clock_ms)
    }
}
