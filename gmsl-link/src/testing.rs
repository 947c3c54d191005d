//! Recording transport for unit tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::vec::Vec;

use gmsl_if::{RegPath, SlaveAddr, TransportError, TransportPort};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Write(SlaveAddr, RegPath, u8),
    Read(SlaveAddr, RegPath),
    Delay(u8),
}

type Key = (u16, Vec<u8>);

fn key(addr: SlaveAddr, reg: &RegPath) -> Key {
    (addr.raw(), reg.as_bytes().to_vec())
}

#[derive(Default)]
pub struct ScriptBus {
    pub calls: Vec<Call>,
    regs: BTreeMap<Key, u8>,
    scripted: BTreeMap<Key, VecDeque<Result<u8, TransportError>>>,
    absent: BTreeSet<u16>,
    fail_at: Option<(usize, TransportError)>,
    transactions: usize,
    clock_ms: u64,
    tick_ms: u64,
    clock: bool,
}

impl ScriptBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, addr: u16, reg: RegPath, value: u8) -> &mut Self {
        self.regs.insert(key(SlaveAddr(addr), &reg), value);
        self
    }

    pub fn get(&self, addr: u16, reg: RegPath) -> Option<u8> {
        self.regs.get(&key(SlaveAddr(addr), &reg)).copied()
    }

    /// 依次返回这些结果，用完之后回落到寄存器表
    pub fn script(
        &mut self,
        addr: u16,
        reg: RegPath,
        results: impl IntoIterator<Item = Result<u8, TransportError>>,
    ) -> &mut Self {
        self.scripted
            .entry(key(SlaveAddr(addr), &reg))
            .or_default()
            .extend(results);
        self
    }

    pub fn absent(&mut self, addr: u16) -> &mut Self {
        self.absent.insert(addr);
        self
    }

    /// 第 `n` 次读写事务（从 0 开始，不含 delay）返回 `err`
    pub fn fail_at(&mut self, n: usize, err: TransportError) -> &mut Self {
        self.fail_at = Some((n, err));
        self
    }

    pub fn with_clock(&mut self, tick_ms: u64) -> &mut Self {
        self.clock = true;
        self.tick_ms = tick_ms;
        self
    }

    pub fn writes(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Write(..)))
            .count()
    }

    pub fn reads_of(&self, addr: u16, reg: RegPath) -> usize {
        self.calls
            .iter()
            .filter(|c| **c == Call::Read(SlaveAddr(addr), reg))
            .count()
    }

    fn transaction(&mut self, addr: SlaveAddr) -> Result<(), TransportError> {
        let n = self.transactions;
        self.transactions += 1;
        self.clock_ms += self.tick_ms;
        if let Some((at, err)) = &self.fail_at
            && *at == n
        {
            return Err(err.clone());
        }
        if self.absent.contains(&addr.raw()) {
            return Err(TransportError::Nack { addr });
        }
        Ok(())
    }
}

impl TransportPort for ScriptBus {
    fn write(&mut self, addr: SlaveAddr, reg: &RegPath, value: u8) -> Result<(), TransportError> {
        self.calls.push(Call::Write(addr, *reg, value));
        self.transaction(addr)?;
        self.regs.insert(key(addr, reg), value);
        Ok(())
    }

    fn read(&mut self, addr: SlaveAddr, reg: &RegPath) -> Result<u8, TransportError> {
        self.calls.push(Call::Read(addr, *reg));
        let k = key(addr, reg);
        if let Some(next) = self.scripted.get_mut(&k).and_then(|q| q.pop_front()) {
            self.transactions += 1;
            self.clock_ms += self.tick_ms;
            return next;
        }
        self.transaction(addr)?;
        Ok(self.regs.get(&k).copied().unwrap_or(0))
    }

    fn delay(&mut self, ms: u8) {
        self.calls.push(Call::Delay(ms));
        self.clock_ms += ms as u64;
    }

    fn now_ms(&self) -> Option<u64> {
        self.clock.then_some(self.clock_ms)
    }
}
