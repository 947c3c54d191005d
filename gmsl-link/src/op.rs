use core::fmt::{self, Display};

use gmsl_if::{RegPath, SlaveAddr};

/// 寄存器序列中的一步
///
/// `Read` 的 `value` 在构造时是期望值（或占位），执行后被覆盖为实际读到的字节，
/// 供调用者之后做比较。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOp {
    Write {
        addr: SlaveAddr,
        reg: RegPath,
        value: u8,
    },
    Read {
        addr: SlaveAddr,
        reg: RegPath,
        value: u8,
    },
    Delay {
        ms: u8,
    },
}

impl RegisterOp {
    pub const fn write(addr: SlaveAddr, reg: RegPath, value: u8) -> Self {
        Self::Write { addr, reg, value }
    }

    pub const fn read(addr: SlaveAddr, reg: RegPath) -> Self {
        Self::Read {
            addr,
            reg,
            value: 0,
        }
    }

    pub const fn read_expect(addr: SlaveAddr, reg: RegPath, expected: u8) -> Self {
        Self::Read {
            addr,
            reg,
            value: expected,
        }
    }

    pub const fn delay(ms: u8) -> Self {
        Self::Delay { ms }
    }

    pub const fn is_write(&self) -> bool {
        matches!(self, Self::Write { .. })
    }

    pub const fn target(&self) -> Option<(SlaveAddr, RegPath)> {
        match *self {
            Self::Write { addr, reg, .. } | Self::Read { addr, reg, .. } => Some((addr, reg)),
            Self::Delay { .. } => None,
        }
    }

    pub const fn value(&self) -> Option<u8> {
        match *self {
            Self::Write { value, .. } | Self::Read { value, .. } => Some(value),
            Self::Delay { .. } => None,
        }
    }
}

impl Display for RegisterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Write { addr, reg, value } => write!(f, "W {addr} {reg} <- {value:#04x}"),
            Self::Read { addr, reg, value } => write!(f, "R {addr} {reg} -> {value:#04x}"),
            Self::Delay { ms } => write!(f, "D {ms}ms"),
        }
    }
}
