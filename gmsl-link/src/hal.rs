//! 基于 `embedded-hal` 1.0 的 [`TransportPort`] 实现
//!
//! ## 概述
//!
//! 寄存器表里使用 8-bit 地址，这里在发送前转换为 7-bit。
//! 写事务是 `[reg.., value]` 一次 write；读事务是 write_read，读回 1 字节。

use alloc::format;

use embedded_hal::{
    delay::DelayNs,
    i2c::{Error as _, ErrorKind, I2c},
};

use crate::{RegPath, SlaveAddr, TransportError, TransportPort};

pub struct HalTransport<I2C, D> {
    i2c: I2C,
    delay: D,
}

impl<I2C: I2c, D: DelayNs> HalTransport<I2C, D> {
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self { i2c, delay }
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }
}

fn map_error(addr: SlaveAddr, kind: ErrorKind) -> TransportError {
    match kind {
        ErrorKind::NoAcknowledge(_) => TransportError::Nack { addr },
        ErrorKind::ArbitrationLoss => TransportError::ArbitrationLost,
        ErrorKind::Overrun => TransportError::Timeout,
        other => TransportError::Other(format!("{other:?}")),
    }
}

impl<I2C: I2c, D: DelayNs> TransportPort for HalTransport<I2C, D> {
    fn write(&mut self, addr: SlaveAddr, reg: &RegPath, value: u8) -> Result<(), TransportError> {
        let mut buf = [0u8; 3];
        let n = reg.as_bytes().len();
        buf[..n].copy_from_slice(reg.as_bytes());
        buf[n] = value;
        self.i2c
            .write(addr.seven_bit(), &buf[..=n])
            .map_err(|e| map_error(addr, e.kind()))
    }

    fn read(&mut self, addr: SlaveAddr, reg: &RegPath) -> Result<u8, TransportError> {
        let mut value = [0u8; 1];
        self.i2c
            .write_read(addr.seven_bit(), reg.as_bytes(), &mut value)
            .map_err(|e| map_error(addr, e.kind()))?;
        Ok(value[0])
    }

    fn delay(&mut self, ms: u8) {
        self.delay.delay_ms(ms as u32);
    }
}
