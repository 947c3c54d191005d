use crate::{RegPath, SlaveAddr, TransportError};

/// 单次寄存器事务的总线抽象，由平台提供。
///
/// 每次调用都是阻塞的，且不可中途取消：I2C 事务在硬件层面是原子的。
/// 同一个解串器的总线上还隐含着"当前转发到哪个通道"的芯片内部状态，
/// 所以平台必须保证 bring-up 期间没有其他访问者（见 `gmsl_link::bus::SharedBus`）。
pub trait TransportPort {
    /// 写入 `reg` 地址字节后紧跟一个数据字节
    fn write(&mut self, addr: SlaveAddr, reg: &RegPath, value: u8) -> Result<(), TransportError>;

    /// 写入 `reg` 地址字节，再读回一个字节
    fn read(&mut self, addr: SlaveAddr, reg: &RegPath) -> Result<u8, TransportError>;

    fn delay(&mut self, ms: u8);

    /// Monotonic milliseconds, used only for the optional overall bring-up deadline.
    fn now_ms(&self) -> Option<u64> {
        None
    }
}

impl<T: TransportPort + ?Sized> TransportPort for &mut T {
    fn write(&mut self, addr: SlaveAddr, reg: &RegPath, value: u8) -> Result<(), TransportError> {
        (**self).write(addr, reg, value)
    }

    fn read(&mut self, addr: SlaveAddr, reg: &RegPath) -> Result<u8, TransportError> {
        (**self).read(addr, reg)
    }

    fn delay(&mut self, ms: u8) {
        (**self).delay(ms)
    }

    fn now_ms(&self) -> Option<u64> {
        (**self).now_ms()
    }
}
