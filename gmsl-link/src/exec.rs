use alloc::vec::Vec;

use gmsl_if::{TransportError, TransportPort};

use crate::{RegisterOp, SequenceError};

/// 按顺序执行寄存器序列
///
/// 第一个失败的步骤立即终止执行，之后的步骤不会触达总线。这里不做重试，
/// 重试策略由调用者决定。
pub struct SequenceExecutor<'a, T: TransportPort + ?Sized> {
    bus: &'a mut T,
}

impl<'a, T: TransportPort + ?Sized> SequenceExecutor<'a, T> {
    pub fn new(bus: &'a mut T) -> Self {
        Self { bus }
    }

    /// 执行 `ops`。`Read` 步骤读到的值写回该步骤的 `value`，
    /// 失败时失败点之前的读取结果仍然保留。
    pub fn execute(&mut self, ops: &mut [RegisterOp]) -> Result<(), SequenceError> {
        for (index, op) in ops.iter_mut().enumerate() {
            if let Err(source) = self.step(op) {
                error!("step {index} ({op}) failed: {source}");
                return Err(SequenceError { index, source });
            }
        }
        Ok(())
    }

    fn step(&mut self, op: &mut RegisterOp) -> Result<(), TransportError> {
        match op {
            RegisterOp::Write { addr, reg, value } => {
                debug!("write {addr} {reg} <- {value:#04x}");
                self.bus.write(*addr, reg, *value)
            }
            RegisterOp::Read { addr, reg, value } => {
                *value = self.bus.read(*addr, reg)?;
                debug!("read {addr} {reg} -> {value:#04x}");
                Ok(())
            }
            RegisterOp::Delay { ms } => {
                self.bus.delay(*ms);
                Ok(())
            }
        }
    }

    /// 读回 `ops` 中每个写步骤的目标寄存器，全部与待写值一致时返回 `true`。
    ///
    /// Only meaningful for sequences that write each register once.
    pub fn verify(&mut self, ops: &[RegisterOp]) -> Result<bool, SequenceError> {
        let mut probes: Vec<RegisterOp> = ops
            .iter()
            .filter_map(|op| match *op {
                RegisterOp::Write { addr, reg, value } => {
                    Some(RegisterOp::read_expect(addr, reg, value))
                }
                _ => None,
            })
            .collect();
        let expected: Vec<u8> = probes.iter().filter_map(RegisterOp::value).collect();

        self.execute(&mut probes)?;

        Ok(probes
            .iter()
            .zip(expected)
            .all(|(probe, want)| probe.value() == Some(want)))
    }

    /// `verify` 不通过时才执行 `ops`，返回是否真的写了总线
    pub fn apply_if_changed(&mut self, ops: &mut [RegisterOp]) -> Result<bool, SequenceError> {
        if self.verify(ops)? {
            debug!("{} register(s) already hold the requested values", ops.len());
            return Ok(false);
        }
        self.execute(ops)?;
        Ok(true)
    }
}
