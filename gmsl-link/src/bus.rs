use spin::{Mutex, MutexGuard};

use gmsl_if::TransportPort;

/// 同一个解串器的总线只能有一个互斥域
///
/// 解串器的通道选择是总线上的隐式状态，bring-up、格式设置、调试读寄存器
/// 都必须整段持锁，不能只锁单次事务。
pub struct SharedBus<T> {
    inner: Mutex<T>,
}

impl<T: TransportPort> SharedBus<T> {
    pub fn new(bus: T) -> Self {
        Self {
            inner: Mutex::new(bus),
        }
    }

    /// 持锁执行 `f`
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut *guard)
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }

    pub fn try_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = self.inner.try_lock()?;
        Some(f(&mut *guard))
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}
