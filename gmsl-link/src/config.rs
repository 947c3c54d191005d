use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{BringupError, Result};

/// 测试图样请求，对应驱动参数的 0 / 1 / 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum TestPatternMode {
    #[default]
    Off = 0,
    Enable = 1,
    Disable = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BringupConfig {
    /// ID / 链路 / 锁定检查各自的读取次数上限
    pub retries: u8,
    /// 两次尝试之间的等待
    pub retry_delay_ms: u8,
    /// 整个 bring-up 的时限，需要总线提供时钟
    pub deadline_ms: Option<u32>,
    pub test_pattern: TestPatternMode,
}

impl Default for BringupConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay_ms: 10,
            deadline_ms: None,
            test_pattern: TestPatternMode::Off,
        }
    }
}

impl BringupConfig {
    pub fn validate(&self) -> Result {
        if self.retries == 0 {
            return Err(BringupError::InvalidConfig("retries must be at least 1"));
        }
        if self.deadline_ms == Some(0) {
            return Err(BringupError::InvalidConfig("deadline_ms must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = BringupConfig::default();
        assert_eq!(cfg.retries, 3);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_retries_rejected() {
        let cfg = BringupConfig {
            retries: 0,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(BringupError::InvalidConfig(_))
        ));
    }

    #[test]
    fn pattern_mode_from_param() {
        assert_eq!(TestPatternMode::try_from(2u8).ok(), Some(TestPatternMode::Disable));
        assert!(TestPatternMode::try_from(7u8).is_err());
        assert_eq!(u8::from(TestPatternMode::Enable), 1);
    }
}
