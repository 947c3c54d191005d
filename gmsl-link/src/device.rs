//! 平台侧入口
//!
//! 上层（V4L2 子设备、裸机 demo 等）只和 [`DeviceContext`] 打交道：上电时
//! bring-up，设置格式时切换测试图样，调试时直接读解串器寄存器。每个入口
//! 都假定调用期间独占总线。

use gmsl_if::{RegPath, TransportPort};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{
    AnyChip, BringupConfig, BringupError, ChannelMask, ChipProfile, CsiLanes,
    LinkBringupController, Result, SequenceExecutor, TestPatternMode,
};

/// media bus 像素格式编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum MediaBusFormat {
    Uyvy8_2x8 = 0x2006,
    Yuyv8_2x8 = 0x2008,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatWhich {
    Active,
    Try,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatRequest {
    pub width: u32,
    pub height: u32,
    pub code: u32,
    pub which: FormatWhich,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    pub width: u32,
    pub height: u32,
    pub code: MediaBusFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    pub lanes: CsiLanes,
    /// 每路摄像头一个 CSI-2 虚拟通道
    pub virtual_channels: bool,
    pub continuous_clock: bool,
}

/// 测试图样是否已经打开，重复请求不会再写 ISP
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestPatternState {
    active: bool,
}

impl TestPatternState {
    pub fn is_active(&self) -> bool {
        self.active
    }
}

pub struct DeviceContext<P: ChipProfile> {
    controller: LinkBringupController<P>,
    powered: bool,
    pattern_mode: TestPatternMode,
    pattern: TestPatternState,
    active: Option<FrameFormat>,
    try_format: Option<FrameFormat>,
}

impl DeviceContext<AnyChip> {
    /// 按设备树 compatible 选择芯片
    pub fn probe(compatible: &str, config: BringupConfig) -> Result<Self> {
        let chip = AnyChip::from_compatible(compatible)
            .ok_or(BringupError::InvalidConfig("unknown compatible"))?;
        info!("probe {compatible} -> {}", chip.name());
        Self::new(chip, config)
    }
}

impl<P: ChipProfile> DeviceContext<P> {
    pub fn new(profile: P, config: BringupConfig) -> Result<Self> {
        let pattern_mode = config.test_pattern;
        Ok(Self {
            controller: LinkBringupController::new(profile, config)?,
            powered: false,
            pattern_mode,
            pattern: TestPatternState::default(),
            active: None,
            try_format: None,
        })
    }

    pub fn controller(&self) -> &LinkBringupController<P> {
        &self.controller
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn test_pattern(&self) -> TestPatternState {
        self.pattern
    }

    /// 运行时修改测试图样请求，下一次 `set_format` 生效
    pub fn set_test_pattern_mode(&mut self, mode: TestPatternMode) {
        self.pattern_mode = mode;
    }

    /// 电源由平台控制，这里只负责上电后的 bring-up 和下电后的状态清理
    pub fn power<T: TransportPort + ?Sized>(
        &mut self,
        bus: &mut T,
        on: bool,
    ) -> Result<Option<ChannelMask>> {
        if on {
            self.powered = true;
            self.controller.bring_up(bus).map(Some)
        } else {
            info!("{}: power off", self.controller.profile().name());
            self.powered = false;
            self.controller.reset();
            self.pattern = TestPatternState::default();
            self.active = None;
            self.try_format = None;
            Ok(None)
        }
    }

    /// 链路还没有 ready 时执行一次 bring-up
    pub fn ensure_initialized<T: TransportPort + ?Sized>(
        &mut self,
        bus: &mut T,
    ) -> Result<ChannelMask> {
        match self.controller.link_mask() {
            Some(mask) => Ok(mask),
            None => self.controller.bring_up(bus),
        }
    }

    /// 读解串器寄存器，不触发 bring-up
    pub fn read_register<T: TransportPort + ?Sized>(&self, bus: &mut T, reg: u8) -> Result<u8> {
        let deser = self.controller.profile().deser_addr();
        let value = bus.read(deser, &RegPath::byte(reg))?;
        debug!("read {deser} reg {reg:#04x} = {value:#04x}");
        Ok(value)
    }

    pub fn enum_mbus_code(&self, index: usize) -> Option<MediaBusFormat> {
        self.controller.profile().layout().formats.get(index).copied()
    }

    pub fn bus_config(&self) -> Result<BusConfig> {
        let cfg = self
            .controller
            .output_config()
            .ok_or(BringupError::NotInitialized)?;
        Ok(BusConfig {
            lanes: cfg.lanes,
            virtual_channels: true,
            continuous_clock: true,
        })
    }

    pub fn format(&self, which: FormatWhich) -> Option<FrameFormat> {
        match which {
            FormatWhich::Active => self.active,
            FormatWhich::Try => self.try_format,
        }
    }

    /// 只支持固定分辨率，尺寸不符时告警并返回实际尺寸
    pub fn set_format<T: TransportPort + ?Sized>(
        &mut self,
        bus: &mut T,
        req: FormatRequest,
    ) -> Result<FrameFormat> {
        let profile = self.controller.profile();
        let formats = profile.layout().formats;

        let code = match MediaBusFormat::try_from(req.code)
            .ok()
            .filter(|code| formats.contains(code))
        {
            Some(code) => code,
            None if req.which == FormatWhich::Active => {
                return Err(BringupError::UnsupportedFormat { code: req.code });
            }
            None => formats
                .first()
                .copied()
                .ok_or(BringupError::UnsupportedFormat { code: req.code })?,
        };

        let mask = self
            .controller
            .link_mask()
            .ok_or(BringupError::NotInitialized)?;
        let (width, height) = profile.frame_size(mask);
        if req.width != width || req.height != height {
            warn!(
                "{}: {}x{} not supported, use {width}x{height}",
                profile.name(),
                req.width,
                req.height
            );
        }

        let fmt = FrameFormat {
            width,
            height,
            code,
        };
        match req.which {
            FormatWhich::Active => self.active = Some(fmt),
            FormatWhich::Try => self.try_format = Some(fmt),
        }

        self.apply_test_pattern(bus, mask)?;
        Ok(fmt)
    }

    fn apply_test_pattern<T: TransportPort + ?Sized>(
        &mut self,
        bus: &mut T,
        mask: ChannelMask,
    ) -> Result {
        let enable = match self.pattern_mode {
            TestPatternMode::Off => return Ok(()),
            TestPatternMode::Enable => true,
            TestPatternMode::Disable => false,
        };
        if self.pattern.active == enable {
            debug!("test pattern already {}", if enable { "on" } else { "off" });
            return Ok(());
        }

        let mut ops = self.controller.profile().test_pattern_ops(mask, enable)?;
        SequenceExecutor::new(bus).execute(&mut ops)?;
        self.pattern.active = enable;
        info!(
            "{}: test pattern {}",
            self.controller.profile().name(),
            if enable { "enabled" } else { "disabled" }
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use gmsl_if::SlaveAddr;

    use super::*;
    use crate::{Max9286, profile::regs, testing::ScriptBus};

    /// 单路、串行器已在 0x82 上的运行中链路
    fn running_link() -> ScriptBus {
        let mut bus = ScriptBus::new();
        bus.set(0x94, RegPath::byte(0x1E), 0x40)
            .set(0x94, RegPath::byte(0x49), 0x01)
            .set(0x94, RegPath::byte(0x27), 0x80)
            .set(0x94, regs::FORWARD, 0xF1)
            .set(0x94, regs::CSI_OUT, regs::CSI_OUT_ON)
            .set(0x82, RegPath::byte(0x00), 0x82);
        bus
    }

    fn context(mode: TestPatternMode) -> DeviceContext<Max9286> {
        DeviceContext::new(
            Max9286,
            BringupConfig {
                test_pattern: mode,
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn request(code: MediaBusFormat, which: FormatWhich) -> FormatRequest {
        FormatRequest {
            width: 1920,
            height: 1080,
            code: code.into(),
            which,
        }
    }

    fn isp_writes(bus: &ScriptBus) -> usize {
        bus.calls
            .iter()
            .filter(|c| matches!(c, crate::testing::Call::Write(a, ..) if *a == SlaveAddr(0x34)))
            .count()
    }

    #[test]
    fn register_read_has_no_side_effects() {
        let mut bus = running_link();
        let ctx = context(TestPatternMode::Off);

        assert_eq!(ctx.read_register(&mut bus, 0x1E).unwrap(), 0x40);
        assert_eq!(bus.calls.len(), 1);
        assert_eq!(ctx.controller().state(), crate::LinkState::Unconfigured);
    }

    #[test]
    fn format_needs_link() {
        let mut bus = running_link();
        let mut ctx = context(TestPatternMode::Off);

        let err = ctx
            .set_format(&mut bus, request(MediaBusFormat::Uyvy8_2x8, FormatWhich::Active))
            .unwrap_err();
        assert_eq!(err, BringupError::NotInitialized);
        assert!(ctx.bus_config().is_err());
    }

    #[test]
    fn format_is_fixed_size() {
        let mut bus = running_link();
        let mut ctx = context(TestPatternMode::Off);
        assert_eq!(ctx.power(&mut bus, true).unwrap(), Some(ChannelMask::CH0));

        let fmt = ctx
            .set_format(&mut bus, request(MediaBusFormat::Yuyv8_2x8, FormatWhich::Active))
            .unwrap();

        assert_eq!((fmt.width, fmt.height), (1280, 800));
        assert_eq!(ctx.format(FormatWhich::Active), Some(fmt));
        assert_eq!(ctx.bus_config().unwrap().lanes, CsiLanes::One);
    }

    #[test]
    fn unknown_code() {
        let mut bus = running_link();
        let mut ctx = context(TestPatternMode::Off);
        ctx.ensure_initialized(&mut bus).unwrap();

        let mut req = request(MediaBusFormat::Uyvy8_2x8, FormatWhich::Active);
        req.code = 0x1234;
        assert_eq!(
            ctx.set_format(&mut bus, req).unwrap_err(),
            BringupError::UnsupportedFormat { code: 0x1234 }
        );

        req.which = FormatWhich::Try;
        let fmt = ctx.set_format(&mut bus, req).unwrap();
        assert_eq!(fmt.code, MediaBusFormat::Uyvy8_2x8);
        assert_eq!(ctx.format(FormatWhich::Active), None);
    }

    #[test]
    fn test_pattern_applied_once() {
        let mut bus = running_link();
        let mut ctx = context(TestPatternMode::Enable);
        ctx.ensure_initialized(&mut bus).unwrap();
        let req = request(MediaBusFormat::Uyvy8_2x8, FormatWhich::Active);

        ctx.set_format(&mut bus, req).unwrap();
        ctx.set_format(&mut bus, req).unwrap();
        assert_eq!(isp_writes(&bus), 5);
        assert!(ctx.test_pattern().is_active());

        ctx.set_test_pattern_mode(TestPatternMode::Disable);
        ctx.set_format(&mut bus, req).unwrap();
        ctx.set_format(&mut bus, req).unwrap();
        assert_eq!(isp_writes(&bus), 10);
        assert!(!ctx.test_pattern().is_active());
    }

    #[test]
    fn ensure_initialized_runs_once() {
        let mut bus = running_link();
        let mut ctx = context(TestPatternMode::Off);

        ctx.ensure_initialized(&mut bus).unwrap();
        let after_first = bus.calls.len();
        ctx.ensure_initialized(&mut bus).unwrap();
        assert_eq!(bus.calls.len(), after_first);
    }

    #[test]
    fn power_off_forgets_link() {
        let mut bus = running_link();
        let mut ctx = context(TestPatternMode::Off);
        ctx.power(&mut bus, true).unwrap();

        assert_eq!(ctx.power(&mut bus, false).unwrap(), None);
        assert!(!ctx.is_powered());
        assert_eq!(ctx.controller().link_mask(), None);
        assert_eq!(ctx.controller().selection(), crate::BusSelection::Unknown);
    }

    #[test]
    fn mbus_codes() {
        let ctx = context(TestPatternMode::Off);
        assert_eq!(ctx.enum_mbus_code(0), Some(MediaBusFormat::Uyvy8_2x8));
        assert_eq!(ctx.enum_mbus_code(1), Some(MediaBusFormat::Yuyv8_2x8));
        assert_eq!(ctx.enum_mbus_code(2), None);
    }

    #[test]
    fn probe_by_compatible() {
        let ctx = DeviceContext::probe("maxim,max9288", BringupConfig::default()).unwrap();
        assert_eq!(ctx.controller().profile().name(), "max9288");
        assert!(DeviceContext::probe("maxim,max9999", BringupConfig::default()).is_err());
    }
}
