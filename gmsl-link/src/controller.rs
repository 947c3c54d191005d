use alloc::vec::Vec;

use gmsl_if::TransportPort;

use crate::{
    BringupConfig, BringupError, BusSelection, ChannelBringup, ChannelMask, ChannelOutcome,
    ChipProfile, OutputOrderConfig, RegisterOp, Result, SequenceExecutor,
    profile::{decode_link_status, is_locked, regs, unsupported},
};

/// 链路 bring-up 状态，只会前进；出错时回到 `Unconfigured`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LinkState {
    Unconfigured,
    IdChecked,
    LinkDetected,
    OutputOrderSet,
    Locked,
    ChannelsAddressed,
    StreamReady,
}

/// 幂等检查的结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    /// 全部通道保持上次的配置
    All,
    None,
    /// 上次的配置只留下一部分，值为仍在目标地址上的通道
    Partial(ChannelMask),
}

impl InitStatus {
    /// `expected` 为本次检测到的链路数
    pub fn classify(configured: ChannelMask, expected: u8) -> Self {
        match configured.count() {
            0 => InitStatus::None,
            n if n == expected => InitStatus::All,
            _ => InitStatus::Partial(configured),
        }
    }
}

/// 整条链路的 bring-up 编排
///
/// 调用期间需要独占总线，见 [`crate::SharedBus`]。
pub struct LinkBringupController<P: ChipProfile> {
    profile: P,
    config: BringupConfig,
    state: LinkState,
    output: Option<OutputOrderConfig>,
    selection: BusSelection,
    outcomes: Vec<(u8, ChannelOutcome)>,
    started_ms: Option<u64>,
}

impl<P: ChipProfile> LinkBringupController<P> {
    pub fn new(profile: P, config: BringupConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            profile,
            config,
            state: LinkState::Unconfigured,
            output: None,
            selection: BusSelection::Unknown,
            outcomes: Vec::new(),
            started_ms: None,
        })
    }

    pub fn profile(&self) -> &P {
        &self.profile
    }

    pub fn config(&self) -> &BringupConfig {
        &self.config
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn selection(&self) -> BusSelection {
        self.selection
    }

    /// 仅在 `StreamReady` 时有值
    pub fn link_mask(&self) -> Option<ChannelMask> {
        self.output_config().map(|cfg| cfg.mask)
    }

    pub fn output_config(&self) -> Option<&OutputOrderConfig> {
        if self.state == LinkState::StreamReady {
            self.output.as_ref()
        } else {
            None
        }
    }

    /// 上一次 bring-up 中每个通道的结果，按通道号升序
    pub fn channel_outcomes(&self) -> &[(u8, ChannelOutcome)] {
        &self.outcomes
    }

    /// 回到 `Unconfigured`，不访问总线
    pub fn reset(&mut self) {
        self.state = LinkState::Unconfigured;
        self.output = None;
        self.outcomes.clear();
        self.selection = BusSelection::Unknown;
        self.started_ms = None;
    }

    /// 从 `Unconfigured` 走到 `StreamReady`
    ///
    /// 每次调用都从头开始；失败时状态回到 `Unconfigured`，不会自动重试。
    pub fn bring_up<T: TransportPort + ?Sized>(&mut self, bus: &mut T) -> Result<ChannelMask> {
        self.reset();
        self.started_ms = bus.now_ms();
        if self.config.deadline_ms.is_some() && self.started_ms.is_none() {
            warn!("{}: transport has no clock, deadline ignored", self.name());
        }

        match self.run(bus) {
            Ok(mask) => Ok(mask),
            Err(e) => {
                error!("{}: bring-up failed in {:?}: {e}", self.name(), self.state);
                self.reset();
                Err(e)
            }
        }
    }

    fn run<T: TransportPort + ?Sized>(&mut self, bus: &mut T) -> Result<ChannelMask> {
        self.check_id(bus)?;
        self.enter(LinkState::IdChecked);

        let mask = self.detect_link(bus)?;
        self.enter(LinkState::LinkDetected);
        if !self.profile.supports(mask) {
            return Err(unsupported(mask));
        }

        self.check_deadline(bus)?;
        let cfg = self.set_output_order(bus, mask)?;
        self.enter(LinkState::OutputOrderSet);

        self.wait_lock(bus)?;
        self.enter(LinkState::Locked);

        self.check_deadline(bus)?;
        let reinit = match self.init_status(bus, &cfg)? {
            InitStatus::All => {
                info!(
                    "{}: all channels keep the last setting, skip init",
                    self.name()
                );
                false
            }
            InitStatus::None => {
                self.init_all_channels(bus, &cfg)?;
                true
            }
            InitStatus::Partial(configured) => {
                warn!(
                    "{}: only {configured} of {mask} still configured, re-init all",
                    self.name()
                );
                self.release(bus, configured)?;
                self.init_all_channels(bus, &cfg)?;
                true
            }
        };
        self.enter(LinkState::ChannelsAddressed);

        if reinit {
            self.check_deadline(bus)?;
            let mut ops = self.profile.forward_ops(mask);
            ops.extend(self.profile.enable_ops());
            self.run_ops(bus, &mut ops)?;
            self.selection = BusSelection::All(mask);
        }
        self.enter(LinkState::StreamReady);

        Ok(mask)
    }

    fn name(&self) -> &'static str {
        self.profile.name()
    }

    fn enter(&mut self, next: LinkState) {
        info!("{}: {:?} -> {:?}", self.name(), self.state, next);
        self.state = next;
    }

    fn check_deadline<T: TransportPort + ?Sized>(&self, bus: &T) -> Result {
        if let (Some(limit), Some(start), Some(now)) =
            (self.config.deadline_ms, self.started_ms, bus.now_ms())
            && now.saturating_sub(start) > limit as u64
        {
            return Err(BringupError::DeadlineExceeded { state: self.state });
        }
        Ok(())
    }

    /// 最多尝试 `retries` 次，两次之间等待；失败时带回最后一次读到的值
    fn retry<T, V>(
        &self,
        bus: &mut T,
        what: &str,
        mut attempt: impl FnMut(&mut T) -> core::result::Result<V, Option<u8>>,
    ) -> core::result::Result<V, Option<u8>>
    where
        T: TransportPort + ?Sized,
    {
        let mut last = None;
        for n in 1..=self.config.retries {
            match attempt(bus) {
                Ok(v) => return Ok(v),
                Err(seen) => {
                    last = seen.or(last);
                    warn!(
                        "{}: {what} attempt {n}/{} failed ({last:02x?})",
                        self.name(),
                        self.config.retries
                    );
                    if n < self.config.retries {
                        bus.delay(self.config.retry_delay_ms);
                    }
                }
            }
        }
        Err(last)
    }

    fn check_id<T: TransportPort + ?Sized>(&self, bus: &mut T) -> Result {
        let l = self.profile.layout();
        self.retry(bus, "id", |bus| match bus.read(l.deser, &l.id_reg) {
            Ok(v) if v == l.id_value => Ok(()),
            Ok(v) => Err(Some(v)),
            Err(e) => {
                debug!("id read: {e}");
                Err(None)
            }
        })
        .map_err(|found| BringupError::IdMismatch {
            expected: l.id_value,
            found,
        })?;
        info!("{}: id {:#04x} match", self.name(), l.id_value);
        Ok(())
    }

    fn detect_link<T: TransportPort + ?Sized>(&self, bus: &mut T) -> Result<ChannelMask> {
        let l = self.profile.layout();
        let mask = self
            .retry(bus, "link detect", |bus| match bus.read(l.deser, &l.link_reg) {
                Ok(v) => {
                    let mask = decode_link_status(v);
                    if mask.is_empty() { Err(Some(v)) } else { Ok(mask) }
                }
                Err(e) => {
                    debug!("link read: {e}");
                    Err(None)
                }
            })
            .map_err(|_| BringupError::NoLinkDetected)?;

        for ch in 0..ChannelMask::CHANNELS {
            debug!(
                "{}: channel {ch} {}",
                self.name(),
                if mask.contains_channel(ch) {
                    "linked"
                } else {
                    "not linked"
                }
            );
        }
        info!("{}: {} camera(s) linked, mask {mask}", self.name(), mask.count());
        Ok(mask)
    }

    fn set_output_order<T: TransportPort + ?Sized>(
        &mut self,
        bus: &mut T,
        mask: ChannelMask,
    ) -> Result<OutputOrderConfig> {
        let cfg = self.profile.configurator().compute_output_order(mask);
        let mut ops = self.profile.output_order_ops(&cfg);
        let written = SequenceExecutor::new(bus).apply_if_changed(&mut ops)?;
        info!(
            "{}: output order {:#04x}{}",
            self.name(),
            cfg.order,
            if written { "" } else { " (unchanged)" }
        );
        self.output = Some(cfg);
        Ok(cfg)
    }

    fn wait_lock<T: TransportPort + ?Sized>(&self, bus: &mut T) -> Result {
        let l = self.profile.layout();
        self.retry(bus, "lock", |bus| match bus.read(l.deser, &l.lock_reg) {
            Ok(v) if is_locked(v) => Ok(()),
            Ok(v) => Err(Some(v)),
            Err(e) => {
                debug!("lock read: {e}");
                Err(None)
            }
        })
        .map_err(|status| BringupError::NotLocked { status })?;
        info!("{}: camera links are locked", self.name());
        Ok(())
    }

    /// 只读检查每个已连接通道是否还在目标地址上，以及上次是否走到了使能
    ///
    /// 转发已经覆盖全部已连接链路时不写总线；否则先打开转发。
    fn init_status<T: TransportPort + ?Sized>(
        &mut self,
        bus: &mut T,
        cfg: &OutputOrderConfig,
    ) -> Result<InitStatus> {
        let deser = self.profile.deser_addr();
        let forward = bus.read(deser, &regs::FORWARD)?;
        let current = BusSelection::from_forward_value(forward);
        if cfg.mask.channels().all(|ch| current.reaches(ch)) {
            self.selection = current;
        } else {
            debug!("{}: forward {forward:#04x}, open all links", self.name());
            let mut ops = self.profile.forward_ops(cfg.mask);
            self.run_ops(bus, &mut ops)?;
            self.selection = BusSelection::All(cfg.mask);
        }

        let mut configured = ChannelMask::empty();
        for ch in cfg.mask.channels() {
            let slot = self.profile.channel_slot(ch);
            if ChannelBringup::new(bus, &mut self.selection).probe(&slot)? {
                debug!("{}: channel {ch} keeps the last setting", self.name());
                configured |= ChannelMask::channel(ch);
            } else {
                debug!("{}: channel {ch} has been reset", self.name());
            }
        }

        let status = InitStatus::classify(configured, cfg.mask.count());
        // CSI 输出是最后一步，没打开说明上次在配置或使能途中失败
        if status == InitStatus::All && !self.output_enabled(bus)? {
            warn!(
                "{}: all channels addressed but CSI output is off, re-init all",
                self.name()
            );
            return Ok(InitStatus::Partial(configured));
        }
        Ok(status)
    }

    fn output_enabled<T: TransportPort + ?Sized>(&self, bus: &mut T) -> Result<bool> {
        let csi = bus.read(self.profile.deser_addr(), &regs::CSI_OUT)?;
        Ok(csi == regs::CSI_OUT_ON)
    }

    fn release<T: TransportPort + ?Sized>(&mut self, bus: &mut T, configured: ChannelMask) -> Result {
        for ch in configured.channels() {
            self.check_deadline(bus)?;
            let slot = self.profile.channel_slot(ch);
            ChannelBringup::new(bus, &mut self.selection).release(&slot)?;
        }
        Ok(())
    }

    fn init_all_channels<T: TransportPort + ?Sized>(
        &mut self,
        bus: &mut T,
        cfg: &OutputOrderConfig,
    ) -> Result {
        let mask = cfg.mask;
        if self.selection != BusSelection::All(mask) {
            let mut ops = self.profile.forward_ops(mask);
            self.run_ops(bus, &mut ops)?;
            self.selection = BusSelection::All(mask);
        }

        let mut ops = self.profile.pre_init_ops();
        self.run_ops(bus, &mut ops)?;
        let mut ops = self.profile.topology_ops(cfg);
        self.run_ops(bus, &mut ops)?;
        self.selection = BusSelection::All(mask);

        for ch in mask.channels() {
            self.check_deadline(bus)?;
            info!("{}: channel {ch} linked, init it", self.name());
            let mut slot = self.profile.channel_slot(ch);
            let outcome = ChannelBringup::new(bus, &mut self.selection).bring_up(&mut slot)?;
            self.outcomes.push((ch, outcome));
        }
        Ok(())
    }

    /// 写操作会改变转发状态，执行期间镜像视为未知
    fn run_ops<T: TransportPort + ?Sized>(&mut self, bus: &mut T, ops: &mut [RegisterOp]) -> Result {
        let selection = self.selection;
        self.selection = BusSelection::Unknown;
        SequenceExecutor::new(bus).execute(ops)?;
        self.selection = selection;
        Ok(())
    }
}
