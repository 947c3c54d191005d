#![cfg_attr(target_os = "none", no_std)]
#![cfg(not(target_os = "none"))]

use std::path::Path;

use bus_sim::{SimBus, Transaction};
use gmsl_link::{
    AnyChip, BringupConfig, ChannelMask, ChipProfile, DeviceContext, FormatRequest, FormatWhich,
    FrameFormat, LinkState,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};


/// 场景文件：芯片、哪些链路接了摄像头、串行器的初始状态
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Scenario {
    pub compatible: String,
    /// 已连接的通道号
    pub linked: Vec<u8>,
    /// 上一次 bring-up 后仍在目标地址上的通道
    #[serde(default)]
    pub preconfigured: Vec<u8>,
    #[serde(default = "default_locked")]
    pub locked: bool,
    #[serde(default)]
    pub transaction_cost_ms: u64,
    #[serde(default = "default_runs")]
    pub runs: u8,
    /// 两次运行之间给芯片重新上电
    #[serde(default)]
    pub power_cycle_between: bool,
    #[serde(default)]
    pub bringup: BringupConfig,
    pub format: Option<FormatSpec>,
}

fn default_locked() -> bool {
    true
}

fn default_runs() -> u8 {
    1
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct FormatSpec {
    pub width: u32,
    pub height: u32,
    pub code: u32,
    #[serde(default)]
    pub try_only: bool,
}

impl FormatSpec {
    fn request(&self) -> FormatRequest {
        FormatRequest {
            width: self.width,
            height: self.height,
            code: self.code,
            which: if self.try_only {
                FormatWhich::Try
            } else {
                FormatWhich::Active
            },
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub result: gmsl_link::Result<ChannelMask>,
    pub state: LinkState,
    pub trace: Vec<Transaction>,
}

impl RunReport {
    pub fn writes(&self) -> usize {
        self.trace.iter().filter(|t| t.is_write()).count()
    }
}

#[derive(Debug)]
pub struct DryRun {
    pub chip: &'static str,
    pub runs: Vec<RunReport>,
    pub format: Option<(gmsl_link::Result<FrameFormat>, Vec<Transaction>)>,
}

impl DryRun {
    pub fn succeeded(&self) -> bool {
        self.runs.iter().all(|r| r.result.is_ok())
            && self.format.as_ref().is_none_or(|(r, _)| r.is_ok())
    }
}

fn mask_of(channels: &[u8]) -> Result<ChannelMask, Box<dyn std::error::Error>> {
    channels.iter().try_fold(ChannelMask::empty(), |mask, &ch| {
        if ch < ChannelMask::CHANNELS {
            Ok(mask | ChannelMask::channel(ch))
        } else {
            Err(format!("channel {ch} out of range").into())
        }
    })
}

impl Scenario {
    pub fn from_toml(content: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let scenario: Scenario = toml::from_str(content)?;
        scenario.bringup.validate()?;
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let scenario = Self::from_toml(&content)?;
        info!("Scenario loaded from {path:?}: {}", scenario.compatible);
        Ok(scenario)
    }

    pub fn build_bus(&self, chip: &AnyChip) -> Result<SimBus, Box<dyn std::error::Error>> {
        let mut sim = SimBus::new(chip, mask_of(&self.linked)?);
        for ch in mask_of(&self.preconfigured)?.channels() {
            sim.preconfigure(ch);
        }
        sim.set_locked(self.locked)
            .with_transaction_cost(self.transaction_cost_ms);
        Ok(sim)
    }

    pub fn run(&self) -> Result<DryRun, Box<dyn std::error::Error>> {
        let mut dev = DeviceContext::probe(&self.compatible, self.bringup)?;
        let chip = *dev.controller().profile();
        let mut sim = self.build_bus(&chip)?;

        let mut runs = Vec::new();
        for n in 0..self.runs {
            if n > 0 && self.power_cycle_between {
                dev.power(&mut sim, false)?;
                sim.power_cycle();
            }
            let result = dev
                .power(&mut sim, true)
                .map(|mask| mask.unwrap_or(ChannelMask::empty()));
            if let Err(e) = &result {
                warn!("run {n}: {e}");
            }
            runs.push(RunReport {
                result,
                state: dev.controller().state(),
                trace: sim.take_log(),
            });
        }

        let format = self.format.map(|spec| {
            let result = dev.set_format(&mut sim, spec.request());
            (result, sim.take_log())
        });

        Ok(DryRun {
            chip: chip.name(),
            runs,
            format,
        })
    }
}
