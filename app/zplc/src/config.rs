//! Parses the TOML scenario/device-map file accepted by `run`, `hil`, and
//! `devices`: HAL channel assignments plus per-task priority/interval
//! overrides, applied on top of whatever a program file itself declares.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use zplc_abi::{Priority, TaskOverride};
use zplc_kern::hal::ChannelMap;

#[derive(Debug, Default, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    inputs: Vec<DeviceEntry>,
    #[serde(default)]
    outputs: Vec<DeviceEntry>,
    #[serde(default)]
    tasks: Vec<TaskOverrideEntry>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct DeviceEntry {
    addr: u32,
    channel: u32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct TaskOverrideEntry {
    id: u16,
    priority: Option<u8>,
    interval_us: Option<u32>,
}

impl ScenarioConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario config {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("parsing scenario config {}", path.display()))
    }

    pub fn channel_map(&self) -> ChannelMap {
        ChannelMap {
            inputs: self.inputs.iter().map(|e| (e.addr, e.channel)).collect(),
            outputs: self.outputs.iter().map(|e| (e.addr, e.channel)).collect(),
        }
    }

    pub fn task_overrides(&self) -> Vec<TaskOverride> {
        self.tasks
            .iter()
            .map(|t| TaskOverride {
                id: t.id,
                priority: t.priority.map(Priority),
                interval_us: t.interval_us,
            })
            .collect()
    }
}
