//! Reports the HAL channel bindings a run would use, read from the same
//! scenario file `run`/`hil` accept.

use std::path::Path;

use anyhow::Result;
use zplc_kern::hal::{DeviceBinding, DeviceDirection, NullHal};
use zplc_kern::sched::Scheduler;

use crate::config::ScenarioConfig;

pub fn devices(json: bool, config: Option<&Path>) -> Result<()> {
    let channels = match config {
        Some(path) => ScenarioConfig::load(path)?.channel_map(),
        None => Default::default(),
    };
    let mut scheduler = Scheduler::new().with_hal(std::sync::Arc::new(NullHal), channels);
    scheduler.init().map_err(|e| anyhow::anyhow!("{e}"))?;
    let bindings = scheduler.devices().to_vec();
    scheduler.shutdown();

    if json {
        let payload: Vec<_> = bindings
            .iter()
            .map(|b| {
                serde_json::json!({
                    "addr": b.addr,
                    "channel": b.channel,
                    "direction": match b.direction {
                        DeviceDirection::Input => "input",
                        DeviceDirection::Output => "output",
                    },
                })
            })
            .collect();
        println!("{}", serde_json::json!({ "devices": payload }));
    } else if bindings.is_empty() {
        println!("no channels bound (null HAL)");
    } else {
        for b in &bindings {
            print_binding(b);
        }
    }
    Ok(())
}

fn print_binding(b: &DeviceBinding) {
    let dir = match b.direction {
        DeviceDirection::Input => "input ",
        DeviceDirection::Output => "output",
    };
    println!("{dir} 0x{:04x} -> channel {}", b.addr, b.channel);
}
