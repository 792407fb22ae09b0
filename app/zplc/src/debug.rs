//! Interactive debug session: loads a program, attaches a debug channel on
//! stdout, and applies one command per line of stdin until it closes.

use std::io::{stdin, stdout, BufRead};
use std::sync::Arc;

use anyhow::{Context, Result};
use zplc_abi::{DebugMode, Observer, DEBUG_PROTOCOL_VERSION};
use zplc_debug::{CommandTarget, DebugChannel, DebugCommand};
use zplc_kern::sched::Scheduler;

struct SchedulerTarget {
    scheduler: Scheduler,
    mode: std::sync::Mutex<DebugMode>,
}

impl CommandTarget for SchedulerTarget {
    fn set_mode(&self, mode: DebugMode) {
        *self.mode.lock().expect("mode lock poisoned") = mode;
    }

    fn mode(&self) -> DebugMode {
        *self.mode.lock().expect("mode lock poisoned")
    }

    fn reset_task(&self, task_id: u16) -> bool {
        match self.scheduler.find_by_task_id(task_id) {
            Some(handle) => self.scheduler.clear_fault(handle).is_ok(),
            None => false,
        }
    }
}

pub fn interactive(program: &std::path::Path, debug_mode: &str) -> Result<()> {
    let mode = match debug_mode {
        "off" => DebugMode::Off,
        "summary" => DebugMode::Summary,
        "verbose" => DebugMode::Verbose,
        other => anyhow::bail!("unknown debug mode '{other}'"),
    };

    let (channel, handle) = DebugChannel::new(stdout(), mode);
    channel.on_ready(DEBUG_PROTOCOL_VERSION);
    let observer: Arc<dyn Observer> = Arc::new(channel.clone());

    let bytes = std::fs::read(program)
        .with_context(|| format!("reading program file {}", program.display()))?;
    let mut scheduler = Scheduler::new().with_observer(observer);
    scheduler.init().map_err(|e| anyhow::anyhow!("{e}"))?;
    scheduler.load(&bytes).map_err(|e| anyhow::anyhow!("{e}"))?;
    scheduler.start().map_err(|e| anyhow::anyhow!("{e}"))?;

    let mut target = SchedulerTarget { scheduler, mode: std::sync::Mutex::new(mode) };

    for line in stdin().lock().lines() {
        let line = line.context("reading a debug command from stdin")?;
        if let Some(cmd) = DebugCommand::parse(&line) {
            channel.handle_command(cmd, &target);
        }
    }

    let _ = target.scheduler.stop();
    let SchedulerTarget { scheduler, .. } = target;
    scheduler.shutdown();
    handle.join();
    Ok(())
}
