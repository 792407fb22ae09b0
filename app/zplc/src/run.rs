//! Drives a loaded program to completion or for a fixed duration, optionally
//! wired to the debug channel.

use std::io::stdout;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::info;
use zplc_abi::{DebugMode, Observer, DEBUG_PROTOCOL_VERSION};
use zplc_debug::DebugChannel;
use zplc_kern::hal::NullHal;
use zplc_kern::sched::Scheduler;

use crate::config::ScenarioConfig;

fn parse_mode(s: &str) -> Result<DebugMode> {
    match s {
        "off" => Ok(DebugMode::Off),
        "summary" => Ok(DebugMode::Summary),
        "verbose" => Ok(DebugMode::Verbose),
        other => bail!("unknown debug mode '{other}' (expected off, summary, or verbose)"),
    }
}

fn load_and_start(
    program: &std::path::Path,
    observer: Arc<dyn Observer>,
    config: Option<&std::path::Path>,
) -> Result<Scheduler> {
    let bytes = std::fs::read(program)
        .with_context(|| format!("reading program file {}", program.display()))?;
    let scenario = config.map(ScenarioConfig::load).transpose()?;

    let mut scheduler = Scheduler::new().with_observer(observer);
    if let Some(scenario) = &scenario {
        scheduler = scheduler.with_hal(Arc::new(NullHal), scenario.channel_map());
    }
    scheduler.init().map_err(|e| anyhow::anyhow!("{e}"))?;
    let n = scheduler
        .load(&bytes)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    info!("loaded {n} task(s) from {}", program.display());
    if let Some(scenario) = &scenario {
        scheduler
            .apply_overrides(&scenario.task_overrides())
            .map_err(|e| anyhow::anyhow!("{e}"))?;
    }
    scheduler.start().map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(scheduler)
}

fn print_summary(scheduler: &Scheduler, json: bool) {
    let stats = scheduler.stats();
    if json {
        let payload = serde_json::json!({
            "active_tasks": stats.active_tasks,
            "total_cycles": stats.total_cycles,
            "total_overruns": stats.total_overruns,
            "uptime_ms": stats.uptime_ms,
        });
        println!("{payload}");
    } else {
        println!(
            "tasks={} cycles={} overruns={} uptime_ms={}",
            stats.active_tasks, stats.total_cycles, stats.total_overruns, stats.uptime_ms
        );
    }
}

pub fn run(
    program: &std::path::Path,
    for_ms: Option<u64>,
    debug_mode: &str,
    json: bool,
    config: Option<&std::path::Path>,
) -> Result<()> {
    let mode = parse_mode(debug_mode)?;
    let (channel, handle) = DebugChannel::new(stdout(), mode);
    channel.on_ready(DEBUG_PROTOCOL_VERSION);
    let observer: Arc<dyn Observer> = Arc::new(channel);

    let mut scheduler = load_and_start(program, observer, config)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc_fallback(r);

    match for_ms {
        Some(ms) => std::thread::sleep(Duration::from_millis(ms)),
        None => {
            while running.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }

    scheduler.stop().map_err(|e| anyhow::anyhow!("{e}"))?;
    print_summary(&scheduler, json);
    scheduler.shutdown();
    handle.join();
    Ok(())
}

pub fn hil(
    program: &std::path::Path,
    for_ms: u64,
    json: bool,
    config: Option<&std::path::Path>,
) -> Result<()> {
    let observer: Arc<dyn Observer> = Arc::new(zplc_abi::NullObserver);
    let mut scheduler = load_and_start(program, observer, config)?;
    std::thread::sleep(Duration::from_millis(for_ms));
    scheduler.stop().map_err(|e| anyhow::anyhow!("{e}"))?;
    print_summary(&scheduler, json);
    scheduler.shutdown();
    Ok(())
}

/// No signal-handling crate is in the dependency stack, so an interactive
/// run without `--for-ms` simply relies on the process being killed; this
/// exists as the seam a real Ctrl-C handler would plug into.
fn ctrlc_fallback(_running: Arc<AtomicBool>) {}
