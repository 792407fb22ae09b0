//! Owns the task slots, fires each at its configured cadence, serialises
//! Memory Plane access and tracks health.
//!
//! Priority tiers map to two executor threads plus one timing thread; no
//! work-stealing or global queue. The "drop the tick if one's already
//! pending" overrun policy is deliberate: it keeps memory bounded and is
//! simpler to reason about than trying to catch up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use zplc_abi::{
    Generation, LoaderError, NullObserver, Observer, Priority, StepOutcome, TaskHandle, TaskInfo,
    TaskOverride, MAX_INTERVAL_US, MIN_INTERVAL_US,
};

use crate::err::SchedulerError;
use crate::hal::{ChannelMap, DeviceBinding, Hal, NullHal};
use crate::loader;
use crate::mem::MemoryPlane;
use crate::shm::SharedMemoryLock;
use crate::vm::{Vm, VmState};

const MAX_TASKS: usize = 32;
const TIMER_TICK: Duration = Duration::from_millis(1);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SchedState {
    Uninit,
    Idle,
    Running,
    Paused,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TaskRunState {
    Normal,
    Error,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct TaskStats {
    pub cycle_count: u64,
    pub last_exec_us: u64,
    pub max_exec_us: u64,
    pub avg_exec_us: u64,
    pub overrun_count: u64,
    has_sample: bool,
}

impl TaskStats {
    fn record(&mut self, exec_us: u64) {
        self.cycle_count += 1;
        self.last_exec_us = exec_us;
        self.max_exec_us = self.max_exec_us.max(exec_us);
        self.avg_exec_us = if self.has_sample {
            (self.avg_exec_us * 7 + exec_us) / 8
        } else {
            exec_us
        };
        self.has_sample = true;
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct SchedulerStats {
    pub active_tasks: u32,
    pub total_cycles: u64,
    pub total_overruns: u64,
    pub uptime_ms: u64,
}

struct TaskSlot {
    def: TaskInfo,
    vm: Vm,
    interval: Duration,
    next_deadline: Instant,
    deadline_ms: u64,
    runnable_pending: bool,
    run_state: TaskRunState,
    stats: TaskStats,
}

/// A read-only snapshot of one task's state, for `Scheduler::task`.
#[derive(Copy, Clone, Debug)]
pub struct TaskView {
    pub def: TaskInfo,
    pub run_state: TaskRunState,
    pub stats: TaskStats,
    pub vm_state: VmState,
}

type SlotTable = Vec<Mutex<Option<TaskSlot>>>;

pub struct Scheduler {
    state: Arc<Mutex<SchedState>>,
    slots: Arc<SlotTable>,
    generations: Arc<Vec<Mutex<Generation>>>,
    mem: Arc<SharedMemoryLock>,
    hal: Arc<dyn Hal>,
    channels: ChannelMap,
    devices: Vec<DeviceBinding>,
    observer: Arc<dyn Observer>,
    hi_tx: Option<Sender<usize>>,
    lo_tx: Option<Sender<usize>>,
    threads: Vec<JoinHandle<()>>,
    shutdown_flag: Arc<AtomicBool>,
    started_at: Option<Instant>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            state: Arc::new(Mutex::new(SchedState::Uninit)),
            slots: Arc::new((0..MAX_TASKS).map(|_| Mutex::new(None)).collect()),
            generations: Arc::new((0..MAX_TASKS).map(|_| Mutex::new(Generation::default())).collect()),
            mem: Arc::new(SharedMemoryLock::new(MemoryPlane::new())),
            hal: Arc::new(NullHal),
            channels: ChannelMap::default(),
            devices: Vec::new(),
            observer: Arc::new(NullObserver),
            hi_tx: None,
            lo_tx: None,
            threads: Vec::new(),
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            started_at: None,
        }
    }

    pub fn with_hal(mut self, hal: Arc<dyn Hal>, channels: ChannelMap) -> Self {
        self.devices = channels.bindings();
        self.hal = hal;
        self.channels = channels;
        self
    }

    /// The configured HAL channel-to-address bindings, as loaded from a
    /// run/hil scenario file via `with_hal`. Empty (the null HAL's binding
    /// set) if none was configured.
    pub fn devices(&self) -> &[DeviceBinding] {
        &self.devices
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn state(&self) -> SchedState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, s: SchedState) {
        *self.state.lock().unwrap() = s;
    }

    /// Uninit -> Idle. Zeroes the non-Retain banks and starts the two
    /// executor threads plus the timing thread. They idle harmlessly until
    /// `start` puts the Scheduler into Running.
    pub fn init(&mut self) -> Result<(), SchedulerError> {
        if self.state() != SchedState::Uninit {
            return Err(SchedulerError::WrongState);
        }
        self.mem.lock(-1).map_err(|_| SchedulerError::WrongState)?.init();

        let (hi_tx, hi_rx) = mpsc::channel();
        let (lo_tx, lo_rx) = mpsc::channel();
        self.hi_tx = Some(hi_tx);
        self.lo_tx = Some(lo_tx);

        for rx in [hi_rx, lo_rx] {
            let slots = Arc::clone(&self.slots);
            let mem = Arc::clone(&self.mem);
            let hal = Arc::clone(&self.hal);
            let channels = self.channels.clone();
            let observer = Arc::clone(&self.observer);
            self.threads.push(std::thread::spawn(move || {
                executor_loop(rx, slots, mem, hal, channels, observer);
            }));
        }

        {
            let state = Arc::clone(&self.state);
            let slots = Arc::clone(&self.slots);
            let hal = Arc::clone(&self.hal);
            let observer = Arc::clone(&self.observer);
            let hi_tx = self.hi_tx.clone().unwrap();
            let lo_tx = self.lo_tx.clone().unwrap();
            let shutdown = Arc::clone(&self.shutdown_flag);
            self.threads.push(std::thread::spawn(move || {
                timer_loop(state, slots, hal, observer, hi_tx, lo_tx, shutdown);
            }));
        }

        self.set_state(SchedState::Idle);
        Ok(())
    }

    /// Allocates a free slot, appends `code` to the Memory Plane's Code
    /// bank, and initialises a VM whose entry is the offset the code was
    /// appended at.
    pub fn register_task(&mut self, def: TaskInfo, code: &[u8]) -> Result<TaskHandle, SchedulerError> {
        if self.state() != SchedState::Idle {
            return Err(SchedulerError::WrongState);
        }
        if !(MIN_INTERVAL_US..=MAX_INTERVAL_US).contains(&def.interval_us) {
            return Err(SchedulerError::IntervalOutOfRange);
        }
        let idx = self.free_slot_index().ok_or(SchedulerError::NoFreeSlot)?;

        let entry = {
            let mut mem = self.mem.lock(-1).map_err(|_| SchedulerError::NoFreeSlot)?;
            let tail = mem.loaded_code_size();
            mem.load_code(code, tail)
                .map_err(|_| SchedulerError::CodeTooLarge)?;
            tail as u16
        };
        let mut vm = Vm::init(def.id, def.priority);
        vm.set_entry(entry, entry + code.len() as u16)
            .map_err(|_| SchedulerError::CodeTooLarge)?;

        self.install(idx, def, vm)
    }

    /// Runs the Loader against `file_bytes`, then allocates a slot for each
    /// parsed task, pointed at its own entry within the shared code image.
    pub fn load(&mut self, file_bytes: &[u8]) -> Result<usize, SchedulerError> {
        if self.state() != SchedState::Idle {
            return Err(SchedulerError::WrongState);
        }
        let loaded = {
            let mut mem = self.mem.lock(-1).map_err(|_| SchedulerError::NoFreeSlot)?;
            loader::load_tasks(&mut mem, file_bytes, MAX_TASKS)?
        };
        let mut n = 0;
        for task in &loaded.tasks {
            if !(MIN_INTERVAL_US..=MAX_INTERVAL_US).contains(&task.interval_us) {
                return Err(SchedulerError::IntervalOutOfRange);
            }
            let idx = self
                .free_slot_index()
                .ok_or(SchedulerError::NoFreeSlot)?;
            let mut vm = Vm::init(task.id, task.priority);
            vm.set_entry(task.entry_point, loaded.code_size as u16)
                .map_err(|_| SchedulerError::from(LoaderError::CodeTooLarge))?;
            self.install(idx, *task, vm)?;
            n += 1;
        }
        Ok(n)
    }

    fn free_slot_index(&self) -> Option<usize> {
        self.slots.iter().position(|m| m.lock().unwrap().is_none())
    }

    fn install(&mut self, idx: usize, def: TaskInfo, vm: Vm) -> Result<TaskHandle, SchedulerError> {
        let interval = Duration::from_micros(def.interval_us as u64).max(Duration::from_millis(1));
        let mut guard = self.slots[idx].lock().unwrap();
        *guard = Some(TaskSlot {
            def,
            vm,
            interval,
            next_deadline: Instant::now() + interval,
            deadline_ms: 0,
            runnable_pending: false,
            run_state: TaskRunState::Normal,
            stats: TaskStats::default(),
        });
        let generation = *self.generations[idx].lock().unwrap();
        Ok(TaskHandle {
            index: idx,
            generation,
        })
    }

    fn check_handle(&self, handle: TaskHandle) -> Result<(), SchedulerError> {
        if handle.index >= self.slots.len() {
            return Err(SchedulerError::UnknownHandle);
        }
        if *self.generations[handle.index].lock().unwrap() != handle.generation {
            return Err(SchedulerError::StaleHandle);
        }
        Ok(())
    }

    /// Stops the task's timer, drains any pending runnable, frees the slot,
    /// and bumps its generation so old handles are rejected.
    pub fn unregister_task(&mut self, handle: TaskHandle) -> Result<(), SchedulerError> {
        self.check_handle(handle)?;
        loop {
            let pending = self.slots[handle.index]
                .lock()
                .unwrap()
                .as_ref()
                .map(|s| s.runnable_pending)
                .unwrap_or(false);
            if !pending {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        *self.slots[handle.index].lock().unwrap() = None;
        let mut gen = self.generations[handle.index].lock().unwrap();
        *gen = gen.next();
        Ok(())
    }

    /// Idle -> Running. Zeroes statistics, resets every VM, and arms every
    /// timer.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self.state() != SchedState::Idle {
            return Err(SchedulerError::WrongState);
        }
        let now = Instant::now();
        for slot_mutex in self.slots.iter() {
            if let Some(slot) = slot_mutex.lock().unwrap().as_mut() {
                slot.vm.reset_cycle();
                slot.stats = TaskStats::default();
                slot.run_state = TaskRunState::Normal;
                slot.runnable_pending = false;
                slot.next_deadline = now + slot.interval;
            }
        }
        self.started_at = Some(now);
        self.set_state(SchedState::Running);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), SchedulerError> {
        if self.state() != SchedState::Running {
            return Err(SchedulerError::WrongState);
        }
        self.set_state(SchedState::Paused);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), SchedulerError> {
        if self.state() != SchedState::Paused {
            return Err(SchedulerError::WrongState);
        }
        self.set_state(SchedState::Running);
        Ok(())
    }

    /// Running|Paused -> Idle. Arms no further timers and waits for any
    /// in-flight runnable to finish its current cycle before returning.
    pub fn stop(&mut self) -> Result<(), SchedulerError> {
        let s = self.state();
        if s != SchedState::Running && s != SchedState::Paused {
            return Err(SchedulerError::WrongState);
        }
        self.set_state(SchedState::Idle);
        loop {
            let any_pending = self
                .slots
                .iter()
                .any(|m| m.lock().unwrap().as_ref().map(|s| s.runnable_pending).unwrap_or(false));
            if !any_pending {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }

    /// Any -> Uninit. Tears down the executor and timing threads.
    pub fn shutdown(mut self) {
        self.set_state(SchedState::Uninit);
        self.shutdown_flag.store(true, Ordering::SeqCst);
        self.hi_tx = None;
        self.lo_tx = None;
        for t in self.threads.drain(..) {
            let _ = t.join();
        }
    }

    pub fn task_count(&self) -> usize {
        self.slots.iter().filter(|m| m.lock().unwrap().is_some()).count()
    }

    pub fn task(&self, handle: TaskHandle) -> Option<TaskView> {
        self.check_handle(handle).ok()?;
        let guard = self.slots[handle.index].lock().unwrap();
        let slot = guard.as_ref()?;
        Some(TaskView {
            def: slot.def,
            run_state: slot.run_state,
            stats: slot.stats,
            vm_state: slot.vm.state(),
        })
    }

    pub fn stats(&self) -> SchedulerStats {
        let mut s = SchedulerStats::default();
        for slot_mutex in self.slots.iter() {
            if let Some(slot) = slot_mutex.lock().unwrap().as_ref() {
                s.active_tasks += 1;
                s.total_cycles += slot.stats.cycle_count;
                s.total_overruns += slot.stats.overrun_count;
            }
        }
        s.uptime_ms = self
            .started_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        s
    }

    /// Acquires the shared-memory lock directly, for host code that wants
    /// to poke at I/O banks between cycles (e.g. a test harness seeding
    /// inputs).
    pub fn lock(&self, timeout_ms: i64) -> Result<std::sync::MutexGuard<'_, MemoryPlane>, crate::err::LockError> {
        self.mem.lock(timeout_ms)
    }

    /// Finds the handle currently bound to `task_id`, if any task with that
    /// id is registered. Task ids need not be unique by construction; this
    /// returns the first match.
    pub fn find_by_task_id(&self, task_id: u16) -> Option<TaskHandle> {
        for (idx, slot_mutex) in self.slots.iter().enumerate() {
            if let Some(slot) = slot_mutex.lock().unwrap().as_ref() {
                if slot.def.id == task_id {
                    let generation = *self.generations[idx].lock().unwrap();
                    return Some(TaskHandle { index: idx, generation });
                }
            }
        }
        None
    }

    /// Clears a faulted task's run state and resets its VM to the start of
    /// its cycle, without touching its registration or statistics history.
    /// This is the only way a faulted task becomes runnable again; nothing
    /// in the Scheduler does this automatically.
    pub fn clear_fault(&self, handle: TaskHandle) -> Result<(), SchedulerError> {
        self.check_handle(handle)?;
        let mut guard = self.slots[handle.index].lock().unwrap();
        let slot = guard.as_mut().ok_or(SchedulerError::UnknownHandle)?;
        slot.vm.reset_cycle();
        slot.run_state = TaskRunState::Normal;
        slot.runnable_pending = false;
        Ok(())
    }

    /// Applies scenario-file priority/interval overrides to already
    /// registered tasks, matched by task id. Must be called before `start`;
    /// an override naming a task id that isn't registered is silently
    /// skipped, matching a config file describing a superset of the
    /// currently loaded program.
    pub fn apply_overrides(&self, overrides: &[TaskOverride]) -> Result<(), SchedulerError> {
        if self.state() != SchedState::Idle {
            return Err(SchedulerError::WrongState);
        }
        for ov in overrides {
            let Some(handle) = self.find_by_task_id(ov.id) else {
                continue;
            };
            let mut guard = self.slots[handle.index].lock().unwrap();
            let slot = guard.as_mut().ok_or(SchedulerError::UnknownHandle)?;
            if let Some(priority) = ov.priority {
                slot.def.priority = priority;
                slot.vm.set_priority(priority);
            }
            if let Some(interval_us) = ov.interval_us {
                if !(MIN_INTERVAL_US..=MAX_INTERVAL_US).contains(&interval_us) {
                    return Err(SchedulerError::IntervalOutOfRange);
                }
                slot.def.interval_us = interval_us;
                slot.interval = Duration::from_micros(interval_us as u64).max(Duration::from_millis(1));
                slot.next_deadline = Instant::now() + slot.interval;
            }
        }
        Ok(())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn fault_code(e: zplc_abi::VmFault) -> &'static str {
    use zplc_abi::VmFault::*;
    match e {
        StackOverflow => "STACK_OVERFLOW",
        StackUnderflow => "STACK_UNDERFLOW",
        CallOverflow => "CALL_OVERFLOW",
        DivByZero => "DIV_BY_ZERO",
        InvalidOpcode(_) => "INVALID_OPCODE",
        InvalidJump => "INVALID_JUMP",
        OutOfBounds => "OUT_OF_BOUNDS",
    }
}

fn executor_loop(
    rx: mpsc::Receiver<usize>,
    slots: Arc<SlotTable>,
    mem: Arc<SharedMemoryLock>,
    hal: Arc<dyn Hal>,
    channels: ChannelMap,
    observer: Arc<dyn Observer>,
) {
    while let Ok(idx) = rx.recv() {
        run_one_cycle(idx, &slots, &mem, &hal, &channels, &observer);
    }
}

fn run_one_cycle(
    idx: usize,
    slots: &SlotTable,
    mem: &SharedMemoryLock,
    hal: &Arc<dyn Hal>,
    channels: &ChannelMap,
    observer: &Arc<dyn Observer>,
) {
    let start_tick = hal.tick();
    let mut mem_guard = match mem.lock(-1) {
        Ok(g) => g,
        Err(_) => return,
    };

    for &(offset, channel) in &channels.inputs {
        match hal.gpio_read(channel) {
            Ok(v) => {
                let _ = mem_guard.ipi_write8(offset, v);
            }
            Err(_) => log::warn!("HAL read failed on input channel {channel}"),
        }
    }

    let mut slot_guard = slots[idx].lock().unwrap();
    let Some(slot) = slot_guard.as_mut() else {
        return;
    };

    let trace = observer.wants_opcode_trace();
    let outcome = if trace {
        slot.vm.reset_cycle();
        loop {
            match slot.vm.step(&mut mem_guard, hal.tick()) {
                StepOutcome::Ok => continue,
                StepOutcome::Break => {
                    observer.on_opcode("BREAK", slot.vm.pc(), slot.vm.stack_depth() as u16, slot.vm.top_of_stack());
                    continue;
                }
                StepOutcome::Halted => break Ok(()),
                StepOutcome::Fault(e) => break Err(e),
            }
        }
    } else {
        slot.vm.run_cycle(&mut mem_guard, hal.tick()).map(|_| ())
    };

    for &(offset, channel) in &channels.outputs {
        if let Ok(v) = mem_guard.opi_read8(offset) {
            if hal.gpio_write(channel, v).is_err() {
                log::warn!("HAL write failed on output channel {channel}");
            }
        }
    }
    drop(mem_guard);

    let end_tick = hal.tick();
    let exec_us = end_tick.saturating_sub(start_tick) * 1000;
    let overrun = end_tick > slot.deadline_ms && slot.deadline_ms != 0;
    slot.stats.record(exec_us);
    if overrun {
        slot.stats.overrun_count += 1;
    }

    match outcome {
        Ok(()) => slot.run_state = TaskRunState::Normal,
        Err(e) => {
            slot.run_state = TaskRunState::Error;
            observer.on_error(fault_code(e), &e.to_string(), slot.vm.pc());
        }
    }
    observer.on_task_cycle(slot.def.id, start_tick, end_tick, exec_us, overrun);
    slot.runnable_pending = false;
}

#[allow(clippy::too_many_arguments)]
fn timer_loop(
    state: Arc<Mutex<SchedState>>,
    slots: Arc<SlotTable>,
    hal: Arc<dyn Hal>,
    observer: Arc<dyn Observer>,
    hi_tx: Sender<usize>,
    lo_tx: Sender<usize>,
    shutdown: Arc<AtomicBool>,
) {
    let mut sweep_n = 0u64;
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(TIMER_TICK);
        if *state.lock().unwrap() != SchedState::Running {
            continue;
        }
        let sweep_start = Instant::now();
        let mut dispatched = 0u32;
        for (idx, slot_mutex) in slots.iter().enumerate() {
            let mut guard = slot_mutex.lock().unwrap();
            let Some(slot) = guard.as_mut() else {
                continue;
            };
            if sweep_start < slot.next_deadline {
                continue;
            }
            if slot.run_state == TaskRunState::Error {
                // A faulted task is never rescheduled automatically; it
                // stays parked until an explicit reset_task call.
                slot.next_deadline = sweep_start + slot.interval;
                continue;
            }
            if slot.runnable_pending {
                slot.stats.overrun_count += 1;
                observer.on_error("TASK_OVERRUN", "tick dropped, cycle still pending", slot.vm.pc());
            } else {
                slot.runnable_pending = true;
                slot.deadline_ms = hal.tick() + slot.interval.as_millis() as u64;
                let tx = if slot.def.priority.is_high_tier() {
                    &hi_tx
                } else {
                    &lo_tx
                };
                let _ = tx.send(idx);
                dispatched += 1;
            }
            slot.next_deadline += slot.interval;
        }
        sweep_n += 1;
        observer.on_cycle(sweep_n, sweep_start.elapsed().as_micros() as u64, dispatched);
    }
}
