//! The "drop the tick if one's already pending" overrun policy: a task
//! whose cycle body runs well past its own interval accumulates overruns
//! instead of being rescheduled on top of itself.

use std::time::Duration;

use zplc_abi::{mem, Opcode, Priority, TaskInfo, TaskKind};
use zplc_kern::sched::Scheduler;

/// Builds a cycle body that reinitialises a Work-bank counter to
/// `iterations` and spins it down to zero with a decrement/branch loop,
/// deliberately slow enough to run for many scheduler ticks.
fn busy_loop_program(iterations: u32) -> Vec<u8> {
    let counter = mem::WORK_BASE as u16;
    let mut code = Vec::new();

    code.push(Opcode::Push32 as u8);
    code.extend_from_slice(&iterations.to_le_bytes());
    code.push(Opcode::Store32 as u8);
    code.extend_from_slice(&counter.to_le_bytes());

    let loop_start = code.len();
    code.push(Opcode::Load32 as u8);
    code.extend_from_slice(&counter.to_le_bytes());
    code.push(Opcode::Push8 as u8);
    code.push(1);
    code.push(Opcode::Sub as u8);
    code.push(Opcode::Dup as u8);
    code.push(Opcode::Store32 as u8);
    code.extend_from_slice(&counter.to_le_bytes());

    let jrnz_instr_pc = code.len();
    code.push(Opcode::Jrnz as u8);
    let offset = loop_start as i32 - (jrnz_instr_pc as i32 + 2);
    code.push((offset as i8) as u8);

    code.push(Opcode::Halt as u8);
    code
}

#[test]
fn a_slow_cycle_on_a_tight_interval_accumulates_overruns() {
    let code = busy_loop_program(300_000);
    let def = TaskInfo {
        id: 7,
        kind: TaskKind::Cyclic,
        priority: Priority(0),
        interval_us: 500,
        entry_point: 0,
        stack_size: 256,
    };

    let mut scheduler = Scheduler::new();
    scheduler.init().unwrap();
    let handle = scheduler.register_task(def, &code).unwrap();
    scheduler.start().unwrap();

    // The timer thread sweeps every millisecond; a cycle that runs for
    // tens of milliseconds gets its tick dropped on every sweep in
    // between, well before the first cycle ever completes.
    std::thread::sleep(Duration::from_millis(300));
    scheduler.stop().unwrap();

    let view = scheduler.task(handle).unwrap();
    assert!(
        view.stats.overrun_count > 0,
        "expected at least one dropped tick, got overrun_count={}",
        view.stats.overrun_count
    );
    scheduler.shutdown();
}
