//! End-to-end scenarios against a live `Scheduler`, one task registered by
//! hand rather than through a container file.

mod common;

use std::time::Duration;

use zplc_abi::{Priority, TaskInfo, TaskKind};
use zplc_kern::sched::{SchedState, Scheduler, TaskRunState};
use zplc_kern::vm::VmState;

fn one_task(id: u16, priority: u8, interval_us: u32) -> TaskInfo {
    TaskInfo {
        id,
        kind: TaskKind::Cyclic,
        priority: Priority(priority),
        interval_us,
        entry_point: 0,
        stack_size: 256,
    }
}

/// Scenario 1: `PUSH8 3; PUSH8 4; ADD; STORE32 @0x2004; HALT`.
#[test]
fn integer_add_stores_seven_and_halts() {
    use zplc_abi::{mem, Opcode};

    let code = [
        Opcode::Push8 as u8,
        3,
        Opcode::Push8 as u8,
        4,
        Opcode::Add as u8,
        Opcode::Store32 as u8,
        0x04,
        0x20,
        Opcode::Halt as u8,
    ];

    let mut scheduler = Scheduler::new();
    scheduler.init().unwrap();
    let handle = scheduler.register_task(one_task(1, 0, 10_000), &code).unwrap();
    scheduler.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    scheduler.stop().unwrap();

    let view = scheduler.task(handle).unwrap();
    assert_eq!(view.vm_state, VmState::Halted);
    assert_eq!(view.run_state, TaskRunState::Normal);
    let mem_guard = scheduler.lock(-1).unwrap();
    assert_eq!(mem_guard.read32(mem::WORK_BASE + 4).unwrap(), 7);
    drop(mem_guard);
    scheduler.shutdown();
}

/// Scenario 2: `PUSH8 5; PUSH8 0; DIV; HALT` faults with DIV_BY_ZERO and the
/// task is marked in error after its one cycle.
#[test]
fn division_by_zero_marks_task_in_error() {
    use zplc_abi::Opcode;

    let code = [
        Opcode::Push8 as u8,
        5,
        Opcode::Push8 as u8,
        0,
        Opcode::Div as u8,
        Opcode::Halt as u8,
    ];

    let mut scheduler = Scheduler::new();
    scheduler.init().unwrap();
    let handle = scheduler.register_task(one_task(2, 0, 10_000), &code).unwrap();
    scheduler.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    scheduler.stop().unwrap();

    let view = scheduler.task(handle).unwrap();
    assert_eq!(view.run_state, TaskRunState::Error);
    assert_eq!(view.stats.cycle_count, 1);
    scheduler.shutdown();
}

/// Scenario 3: a backward-branch loop counts a Work-bank byte down to zero
/// in one cycle, reporting a positive execution time.
#[test]
fn backward_branch_loop_counts_down_and_reports_positive_exec_time() {
    use zplc_abi::{mem, Opcode};

    let counter = mem::WORK_BASE as u16;
    let code = [
        Opcode::Load8 as u8,
        (counter & 0xff) as u8,
        (counter >> 8) as u8,
        Opcode::Push8 as u8,
        1,
        Opcode::Sub as u8,
        Opcode::Dup as u8,
        Opcode::Store8 as u8,
        (counter & 0xff) as u8,
        (counter >> 8) as u8,
        Opcode::Jrnz as u8,
        (-12i8) as u8,
        Opcode::Halt as u8,
    ];

    let mut scheduler = Scheduler::new();
    scheduler.init().unwrap();
    {
        let mut mem_guard = scheduler.lock(-1).unwrap();
        mem_guard.write8(mem::WORK_BASE, 10).unwrap();
    }
    let handle = scheduler.register_task(one_task(3, 0, 10_000), &code).unwrap();
    scheduler.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    scheduler.stop().unwrap();

    let view = scheduler.task(handle).unwrap();
    assert_eq!(view.vm_state, VmState::Halted);
    assert!(view.stats.last_exec_us > 0);
    let mem_guard = scheduler.lock(-1).unwrap();
    assert_eq!(mem_guard.read8(mem::WORK_BASE).unwrap(), 0);
    scheduler.shutdown();
}

/// Scenario 5: a file with a bad magic number is rejected and nothing is
/// loaded into the Code bank.
#[test]
fn loader_rejects_bad_magic_and_leaves_scheduler_idle() {
    let bytes = [0x41u8, 0x42, 0x43, 0x44, 0, 0, 0, 0, 0, 0, 0, 0];
    let mut scheduler = Scheduler::new();
    scheduler.init().unwrap();
    let result = scheduler.load(&bytes);
    assert!(result.is_err());
    assert_eq!(scheduler.task_count(), 0);
    assert_eq!(scheduler.state(), SchedState::Idle);
    scheduler.shutdown();
}
