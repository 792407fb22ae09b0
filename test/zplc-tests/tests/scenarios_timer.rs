//! Scenario 4: a TON-style 100 ms timer observed through the Output bank.

mod common;

use std::time::Duration;

use zplc_abi::{mem, Opcode, Priority, TaskInfo, TaskKind};
use zplc_kern::sched::Scheduler;

fn timer_program() -> Vec<u8> {
    // start := GET_TICKS; stored once, on first pass, into Work[0..4].
    // Each cycle: if Work[0] == 0, store GET_TICKS there. Then compute
    // GET_TICKS - start and store 1 into Output[0] once the delta exceeds
    // 100, else leave Output[0] as-is.
    let start = mem::WORK_BASE as u16;
    let out = mem::OUTPUT_BASE as u16;

    let mut code = Vec::new();
    // if Work[start] != 0 goto SKIP_INIT
    code.push(Opcode::Load8 as u8);
    code.extend_from_slice(&start.to_le_bytes());
    let skip_init_jrnz_operand_pos = code.len() + 1;
    code.push(Opcode::Jrnz as u8);
    code.push(0); // patched below
    // init: store GET_TICKS into start (as i32, low byte only matters for this test window)
    code.push(Opcode::GetTicks as u8);
    code.push(Opcode::Store32 as u8);
    code.extend_from_slice(&start.to_le_bytes());
    let after_init = code.len();
    code[skip_init_jrnz_operand_pos] = ((after_init - (skip_init_jrnz_operand_pos + 1)) as i8) as u8;

    // delta = GET_TICKS - start
    code.push(Opcode::GetTicks as u8);
    code.push(Opcode::Load32 as u8);
    code.extend_from_slice(&start.to_le_bytes());
    code.push(Opcode::Sub as u8);
    // push 100, compare GT
    code.push(Opcode::Push8 as u8);
    code.push(100);
    code.push(Opcode::Gt as u8);
    // if not greater, halt without touching output
    let jrz_operand_pos = code.len() + 1;
    code.push(Opcode::Jrz as u8);
    code.push(0); // patched below
    code.push(Opcode::Push8 as u8);
    code.push(1);
    code.push(Opcode::Store8 as u8);
    code.extend_from_slice(&out.to_le_bytes());
    let after_store = code.len();
    code[jrz_operand_pos] = ((after_store - (jrz_operand_pos + 1)) as i8) as u8;
    code.push(Opcode::Halt as u8);

    code
}

#[test]
fn output_transitions_between_90_and_110_ms_after_start() {
    let code = timer_program();
    let mut scheduler = Scheduler::new();
    scheduler.init().unwrap();
    let def = TaskInfo {
        id: 4,
        kind: TaskKind::Cyclic,
        priority: Priority(0),
        interval_us: 10_000,
        entry_point: 0,
        stack_size: 256,
    };
    scheduler.register_task(def, &code).unwrap();
    scheduler.start().unwrap();

    std::thread::sleep(Duration::from_millis(85));
    {
        let mem_guard = scheduler.lock(-1).unwrap();
        assert_eq!(mem_guard.read8(mem::OUTPUT_BASE).unwrap(), 0);
    }

    std::thread::sleep(Duration::from_millis(60));
    {
        let mem_guard = scheduler.lock(-1).unwrap();
        assert_eq!(mem_guard.read8(mem::OUTPUT_BASE).unwrap(), 1);
    }

    scheduler.stop().unwrap();
    scheduler.shutdown();
}
