//! Scenario 6: a two-task project, one high-priority at 10 ms, one normal
//! at 100 ms, run for one second with cycle counts within tolerance.

mod common;

use std::time::Duration;

use common::TaskFixture;
use zplc_abi::Opcode;
use zplc_kern::sched::Scheduler;

#[test]
fn cycle_counts_track_interval_over_one_second() {
    let code = [Opcode::Halt as u8];
    let file = common::build_program(
        &code,
        &[
            TaskFixture {
                id: 1,
                kind: 0,
                priority: 0,
                interval_us: 10_000,
                entry_point: 0,
                stack_size: 256,
            },
            TaskFixture {
                id: 2,
                kind: 0,
                priority: 2,
                interval_us: 100_000,
                entry_point: 0,
                stack_size: 256,
            },
        ],
    );

    let mut scheduler = Scheduler::new();
    scheduler.init().unwrap();
    let n = scheduler.load(&file).unwrap();
    assert_eq!(n, 2);
    let high = scheduler.find_by_task_id(1).unwrap();
    let low = scheduler.find_by_task_id(2).unwrap();

    scheduler.start().unwrap();
    std::thread::sleep(Duration::from_millis(1000));
    scheduler.stop().unwrap();

    let high_view = scheduler.task(high).unwrap();
    let low_view = scheduler.task(low).unwrap();

    assert!(
        (95u64..=105u64).contains(&high_view.stats.cycle_count),
        "high-priority cycle_count {} outside 95..=105",
        high_view.stats.cycle_count
    );
    assert!(
        (9u64..=11u64).contains(&low_view.stats.cycle_count),
        "low-priority cycle_count {} outside 9..=11",
        low_view.stats.cycle_count
    );
    assert_eq!(high_view.stats.overrun_count, 0);
    assert_eq!(low_view.stats.overrun_count, 0);

    scheduler.shutdown();
}
