//! Shared container-file assembly helpers for the scenario tests.

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

pub const SEG_CODE: u16 = 1;
pub const SEG_TASK: u16 = 2;

pub struct TaskFixture {
    pub id: u16,
    pub kind: u8,
    pub priority: u8,
    pub interval_us: u32,
    pub entry_point: u16,
    pub stack_size: u16,
}

/// Builds a container file with one CODE segment and, if any are given, one
/// TASK segment holding the supplied task records.
pub fn build_program(code: &[u8], tasks: &[TaskFixture]) -> Vec<u8> {
    let seg_count = if tasks.is_empty() { 1 } else { 2 };

    let mut file = Vec::new();
    file.extend_from_slice(b"ZPLC");
    file.write_u16::<LittleEndian>(1).unwrap(); // version_major
    file.write_u16::<LittleEndian>(0).unwrap(); // version_minor
    file.write_u16::<LittleEndian>(0).unwrap(); // entry_point
    file.write_u32::<LittleEndian>(code.len() as u32).unwrap();
    file.write_all(&[0u8; 12]).unwrap(); // reserved
    file.write_u16::<LittleEndian>(seg_count).unwrap();
    file.write_all(&[0u8; 4]).unwrap(); // header padding

    // CODE segment entry.
    file.write_u16::<LittleEndian>(SEG_CODE).unwrap();
    file.write_u16::<LittleEndian>(0).unwrap();
    file.write_u32::<LittleEndian>(code.len() as u32).unwrap();

    let task_bytes_len = tasks.len() * 16;
    if !tasks.is_empty() {
        file.write_u16::<LittleEndian>(SEG_TASK).unwrap();
        file.write_u16::<LittleEndian>(0).unwrap();
        file.write_u32::<LittleEndian>(task_bytes_len as u32).unwrap();
    }

    file.extend_from_slice(code);

    for t in tasks {
        file.write_u16::<LittleEndian>(t.id).unwrap();
        file.write_all(&[t.kind]).unwrap();
        file.write_all(&[t.priority]).unwrap();
        file.write_u32::<LittleEndian>(t.interval_us).unwrap();
        file.write_u16::<LittleEndian>(t.entry_point).unwrap();
        file.write_u16::<LittleEndian>(t.stack_size).unwrap();
        file.write_u32::<LittleEndian>(0).unwrap(); // reserved
    }

    file
}
