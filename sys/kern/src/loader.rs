//! Parses a container file into a code image and a task table.
//!
//! Byte-level integrity only: whether a parsed interval is schedulable is
//! the Scheduler's call, made at registration time.

use zplc_abi::{FileHeader, LoaderError, SegmentType, TaskDef, TaskInfo, TASK_DEF_LEN};

use crate::mem::MemoryPlane;

/// Everything pulled out of a container file that the Scheduler needs to
/// bring a program up.
pub struct LoadedProgram {
    pub entry_point: u16,
    pub code_size: u32,
    pub tasks: Vec<TaskInfo>,
}

/// Verifies magic and version, locates the CODE segment (falling back to
/// the header's own `entry_point`/`code_size` if no segment table entry
/// names one explicitly), and copies it into the Memory Plane's Code bank.
pub fn load_program(mem: &mut MemoryPlane, bytes: &[u8]) -> Result<u16, LoaderError> {
    let header = FileHeader::parse(bytes)?;
    if header.version_major > zplc_abi::SUPPORTED_MAJOR_VERSION {
        return Err(LoaderError::BadVersion);
    }
    let segments = header.parse_segments(bytes)?;

    let mut cursor = zplc_abi::FILE_HEADER_LEN + segments.len() * 8;
    let mut code_bytes: Option<&[u8]> = None;
    for seg in &segments {
        let end = cursor
            .checked_add(seg.size as usize)
            .ok_or(LoaderError::Truncated)?;
        if end > bytes.len() {
            return Err(LoaderError::Truncated);
        }
        if seg.kind == SegmentType::Code {
            code_bytes = Some(&bytes[cursor..end]);
        }
        cursor = end;
    }

    let code = match code_bytes {
        Some(c) => c,
        None => {
            // No explicit CODE segment: fall back to the header's own
            // entry_point/code_size describing a code blob that follows
            // the segment table directly.
            let start = zplc_abi::FILE_HEADER_LEN + segments.len() * 8;
            let end = start
                .checked_add(header.code_size as usize)
                .ok_or(LoaderError::Truncated)?;
            if end > bytes.len() {
                return Err(LoaderError::Truncated);
            }
            &bytes[start..end]
        }
    };

    if code.len() > zplc_abi::mem::CODE_SIZE as usize {
        return Err(LoaderError::CodeTooLarge);
    }
    mem.load_code(code, 0).map_err(|_| LoaderError::CodeTooLarge)?;
    Ok(header.entry_point)
}

/// Runs `load_program`'s prerequisites, then parses the TASK segment into
/// up to `capacity` `TaskInfo` records.
pub fn load_tasks(
    mem: &mut MemoryPlane,
    bytes: &[u8],
    capacity: usize,
) -> Result<LoadedProgram, LoaderError> {
    let entry_point = load_program(mem, bytes)?;
    let header = FileHeader::parse(bytes)?;
    let segments = header.parse_segments(bytes)?;

    let mut cursor = zplc_abi::FILE_HEADER_LEN + segments.len() * 8;
    let mut task_bytes: Option<&[u8]> = None;
    for seg in &segments {
        let end = cursor
            .checked_add(seg.size as usize)
            .ok_or(LoaderError::Truncated)?;
        if seg.kind == SegmentType::Task {
            task_bytes = Some(&bytes[cursor..end]);
        }
        cursor = end;
    }

    let task_bytes = task_bytes.ok_or(LoaderError::NoTaskSegment)?;
    if task_bytes.len() % TASK_DEF_LEN != 0 {
        return Err(LoaderError::Truncated);
    }

    let mut tasks = Vec::new();
    for chunk in task_bytes.chunks_exact(TASK_DEF_LEN) {
        if tasks.len() >= capacity {
            break;
        }
        let def = TaskDef::read_from_bytes(chunk).map_err(|_| LoaderError::Truncated)?;
        tasks.push(TaskInfo::try_from(def)?);
    }

    Ok(LoadedProgram {
        entry_point,
        code_size: header.code_size,
        tasks,
    })
}
