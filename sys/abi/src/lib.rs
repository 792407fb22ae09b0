//! Shared wire-format and ABI types for the ZPLC execution core.
//!
//! These types are used by both `kern` (the engine that interprets them) and
//! `app/zplc` (the host binary that loads program files and drives the
//! engine). Keeping them in their own crate means the on-disk/on-wire
//! layouts have exactly one definition.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

pub mod mem {
    //! The fixed address map. Stable across versions: any implementation
    //! MUST preserve these ranges exactly.

    pub const INPUT_BASE: u32 = 0x0000;
    pub const INPUT_SIZE: u32 = 0x1000; // 4 KiB
    pub const OUTPUT_BASE: u32 = 0x1000;
    pub const OUTPUT_SIZE: u32 = 0x1000; // 4 KiB
    pub const WORK_BASE: u32 = 0x2000;
    pub const WORK_SIZE: u32 = 0x2000; // 8 KiB
    pub const RETAIN_BASE: u32 = 0x4000;
    pub const RETAIN_SIZE: u32 = 0x1000; // 4 KiB
    pub const CODE_BASE: u32 = 0x5000;
    pub const CODE_SIZE: u32 = 0x4000; // 16 KiB

    pub const EVAL_STACK_DEPTH: usize = 256;
    pub const CALL_STACK_DEPTH: usize = 32;
}

mod opcode;
pub use opcode::Opcode;

/// Magic tag at the start of every container file: `'Z' 'P' 'L' 'C'`.
pub const FILE_MAGIC: [u8; 4] = *b"ZPLC";

/// Highest major version this crate knows how to load.
pub const SUPPORTED_MAJOR_VERSION: u16 = 1;

/// Size in bytes of the on-disk file header, before the segment table.
pub const FILE_HEADER_LEN: usize = 32;

/// Size in bytes of one segment table entry.
pub const SEGMENT_ENTRY_LEN: usize = 8;

/// Size in bytes of a serialized `TaskDef` record.
pub const TASK_DEF_LEN: usize = 16;

/// Indicates the scheduling priority of a task.
///
/// Priorities are small numbers starting from zero. Numerically lower
/// priorities are more important: priority 0 runs on the high-priority
/// executor ahead of everything else. This type deliberately does not
/// implement `PartialOrd`/`Ord` so that callers can't accidentally compare
/// priorities with `>` and get the sense backwards.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
#[repr(transparent)]
pub struct Priority(pub u8);

impl Priority {
    /// The high-priority executor handles every task at or below this value.
    pub const HIGH_TIER_MAX: u8 = 1;

    /// Checks whether `self` is strictly more important than `other`.
    pub fn is_more_important_than(self, other: Self) -> bool {
        self.0 < other.0
    }

    /// Whether this priority belongs on the high-priority executor tier.
    pub fn is_high_tier(self) -> bool {
        self.0 <= Self::HIGH_TIER_MAX
    }
}

/// Generation counter for a task slot.
///
/// Incremented each time a slot is reused by `register_task`/`load` after a
/// prior `unregister_task`, so a handle captured before the reuse can be told
/// apart from the slot's current occupant.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[repr(transparent)]
pub struct Generation(pub u16);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }
}

/// A stable reference to a registered task slot: index plus generation.
///
/// Using a generation alongside the bare index means a handle obtained
/// before a slot was freed and reused won't silently alias the new
/// occupant; `Scheduler` methods that take a `TaskHandle` check the
/// generation and refuse stale handles.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TaskHandle {
    pub index: usize,
    pub generation: Generation,
}

/// Task scheduling discipline.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TaskKind {
    Cyclic = 0,
    Event = 1,
}

impl TaskKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Cyclic),
            1 => Some(Self::Event),
            _ => None,
        }
    }
}

/// Stable 16-byte task descriptor, as laid out in a TASK segment.
///
/// Field layout matches the wire format exactly (no implicit padding):
/// `u16 id, u8 type, u8 priority, u32 interval_us, u16 entry_point, u16
/// stack_size, u32 reserved`.
#[derive(
    Copy,
    Clone,
    Debug,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
    Serialize,
    Deserialize,
)]
#[repr(C)]
pub struct TaskDef {
    pub id: zerocopy::little_endian::U16,
    pub kind: u8,
    pub priority: u8,
    pub interval_us: zerocopy::little_endian::U32,
    pub entry_point: zerocopy::little_endian::U16,
    pub stack_size: zerocopy::little_endian::U16,
    pub reserved: zerocopy::little_endian::U32,
}

const _: () = assert!(core::mem::size_of::<TaskDef>() == TASK_DEF_LEN);

/// Parsed, host-friendly view of a `TaskDef` record.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TaskInfo {
    pub id: u16,
    pub kind: TaskKind,
    pub priority: Priority,
    pub interval_us: u32,
    pub entry_point: u16,
    pub stack_size: u16,
}

impl TryFrom<TaskDef> for TaskInfo {
    type Error = LoaderError;

    fn try_from(def: TaskDef) -> Result<Self, LoaderError> {
        let kind = TaskKind::from_u8(def.kind).ok_or(LoaderError::Truncated)?;
        Ok(TaskInfo {
            id: def.id.get(),
            kind,
            priority: Priority(def.priority),
            interval_us: def.interval_us.get(),
            entry_point: def.entry_point.get(),
            stack_size: def.stack_size.get(),
        })
    }
}

/// A scenario-file override of one already-registered task's priority
/// and/or interval, applied by `Scheduler::apply_overrides` before
/// `start`. Fields left `None` leave that part of the task untouched.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TaskOverride {
    pub id: u16,
    pub priority: Option<Priority>,
    pub interval_us: Option<u32>,
}

/// Segment type tags recognized in the container's segment table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SegmentType {
    Code,
    Task,
    Unknown(u16),
}

impl SegmentType {
    pub fn from_u16(v: u16) -> Self {
        match v {
            1 => Self::Code,
            2 => Self::Task,
            other => Self::Unknown(other),
        }
    }
}

/// One entry of the container's segment table.
#[derive(Copy, Clone, Debug)]
pub struct SegmentEntry {
    pub kind: SegmentType,
    pub size: u32,
}

/// Parsed file header (the transient part of a container file).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FileHeader {
    pub version_major: u16,
    pub version_minor: u16,
    pub entry_point: u16,
    pub code_size: u32,
    pub segment_count: u16,
}

impl FileHeader {
    /// Parses the fixed 32-byte header from the start of `bytes`.
    ///
    /// This only validates that enough bytes are present and that the magic
    /// matches; version/size policy is enforced by the caller (`Loader`).
    pub fn parse(bytes: &[u8]) -> Result<Self, LoaderError> {
        if bytes.len() < FILE_HEADER_LEN {
            return Err(LoaderError::Truncated);
        }
        if bytes[0..4] != FILE_MAGIC {
            return Err(LoaderError::BadMagic);
        }
        let version_major = LittleEndian::read_u16(&bytes[4..6]);
        let version_minor = LittleEndian::read_u16(&bytes[6..8]);
        let entry_point = LittleEndian::read_u16(&bytes[8..10]);
        let code_size = LittleEndian::read_u32(&bytes[10..14]);
        // bytes[14..26] reserved/metadata, ignored.
        let segment_count = LittleEndian::read_u16(&bytes[26..28]);
        // bytes[28..32] reserved, ignored.
        Ok(FileHeader {
            version_major,
            version_minor,
            entry_point,
            code_size,
            segment_count,
        })
    }

    /// Parses the segment table that immediately follows the header.
    pub fn parse_segments(
        &self,
        bytes: &[u8],
    ) -> Result<Vec<SegmentEntry>, LoaderError> {
        let mut out = Vec::with_capacity(self.segment_count as usize);
        let table_start = FILE_HEADER_LEN;
        let table_len = self.segment_count as usize * SEGMENT_ENTRY_LEN;
        let table_end = table_start
            .checked_add(table_len)
            .ok_or(LoaderError::Truncated)?;
        if bytes.len() < table_end {
            return Err(LoaderError::Truncated);
        }
        for i in 0..self.segment_count as usize {
            let entry = &bytes[table_start + i * SEGMENT_ENTRY_LEN
                ..table_start + (i + 1) * SEGMENT_ENTRY_LEN];
            let kind = SegmentType::from_u16(LittleEndian::read_u16(&entry[0..2]));
            // entry[2..4] reserved, ignored.
            let size = LittleEndian::read_u32(&entry[4..8]);
            out.push(SegmentEntry { kind, size });
        }
        Ok(out)
    }
}

/// Errors the Loader can report. Byte-level integrity only; interval
/// validation against `[MIN_INTERVAL_US, MAX_INTERVAL_US]` is the
/// Scheduler's responsibility at registration time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LoaderError {
    BadMagic,
    BadVersion,
    CodeTooLarge,
    Truncated,
    NoTaskSegment,
}

impl core::fmt::Display for LoaderError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::BadMagic => "bad magic",
            Self::BadVersion => "unsupported major version",
            Self::CodeTooLarge => "code segment exceeds the code bank",
            Self::Truncated => "file is truncated or malformed",
            Self::NoTaskSegment => "no TASK segment present",
        };
        f.write_str(s)
    }
}

impl std::error::Error for LoaderError {}

/// Faults the VM can take. Every variant leaves the VM halted with its
/// error kind and PC recorded so an observer can localise it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VmFault {
    StackOverflow,
    StackUnderflow,
    CallOverflow,
    DivByZero,
    InvalidOpcode(u8),
    InvalidJump,
    OutOfBounds,
}

impl core::fmt::Display for VmFault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::StackOverflow => f.write_str("stack overflow"),
            Self::StackUnderflow => f.write_str("stack underflow"),
            Self::CallOverflow => f.write_str("call stack overflow"),
            Self::DivByZero => f.write_str("division by zero"),
            Self::InvalidOpcode(op) => {
                write!(f, "invalid opcode 0x{op:02x}")
            }
            Self::InvalidJump => f.write_str("jump target out of range"),
            Self::OutOfBounds => f.write_str("memory access out of bounds"),
        }
    }
}

impl std::error::Error for VmFault {}

/// Result of a single `VM::step`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StepOutcome {
    Ok,
    /// Executed a `BREAK`. Program state is unaffected; this exists purely
    /// so an observer (the debug channel) can notice without the VM itself
    /// knowing anything about frames.
    Break,
    Halted,
    Fault(VmFault),
}

/// Debug channel verbosity. Switching is a live operation from the command
/// surface.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
pub enum DebugMode {
    #[default]
    Off,
    Summary,
    Verbose,
}

/// Version reported in the boot `ready` frame. The frame format MUST NOT
/// silently change between versions.
pub const DEBUG_PROTOCOL_VERSION: u32 = 1;

/// Minimum and maximum task interval accepted at Scheduler registration.
/// The Loader does not enforce these; only byte-level integrity is its
/// concern.
pub const MIN_INTERVAL_US: u32 = 500;
pub const MAX_INTERVAL_US: u32 = 60_000_000;

/// Hook the Scheduler and VM call into to report runtime events, without
/// either of them knowing anything about JSON or line framing. The debug
/// channel crate implements this and hands an `Arc<dyn Observer>` to the
/// Scheduler; the CLI can also implement it directly for `--verbose`.
///
/// Implementations must not allocate in a way that can fail or block —
/// these calls happen on the executor hot path under the shared-memory
/// lock.
pub trait Observer: Send + Sync {
    fn on_ready(&self, _version: u32) {}
    fn on_task_cycle(&self, _id: u16, _start_ms: u64, _end_ms: u64, _us: u64, _overrun: bool) {}
    fn on_cycle(&self, _n: u64, _us: u64, _tasks: u32) {}
    fn on_error(&self, _code: &str, _msg: &str, _pc: u16) {}
    fn on_opcode(&self, _op: &str, _pc: u16, _sp: u16, _tos: i32) {}
    fn on_ack(&self, _cmd: &str, _val: &str) {}
    /// Whether the caller should pay the cost of single-stepping to emit
    /// `on_opcode` for every instruction. Returning `false` (the default,
    /// and what `off`/`summary` modes want) lets the Scheduler take the
    /// fast `run_cycle` path instead.
    fn wants_opcode_trace(&self) -> bool {
        false
    }
}

/// An `Observer` that does nothing. Used when no debug channel is attached;
/// its calls compile away to nothing interesting at every call site.
pub struct NullObserver;

impl Observer for NullObserver {}
