//! Frame payloads. One frame is one line of JSON; the framing discipline
//! itself (one object per line, flushed immediately) lives in
//! [`crate::DebugChannel`], not here.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "tag", rename_all = "snake_case")]
pub enum DebugFrame {
    Ready {
        version: u32,
        capabilities: Vec<&'static str>,
    },
    Opcode {
        op: String,
        pc: u16,
        sp: u16,
        tos: i32,
    },
    Task {
        id: u16,
        start_ms: u64,
        end_ms: u64,
        us: u64,
        overrun: bool,
    },
    Cycle {
        n: u64,
        us: u64,
        tasks: u32,
    },
    Error {
        code: String,
        msg: String,
        pc: u16,
    },
    Ack {
        cmd: String,
        val: String,
    },
    Watch {
        addr: u32,
        value: u32,
    },
    /// Reserved for function-block-level tracing. Never emitted by the
    /// core itself today; kept so the tag set downstream tooling expects
    /// is complete.
    Fb {
        payload: serde_json::Value,
    },
}

/// Every frame is stamped with a host timestamp before it reaches the
/// transport.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub ts_ms: u64,
    #[serde(flatten)]
    pub frame: DebugFrame,
}
