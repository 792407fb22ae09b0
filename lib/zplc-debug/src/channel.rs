//! The transport: a background thread that serializes one [`Envelope`] per
//! line to a sink, and the live-switchable mode/watch state that gates which
//! frames actually reach it.

use std::io::Write;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};

use log::warn;
use zplc_abi::{DebugMode, Observer};

use crate::commands::{CommandTarget, DebugCommand};
use crate::frame::{DebugFrame, Envelope};

const QUEUE_DEPTH: usize = 1024;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn writer_loop(rx: Receiver<Envelope>, mut sink: impl Write) {
    while let Ok(envelope) = rx.recv() {
        match serde_json::to_writer(&mut sink, &envelope) {
            Ok(()) => {
                let _ = sink.write_all(b"\n");
                let _ = sink.flush();
            }
            Err(e) => warn!("failed to serialize debug frame: {e}"),
        }
    }
}

/// Owns the line-delimited JSON debug channel: mode, watch list, and the
/// background writer thread. Cloning is cheap; every clone shares the same
/// queue and state.
#[derive(Clone)]
pub struct DebugChannel {
    mode: Arc<Mutex<DebugMode>>,
    watches: Arc<Mutex<Vec<u32>>>,
    tx: SyncSender<Envelope>,
}

pub struct DebugChannelHandle {
    thread: Option<JoinHandle<()>>,
}

impl DebugChannelHandle {
    /// Blocks until the writer thread drains and exits. The channel itself
    /// must be dropped (all clones) before this returns, since the writer
    /// thread exits when its receiver sees the sender disconnect.
    pub fn join(mut self) {
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

impl DebugChannel {
    pub fn new(sink: impl Write + Send + 'static, mode: DebugMode) -> (Self, DebugChannelHandle) {
        let (tx, rx) = sync_channel(QUEUE_DEPTH);
        let thread = std::thread::Builder::new()
            .name("zplc-debug-writer".into())
            .spawn(move || writer_loop(rx, sink))
            .expect("failed to spawn debug writer thread");
        let channel = DebugChannel {
            mode: Arc::new(Mutex::new(mode)),
            watches: Arc::new(Mutex::new(Vec::new())),
            tx,
        };
        (channel, DebugChannelHandle { thread: Some(thread) })
    }

    pub fn mode(&self) -> DebugMode {
        *self.mode.lock().expect("debug mode lock poisoned")
    }

    pub fn set_mode(&self, mode: DebugMode) {
        *self.mode.lock().expect("debug mode lock poisoned") = mode;
    }

    pub fn watched_addresses(&self) -> Vec<u32> {
        self.watches.lock().expect("watch list lock poisoned").clone()
    }

    pub fn add_watch(&self, addr: u32) {
        let mut watches = self.watches.lock().expect("watch list lock poisoned");
        if !watches.contains(&addr) {
            watches.push(addr);
        }
    }

    pub fn remove_watch(&self, addr: u32) {
        self.watches
            .lock()
            .expect("watch list lock poisoned")
            .retain(|a| *a != addr);
    }

    pub fn clear_watch(&self) {
        self.watches.lock().expect("watch list lock poisoned").clear();
    }

    /// Reports a watched address's current value. Suppressed when the
    /// channel is off, same as every other trace frame.
    pub fn emit_watch(&self, addr: u32, value: u32) {
        if self.mode() == DebugMode::Off {
            return;
        }
        self.send(DebugFrame::Watch { addr, value });
    }

    /// Runs a parsed command against `target`, applying any side effects and
    /// always returning an `ack` frame, independent of the current mode.
    pub fn handle_command(&self, cmd: DebugCommand, target: &dyn CommandTarget) {
        let name = cmd.name().to_string();
        let val = match cmd {
            DebugCommand::SetMode(mode) => {
                target.set_mode(mode);
                self.set_mode(mode);
                format!("{mode:?}")
            }
            DebugCommand::GetStatus => format!("{:?}", target.mode()),
            DebugCommand::AddWatch(addr) => {
                self.add_watch(addr);
                addr.to_string()
            }
            DebugCommand::RemoveWatch(addr) => {
                self.remove_watch(addr);
                addr.to_string()
            }
            DebugCommand::ClearWatch => {
                self.clear_watch();
                "cleared".to_string()
            }
            DebugCommand::ResetVm(id) => {
                let ok = target.reset_task(id);
                if ok { "ok".to_string() } else { "unknown_task".to_string() }
            }
        };
        self.send(DebugFrame::Ack { cmd: name, val });
    }

    fn send(&self, frame: DebugFrame) {
        let envelope = Envelope { ts_ms: now_ms(), frame };
        match self.tx.try_send(envelope) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("debug channel queue full, dropping frame"),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl Observer for DebugChannel {
    fn on_ready(&self, version: u32) {
        if self.mode() == DebugMode::Off {
            return;
        }
        self.send(DebugFrame::Ready {
            version,
            capabilities: vec!["mode", "watch", "reset"],
        });
    }

    fn on_task_cycle(&self, id: u16, start_ms: u64, end_ms: u64, us: u64, overrun: bool) {
        if self.mode() == DebugMode::Off {
            return;
        }
        self.send(DebugFrame::Task { id, start_ms, end_ms, us, overrun });
    }

    fn on_cycle(&self, n: u64, us: u64, tasks: u32) {
        if self.mode() == DebugMode::Off {
            return;
        }
        self.send(DebugFrame::Cycle { n, us, tasks });
    }

    fn on_error(&self, code: &str, msg: &str, pc: u16) {
        if self.mode() == DebugMode::Off {
            return;
        }
        self.send(DebugFrame::Error {
            code: code.to_string(),
            msg: msg.to_string(),
            pc,
        });
    }

    fn on_opcode(&self, op: &str, pc: u16, sp: u16, tos: i32) {
        if self.mode() != DebugMode::Verbose {
            return;
        }
        self.send(DebugFrame::Opcode { op: op.to_string(), pc, sp, tos });
    }

    fn on_ack(&self, cmd: &str, val: &str) {
        self.send(DebugFrame::Ack { cmd: cmd.to_string(), val: val.to_string() });
    }

    fn wants_opcode_trace(&self) -> bool {
        self.mode() == DebugMode::Verbose
    }
}
