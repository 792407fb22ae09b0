//! The command surface exposed to external observers: set debug mode, get
//! status, manage watched addresses, reset a VM. Every command yields an
//! `ack` frame.

use zplc_abi::DebugMode;

#[derive(Debug, Clone, PartialEq)]
pub enum DebugCommand {
    SetMode(DebugMode),
    GetStatus,
    AddWatch(u32),
    RemoveWatch(u32),
    ClearWatch,
    ResetVm(u16),
}

/// Parses a single command line. The wire grammar is deliberately tiny:
/// `mode <off|summary|verbose>`, `status`, `watch add <addr>`,
/// `watch remove <addr>`, `watch clear`, `reset <task_id>`.
impl DebugCommand {
    pub fn parse(line: &str) -> Option<DebugCommand> {
        let mut words = line.split_whitespace();
        match words.next()? {
            "mode" => match words.next()? {
                "off" => Some(DebugCommand::SetMode(DebugMode::Off)),
                "summary" => Some(DebugCommand::SetMode(DebugMode::Summary)),
                "verbose" => Some(DebugCommand::SetMode(DebugMode::Verbose)),
                _ => None,
            },
            "status" => Some(DebugCommand::GetStatus),
            "watch" => match words.next()? {
                "add" => words.next()?.parse::<u32>().ok().map(DebugCommand::AddWatch),
                "remove" => words
                    .next()?
                    .parse::<u32>()
                    .ok()
                    .map(DebugCommand::RemoveWatch),
                "clear" => Some(DebugCommand::ClearWatch),
                _ => None,
            },
            "reset" => words.next()?.parse::<u16>().ok().map(DebugCommand::ResetVm),
            _ => None,
        }
    }

    /// The command name, as it appears in the resulting `ack` frame.
    pub fn name(&self) -> &'static str {
        match self {
            DebugCommand::SetMode(_) => "mode",
            DebugCommand::GetStatus => "status",
            DebugCommand::AddWatch(_) => "watch_add",
            DebugCommand::RemoveWatch(_) => "watch_remove",
            DebugCommand::ClearWatch => "watch_clear",
            DebugCommand::ResetVm(_) => "reset",
        }
    }
}

/// Implemented by whatever owns the running Scheduler, so this crate never
/// needs to depend on it directly.
pub trait CommandTarget {
    fn set_mode(&self, mode: DebugMode);
    fn mode(&self) -> DebugMode;
    fn reset_task(&self, task_id: u16) -> bool;
}
