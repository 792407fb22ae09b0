// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scheduler-level error kinds.
//!
//! VM faults (`zplc_abi::VmFault`) and Loader errors (`zplc_abi::LoaderError`)
//! are local to one task or one load; these are the ones that mean "the
//! Scheduler itself refused to do something."

use std::fmt;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SchedulerError {
    IntervalOutOfRange,
    NoFreeSlot,
    CodeTooLarge,
    StaleHandle,
    UnknownHandle,
    WrongState,
    Load(zplc_abi::LoaderError),
}

impl From<zplc_abi::LoaderError> for SchedulerError {
    fn from(e: zplc_abi::LoaderError) -> Self {
        SchedulerError::Load(e)
    }
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntervalOutOfRange => write!(f, "task interval outside the allowed range"),
            Self::NoFreeSlot => write!(f, "no free task slot"),
            Self::CodeTooLarge => write!(f, "task code does not fit in the code bank"),
            Self::StaleHandle => write!(f, "task handle refers to a slot that has been reused"),
            Self::UnknownHandle => write!(f, "task handle does not refer to a registered slot"),
            Self::WrongState => {
                write!(f, "scheduler is not in a state that allows this operation")
            }
            Self::Load(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SchedulerError {}

/// Outcome of `SharedMemoryLock::lock`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LockError {
    WouldBlock,
    Timeout,
    Poisoned,
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WouldBlock => write!(f, "shared-memory lock is held"),
            Self::Timeout => write!(f, "timed out waiting for the shared-memory lock"),
            Self::Poisoned => write!(f, "shared-memory lock is poisoned"),
        }
    }
}

impl std::error::Error for LockError {}
