//! The shared-memory lock serialising every VM's access to the Memory
//! Plane. `lock(timeout_ms)` follows the negative/zero/positive convention:
//! negative waits forever, zero tries once, positive bounds the wait.

use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use crate::err::LockError;
use crate::mem::MemoryPlane;

const POLL_INTERVAL: Duration = Duration::from_micros(200);

pub struct SharedMemoryLock {
    inner: Mutex<MemoryPlane>,
}

impl SharedMemoryLock {
    pub fn new(mem: MemoryPlane) -> Self {
        SharedMemoryLock {
            inner: Mutex::new(mem),
        }
    }

    pub fn lock(&self, timeout_ms: i64) -> Result<MutexGuard<'_, MemoryPlane>, LockError> {
        if timeout_ms < 0 {
            return self.inner.lock().map_err(|_| LockError::Poisoned);
        }
        if timeout_ms == 0 {
            return match self.inner.try_lock() {
                Ok(g) => Ok(g),
                Err(TryLockError::WouldBlock) => Err(LockError::WouldBlock),
                Err(TryLockError::Poisoned(_)) => Err(LockError::Poisoned),
            };
        }
        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
        loop {
            match self.inner.try_lock() {
                Ok(g) => return Ok(g),
                Err(TryLockError::Poisoned(_)) => return Err(LockError::Poisoned),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(LockError::Timeout);
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }
}
