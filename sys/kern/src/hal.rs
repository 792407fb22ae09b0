//! The host adaptation layer contract. The core never talks to real
//! hardware; it calls through this trait, which a host binary implements
//! (or, for tests, fakes).

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HalError {
    NotImplemented,
    Io,
}

pub trait Hal: Send + Sync {
    /// Monotonic milliseconds since boot.
    fn tick(&self) -> u64;
    fn gpio_read(&self, channel: u32) -> Result<u8, HalError>;
    fn gpio_write(&self, channel: u32, value: u8) -> Result<(), HalError>;
}

/// Maps Memory Plane byte offsets to HAL channel numbers. Address
/// assignment for I/O channels is policy set above the core (the source
/// compiler or a run-time config file); the core only moves bytes once
/// told where they go.
#[derive(Clone, Debug, Default)]
pub struct ChannelMap {
    pub inputs: Vec<(u32, u32)>,
    pub outputs: Vec<(u32, u32)>,
}

/// Which way a `DeviceBinding` moves bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeviceDirection {
    Input,
    Output,
}

/// One HAL channel bound to a Memory Plane byte offset, as configured by
/// a run/hil scenario file. Metadata only; reported by `Scheduler::devices`
/// for the CLI's `devices` subcommand, it doesn't change how the core
/// reads or writes the bound byte during a cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DeviceBinding {
    pub addr: u32,
    pub channel: u32,
    pub direction: DeviceDirection,
}

impl ChannelMap {
    /// Flattens `inputs`/`outputs` into the binding list `Scheduler::devices`
    /// reports.
    pub fn bindings(&self) -> Vec<DeviceBinding> {
        let input = self.inputs.iter().map(|&(addr, channel)| DeviceBinding {
            addr,
            channel,
            direction: DeviceDirection::Input,
        });
        let output = self.outputs.iter().map(|&(addr, channel)| DeviceBinding {
            addr,
            channel,
            direction: DeviceDirection::Output,
        });
        input.chain(output).collect()
    }
}

/// A `Hal` backed by nothing: reads return zero, writes are dropped. Used
/// when a program has no configured channels, and by tests.
pub struct NullHal;

impl Hal for NullHal {
    fn tick(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn gpio_read(&self, _channel: u32) -> Result<u8, HalError> {
        Err(HalError::NotImplemented)
    }

    fn gpio_write(&self, _channel: u32, _value: u8) -> Result<(), HalError> {
        Err(HalError::NotImplemented)
    }
}
