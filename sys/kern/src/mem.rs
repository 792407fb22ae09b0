//! The Memory Plane: five fixed-address byte banks shared by every VM.
//!
//! Bank boundaries are the one thing every other component treats as gospel;
//! see `zplc_abi::mem` for the address map itself. This module's whole job is
//! to never let a logical address or a bank copy reach across a boundary it
//! shouldn't.

use zplc_abi::mem;
use zplc_abi::VmFault;

/// One of the five banks in the plane.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Bank {
    Input,
    Output,
    Work,
    Retain,
    Code,
}

impl Bank {
    fn range(self) -> (u32, u32) {
        match self {
            Bank::Input => (mem::INPUT_BASE, mem::INPUT_SIZE),
            Bank::Output => (mem::OUTPUT_BASE, mem::OUTPUT_SIZE),
            Bank::Work => (mem::WORK_BASE, mem::WORK_SIZE),
            Bank::Retain => (mem::RETAIN_BASE, mem::RETAIN_SIZE),
            Bank::Code => (mem::CODE_BASE, mem::CODE_SIZE),
        }
    }

    fn writable_by_vm(self) -> bool {
        matches!(self, Bank::Output | Bank::Work | Bank::Retain)
    }
}

/// Locates the bank containing `addr` and the offset within it, or `None`
/// if `addr` falls in a gap or past the end of the address space.
fn locate(addr: u32) -> Option<(Bank, u32)> {
    for bank in [Bank::Input, Bank::Output, Bank::Work, Bank::Retain, Bank::Code] {
        let (base, size) = bank.range();
        if addr >= base && addr < base.wrapping_add(size) {
            return Some((bank, addr - base));
        }
    }
    None
}

/// A single access never straddles two banks: this checks that `offset +
/// len` still lands within `size`.
fn fits(offset: u32, len: u32, size: u32) -> bool {
    match offset.checked_add(len) {
        Some(end) => end <= size,
        None => false,
    }
}

pub struct MemoryPlane {
    input: [u8; mem::INPUT_SIZE as usize],
    output: [u8; mem::OUTPUT_SIZE as usize],
    work: [u8; mem::WORK_SIZE as usize],
    retain: [u8; mem::RETAIN_SIZE as usize],
    code: Vec<u8>,
    code_len: usize,
}

impl MemoryPlane {
    pub fn new() -> Self {
        let mut plane = MemoryPlane {
            input: [0; mem::INPUT_SIZE as usize],
            output: [0; mem::OUTPUT_SIZE as usize],
            work: [0; mem::WORK_SIZE as usize],
            retain: [0; mem::RETAIN_SIZE as usize],
            code: vec![0; mem::CODE_SIZE as usize],
            code_len: 0,
        };
        plane.init();
        plane
    }

    /// Zeroes every bank except Retain and clears the loaded-code length.
    /// Never fails.
    pub fn init(&mut self) {
        self.input.fill(0);
        self.output.fill(0);
        self.work.fill(0);
        self.code.fill(0);
        self.code_len = 0;
    }

    fn bank_slice(&self, bank: Bank) -> &[u8] {
        match bank {
            Bank::Input => &self.input,
            Bank::Output => &self.output,
            Bank::Work => &self.work,
            Bank::Retain => &self.retain,
            Bank::Code => &self.code,
        }
    }

    fn bank_slice_mut(&mut self, bank: Bank) -> &mut [u8] {
        match bank {
            Bank::Input => &mut self.input,
            Bank::Output => &mut self.output,
            Bank::Work => &mut self.work,
            Bank::Retain => &mut self.retain,
            Bank::Code => &mut self.code,
        }
    }

    /// Copies `bytes` into the Code bank at `dst_offset`, extending the
    /// tracked loaded-code length if this copy pushes the upper bound
    /// higher. Fails without touching anything if it would run past the
    /// end of the Code bank.
    pub fn load_code(&mut self, bytes: &[u8], dst_offset: usize) -> Result<(), VmFault> {
        let end = dst_offset
            .checked_add(bytes.len())
            .ok_or(VmFault::OutOfBounds)?;
        if end > self.code.len() {
            return Err(VmFault::OutOfBounds);
        }
        self.code[dst_offset..end].copy_from_slice(bytes);
        if end > self.code_len {
            self.code_len = end;
        }
        Ok(())
    }

    /// A read-only view into the Code bank, or `None` if `[offset, offset+len)`
    /// runs past the loaded region.
    pub fn get_code(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let end = offset.checked_add(len)?;
        if end > self.code_len {
            return None;
        }
        Some(&self.code[offset..end])
    }

    pub fn loaded_code_size(&self) -> usize {
        self.code_len
    }

    fn check_access(addr: u32, len: u32, want_write: bool) -> Result<(Bank, u32), VmFault> {
        let (bank, offset) = locate(addr).ok_or(VmFault::OutOfBounds)?;
        let (_, size) = bank.range();
        if !fits(offset, len, size) {
            return Err(VmFault::OutOfBounds);
        }
        if want_write {
            if !bank.writable_by_vm() {
                return Err(VmFault::OutOfBounds);
            }
        } else if bank == Bank::Code {
            // Code is readable only through get_code, never via VM load.
            return Err(VmFault::OutOfBounds);
        }
        Ok((bank, offset))
    }

    pub fn read8(&self, addr: u32) -> Result<u8, VmFault> {
        let (bank, off) = Self::check_access(addr, 1, false)?;
        Ok(self.bank_slice(bank)[off as usize])
    }

    pub fn read16(&self, addr: u32) -> Result<u16, VmFault> {
        let (bank, off) = Self::check_access(addr, 2, false)?;
        let s = &self.bank_slice(bank)[off as usize..off as usize + 2];
        Ok(u16::from_le_bytes([s[0], s[1]]))
    }

    pub fn read32(&self, addr: u32) -> Result<u32, VmFault> {
        let (bank, off) = Self::check_access(addr, 4, false)?;
        let s = &self.bank_slice(bank)[off as usize..off as usize + 4];
        Ok(u32::from_le_bytes(s.try_into().unwrap()))
    }

    pub fn read64(&self, addr: u32) -> Result<u64, VmFault> {
        let (bank, off) = Self::check_access(addr, 8, false)?;
        let s = &self.bank_slice(bank)[off as usize..off as usize + 8];
        Ok(u64::from_le_bytes(s.try_into().unwrap()))
    }

    pub fn write8(&mut self, addr: u32, value: u8) -> Result<(), VmFault> {
        let (bank, off) = Self::check_access(addr, 1, true)?;
        self.bank_slice_mut(bank)[off as usize] = value;
        Ok(())
    }

    pub fn write16(&mut self, addr: u32, value: u16) -> Result<(), VmFault> {
        let (bank, off) = Self::check_access(addr, 2, true)?;
        let s = &mut self.bank_slice_mut(bank)[off as usize..off as usize + 2];
        s.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn write32(&mut self, addr: u32, value: u32) -> Result<(), VmFault> {
        let (bank, off) = Self::check_access(addr, 4, true)?;
        let s = &mut self.bank_slice_mut(bank)[off as usize..off as usize + 4];
        s.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn write64(&mut self, addr: u32, value: u64) -> Result<(), VmFault> {
        let (bank, off) = Self::check_access(addr, 8, true)?;
        let s = &mut self.bank_slice_mut(bank)[off as usize..off as usize + 8];
        s.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// HAL-side write into the Input bank. Bypasses the VM's read-only
    /// restriction on Input since the HAL, not the program, owns that data.
    pub fn ipi_write8(&mut self, offset: u32, value: u8) -> Result<(), VmFault> {
        if offset >= mem::INPUT_SIZE {
            return Err(VmFault::OutOfBounds);
        }
        self.input[offset as usize] = value;
        Ok(())
    }

    pub fn ipi_write16(&mut self, offset: u32, value: u16) -> Result<(), VmFault> {
        if !fits(offset, 2, mem::INPUT_SIZE) {
            return Err(VmFault::OutOfBounds);
        }
        self.input[offset as usize..offset as usize + 2].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn ipi_write32(&mut self, offset: u32, value: u32) -> Result<(), VmFault> {
        if !fits(offset, 4, mem::INPUT_SIZE) {
            return Err(VmFault::OutOfBounds);
        }
        self.input[offset as usize..offset as usize + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// HAL-side read from the Output bank.
    pub fn opi_read8(&self, offset: u32) -> Result<u8, VmFault> {
        if offset >= mem::OUTPUT_SIZE {
            return Err(VmFault::OutOfBounds);
        }
        Ok(self.output[offset as usize])
    }

    pub fn opi_read16(&self, offset: u32) -> Result<u16, VmFault> {
        if !fits(offset, 2, mem::OUTPUT_SIZE) {
            return Err(VmFault::OutOfBounds);
        }
        let s = &self.output[offset as usize..offset as usize + 2];
        Ok(u16::from_le_bytes([s[0], s[1]]))
    }

    pub fn opi_read32(&self, offset: u32) -> Result<u32, VmFault> {
        if !fits(offset, 4, mem::OUTPUT_SIZE) {
            return Err(VmFault::OutOfBounds);
        }
        let s = &self.output[offset as usize..offset as usize + 4];
        Ok(u32::from_le_bytes(s.try_into().unwrap()))
    }

    /// Copies the Retain bank out for persistence across a cold boot. Host
    /// policy decides where this goes; the plane only owns the bytes.
    pub fn snapshot_retain(&self) -> Vec<u8> {
        self.retain.to_vec()
    }

    /// Restores a previously snapshotted Retain bank. Silently truncates or
    /// zero-pads to the bank size so a snapshot from a future format doesn't
    /// panic a loader.
    pub fn restore_retain(&mut self, bytes: &[u8]) {
        let n = bytes.len().min(self.retain.len());
        self.retain[..n].copy_from_slice(&bytes[..n]);
        for b in &mut self.retain[n..] {
            *b = 0;
        }
    }
}

impl Default for MemoryPlane {
    fn default() -> Self {
        Self::new()
    }
}
