use anyhow::{Context, Result};
use std::io::Read;

use super::error::{ErrorCode, EventLog};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    Ram,
    Rom,
}

/// Fixed-size byte store. ROM ignores writes; out-of-range accesses are
/// reported to the event log and never touch the buffer.
#[derive(Debug, Clone)]
pub struct Memory {
    kind: MemoryKind,
    data: Vec<u8>,
    log: EventLog,
}

impl Memory {
    pub fn ram(size: usize, log: EventLog) -> Self {
        Self {
            kind: MemoryKind::Ram,
            data: vec![0; size],
            log,
        }
    }

    pub fn rom(size: usize, log: EventLog) -> Self {
        Self {
            kind: MemoryKind::Rom,
            data: vec![0; size],
            log,
        }
    }

    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Drops the old contents and allocates `size` zeroed bytes.
    pub fn resize(&mut self, size: usize) -> Result<()> {
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|err| ErrorCode::OutOfMemory.error(format!("{size} bytes: {err}")))?;
        data.resize(size, 0);
        self.data = data;
        Ok(())
    }

    pub fn read(&self, addr: usize) -> u8 {
        match self.data.get(addr) {
            Some(value) => *value,
            None => {
                self.log.post(
                    ErrorCode::InternalError,
                    format!(
                        "{:?} read at {addr:#06X} outside {} bytes",
                        self.kind,
                        self.data.len()
                    ),
                );
                0
            }
        }
    }

    pub fn write(&mut self, addr: usize, value: u8) {
        if self.kind == MemoryKind::Rom {
            return;
        }
        let len = self.data.len();
        match self.data.get_mut(addr) {
            Some(slot) => *slot = value,
            None => self.log.post(
                ErrorCode::InternalError,
                format!("Ram write at {addr:#06X} outside {len} bytes"),
            ),
        }
    }

    /// Fills the first `size` bytes from `reader`.
    pub fn load_from<R: Read>(&mut self, reader: &mut R, size: usize) -> Result<()> {
        if self.data.len() < size {
            return Err(ErrorCode::FailToLoadMemory.error(format!(
                "{size} bytes requested but buffer holds {}",
                self.data.len()
            )));
        }
        reader
            .read_exact(&mut self.data[..size])
            .map_err(|err| ErrorCode::FileReadError.error(err))
            .with_context(|| format!("failed to load {size} bytes"))
    }
}
