use anyhow::Result;

use super::error::{ErrorCode, EventLog};
use super::memory::Memory;

pub const PRG_BANK_SIZE: usize = 16 * 1024;
pub const CHR_BANK_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    FourScreen,
}

/// Outcome of resolving a CPU read through a mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapRead {
    /// Offset into PRG memory.
    Prg(usize),
    /// The mapper serviced the read itself (on-board RAM, registers).
    Data(u8),
    Unmapped,
}

/// Outcome of resolving a CPU write through a mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapWrite {
    Prg(usize),
    Handled,
    Unmapped,
}

pub trait Mapper {
    fn map_read(&mut self, addr: u16) -> MapRead;
    fn map_write(&mut self, addr: u16, value: u8) -> MapWrite;
    /// Offset into CHR memory for a PPU pattern-table address.
    fn map_ppu(&self, addr: u16) -> Option<usize>;
    fn debug_state(&self) -> String {
        String::new()
    }
}

pub fn mapper_name(mapper_id: u16) -> &'static str {
    match mapper_id {
        0 => "NROM",
        1 => "MMC1",
        2 => "UxROM",
        3 => "CNROM",
        4 => "MMC3",
        5 => "MMC5",
        7 => "AxROM",
        9 => "MMC2",
        10 => "MMC4",
        66 => "GxROM",
        71 => "Camerica",
        _ => "Unknown",
    }
}

/// Closed set of mapper chips this core can drive.
#[derive(Debug, Clone)]
pub enum MapperChip {
    Nrom(Nrom),
}

impl Mapper for MapperChip {
    fn map_read(&mut self, addr: u16) -> MapRead {
        match self {
            Self::Nrom(nrom) => nrom.map_read(addr),
        }
    }

    fn map_write(&mut self, addr: u16, value: u8) -> MapWrite {
        match self {
            Self::Nrom(nrom) => nrom.map_write(addr, value),
        }
    }

    fn map_ppu(&self, addr: u16) -> Option<usize> {
        match self {
            Self::Nrom(nrom) => nrom.map_ppu(addr),
        }
    }

    fn debug_state(&self) -> String {
        match self {
            Self::Nrom(nrom) => nrom.debug_state(),
        }
    }
}

pub fn create_mapper(mapper_id: u16, prg_banks: usize, log: &EventLog) -> Result<MapperChip> {
    match mapper_id {
        0 => Ok(MapperChip::Nrom(Nrom::new(prg_banks, log.clone()))),
        id => Err(ErrorCode::MapperNotSupported.error(format!(
            "mapper {id} ({}) is not implemented",
            mapper_name(id)
        ))),
    }
}

/// Mapper 0. Fixed 16 or 32 KiB PRG window plus 8 KiB of PRG-RAM.
#[derive(Debug, Clone)]
pub struct Nrom {
    prg_mask: u16,
    ram: Memory,
}

impl Nrom {
    pub const PRG_RAM_START: u16 = 0x6000;
    pub const PRG_RAM_END: u16 = 0x7FFF;
    pub const PRG_RAM_SIZE: usize = 8 * 1024;
    pub const PRG_ROM_START: u16 = 0x8000;
    const PRG_MASK_FULL: u16 = 0x7FFF;
    const PRG_MASK_MIRRORED: u16 = 0x3FFF;

    pub fn new(prg_banks: usize, log: EventLog) -> Self {
        let prg_mask = if prg_banks == 1 {
            Self::PRG_MASK_MIRRORED
        } else {
            Self::PRG_MASK_FULL
        };
        Self {
            prg_mask,
            ram: Memory::ram(Self::PRG_RAM_SIZE, log),
        }
    }

    pub fn is_prg_mirrored(&self) -> bool {
        self.prg_mask == Self::PRG_MASK_MIRRORED
    }

    fn ram_offset(addr: u16) -> usize {
        (addr - Self::PRG_RAM_START) as usize
    }
}

impl Mapper for Nrom {
    fn map_read(&mut self, addr: u16) -> MapRead {
        match addr {
            Self::PRG_RAM_START..=Self::PRG_RAM_END => {
                MapRead::Data(self.ram.read(Self::ram_offset(addr)))
            }
            Self::PRG_ROM_START..=0xFFFF => MapRead::Prg((addr & self.prg_mask) as usize),
            _ => MapRead::Unmapped,
        }
    }

    fn map_write(&mut self, addr: u16, value: u8) -> MapWrite {
        match addr {
            Self::PRG_RAM_START..=Self::PRG_RAM_END => {
                self.ram.write(Self::ram_offset(addr), value);
                MapWrite::Handled
            }
            Self::PRG_ROM_START..=0xFFFF => MapWrite::Prg((addr & self.prg_mask) as usize),
            _ => MapWrite::Unmapped,
        }
    }

    fn map_ppu(&self, addr: u16) -> Option<usize> {
        (addr < 0x2000).then_some(addr as usize)
    }

    fn debug_state(&self) -> String {
        format!(
            "NROM prg_mask=${:04X} ({})",
            self.prg_mask,
            if self.is_prg_mirrored() {
                "16K mirrored"
            } else {
                "32K"
            }
        )
    }
}
