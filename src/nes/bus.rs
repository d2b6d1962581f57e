use serde::Serialize;

use super::cartridge::Cartridge;
use super::error::EventLog;
use super::memory::Memory;

pub const RAM_SIZE: usize = 0x0800;
pub const RAM_MIRROR_END: u16 = 0x1FFF;
pub const PPU_REGS_START: u16 = 0x2000;
pub const PPU_REGS_END: u16 = 0x3FFF;

/// The CPU's only view of the machine.
pub trait CpuBus {
    fn read(&mut self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, value: u8);
    /// Reads without disturbing bus state; used by tracing and debuggers.
    fn peek(&mut self, addr: u16) -> u8;
}

/// Device that answered an access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Ram,
    PpuRegisters,
    Cartridge,
    Unmapped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    pub reads: u64,
    pub writes: u64,
    pub ram_reads: u64,
    pub ram_writes: u64,
    pub ppu_reads: u64,
    pub ppu_writes: u64,
    pub cart_reads: u64,
    pub cart_writes: u64,
    pub unmapped_reads: u64,
    pub unmapped_writes: u64,
    pub last_read_addr: u16,
    pub last_write_addr: u16,
    pub last_write_value: u8,
}

impl BusStats {
    fn count_read(&mut self, region: Region, addr: u16) {
        self.reads += 1;
        self.last_read_addr = addr;
        match region {
            Region::Ram => self.ram_reads += 1,
            Region::PpuRegisters => self.ppu_reads += 1,
            Region::Cartridge => self.cart_reads += 1,
            Region::Unmapped => self.unmapped_reads += 1,
        }
    }

    fn count_write(&mut self, region: Region, addr: u16, value: u8) {
        self.writes += 1;
        self.last_write_addr = addr;
        self.last_write_value = value;
        match region {
            Region::Ram => self.ram_writes += 1,
            Region::PpuRegisters => self.ppu_writes += 1,
            Region::Cartridge => self.cart_writes += 1,
            Region::Unmapped => self.unmapped_writes += 1,
        }
    }
}

/// CPU address decoder: 2 KiB of work RAM, the PPU register window and
/// an optional cartridge slot.
#[derive(Debug, Clone)]
pub struct Bus {
    ram: Memory,
    cartridge: Option<Cartridge>,
    open_bus: u8,
    stats: BusStats,
}

impl Bus {
    pub fn new(log: EventLog) -> Self {
        Self {
            ram: Memory::ram(RAM_SIZE, log),
            cartridge: None,
            open_bus: 0,
            stats: BusStats::default(),
        }
    }

    /// Last byte driven onto the data bus by a read.
    pub fn open_bus(&self) -> u8 {
        self.open_bus
    }

    pub fn stats(&self) -> BusStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = BusStats::default();
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.cartridge.as_ref()
    }

    pub fn cartridge_mut(&mut self) -> Option<&mut Cartridge> {
        self.cartridge.as_mut()
    }

    pub(crate) fn attach(&mut self, cartridge: Cartridge) -> Option<Cartridge> {
        self.cartridge.replace(cartridge)
    }

    pub(crate) fn detach(&mut self) -> Option<Cartridge> {
        self.cartridge.take()
    }

    /// Routes a read and returns the answering device with the byte it drove.
    /// Nothing answering leaves `open_bus` on the data lines.
    pub fn decode_read(&mut self, addr: u16, open_bus: u8) -> (Region, u8) {
        if let Some(value) = self.cartridge.as_mut().and_then(|cart| cart.cpu_read(addr)) {
            return (Region::Cartridge, value);
        }
        match addr {
            0x0000..=RAM_MIRROR_END => (Region::Ram, self.ram.read(Self::ram_index(addr))),
            PPU_REGS_START..=PPU_REGS_END => (Region::PpuRegisters, open_bus),
            _ => (Region::Unmapped, open_bus),
        }
    }

    pub fn decode_write(&mut self, addr: u16, value: u8) -> Region {
        if self
            .cartridge
            .as_mut()
            .is_some_and(|cart| cart.cpu_write(addr, value))
        {
            return Region::Cartridge;
        }
        match addr {
            0x0000..=RAM_MIRROR_END => {
                self.ram.write(Self::ram_index(addr), value);
                Region::Ram
            }
            PPU_REGS_START..=PPU_REGS_END => Region::PpuRegisters,
            _ => Region::Unmapped,
        }
    }

    fn ram_index(addr: u16) -> usize {
        (addr as usize) & (RAM_SIZE - 1)
    }
}

impl CpuBus for Bus {
    fn read(&mut self, addr: u16) -> u8 {
        let (region, value) = self.decode_read(addr, self.open_bus);
        self.stats.count_read(region, addr);
        self.open_bus = value;
        value
    }

    fn write(&mut self, addr: u16, value: u8) {
        let region = self.decode_write(addr, value);
        self.stats.count_write(region, addr, value);
    }

    fn peek(&mut self, addr: u16) -> u8 {
        self.decode_read(addr, self.open_bus).1
    }
}
