pub mod bus;
pub mod cartridge;
pub mod cpu;
pub mod error;
pub mod mapper;
pub mod memory;
pub mod opcodes;
pub mod trace;

use anyhow::{Context, Result};
use std::path::Path;

use bus::{Bus, BusStats, CpuBus};
use cartridge::Cartridge;
use cpu::Cpu;
use error::{ErrorCode, EventLog};

pub const FLAG_CARRY: u8 = 0x01;
pub const FLAG_ZERO: u8 = 0x02;
pub const FLAG_INTERRUPT: u8 = 0x04;
pub const FLAG_DECIMAL: u8 = 0x08;
pub const FLAG_BREAK: u8 = 0x10;
pub const FLAG_UNUSED: u8 = 0x20;
pub const FLAG_OVERFLOW: u8 = 0x40;
pub const FLAG_NEGATIVE: u8 = 0x80;

pub const NMI_VECTOR: u16 = 0xFFFA;
pub const RESET_VECTOR: u16 = 0xFFFC;
pub const IRQ_VECTOR: u16 = 0xFFFE;
pub const BRK_VECTOR: u16 = IRQ_VECTOR;

/// CPU, work RAM and cartridge slot wired together behind one address decoder.
pub struct System {
    cpu: Cpu,
    bus: Bus,
    log: EventLog,
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}

impl System {
    pub fn new() -> Self {
        Self::with_event_log(EventLog::new())
    }

    pub fn with_event_log(log: EventLog) -> Self {
        let mut system = Self {
            cpu: Cpu::new(),
            bus: Bus::new(log.clone()),
            log,
        };
        system.reset();
        system
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn bus_stats(&self) -> BusStats {
        self.bus.stats()
    }

    /// One system clock.
    pub fn clock(&mut self) {
        let was_halted = self.cpu.halted();
        self.cpu.step_clock(&mut self.bus);
        if !was_halted && self.cpu.halted() {
            self.note_halt();
        }
    }

    /// Clocks up to the next instruction boundary and returns the clocks spent.
    pub fn step_instruction(&mut self) -> u32 {
        let was_halted = self.cpu.halted();
        let clocks = self.cpu.step_instruction(&mut self.bus);
        if !was_halted && self.cpu.halted() {
            self.note_halt();
        }
        clocks
    }

    fn note_halt(&self) {
        self.log.note(format!(
            "CPU halted by JAM ${:02X} at ${:04X}",
            self.cpu.opcode(),
            self.cpu.pc().wrapping_sub(1)
        ));
    }

    pub fn reset(&mut self) {
        self.cpu.reset(&mut self.bus);
        self.cpu.set_total_cycles(0);
        self.bus.reset_stats();
        self.log
            .note(format!("CPU reset, PC=${:04X}", self.cpu.pc()));
    }

    pub fn irq(&mut self) -> bool {
        let serviced = self.cpu.irq(&mut self.bus);
        if serviced {
            self.log
                .note(format!("IRQ serviced -> PC=${:04X}", self.cpu.pc()));
        } else {
            self.log.note("IRQ ignored");
        }
        serviced
    }

    pub fn nmi(&mut self) -> bool {
        let serviced = self.cpu.nmi(&mut self.bus);
        if serviced {
            self.log
                .note(format!("NMI serviced -> PC=${:04X}", self.cpu.pc()));
        } else {
            self.log.note("NMI ignored while halted");
        }
        serviced
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        self.bus.read(addr)
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        self.bus.write(addr, value);
    }

    pub fn peek(&mut self, addr: u16) -> u8 {
        self.bus.peek(addr)
    }

    /// Connects `cartridge` to the bus and hands back whichever was there
    /// before. Invalid images are refused and never reach the bus.
    pub fn insert_cartridge(&mut self, cartridge: Cartridge) -> Result<Option<Cartridge>> {
        // The failed load already posted its own category; refusal is only noted.
        if !cartridge.is_valid_image() {
            self.log.note("Cartridge refused: invalid image");
            return Err(
                ErrorCode::InvalidNesFormat.error("refusing to insert an invalid cartridge")
            );
        }
        self.log
            .note(format!("Cartridge inserted: {}", cartridge.describe()));
        Ok(self.bus.attach(cartridge))
    }

    pub fn remove_cartridge(&mut self) -> Option<Cartridge> {
        let cartridge = self.bus.detach();
        if cartridge.is_some() {
            self.log.note("Cartridge removed");
        }
        cartridge
    }

    pub fn has_cartridge(&self) -> bool {
        self.bus.cartridge().is_some()
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.bus.cartridge()
    }

    pub fn load_rom_from_path(&mut self, path: &Path) -> Result<()> {
        let cartridge = Cartridge::try_open(path, self.log.clone()).inspect_err(|err| {
            self.log.post_error(err);
        })?;
        self.insert_cartridge(cartridge)
            .with_context(|| format!("failed to load {}", path.display()))?;
        self.reset();
        Ok(())
    }

    /// Copies `program` through the bus starting at `offset`. Bytes landing on
    /// read-only space are dropped the same way a CPU store would be.
    pub fn load_program(&mut self, program: &[u8], offset: u16) {
        for (i, byte) in program.iter().enumerate() {
            self.bus.write(offset.wrapping_add(i as u16), *byte);
        }
    }

    pub fn trace_line(&mut self) -> String {
        trace::format_line(&self.cpu, &mut self.bus)
    }

    pub fn dump_stack(&mut self) -> String {
        trace::dump_stack(&mut self.bus)
    }

    pub fn debug_mapper_state(&self) -> String {
        match self.bus.cartridge() {
            Some(cartridge) => cartridge.debug_mapper_state(),
            None => "No cartridge".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartridge::test_support::{ines_image, nrom_with_program};

    fn system_with(image: &[u8]) -> System {
        let log = EventLog::new();
        let mut system = System::with_event_log(log.clone());
        let cart = Cartridge::from_bytes(image, log);
        system.insert_cartridge(cart).unwrap();
        system.reset();
        system
    }

    #[test]
    fn reset_reads_vector_from_cartridge() {
        let mut system = system_with(&nrom_with_program(&[0xEA]));
        assert_eq!(system.cpu().pc(), 0xC000);
        assert_eq!(system.step_instruction(), 7);
        assert_eq!(system.cpu().total_cycles(), 7);
        assert_eq!(system.step_instruction(), 2);
        assert_eq!(system.cpu().pc(), 0xC001);
    }

    #[test]
    fn nrom_single_bank_mirrors_into_upper_window() {
        let mut system = system_with(&ines_image(1, 1, 0, 0));
        assert_eq!(system.read(0x8000), system.read(0xC000));
        assert_eq!(system.read(0xBFFF), system.read(0xFFFF));
    }

    #[test]
    fn ram_mirrors_through_the_system() {
        let mut system = System::new();
        system.write(0x0000, 0x5C);
        assert_eq!(system.read(0x0800), 0x5C);
        assert_eq!(system.read(0x1800), 0x5C);
    }

    #[test]
    fn invalid_cartridge_is_refused() {
        let mut system = System::new();
        let mut image = ines_image(1, 1, 0, 0);
        image[0] = b'X';
        let cart = Cartridge::from_bytes(&image, system.event_log().clone());
        let err = system.insert_cartridge(cart).unwrap_err();
        assert_eq!(ErrorCode::of(&err), ErrorCode::InvalidNesFormat);
        assert!(!system.has_cartridge());
        assert_eq!(system.event_log().count(ErrorCode::InvalidNesFormat), 1);
        assert_eq!(
            system.event_log().recent(1)[0].message,
            "Cartridge refused: invalid image"
        );
        // Nothing drives the cartridge space without a cartridge.
        system.write(0x0000, 0x3E);
        let _ = system.read(0x0000);
        assert_eq!(system.read(0x8000), 0x3E);
    }

    #[test]
    fn refused_mapper_keeps_its_own_category() {
        let mut system = System::new();
        let cart = Cartridge::from_bytes(&ines_image(1, 1, 0x10, 0), system.event_log().clone());
        assert!(system.insert_cartridge(cart).is_err());
        assert_eq!(system.event_log().count(ErrorCode::MapperNotSupported), 1);
        assert_eq!(system.event_log().count(ErrorCode::InvalidNesFormat), 0);
    }

    #[test]
    fn removed_cartridge_is_handed_back_intact() {
        let mut system = system_with(&ines_image(2, 1, 0, 0));
        let cart = system.remove_cartridge().unwrap();
        assert_eq!(cart.prg_rom().len(), 2 * mapper::PRG_BANK_SIZE);
        assert!(!system.has_cartridge());
        assert!(system.insert_cartridge(cart).unwrap().is_none());
        assert_eq!(system.read(0xC000), 0x02);
    }

    #[test]
    fn load_program_writes_through_the_bus() {
        let mut system = System::new();
        system.load_program(&[0xA9, 0x42, 0x85, 0x10], 0x0200);
        assert_eq!(system.peek(0x0200), 0xA9);
        assert_eq!(system.peek(0x0203), 0x10);
        system.load_program(&[0x01, 0x02], 0x8000);
        assert_eq!(system.bus_stats().unmapped_writes, 2);
    }

    #[test]
    fn jam_is_noted_once() {
        let mut system = system_with(&nrom_with_program(&[0xA9, 0x01, 0x02]));
        for _ in 0..4 {
            system.step_instruction();
        }
        assert!(system.cpu().halted());
        let halts = system
            .event_log()
            .recent(16)
            .into_iter()
            .filter(|event| event.message.starts_with("CPU halted"))
            .count();
        assert_eq!(halts, 1);
        assert_eq!(
            system.event_log().recent(1)[0].message,
            "CPU halted by JAM $02 at $C002"
        );
    }

    #[test]
    fn masked_irq_is_noted() {
        let mut system = system_with(&nrom_with_program(&[0xEA]));
        system.step_instruction();
        assert!(!system.irq());
        assert_eq!(system.event_log().recent(1)[0].message, "IRQ ignored");
        assert!(system.nmi());
        assert_eq!(system.cpu().pc(), 0xEAEA);
    }

    #[test]
    fn missing_rom_path_is_reported() {
        let mut system = System::new();
        let err = system
            .load_rom_from_path(Path::new("/definitely/not/here.nes"))
            .unwrap_err();
        assert_eq!(ErrorCode::of(&err), ErrorCode::FileCouldNotOpen);
        assert_eq!(system.event_log().count(ErrorCode::FileCouldNotOpen), 1);
    }
}
