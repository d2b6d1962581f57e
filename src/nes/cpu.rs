use serde::{Deserialize, Serialize};

use super::bus::CpuBus;
use super::opcodes::{self, AddressingMode, Instruction};
use super::{
    BRK_VECTOR, FLAG_BREAK, FLAG_CARRY, FLAG_DECIMAL, FLAG_INTERRUPT, FLAG_NEGATIVE,
    FLAG_OVERFLOW, FLAG_UNUSED, FLAG_ZERO, IRQ_VECTOR, NMI_VECTOR, RESET_VECTOR,
};

const STACK_BASE: u16 = 0x0100;
const INTERRUPT_CYCLES: u8 = 7;

/// Programmer-visible register file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    pub pc: u16,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub p: u8,
    pub sp: u8,
}

/// Cycle-stepped 6502 core. An instruction does all of its work on the
/// clock that decodes it and then idles out its remaining cycles.
#[derive(Debug, Clone)]
pub struct Cpu {
    pub(crate) a: u8,
    pub(crate) x: u8,
    pub(crate) y: u8,
    pub(crate) p: u8,
    pub(crate) sp: u8,
    pub(crate) pc: u16,

    opcode: u8,
    mode: AddressingMode,
    // Effective address, and the un-indexed address it was derived from.
    addr: u16,
    base: u16,
    rel: u16,
    cycles_left: u8,
    total_cycles: u64,
    halted: bool,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            p: FLAG_INTERRUPT | FLAG_UNUSED,
            sp: 0xFD,
            pc: 0,
            opcode: 0,
            mode: AddressingMode::Implied,
            addr: 0,
            base: 0,
            rel: 0,
            cycles_left: 0,
            total_cycles: 0,
            halted: false,
        }
    }

    pub fn registers(&self) -> Registers {
        Registers {
            pc: self.pc,
            a: self.a,
            x: self.x,
            y: self.y,
            p: self.p,
            sp: self.sp,
        }
    }

    /// Overwrites the register file. Status always reads back with the unused bit set.
    pub fn set_registers(&mut self, regs: Registers) {
        self.pc = regs.pc;
        self.a = regs.a;
        self.x = regs.x;
        self.y = regs.y;
        self.p = regs.p | FLAG_UNUSED;
        self.sp = regs.sp;
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn set_total_cycles(&mut self, cycles: u64) {
        self.total_cycles = cycles;
    }

    pub fn cycles_left(&self) -> u8 {
        self.cycles_left
    }

    /// True when the next clock decodes a fresh opcode.
    pub fn instruction_complete(&self) -> bool {
        self.cycles_left == 0
    }

    pub fn reset<B: CpuBus>(&mut self, bus: &mut B) {
        self.halted = false;
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.p = FLAG_INTERRUPT | FLAG_UNUSED;
        // The reset sequence runs three stack reads without writing.
        self.sp = 0u8.wrapping_sub(3);
        self.pc = read_u16(bus, RESET_VECTOR);
        self.addr = 0;
        self.base = 0;
        self.rel = 0;
        self.cycles_left = INTERRUPT_CYCLES;
    }

    /// Maskable interrupt. Returns false when masked by the I flag or while halted.
    pub fn irq<B: CpuBus>(&mut self, bus: &mut B) -> bool {
        if self.halted || self.get_flag(FLAG_INTERRUPT) {
            return false;
        }
        self.interrupt(bus, IRQ_VECTOR);
        true
    }

    /// Non-maskable interrupt. Only a halted core ignores it.
    pub fn nmi<B: CpuBus>(&mut self, bus: &mut B) -> bool {
        if self.halted {
            return false;
        }
        self.interrupt(bus, NMI_VECTOR);
        true
    }

    fn interrupt<B: CpuBus>(&mut self, bus: &mut B, vector: u16) {
        self.push_u16(bus, self.pc);
        self.push(bus, (self.p & !FLAG_BREAK) | FLAG_UNUSED);
        self.set_flag(FLAG_INTERRUPT, true);
        self.pc = read_u16(bus, vector);
        self.cycles_left = self.cycles_left.saturating_add(INTERRUPT_CYCLES);
    }

    /// Advances the core by one clock.
    pub fn step_clock<B: CpuBus>(&mut self, bus: &mut B) {
        if self.halted {
            return;
        }

        if self.cycles_left == 0 {
            self.opcode = self.fetch_byte(bus);
            let op = opcodes::decode(self.opcode);
            self.mode = op.mode;
            let page_crossed = self.resolve_address(bus, op.mode);
            let wants_extra = self.execute(bus, op.instruction);
            self.cycles_left += op.cycles + (page_crossed && wants_extra) as u8;
        }

        self.cycles_left -= 1;
        self.total_cycles += 1;
    }

    /// Clocks through the rest of the current instruction, or through one whole
    /// instruction when sitting on a boundary. Returns the clocks spent.
    pub fn step_instruction<B: CpuBus>(&mut self, bus: &mut B) -> u32 {
        let mut clocks = 0;
        while !self.halted {
            self.step_clock(bus);
            clocks += 1;
            if self.cycles_left == 0 {
                break;
            }
        }
        clocks
    }

    /// Computes the effective address for `mode`. Returns true when indexing crossed a page.
    fn resolve_address<B: CpuBus>(&mut self, bus: &mut B, mode: AddressingMode) -> bool {
        let (addr, base) = match mode {
            AddressingMode::Implied | AddressingMode::Accumulator => (0, 0),
            AddressingMode::Immediate => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                (addr, addr)
            }
            AddressingMode::ZeroPage => {
                let addr = self.fetch_byte(bus) as u16;
                (addr, addr)
            }
            AddressingMode::ZeroPageX => {
                let zp = self.fetch_byte(bus);
                (zp.wrapping_add(self.x) as u16, zp as u16)
            }
            AddressingMode::ZeroPageY => {
                let zp = self.fetch_byte(bus);
                (zp.wrapping_add(self.y) as u16, zp as u16)
            }
            AddressingMode::Relative => {
                self.rel = self.fetch_byte(bus) as i8 as i16 as u16;
                (0, 0)
            }
            AddressingMode::Absolute => {
                let addr = self.fetch_word(bus);
                (addr, addr)
            }
            AddressingMode::AbsoluteX => {
                let base = self.fetch_word(bus);
                (base.wrapping_add(self.x as u16), base)
            }
            AddressingMode::AbsoluteY => {
                let base = self.fetch_word(bus);
                (base.wrapping_add(self.y as u16), base)
            }
            AddressingMode::Indirect => {
                let ptr = self.fetch_word(bus);
                (read_u16_bug(bus, ptr), ptr)
            }
            AddressingMode::IndexedIndirect => {
                let zp = self.fetch_byte(bus).wrapping_add(self.x);
                let addr = read_zp_u16(bus, zp);
                (addr, addr)
            }
            AddressingMode::IndirectIndexed => {
                let zp = self.fetch_byte(bus);
                let base = read_zp_u16(bus, zp);
                (base.wrapping_add(self.y as u16), base)
            }
        };
        self.addr = addr;
        self.base = base;

        matches!(
            mode,
            AddressingMode::AbsoluteX | AddressingMode::AbsoluteY | AddressingMode::IndirectIndexed
        ) && self.page_crossed()
    }

    fn page_crossed(&self) -> bool {
        (self.base & 0xFF00) != (self.addr & 0xFF00)
    }

    /// Runs one instruction handler. Returns true when the instruction pays
    /// the page-cross cycle its addressing mode may have signalled.
    fn execute<B: CpuBus>(&mut self, bus: &mut B, instruction: Instruction) -> bool {
        use Instruction::*;

        match instruction {
            Adc => {
                let value = self.operand(bus);
                self.adc(value);
                true
            }
            And => {
                let value = self.operand(bus);
                self.and(value);
                true
            }
            Asl => {
                let value = self.operand(bus);
                let out = self.asl(value);
                self.write_back(bus, out);
                false
            }
            Bcc => self.branch(!self.get_flag(FLAG_CARRY)),
            Bcs => self.branch(self.get_flag(FLAG_CARRY)),
            Beq => self.branch(self.get_flag(FLAG_ZERO)),
            Bmi => self.branch(self.get_flag(FLAG_NEGATIVE)),
            Bne => self.branch(!self.get_flag(FLAG_ZERO)),
            Bpl => self.branch(!self.get_flag(FLAG_NEGATIVE)),
            Bvc => self.branch(!self.get_flag(FLAG_OVERFLOW)),
            Bvs => self.branch(self.get_flag(FLAG_OVERFLOW)),
            Bit => {
                let value = self.operand(bus);
                self.bit(value);
                false
            }
            Brk => {
                self.pc = self.pc.wrapping_add(1);
                self.push_u16(bus, self.pc);
                self.push(bus, self.p | FLAG_BREAK | FLAG_UNUSED);
                self.set_flag(FLAG_INTERRUPT, true);
                self.pc = read_u16(bus, BRK_VECTOR);
                false
            }
            Clc => self.flag_op(FLAG_CARRY, false),
            Cld => self.flag_op(FLAG_DECIMAL, false),
            Cli => self.flag_op(FLAG_INTERRUPT, false),
            Clv => self.flag_op(FLAG_OVERFLOW, false),
            Sec => self.flag_op(FLAG_CARRY, true),
            Sed => self.flag_op(FLAG_DECIMAL, true),
            Sei => self.flag_op(FLAG_INTERRUPT, true),
            Cmp => {
                let value = self.operand(bus);
                self.compare(self.a, value);
                true
            }
            Cpx => {
                let value = self.operand(bus);
                self.compare(self.x, value);
                false
            }
            Cpy => {
                let value = self.operand(bus);
                self.compare(self.y, value);
                false
            }
            Dec => {
                let out = self.operand(bus).wrapping_sub(1);
                self.update_zn(out);
                self.write_back(bus, out);
                false
            }
            Dex => {
                self.x = self.x.wrapping_sub(1);
                self.update_zn(self.x);
                false
            }
            Dey => {
                self.y = self.y.wrapping_sub(1);
                self.update_zn(self.y);
                false
            }
            Eor => {
                let value = self.operand(bus);
                self.eor(value);
                true
            }
            Inc => {
                let out = self.operand(bus).wrapping_add(1);
                self.update_zn(out);
                self.write_back(bus, out);
                false
            }
            Inx => {
                self.x = self.x.wrapping_add(1);
                self.update_zn(self.x);
                false
            }
            Iny => {
                self.y = self.y.wrapping_add(1);
                self.update_zn(self.y);
                false
            }
            Jmp => {
                self.pc = self.addr;
                false
            }
            Jsr => {
                self.push_u16(bus, self.pc.wrapping_sub(1));
                self.pc = self.addr;
                false
            }
            Lda => {
                self.a = self.operand(bus);
                self.update_zn(self.a);
                true
            }
            Ldx => {
                self.x = self.operand(bus);
                self.update_zn(self.x);
                true
            }
            Ldy => {
                self.y = self.operand(bus);
                self.update_zn(self.y);
                true
            }
            Lsr => {
                let value = self.operand(bus);
                let out = self.lsr(value);
                self.write_back(bus, out);
                false
            }
            Nop => {
                if self.mode != AddressingMode::Implied {
                    let _ = self.operand(bus);
                }
                true
            }
            Ora => {
                let value = self.operand(bus);
                self.ora(value);
                true
            }
            Pha => {
                self.push(bus, self.a);
                false
            }
            Php => {
                self.push(bus, self.p | FLAG_BREAK | FLAG_UNUSED);
                false
            }
            Pla => {
                self.a = self.pop(bus);
                self.update_zn(self.a);
                false
            }
            Plp => {
                self.p = (self.pop(bus) & !FLAG_BREAK) | FLAG_UNUSED;
                false
            }
            Rol => {
                let value = self.operand(bus);
                let out = self.rol(value);
                self.write_back(bus, out);
                false
            }
            Ror => {
                let value = self.operand(bus);
                let out = self.ror(value);
                self.write_back(bus, out);
                false
            }
            Rti => {
                self.p = (self.pop(bus) & !FLAG_BREAK) | FLAG_UNUSED;
                self.pc = self.pop_u16(bus);
                false
            }
            Rts => {
                self.pc = self.pop_u16(bus).wrapping_add(1);
                false
            }
            Sbc => {
                let value = self.operand(bus);
                self.sbc(value);
                true
            }
            Sta => {
                bus.write(self.addr, self.a);
                false
            }
            Stx => {
                bus.write(self.addr, self.x);
                false
            }
            Sty => {
                bus.write(self.addr, self.y);
                false
            }
            Tax => {
                self.x = self.a;
                self.update_zn(self.x);
                false
            }
            Tay => {
                self.y = self.a;
                self.update_zn(self.y);
                false
            }
            Tsx => {
                self.x = self.sp;
                self.update_zn(self.x);
                false
            }
            Txa => {
                self.a = self.x;
                self.update_zn(self.a);
                false
            }
            Txs => {
                self.sp = self.x;
                false
            }
            Tya => {
                self.a = self.y;
                self.update_zn(self.a);
                false
            }

            Alr => {
                let value = self.operand(bus);
                self.a &= value;
                self.a = self.lsr(self.a);
                false
            }
            Anc => {
                let value = self.operand(bus);
                self.and(value);
                self.set_flag(FLAG_CARRY, (self.a & 0x80) != 0);
                false
            }
            Arr => {
                let value = self.operand(bus);
                self.a &= value;
                let carry_in = if self.get_flag(FLAG_CARRY) { 0x80 } else { 0 };
                self.a = (self.a >> 1) | carry_in;
                self.update_zn(self.a);
                self.set_flag(FLAG_CARRY, (self.a & 0x40) != 0);
                self.set_flag(FLAG_OVERFLOW, (((self.a >> 6) ^ (self.a >> 5)) & 0x01) != 0);
                false
            }
            Dcp => {
                let out = self.operand(bus).wrapping_sub(1);
                self.compare(self.a, out);
                bus.write(self.addr, out);
                false
            }
            Isb => {
                let out = self.operand(bus).wrapping_add(1);
                self.sbc(out);
                bus.write(self.addr, out);
                false
            }
            Jam => {
                self.halted = true;
                false
            }
            Las => {
                let value = self.operand(bus) & self.sp;
                self.a = value;
                self.x = value;
                self.sp = value;
                self.update_zn(value);
                true
            }
            Lax => {
                let value = self.operand(bus);
                self.a = value;
                self.x = value;
                self.update_zn(value);
                true
            }
            Lxa => {
                let value = self.operand(bus);
                self.a = (self.a | 0xEE) & value;
                self.x = self.a;
                self.update_zn(self.a);
                false
            }
            Rla => {
                let value = self.operand(bus);
                let out = self.rol(value);
                self.and(out);
                bus.write(self.addr, out);
                false
            }
            Rra => {
                let value = self.operand(bus);
                let out = self.ror(value);
                self.adc(out);
                bus.write(self.addr, out);
                false
            }
            Sax => {
                bus.write(self.addr, self.a & self.x);
                false
            }
            Sbx => {
                let value = self.operand(bus);
                let masked = self.a & self.x;
                self.set_flag(FLAG_CARRY, masked >= value);
                self.x = masked.wrapping_sub(value);
                self.update_zn(self.x);
                false
            }
            Sha => {
                self.store_high_masked(bus, self.a & self.x, true);
                false
            }
            Shx => {
                self.store_high_masked(bus, self.x, false);
                false
            }
            Shy => {
                self.store_high_masked(bus, self.y, false);
                false
            }
            Slo => {
                let value = self.operand(bus);
                let out = self.asl(value);
                self.ora(out);
                bus.write(self.addr, out);
                false
            }
            Sre => {
                let value = self.operand(bus);
                let out = self.lsr(value);
                self.eor(out);
                bus.write(self.addr, out);
                false
            }
            Tas => {
                self.sp = self.a & self.x;
                self.store_high_masked(bus, self.sp, true);
                false
            }
            Xaa => {
                let value = self.operand(bus);
                self.a = (self.a | 0xEE) & self.x & value;
                self.update_zn(self.a);
                false
            }
        }
    }

    /// Source byte for the current instruction: the accumulator for
    /// accumulator and implied modes, memory otherwise.
    fn operand<B: CpuBus>(&mut self, bus: &mut B) -> u8 {
        match self.mode {
            AddressingMode::Implied | AddressingMode::Accumulator => self.a,
            _ => bus.read(self.addr),
        }
    }

    fn write_back<B: CpuBus>(&mut self, bus: &mut B, value: u8) {
        match self.mode {
            AddressingMode::Implied | AddressingMode::Accumulator => self.a = value,
            _ => bus.write(self.addr, value),
        }
    }

    /// SHA/SHX/SHY/TAS: the stored value is ANDed with the base high byte + 1.
    /// On a page cross the high address byte is corrupted as well.
    fn store_high_masked<B: CpuBus>(&mut self, bus: &mut B, source: u8, high_from_x: bool) {
        let h = ((self.base >> 8) as u8).wrapping_add(1);
        let value = source & h;
        let addr = if self.page_crossed() {
            let high = if high_from_x { h & self.x } else { value };
            ((high as u16) << 8) | (self.addr & 0x00FF)
        } else {
            self.addr
        };
        bus.write(addr, value);
    }

    fn flag_op(&mut self, flag: u8, value: bool) -> bool {
        self.set_flag(flag, value);
        false
    }

    /// Branch cycles go straight onto the counter: one when taken, another on a page cross.
    fn branch(&mut self, condition: bool) -> bool {
        if condition {
            let target = self.pc.wrapping_add(self.rel);
            self.cycles_left += 1;
            if (target & 0xFF00) != (self.pc & 0xFF00) {
                self.cycles_left += 1;
            }
            self.pc = target;
        }
        false
    }

    fn ora(&mut self, value: u8) {
        self.a |= value;
        self.update_zn(self.a);
    }

    fn and(&mut self, value: u8) {
        self.a &= value;
        self.update_zn(self.a);
    }

    fn eor(&mut self, value: u8) {
        self.a ^= value;
        self.update_zn(self.a);
    }

    fn bit(&mut self, value: u8) {
        self.set_flag(FLAG_ZERO, (self.a & value) == 0);
        self.set_flag(FLAG_NEGATIVE, (value & 0x80) != 0);
        self.set_flag(FLAG_OVERFLOW, (value & 0x40) != 0);
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.set_flag(FLAG_CARRY, register >= value);
        self.update_zn(register.wrapping_sub(value));
    }

    fn adc(&mut self, value: u8) {
        let carry_in = self.get_flag(FLAG_CARRY) as u16;
        let result = self.a as u16 + value as u16 + carry_in;
        let out = result as u8;

        self.set_flag(FLAG_CARRY, result > 0xFF);
        self.set_flag(FLAG_OVERFLOW, ((self.a ^ out) & (value ^ out) & 0x80) != 0);

        self.a = out;
        self.update_zn(self.a);
    }

    fn sbc(&mut self, value: u8) {
        self.adc(value ^ 0xFF);
    }

    fn asl(&mut self, value: u8) -> u8 {
        self.set_flag(FLAG_CARRY, (value & 0x80) != 0);
        let result = value << 1;
        self.update_zn(result);
        result
    }

    fn lsr(&mut self, value: u8) -> u8 {
        self.set_flag(FLAG_CARRY, (value & 0x01) != 0);
        let result = value >> 1;
        self.update_zn(result);
        result
    }

    fn rol(&mut self, value: u8) -> u8 {
        let carry_in = self.get_flag(FLAG_CARRY) as u8;
        self.set_flag(FLAG_CARRY, (value & 0x80) != 0);
        let result = (value << 1) | carry_in;
        self.update_zn(result);
        result
    }

    fn ror(&mut self, value: u8) -> u8 {
        let carry_in = if self.get_flag(FLAG_CARRY) { 0x80 } else { 0 };
        self.set_flag(FLAG_CARRY, (value & 0x01) != 0);
        let result = (value >> 1) | carry_in;
        self.update_zn(result);
        result
    }

    fn fetch_byte<B: CpuBus>(&mut self, bus: &mut B) -> u8 {
        let byte = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        byte
    }

    fn fetch_word<B: CpuBus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch_byte(bus) as u16;
        let hi = self.fetch_byte(bus) as u16;
        (hi << 8) | lo
    }

    fn push<B: CpuBus>(&mut self, bus: &mut B, value: u8) {
        bus.write(STACK_BASE | self.sp as u16, value);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pop<B: CpuBus>(&mut self, bus: &mut B) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        bus.read(STACK_BASE | self.sp as u16)
    }

    fn push_u16<B: CpuBus>(&mut self, bus: &mut B, value: u16) {
        self.push(bus, (value >> 8) as u8);
        self.push(bus, value as u8);
    }

    fn pop_u16<B: CpuBus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.pop(bus) as u16;
        let hi = self.pop(bus) as u16;
        (hi << 8) | lo
    }

    pub(crate) fn set_flag(&mut self, flag: u8, value: bool) {
        if value {
            self.p |= flag;
        } else {
            self.p &= !flag;
        }
        self.p |= FLAG_UNUSED;
    }

    pub(crate) fn get_flag(&self, flag: u8) -> bool {
        (self.p & flag) != 0
    }

    fn update_zn(&mut self, value: u8) {
        self.set_flag(FLAG_ZERO, value == 0);
        self.set_flag(FLAG_NEGATIVE, (value & 0x80) != 0);
    }
}

pub(crate) fn read_u16<B: CpuBus>(bus: &mut B, addr: u16) -> u16 {
    let lo = bus.read(addr) as u16;
    let hi = bus.read(addr.wrapping_add(1)) as u16;
    (hi << 8) | lo
}

/// Indirect JMP never carries into the pointer's high byte.
pub(crate) fn read_u16_bug<B: CpuBus>(bus: &mut B, ptr: u16) -> u16 {
    let lo = bus.read(ptr) as u16;
    let hi = bus.read((ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF)) as u16;
    (hi << 8) | lo
}

fn read_zp_u16<B: CpuBus>(bus: &mut B, zp: u8) -> u16 {
    let lo = bus.read(zp as u16) as u16;
    let hi = bus.read(zp.wrapping_add(1) as u16) as u16;
    (hi << 8) | lo
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlatBus {
        mem: Vec<u8>,
    }

    impl CpuBus for FlatBus {
        fn read(&mut self, addr: u16) -> u8 {
            self.mem[addr as usize]
        }

        fn write(&mut self, addr: u16, value: u8) {
            self.mem[addr as usize] = value;
        }

        fn peek(&mut self, addr: u16) -> u8 {
            self.mem[addr as usize]
        }
    }

    /// Resets into `program` placed at `origin` and burns the reset cycles.
    fn boot_at(origin: u16, program: &[u8]) -> (Cpu, FlatBus) {
        let mut bus = FlatBus {
            mem: vec![0; 0x10000],
        };
        let start = origin as usize;
        bus.mem[start..start + program.len()].copy_from_slice(program);
        bus.mem[RESET_VECTOR as usize] = origin as u8;
        bus.mem[RESET_VECTOR as usize + 1] = (origin >> 8) as u8;
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        cpu.step_instruction(&mut bus);
        (cpu, bus)
    }

    fn boot(program: &[u8]) -> (Cpu, FlatBus) {
        boot_at(0x8000, program)
    }

    fn run(cpu: &mut Cpu, bus: &mut FlatBus, instructions: usize) -> u32 {
        (0..instructions).map(|_| cpu.step_instruction(bus)).sum()
    }

    #[test]
    fn reset_loads_vector_and_takes_seven_cycles() {
        let mut bus = FlatBus {
            mem: vec![0; 0x10000],
        };
        bus.mem[0xFFFC] = 0x34;
        bus.mem[0xFFFD] = 0x12;
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        assert_eq!(cpu.pc(), 0x1234);
        assert_eq!(cpu.sp, 0xFD);
        assert_eq!(cpu.p, FLAG_UNUSED | FLAG_INTERRUPT);
        for _ in 0..6 {
            cpu.step_clock(&mut bus);
            assert!(!cpu.instruction_complete());
        }
        cpu.step_clock(&mut bus);
        assert!(cpu.instruction_complete());
        assert_eq!(cpu.total_cycles(), 7);
        assert_eq!(cpu.pc(), 0x1234);
    }

    #[test]
    fn adc_sets_overflow_on_signed_wrap() {
        let (mut cpu, mut bus) = boot(&[0xA9, 0x50, 0x18, 0x69, 0x50]);
        run(&mut cpu, &mut bus, 3);
        assert_eq!(cpu.a, 0xA0);
        assert!(cpu.get_flag(FLAG_NEGATIVE));
        assert!(cpu.get_flag(FLAG_OVERFLOW));
        assert!(!cpu.get_flag(FLAG_CARRY));
        assert!(!cpu.get_flag(FLAG_ZERO));
    }

    #[test]
    fn sbc_borrows_below_zero() {
        let (mut cpu, mut bus) = boot(&[0xA9, 0x00, 0x38, 0xE9, 0x01]);
        run(&mut cpu, &mut bus, 3);
        assert_eq!(cpu.a, 0xFF);
        assert!(!cpu.get_flag(FLAG_CARRY));
        assert!(cpu.get_flag(FLAG_NEGATIVE));
        assert!(!cpu.get_flag(FLAG_ZERO));
    }

    #[test]
    fn branch_not_taken_costs_base_cycles() {
        // BCS with carry clear after reset.
        let (mut cpu, mut bus) = boot(&[0xB0, 0x10]);
        assert_eq!(cpu.step_instruction(&mut bus), 2);
        assert_eq!(cpu.pc(), 0x8002);
    }

    #[test]
    fn branch_taken_within_page_costs_one_more() {
        let (mut cpu, mut bus) = boot(&[0x90, 0x10]);
        assert_eq!(cpu.step_instruction(&mut bus), 3);
        assert_eq!(cpu.pc(), 0x8012);
    }

    #[test]
    fn branch_taken_across_page_costs_two_more() {
        let (mut cpu, mut bus) = boot_at(0x80F0, &[0x90, 0x20]);
        assert_eq!(cpu.step_instruction(&mut bus), 4);
        assert_eq!(cpu.pc(), 0x8112);

        let (mut cpu, mut bus) = boot(&[0x90, 0xFC]);
        assert_eq!(cpu.step_instruction(&mut bus), 4);
        assert_eq!(cpu.pc(), 0x7FFE);
    }

    #[test]
    fn indirect_jump_wraps_within_pointer_page() {
        let (mut cpu, mut bus) = boot(&[0x6C, 0xFF, 0x02]);
        bus.mem[0x02FF] = 0x34;
        bus.mem[0x0200] = 0x12;
        bus.mem[0x0300] = 0x56;
        assert_eq!(cpu.step_instruction(&mut bus), 5);
        assert_eq!(cpu.pc(), 0x1234);
    }

    #[test]
    fn zero_page_index_wraps() {
        let (mut cpu, mut bus) = boot(&[0xA2, 0x01, 0xB5, 0xFF]);
        bus.mem[0x0000] = 0x11;
        bus.mem[0x0100] = 0x22;
        run(&mut cpu, &mut bus, 2);
        assert_eq!(cpu.a, 0x11);
    }

    #[test]
    fn indexed_indirect_pointer_wraps_in_zero_page() {
        let (mut cpu, mut bus) = boot(&[0xA2, 0x01, 0xA1, 0xFE]);
        bus.mem[0x00FF] = 0x00;
        bus.mem[0x0000] = 0x03;
        bus.mem[0x0300] = 0x5A;
        run(&mut cpu, &mut bus, 1);
        assert_eq!(cpu.step_instruction(&mut bus), 6);
        assert_eq!(cpu.a, 0x5A);
    }

    #[test]
    fn page_cross_penalty_applies_to_reads_only() {
        let program = [
            0xA2, 0x01, // LDX #$01
            0xBD, 0xFF, 0x10, // LDA $10FF,X
            0xBD, 0x00, 0x10, // LDA $1000,X
            0x9D, 0xFF, 0x10, // STA $10FF,X
            0x9D, 0x00, 0x10, // STA $1000,X
            0x1E, 0xFF, 0x10, // ASL $10FF,X
        ];
        let (mut cpu, mut bus) = boot(&program);
        run(&mut cpu, &mut bus, 1);
        let cycles: Vec<u32> = (0..5).map(|_| cpu.step_instruction(&mut bus)).collect();
        assert_eq!(cycles, vec![5, 4, 5, 5, 7]);
    }

    #[test]
    fn indirect_indexed_page_cross() {
        let (mut cpu, mut bus) = boot(&[0xA0, 0x10, 0xB1, 0x40, 0xB1, 0x42]);
        bus.mem[0x0040] = 0xF8;
        bus.mem[0x0041] = 0x02;
        bus.mem[0x0042] = 0x00;
        bus.mem[0x0043] = 0x02;
        bus.mem[0x0308] = 0x77;
        bus.mem[0x0210] = 0x66;
        run(&mut cpu, &mut bus, 1);
        assert_eq!(cpu.step_instruction(&mut bus), 6);
        assert_eq!(cpu.a, 0x77);
        assert_eq!(cpu.step_instruction(&mut bus), 5);
        assert_eq!(cpu.a, 0x66);
    }

    #[test]
    fn accumulator_shift_leaves_memory_alone() {
        let (mut cpu, mut bus) = boot(&[0xA9, 0x81, 0x0A]);
        run(&mut cpu, &mut bus, 2);
        assert_eq!(cpu.a, 0x02);
        assert!(cpu.get_flag(FLAG_CARRY));
    }

    #[test]
    fn jsr_and_rts_round_trip() {
        let (mut cpu, mut bus) = boot(&[0x20, 0x00, 0x90]);
        bus.mem[0x9000] = 0x60;
        assert_eq!(cpu.step_instruction(&mut bus), 6);
        assert_eq!(cpu.pc(), 0x9000);
        assert_eq!(bus.mem[0x01FD], 0x80);
        assert_eq!(bus.mem[0x01FC], 0x02);
        assert_eq!(cpu.step_instruction(&mut bus), 6);
        assert_eq!(cpu.pc(), 0x8003);
        assert_eq!(cpu.sp, 0xFD);
    }

    #[test]
    fn php_sets_break_on_the_copy_only() {
        let (mut cpu, mut bus) = boot(&[0x08, 0xA9, 0xFF, 0x48, 0x28]);
        run(&mut cpu, &mut bus, 1);
        assert_eq!(bus.mem[0x01FD], 0x34);
        assert_eq!(cpu.p & FLAG_BREAK, 0);
        run(&mut cpu, &mut bus, 3);
        assert_eq!(cpu.p, 0xEF);
    }

    #[test]
    fn brk_and_rti() {
        let (mut cpu, mut bus) = boot(&[0x00, 0xEA, 0xEA]);
        bus.mem[BRK_VECTOR as usize] = 0x00;
        bus.mem[BRK_VECTOR as usize + 1] = 0x90;
        bus.mem[0x9000] = 0x40;
        assert_eq!(cpu.step_instruction(&mut bus), 7);
        assert_eq!(cpu.pc(), 0x9000);
        assert_eq!(bus.mem[0x01FD], 0x80);
        assert_eq!(bus.mem[0x01FC], 0x02);
        assert_eq!(bus.mem[0x01FB], 0x34);
        assert!(cpu.get_flag(FLAG_INTERRUPT));
        assert_eq!(cpu.step_instruction(&mut bus), 6);
        assert_eq!(cpu.pc(), 0x8002);
        assert_eq!(cpu.p, 0x24);
    }

    #[test]
    fn irq_respects_interrupt_disable() {
        let (mut cpu, mut bus) = boot(&[0x58, 0xEA]);
        bus.mem[0xFFFE] = 0x00;
        bus.mem[0xFFFF] = 0xA0;
        assert!(!cpu.irq(&mut bus));
        run(&mut cpu, &mut bus, 1);
        assert!(cpu.irq(&mut bus));
        assert_eq!(cpu.pc(), 0xA000);
        assert_eq!(bus.mem[0x01FB] & FLAG_BREAK, 0);
        assert_eq!(bus.mem[0x01FB] & FLAG_UNUSED, FLAG_UNUSED);
        assert_eq!(cpu.cycles_left(), 7);
        assert!(cpu.get_flag(FLAG_INTERRUPT));
    }

    #[test]
    fn nmi_ignores_interrupt_disable() {
        let (mut cpu, mut bus) = boot(&[0xEA]);
        bus.mem[0xFFFA] = 0x00;
        bus.mem[0xFFFB] = 0xB0;
        assert!(cpu.nmi(&mut bus));
        assert_eq!(cpu.pc(), 0xB000);
        assert_eq!(bus.mem[0x01FD], 0x80);
        assert_eq!(bus.mem[0x01FC], 0x00);
    }

    #[test]
    fn jam_halts_until_reset() {
        let (mut cpu, mut bus) = boot(&[0xA9, 0x01, 0x02, 0xA9, 0x02]);
        run(&mut cpu, &mut bus, 2);
        assert!(cpu.halted());
        let before = cpu.registers();
        let cycles = cpu.total_cycles();
        for _ in 0..10 {
            cpu.step_clock(&mut bus);
        }
        assert_eq!(cpu.registers(), before);
        assert_eq!(cpu.total_cycles(), cycles);
        assert!(!cpu.nmi(&mut bus));
        assert!(!cpu.irq(&mut bus));

        cpu.reset(&mut bus);
        assert!(!cpu.halted());
        assert_eq!(cpu.pc(), 0x8000);
    }

    #[test]
    fn lax_and_sax() {
        let (mut cpu, mut bus) = boot(&[0xA7, 0x10, 0xA9, 0x0F, 0x87, 0x11]);
        bus.mem[0x0010] = 0x3C;
        run(&mut cpu, &mut bus, 1);
        assert_eq!((cpu.a, cpu.x), (0x3C, 0x3C));
        run(&mut cpu, &mut bus, 2);
        assert_eq!(bus.mem[0x0011], 0x0C);
    }

    #[test]
    fn read_modify_write_combos() {
        let program = [
            0xA9, 0x01, // LDA #$01
            0x07, 0x10, // SLO $10
            0xC7, 0x11, // DCP $11
            0x38, // SEC
            0xE7, 0x12, // ISB $12
        ];
        let (mut cpu, mut bus) = boot(&program);
        bus.mem[0x0010] = 0x40;
        bus.mem[0x0011] = 0x82;
        bus.mem[0x0012] = 0x00;
        run(&mut cpu, &mut bus, 2);
        assert_eq!(bus.mem[0x0010], 0x80);
        assert_eq!(cpu.a, 0x81);
        run(&mut cpu, &mut bus, 1);
        assert_eq!(bus.mem[0x0011], 0x81);
        assert!(cpu.get_flag(FLAG_ZERO));
        assert!(cpu.get_flag(FLAG_CARRY));
        run(&mut cpu, &mut bus, 2);
        assert_eq!(bus.mem[0x0012], 0x01);
        assert_eq!(cpu.a, 0x80);
    }

    #[test]
    fn arr_sets_carry_and_overflow_from_result() {
        let (mut cpu, mut bus) = boot(&[0xA9, 0xFF, 0x38, 0x6B, 0xC0]);
        run(&mut cpu, &mut bus, 3);
        assert_eq!(cpu.a, 0xE0);
        assert!(cpu.get_flag(FLAG_CARRY));
        assert!(!cpu.get_flag(FLAG_OVERFLOW));
    }

    #[test]
    fn shx_corrupts_high_byte_on_page_cross() {
        let (mut cpu, mut bus) = boot(&[0xA2, 0x03, 0xA0, 0x01, 0x9E, 0xFF, 0x10]);
        run(&mut cpu, &mut bus, 2);
        assert_eq!(cpu.step_instruction(&mut bus), 5);
        assert_eq!(bus.mem[0x0100], 0x01);
        assert_eq!(bus.mem[0x1100], 0x00);
    }

    #[test]
    fn shx_without_page_cross_masks_value() {
        let (mut cpu, mut bus) = boot(&[0xA2, 0xFF, 0xA0, 0x00, 0x9E, 0x00, 0x10]);
        run(&mut cpu, &mut bus, 3);
        assert_eq!(bus.mem[0x1000], 0x11);
    }

    #[test]
    fn unofficial_nops_skip_operands() {
        let (mut cpu, mut bus) = boot(&[0x80, 0x12, 0x04, 0x34, 0x0C, 0x00, 0x02, 0x1A]);
        let cycles: Vec<u32> = (0..4).map(|_| cpu.step_instruction(&mut bus)).collect();
        assert_eq!(cycles, vec![2, 3, 4, 2]);
        assert_eq!(cpu.pc(), 0x8008);
    }

    /// (N, V, Z, C)
    fn nvzc(cpu: &Cpu) -> (bool, bool, bool, bool) {
        (
            cpu.get_flag(FLAG_NEGATIVE),
            cpu.get_flag(FLAG_OVERFLOW),
            cpu.get_flag(FLAG_ZERO),
            cpu.get_flag(FLAG_CARRY),
        )
    }

    #[test]
    fn rra_feeds_ror_carry_into_adc() {
        let (mut cpu, mut bus) = boot(&[0x67, 0x10]);
        bus.mem[0x0010] = 0x03;
        cpu.a = 0x10;
        assert_eq!(cpu.step_instruction(&mut bus), 5);
        assert_eq!(bus.mem[0x0010], 0x01);
        assert_eq!(cpu.a, 0x12);
        assert_eq!(nvzc(&cpu), (false, false, false, false));

        let (mut cpu, mut bus) = boot(&[0x67, 0x10]);
        bus.mem[0x0010] = 0xA0;
        cpu.a = 0x50;
        cpu.step_instruction(&mut bus);
        assert_eq!(bus.mem[0x0010], 0x50);
        assert_eq!(cpu.a, 0xA0);
        assert_eq!(nvzc(&cpu), (true, true, false, false));
    }

    #[test]
    fn rla_rotates_then_ands() {
        let (mut cpu, mut bus) = boot(&[0x27, 0x10]);
        bus.mem[0x0010] = 0x81;
        cpu.a = 0xFC;
        cpu.p |= FLAG_CARRY;
        cpu.step_instruction(&mut bus);
        assert_eq!(bus.mem[0x0010], 0x03);
        assert_eq!(cpu.a, 0x00);
        assert_eq!(nvzc(&cpu), (false, false, true, true));
    }

    #[test]
    fn sre_shifts_then_eors() {
        let (mut cpu, mut bus) = boot(&[0x47, 0x10]);
        bus.mem[0x0010] = 0x03;
        cpu.a = 0x80;
        cpu.step_instruction(&mut bus);
        assert_eq!(bus.mem[0x0010], 0x01);
        assert_eq!(cpu.a, 0x81);
        assert_eq!(nvzc(&cpu), (true, false, false, true));
    }

    #[test]
    fn alr_ands_then_shifts_accumulator() {
        let (mut cpu, mut bus) = boot(&[0x4B, 0x01]);
        cpu.a = 0xFF;
        assert_eq!(cpu.step_instruction(&mut bus), 2);
        assert_eq!(cpu.a, 0x00);
        assert_eq!(nvzc(&cpu), (false, false, true, true));
    }

    #[test]
    fn anc_copies_bit_seven_into_carry() {
        let (mut cpu, mut bus) = boot(&[0x0B, 0xF0, 0x2B, 0x7F]);
        cpu.a = 0x81;
        cpu.step_instruction(&mut bus);
        assert_eq!(cpu.a, 0x80);
        assert_eq!(nvzc(&cpu), (true, false, false, true));

        cpu.a = 0x81;
        cpu.step_instruction(&mut bus);
        assert_eq!(cpu.a, 0x01);
        assert_eq!(nvzc(&cpu), (false, false, false, false));
    }

    #[test]
    fn sbx_subtracts_without_borrow_or_overflow() {
        let (mut cpu, mut bus) = boot(&[0xCB, 0x05]);
        cpu.a = 0x0F;
        cpu.x = 0xF3;
        cpu.p |= FLAG_OVERFLOW;
        cpu.step_instruction(&mut bus);
        assert_eq!(cpu.x, 0xFE);
        assert_eq!(cpu.a, 0x0F);
        assert_eq!(nvzc(&cpu), (true, true, false, false));
    }

    #[test]
    fn lxa_and_xaa_use_the_ee_constant() {
        let (mut cpu, mut bus) = boot(&[0xAB, 0x5A, 0x8B, 0xF0]);
        cpu.a = 0x11;
        cpu.step_instruction(&mut bus);
        assert_eq!((cpu.a, cpu.x), (0x5A, 0x5A));
        assert_eq!(nvzc(&cpu), (false, false, false, false));

        cpu.a = 0x00;
        cpu.x = 0x3C;
        cpu.step_instruction(&mut bus);
        assert_eq!((cpu.a, cpu.x), (0x20, 0x3C));
        assert_eq!(nvzc(&cpu), (false, false, false, false));
    }

    #[test]
    fn las_loads_a_x_and_sp() {
        let (mut cpu, mut bus) = boot(&[0xBB, 0x00, 0x10, 0xBB, 0xFF, 0x10]);
        bus.mem[0x1005] = 0xB7;
        cpu.y = 0x05;
        cpu.sp = 0xF3;
        assert_eq!(cpu.step_instruction(&mut bus), 4);
        assert_eq!((cpu.a, cpu.x, cpu.sp), (0xB3, 0xB3, 0xB3));
        assert_eq!(nvzc(&cpu), (true, false, false, false));

        bus.mem[0x1104] = 0x00;
        assert_eq!(cpu.step_instruction(&mut bus), 5);
        assert_eq!((cpu.a, cpu.x, cpu.sp), (0x00, 0x00, 0x00));
        assert!(cpu.get_flag(FLAG_ZERO));
    }

    #[test]
    fn tas_sets_sp_and_stores_masked() {
        let (mut cpu, mut bus) = boot(&[0x9B, 0x00, 0x10]);
        cpu.a = 0xF7;
        cpu.x = 0x3E;
        cpu.y = 0x01;
        let flags = cpu.p;
        assert_eq!(cpu.step_instruction(&mut bus), 5);
        assert_eq!(cpu.sp, 0x36);
        assert_eq!(bus.mem[0x1001], 0x10);
        assert_eq!(cpu.p, flags);
    }

    #[test]
    fn tas_page_cross_corrupts_high_byte() {
        let (mut cpu, mut bus) = boot(&[0x9B, 0xFF, 0x12]);
        cpu.a = 0xF7;
        cpu.x = 0x3E;
        cpu.y = 0x01;
        assert_eq!(cpu.step_instruction(&mut bus), 5);
        assert_eq!(cpu.sp, 0x36);
        assert_eq!(bus.mem[0x1200], 0x12);
        assert_eq!(bus.mem[0x1300], 0x00);
    }

    #[test]
    fn sha_stores_a_and_x_masked() {
        let (mut cpu, mut bus) = boot(&[0x9F, 0x00, 0x10, 0x9F, 0xFF, 0x12]);
        cpu.a = 0x33;
        cpu.x = 0xFE;
        cpu.y = 0x01;
        cpu.step_instruction(&mut bus);
        assert_eq!(bus.mem[0x1001], 0x10);

        cpu.step_instruction(&mut bus);
        assert_eq!(bus.mem[0x1200], 0x12);
        assert_eq!(bus.mem[0x1300], 0x00);
        assert_eq!((cpu.a, cpu.x), (0x33, 0xFE));
    }

    #[test]
    fn sha_indirect_indexed_page_cross() {
        let (mut cpu, mut bus) = boot(&[0x93, 0x20]);
        bus.mem[0x0020] = 0xFF;
        bus.mem[0x0021] = 0x12;
        cpu.a = 0x33;
        cpu.x = 0xFE;
        cpu.y = 0x01;
        assert_eq!(cpu.step_instruction(&mut bus), 6);
        assert_eq!(bus.mem[0x1200], 0x12);
        assert_eq!(bus.mem[0x1300], 0x00);
    }

    #[test]
    fn shy_masks_and_corrupts_like_shx() {
        let (mut cpu, mut bus) = boot(&[0x9C, 0x00, 0x10, 0x9C, 0xFF, 0x10]);
        cpu.x = 0x01;
        cpu.y = 0xFF;
        cpu.step_instruction(&mut bus);
        assert_eq!(bus.mem[0x1001], 0x11);

        cpu.y = 0x07;
        assert_eq!(cpu.step_instruction(&mut bus), 5);
        assert_eq!(bus.mem[0x0100], 0x01);
        assert_eq!(bus.mem[0x1100], 0x00);
    }

    #[test]
    fn registers_round_trip_through_serde() {
        let regs = Registers {
            pc: 0xC000,
            a: 1,
            x: 2,
            y: 3,
            p: 0x24,
            sp: 0xFD,
        };
        let json = serde_json::to_string(&regs).unwrap();
        let back: Registers = serde_json::from_str(&json).unwrap();
        assert_eq!(back, regs);

        let mut cpu = Cpu::new();
        cpu.set_registers(Registers { p: 0x00, ..regs });
        assert_eq!(cpu.registers().p, FLAG_UNUSED);
    }
}
