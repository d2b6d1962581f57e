//! nestest-style execution trace lines.
//!
//! A line shows the state *before* the instruction at PC runs:
//!
//! ```text
//! C000  4C F5 C5  JMP $C5F5                       A:00 X:00 Y:00 P:24 SP:FD CYC:7
//! ```
//!
//! Unofficial opcodes carry a `*` directly in front of the mnemonic.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::bus::CpuBus;
use super::cpu::Cpu;
use super::opcodes::{self, AddressingMode, Instruction};

pub const STACK_ROWS: usize = 8;
pub const STACK_ROW_BYTES: usize = 32;

pub fn format_line<B: CpuBus>(cpu: &Cpu, bus: &mut B) -> String {
    let regs = cpu.registers();
    let pc = regs.pc;
    let op = opcodes::decode(bus.peek(pc));

    let bytes = (0..op.byte_len())
        .map(|i| format!("{:02X}", bus.peek(pc.wrapping_add(i))))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "{:04X}  {:<8} {}{:<32}A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X} CYC:{}",
        pc,
        bytes,
        if op.official { ' ' } else { '*' },
        disassemble(cpu, bus, pc),
        regs.a,
        regs.x,
        regs.y,
        regs.p,
        regs.sp,
        cpu.total_cycles()
    )
}

/// Mnemonic plus operand for the instruction at `pc`, annotated with the
/// effective address and the value currently stored there.
pub fn disassemble<B: CpuBus>(cpu: &Cpu, bus: &mut B, pc: u16) -> String {
    let op = opcodes::decode(bus.peek(pc));
    let name = op.instruction.mnemonic();
    let regs = cpu.registers();
    let b1 = bus.peek(pc.wrapping_add(1));
    let word = peek_u16(bus, pc.wrapping_add(1));

    match op.mode {
        AddressingMode::Implied => name.to_string(),
        AddressingMode::Accumulator => format!("{name} A"),
        AddressingMode::Immediate => format!("{name} #${b1:02X}"),
        AddressingMode::ZeroPage => {
            format!("{name} ${b1:02X} = {:02X}", bus.peek(b1 as u16))
        }
        AddressingMode::ZeroPageX | AddressingMode::ZeroPageY => {
            let (reg, index) = if op.mode == AddressingMode::ZeroPageX {
                ('X', regs.x)
            } else {
                ('Y', regs.y)
            };
            let addr = b1.wrapping_add(index);
            format!(
                "{name} ${b1:02X},{reg} @ {addr:02X} = {:02X}",
                bus.peek(addr as u16)
            )
        }
        AddressingMode::Relative => {
            let target = pc.wrapping_add(2).wrapping_add(b1 as i8 as i16 as u16);
            format!("{name} ${target:04X}")
        }
        AddressingMode::Absolute => {
            if matches!(op.instruction, Instruction::Jmp | Instruction::Jsr) {
                format!("{name} ${word:04X}")
            } else {
                format!("{name} ${word:04X} = {:02X}", bus.peek(word))
            }
        }
        AddressingMode::AbsoluteX | AddressingMode::AbsoluteY => {
            let (reg, index) = if op.mode == AddressingMode::AbsoluteX {
                ('X', regs.x)
            } else {
                ('Y', regs.y)
            };
            let addr = word.wrapping_add(index as u16);
            format!(
                "{name} ${word:04X},{reg} @ {addr:04X} = {:02X}",
                bus.peek(addr)
            )
        }
        AddressingMode::Indirect => {
            let lo = bus.peek(word) as u16;
            let hi = bus.peek((word & 0xFF00) | (word.wrapping_add(1) & 0x00FF)) as u16;
            format!("{name} (${word:04X}) = {:04X}", (hi << 8) | lo)
        }
        AddressingMode::IndexedIndirect => {
            let zp = b1.wrapping_add(regs.x);
            let addr = peek_zp_u16(bus, zp);
            format!(
                "{name} (${b1:02X},X) @ {zp:02X} = {addr:04X} = {:02X}",
                bus.peek(addr)
            )
        }
        AddressingMode::IndirectIndexed => {
            let base = peek_zp_u16(bus, b1);
            let addr = base.wrapping_add(regs.y as u16);
            format!(
                "{name} (${b1:02X}),Y = {base:04X} @ {addr:04X} = {:02X}",
                bus.peek(addr)
            )
        }
    }
}

fn peek_u16<B: CpuBus>(bus: &mut B, addr: u16) -> u16 {
    let lo = bus.peek(addr) as u16;
    let hi = bus.peek(addr.wrapping_add(1)) as u16;
    (hi << 8) | lo
}

fn peek_zp_u16<B: CpuBus>(bus: &mut B, zp: u8) -> u16 {
    let lo = bus.peek(zp as u16) as u16;
    let hi = bus.peek(zp.wrapping_add(1) as u16) as u16;
    (hi << 8) | lo
}

/// Register and cycle fields recovered from a trace line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceState {
    pub pc: u16,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub p: u8,
    pub sp: u8,
    pub cycles: u64,
}

impl TraceState {
    pub fn from_cpu(cpu: &Cpu) -> Self {
        let regs = cpu.registers();
        Self {
            pc: regs.pc,
            a: regs.a,
            x: regs.x,
            y: regs.y,
            p: regs.p,
            sp: regs.sp,
            cycles: cpu.total_cycles(),
        }
    }

    /// Parses our own trace lines as well as reference nestest logs, whose
    /// extra `PPU:` column is skipped.
    pub fn parse(line: &str) -> Result<Self> {
        let pc_text = line.get(0..4).context("trace line is shorter than a PC field")?;
        let pc = u16::from_str_radix(pc_text, 16)
            .with_context(|| format!("invalid PC field: {pc_text}"))?;
        let regs_at = line
            .find("A:")
            .with_context(|| format!("no register block in: {line}"))?;

        let (mut a, mut x, mut y, mut p, mut sp, mut cycles) = (None, None, None, None, None, None);
        for field in line[regs_at..].split_whitespace() {
            let Some((key, value)) = field.split_once(':') else {
                continue;
            };
            match key {
                "A" => a = Some(parse_hex_u8(key, value)?),
                "X" => x = Some(parse_hex_u8(key, value)?),
                "Y" => y = Some(parse_hex_u8(key, value)?),
                "P" => p = Some(parse_hex_u8(key, value)?),
                "SP" => sp = Some(parse_hex_u8(key, value)?),
                "CYC" => {
                    cycles = Some(
                        value
                            .parse::<u64>()
                            .with_context(|| format!("invalid CYC field: {value}"))?,
                    )
                }
                _ => {}
            }
        }

        Ok(Self {
            pc,
            a: a.context("missing A field")?,
            x: x.context("missing X field")?,
            y: y.context("missing Y field")?,
            p: p.context("missing P field")?,
            sp: sp.context("missing SP field")?,
            cycles: cycles.context("missing CYC field")?,
        })
    }

    /// Names of the fields that differ from `expected`, rendered `field got/expected`.
    pub fn mismatches(&self, expected: &TraceState) -> Vec<String> {
        let mut out = Vec::new();
        if self.pc != expected.pc {
            out.push(format!("PC {:04X}/{:04X}", self.pc, expected.pc));
        }
        let bytes = [
            ("A", self.a, expected.a),
            ("X", self.x, expected.x),
            ("Y", self.y, expected.y),
            ("P", self.p, expected.p),
            ("SP", self.sp, expected.sp),
        ];
        for (name, got, want) in bytes {
            if got != want {
                out.push(format!("{name} {got:02X}/{want:02X}"));
            }
        }
        if self.cycles != expected.cycles {
            out.push(format!("CYC {}/{}", self.cycles, expected.cycles));
        }
        out
    }
}

fn parse_hex_u8(key: &str, value: &str) -> Result<u8> {
    u8::from_str_radix(value, 16).with_context(|| format!("invalid {key} field: {value}"))
}

/// Hex dump of the stack page.
pub fn dump_stack<B: CpuBus>(bus: &mut B) -> String {
    let mut out = String::new();
    for row in 0..STACK_ROWS {
        let start = 0x0100 + (row * STACK_ROW_BYTES) as u16;
        out.push_str(&format!("{start:04X}:"));
        for i in 0..STACK_ROW_BYTES as u16 {
            out.push_str(&format!(" {:02X}", bus.peek(start + i)));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nes::cpu::Registers;

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

    fn setup(pc: u16, code: &[u8]) -> (Cpu, FlatBus) {
        let mut bus = FlatBus {
            mem: vec![0; 0x10000],
        };
        bus.mem[pc as usize..pc as usize + code.len()].copy_from_slice(code);
        let mut cpu = Cpu::new();
        cpu.set_registers(Registers {
            pc,
            a: 0,
            x: 0,
            y: 0,
            p: 0x24,
            sp: 0xFD,
        });
        cpu.set_total_cycles(7);
        (cpu, bus)
    }

    #[test]
    fn jump_line_matches_reference_layout() {
        let (cpu, mut bus) = setup(0xC000, &[0x4C, 0xF5, 0xC5]);
        assert_eq!(
            format_line(&cpu, &mut bus),
            "C000  4C F5 C5  JMP $C5F5                       A:00 X:00 Y:00 P:24 SP:FD CYC:7"
        );
    }

    #[test]
    fn unofficial_opcodes_are_starred() {
        let (cpu, mut bus) = setup(0xC6BD, &[0x04, 0xA9]);
        bus.mem[0x00A9] = 0x00;
        let line = format_line(&cpu, &mut bus);
        assert!(line.starts_with("C6BD  04 A9    *NOP $A9 = 00"));
        assert_eq!(line.find("A:"), Some(48));
    }

    #[test]
    fn operand_annotations() {
        let (mut cpu, mut bus) = setup(0x0400, &[0xA1, 0x80]);
        cpu.set_registers(Registers {
            x: 0x02,
            y: 0x10,
            ..cpu.registers()
        });
        bus.mem[0x0082] = 0x00;
        bus.mem[0x0083] = 0x02;
        bus.mem[0x0200] = 0x5A;
        assert_eq!(
            disassemble(&cpu, &mut bus, 0x0400),
            "LDA ($80,X) @ 82 = 0200 = 5A"
        );

        bus.mem[0x0410..0x0412].copy_from_slice(&[0xB1, 0x89]);
        bus.mem[0x0089] = 0xF0;
        bus.mem[0x008A] = 0x02;
        bus.mem[0x0300] = 0x89;
        assert_eq!(
            disassemble(&cpu, &mut bus, 0x0410),
            "LDA ($89),Y = 02F0 @ 0300 = 89"
        );

        bus.mem[0x0420..0x0423].copy_from_slice(&[0x6C, 0xFF, 0x02]);
        bus.mem[0x02FF] = 0x7E;
        bus.mem[0x0200] = 0xDB;
        assert_eq!(disassemble(&cpu, &mut bus, 0x0420), "JMP ($02FF) = DB7E");

        bus.mem[0x0430..0x0432].copy_from_slice(&[0xB0, 0xFE]);
        assert_eq!(disassemble(&cpu, &mut bus, 0x0430), "BCS $0430");

        bus.mem[0x0440] = 0x4A;
        assert_eq!(disassemble(&cpu, &mut bus, 0x0440), "LSR A");

        bus.mem[0x0450..0x0452].copy_from_slice(&[0xB6, 0xFF]);
        assert_eq!(disassemble(&cpu, &mut bus, 0x0450), "LDX $FF,Y @ 0F = 00");

        bus.mem[0x0460..0x0463].copy_from_slice(&[0x9D, 0xF8, 0x02]);
        assert_eq!(
            disassemble(&cpu, &mut bus, 0x0460),
            "STA $02F8,X @ 02FA = 00"
        );
    }

    #[test]
    fn parses_reference_lines_with_ppu_column() {
        let line = "C72F  B0 04     BCS $C735                       A:00 X:00 Y:00 P:27 SP:FB PPU:  0, 30 CYC:10";
        let state = TraceState::parse(line).unwrap();
        assert_eq!(
            state,
            TraceState {
                pc: 0xC72F,
                a: 0,
                x: 0,
                y: 0,
                p: 0x27,
                sp: 0xFB,
                cycles: 10,
            }
        );
    }

    #[test]
    fn parses_own_lines() {
        let (cpu, mut bus) = setup(0xC000, &[0xA9, 0x10]);
        let state = TraceState::parse(&format_line(&cpu, &mut bus)).unwrap();
        assert_eq!(state, TraceState::from_cpu(&cpu));
    }

    #[test]
    fn rejects_lines_without_registers() {
        assert!(TraceState::parse("C000  EA        NOP").is_err());
        assert!(TraceState::parse("ZZZZ  A:00 X:00 Y:00 P:24 SP:FD CYC:7").is_err());
    }

    #[test]
    fn mismatches_name_the_fields() {
        let got = TraceState {
            pc: 0xC000,
            a: 1,
            cycles: 9,
            ..TraceState::default()
        };
        let want = TraceState {
            pc: 0xC000,
            a: 2,
            cycles: 7,
            ..TraceState::default()
        };
        assert_eq!(got.mismatches(&want), vec!["A 01/02", "CYC 9/7"]);
        assert!(got.mismatches(&got).is_empty());
    }

    #[test]
    fn stack_dump_shape() {
        let (_, mut bus) = setup(0xC000, &[]);
        bus.mem[0x01FF] = 0xAB;
        let dump = dump_stack(&mut bus);
        let rows: Vec<&str> = dump.lines().collect();
        assert_eq!(rows.len(), STACK_ROWS);
        assert!(rows[0].starts_with("0100: 00 00"));
        assert!(rows[7].starts_with("01E0:"));
        assert!(rows[7].ends_with("AB"));
    }
}
