//! Static decode table for the 6502 instruction set, unofficial opcodes included.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Relative,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndexedIndirect,
    IndirectIndexed,
}

impl AddressingMode {
    /// Operand bytes following the opcode.
    pub fn operand_len(self) -> u16 {
        match self {
            Self::Implied | Self::Accumulator => 0,
            Self::Immediate
            | Self::ZeroPage
            | Self::ZeroPageX
            | Self::ZeroPageY
            | Self::Relative
            | Self::IndexedIndirect
            | Self::IndirectIndexed => 1,
            Self::Absolute | Self::AbsoluteX | Self::AbsoluteY | Self::Indirect => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Adc,
    And,
    Asl,
    Bcc,
    Bcs,
    Beq,
    Bit,
    Bmi,
    Bne,
    Bpl,
    Brk,
    Bvc,
    Bvs,
    Clc,
    Cld,
    Cli,
    Clv,
    Cmp,
    Cpx,
    Cpy,
    Dec,
    Dex,
    Dey,
    Eor,
    Inc,
    Inx,
    Iny,
    Jmp,
    Jsr,
    Lda,
    Ldx,
    Ldy,
    Lsr,
    Nop,
    Ora,
    Pha,
    Php,
    Pla,
    Plp,
    Rol,
    Ror,
    Rti,
    Rts,
    Sbc,
    Sec,
    Sed,
    Sei,
    Sta,
    Stx,
    Sty,
    Tax,
    Tay,
    Tsx,
    Txa,
    Txs,
    Tya,
    // Unofficial.
    Alr,
    Anc,
    Arr,
    Dcp,
    Isb,
    Jam,
    Las,
    Lax,
    Lxa,
    Rla,
    Rra,
    Sax,
    Sbx,
    Sha,
    Shx,
    Shy,
    Slo,
    Sre,
    Tas,
    Xaa,
}

impl Instruction {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Adc => "ADC",
            Self::And => "AND",
            Self::Asl => "ASL",
            Self::Bcc => "BCC",
            Self::Bcs => "BCS",
            Self::Beq => "BEQ",
            Self::Bit => "BIT",
            Self::Bmi => "BMI",
            Self::Bne => "BNE",
            Self::Bpl => "BPL",
            Self::Brk => "BRK",
            Self::Bvc => "BVC",
            Self::Bvs => "BVS",
            Self::Clc => "CLC",
            Self::Cld => "CLD",
            Self::Cli => "CLI",
            Self::Clv => "CLV",
            Self::Cmp => "CMP",
            Self::Cpx => "CPX",
            Self::Cpy => "CPY",
            Self::Dec => "DEC",
            Self::Dex => "DEX",
            Self::Dey => "DEY",
            Self::Eor => "EOR",
            Self::Inc => "INC",
            Self::Inx => "INX",
            Self::Iny => "INY",
            Self::Jmp => "JMP",
            Self::Jsr => "JSR",
            Self::Lda => "LDA",
            Self::Ldx => "LDX",
            Self::Ldy => "LDY",
            Self::Lsr => "LSR",
            Self::Nop => "NOP",
            Self::Ora => "ORA",
            Self::Pha => "PHA",
            Self::Php => "PHP",
            Self::Pla => "PLA",
            Self::Plp => "PLP",
            Self::Rol => "ROL",
            Self::Ror => "ROR",
            Self::Rti => "RTI",
            Self::Rts => "RTS",
            Self::Sbc => "SBC",
            Self::Sec => "SEC",
            Self::Sed => "SED",
            Self::Sei => "SEI",
            Self::Sta => "STA",
            Self::Stx => "STX",
            Self::Sty => "STY",
            Self::Tax => "TAX",
            Self::Tay => "TAY",
            Self::Tsx => "TSX",
            Self::Txa => "TXA",
            Self::Txs => "TXS",
            Self::Tya => "TYA",
            Self::Alr => "ALR",
            Self::Anc => "ANC",
            Self::Arr => "ARR",
            Self::Dcp => "DCP",
            Self::Isb => "ISB",
            Self::Jam => "JAM",
            Self::Las => "LAS",
            Self::Lax => "LAX",
            Self::Lxa => "LXA",
            Self::Rla => "RLA",
            Self::Rra => "RRA",
            Self::Sax => "SAX",
            Self::Sbx => "SBX",
            Self::Sha => "SHA",
            Self::Shx => "SHX",
            Self::Shy => "SHY",
            Self::Slo => "SLO",
            Self::Sre => "SRE",
            Self::Tas => "TAS",
            Self::Xaa => "XAA",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub instruction: Instruction,
    pub mode: AddressingMode,
    pub cycles: u8,
    pub official: bool,
}

impl Opcode {
    pub fn byte_len(&self) -> u16 {
        1 + self.mode.operand_len()
    }
}

pub fn decode(opcode: u8) -> &'static Opcode {
    &OPCODES[opcode as usize]
}

const fn op(instruction: Instruction, mode: AddressingMode, cycles: u8) -> Opcode {
    Opcode {
        instruction,
        mode,
        cycles,
        official: true,
    }
}

const fn ill(instruction: Instruction, mode: AddressingMode, cycles: u8) -> Opcode {
    Opcode {
        instruction,
        mode,
        cycles,
        official: false,
    }
}

const IMP: AddressingMode = AddressingMode::Implied;
const ACC: AddressingMode = AddressingMode::Accumulator;
const IMM: AddressingMode = AddressingMode::Immediate;
const ZP: AddressingMode = AddressingMode::ZeroPage;
const ZPX: AddressingMode = AddressingMode::ZeroPageX;
const ZPY: AddressingMode = AddressingMode::ZeroPageY;
const REL: AddressingMode = AddressingMode::Relative;
const ABS: AddressingMode = AddressingMode::Absolute;
const ABX: AddressingMode = AddressingMode::AbsoluteX;
const ABY: AddressingMode = AddressingMode::AbsoluteY;
const IND: AddressingMode = AddressingMode::Indirect;
const IZX: AddressingMode = AddressingMode::IndexedIndirect;
const IZY: AddressingMode = AddressingMode::IndirectIndexed;

const JAM: Opcode = ill(Instruction::Jam, IMP, 2);

use Instruction::*;

#[rustfmt::skip]
pub static OPCODES: [Opcode; 256] = [
    // 0x00
    op(Brk, IMP, 7), op(Ora, IZX, 6), JAM,            ill(Slo, IZX, 8),
    ill(Nop, ZP, 3), op(Ora, ZP, 3),  op(Asl, ZP, 5), ill(Slo, ZP, 5),
    op(Php, IMP, 3), op(Ora, IMM, 2), op(Asl, ACC, 2), ill(Anc, IMM, 2),
    ill(Nop, ABS, 4), op(Ora, ABS, 4), op(Asl, ABS, 6), ill(Slo, ABS, 6),
    // 0x10
    op(Bpl, REL, 2), op(Ora, IZY, 5), JAM,             ill(Slo, IZY, 8),
    ill(Nop, ZPX, 4), op(Ora, ZPX, 4), op(Asl, ZPX, 6), ill(Slo, ZPX, 6),
    op(Clc, IMP, 2), op(Ora, ABY, 4), ill(Nop, IMP, 2), ill(Slo, ABY, 7),
    ill(Nop, ABX, 4), op(Ora, ABX, 4), op(Asl, ABX, 7), ill(Slo, ABX, 7),
    // 0x20
    op(Jsr, ABS, 6), op(And, IZX, 6), JAM,             ill(Rla, IZX, 8),
    op(Bit, ZP, 3),  op(And, ZP, 3),  op(Rol, ZP, 5),  ill(Rla, ZP, 5),
    op(Plp, IMP, 4), op(And, IMM, 2), op(Rol, ACC, 2), ill(Anc, IMM, 2),
    op(Bit, ABS, 4), op(And, ABS, 4), op(Rol, ABS, 6), ill(Rla, ABS, 6),
    // 0x30
    op(Bmi, REL, 2), op(And, IZY, 5), JAM,             ill(Rla, IZY, 8),
    ill(Nop, ZPX, 4), op(And, ZPX, 4), op(Rol, ZPX, 6), ill(Rla, ZPX, 6),
    op(Sec, IMP, 2), op(And, ABY, 4), ill(Nop, IMP, 2), ill(Rla, ABY, 7),
    ill(Nop, ABX, 4), op(And, ABX, 4), op(Rol, ABX, 7), ill(Rla, ABX, 7),
    // 0x40
    op(Rti, IMP, 6), op(Eor, IZX, 6), JAM,             ill(Sre, IZX, 8),
    ill(Nop, ZP, 3), op(Eor, ZP, 3),  op(Lsr, ZP, 5),  ill(Sre, ZP, 5),
    op(Pha, IMP, 3), op(Eor, IMM, 2), op(Lsr, ACC, 2), ill(Alr, IMM, 2),
    op(Jmp, ABS, 3), op(Eor, ABS, 4), op(Lsr, ABS, 6), ill(Sre, ABS, 6),
    // 0x50
    op(Bvc, REL, 2), op(Eor, IZY, 5), JAM,             ill(Sre, IZY, 8),
    ill(Nop, ZPX, 4), op(Eor, ZPX, 4), op(Lsr, ZPX, 6), ill(Sre, ZPX, 6),
    op(Cli, IMP, 2), op(Eor, ABY, 4), ill(Nop, IMP, 2), ill(Sre, ABY, 7),
    ill(Nop, ABX, 4), op(Eor, ABX, 4), op(Lsr, ABX, 7), ill(Sre, ABX, 7),
    // 0x60
    op(Rts, IMP, 6), op(Adc, IZX, 6), JAM,             ill(Rra, IZX, 8),
    ill(Nop, ZP, 3), op(Adc, ZP, 3),  op(Ror, ZP, 5),  ill(Rra, ZP, 5),
    op(Pla, IMP, 4), op(Adc, IMM, 2), op(Ror, ACC, 2), ill(Arr, IMM, 2),
    op(Jmp, IND, 5), op(Adc, ABS, 4), op(Ror, ABS, 6), ill(Rra, ABS, 6),
    // 0x70
    op(Bvs, REL, 2), op(Adc, IZY, 5), JAM,             ill(Rra, IZY, 8),
    ill(Nop, ZPX, 4), op(Adc, ZPX, 4), op(Ror, ZPX, 6), ill(Rra, ZPX, 6),
    op(Sei, IMP, 2), op(Adc, ABY, 4), ill(Nop, IMP, 2), ill(Rra, ABY, 7),
    ill(Nop, ABX, 4), op(Adc, ABX, 4), op(Ror, ABX, 7), ill(Rra, ABX, 7),
    // 0x80
    ill(Nop, IMM, 2), op(Sta, IZX, 6), ill(Nop, IMM, 2), ill(Sax, IZX, 6),
    op(Sty, ZP, 3),  op(Sta, ZP, 3),  op(Stx, ZP, 3),  ill(Sax, ZP, 3),
    op(Dey, IMP, 2), ill(Nop, IMM, 2), op(Txa, IMP, 2), ill(Xaa, IMM, 2),
    op(Sty, ABS, 4), op(Sta, ABS, 4), op(Stx, ABS, 4), ill(Sax, ABS, 4),
    // 0x90
    op(Bcc, REL, 2), op(Sta, IZY, 6), JAM,             ill(Sha, IZY, 6),
    op(Sty, ZPX, 4), op(Sta, ZPX, 4), op(Stx, ZPY, 4), ill(Sax, ZPY, 4),
    op(Tya, IMP, 2), op(Sta, ABY, 5), op(Txs, IMP, 2), ill(Tas, ABY, 5),
    ill(Shy, ABX, 5), op(Sta, ABX, 5), ill(Shx, ABY, 5), ill(Sha, ABY, 5),
    // 0xA0
    op(Ldy, IMM, 2), op(Lda, IZX, 6), op(Ldx, IMM, 2), ill(Lax, IZX, 6),
    op(Ldy, ZP, 3),  op(Lda, ZP, 3),  op(Ldx, ZP, 3),  ill(Lax, ZP, 3),
    op(Tay, IMP, 2), op(Lda, IMM, 2), op(Tax, IMP, 2), ill(Lxa, IMM, 2),
    op(Ldy, ABS, 4), op(Lda, ABS, 4), op(Ldx, ABS, 4), ill(Lax, ABS, 4),
    // 0xB0
    op(Bcs, REL, 2), op(Lda, IZY, 5), JAM,             ill(Lax, IZY, 5),
    op(Ldy, ZPX, 4), op(Lda, ZPX, 4), op(Ldx, ZPY, 4), ill(Lax, ZPY, 4),
    op(Clv, IMP, 2), op(Lda, ABY, 4), op(Tsx, IMP, 2), ill(Las, ABY, 4),
    op(Ldy, ABX, 4), op(Lda, ABX, 4), op(Ldx, ABY, 4), ill(Lax, ABY, 4),
    // 0xC0
    op(Cpy, IMM, 2), op(Cmp, IZX, 6), ill(Nop, IMM, 2), ill(Dcp, IZX, 8),
    op(Cpy, ZP, 3),  op(Cmp, ZP, 3),  op(Dec, ZP, 5),  ill(Dcp, ZP, 5),
    op(Iny, IMP, 2), op(Cmp, IMM, 2), op(Dex, IMP, 2), ill(Sbx, IMM, 2),
    op(Cpy, ABS, 4), op(Cmp, ABS, 4), op(Dec, ABS, 6), ill(Dcp, ABS, 6),
    // 0xD0
    op(Bne, REL, 2), op(Cmp, IZY, 5), JAM,             ill(Dcp, IZY, 8),
    ill(Nop, ZPX, 4), op(Cmp, ZPX, 4), op(Dec, ZPX, 6), ill(Dcp, ZPX, 6),
    op(Cld, IMP, 2), op(Cmp, ABY, 4), ill(Nop, IMP, 2), ill(Dcp, ABY, 7),
    ill(Nop, ABX, 4), op(Cmp, ABX, 4), op(Dec, ABX, 7), ill(Dcp, ABX, 7),
    // 0xE0
    op(Cpx, IMM, 2), op(Sbc, IZX, 6), ill(Nop, IMM, 2), ill(Isb, IZX, 8),
    op(Cpx, ZP, 3),  op(Sbc, ZP, 3),  op(Inc, ZP, 5),  ill(Isb, ZP, 5),
    op(Inx, IMP, 2), op(Sbc, IMM, 2), op(Nop, IMP, 2), ill(Sbc, IMM, 2),
    op(Cpx, ABS, 4), op(Sbc, ABS, 4), op(Inc, ABS, 6), ill(Isb, ABS, 6),
    // 0xF0
    op(Beq, REL, 2), op(Sbc, IZY, 5), JAM,             ill(Isb, IZY, 8),
    ill(Nop, ZPX, 4), op(Sbc, ZPX, 4), op(Inc, ZPX, 6), ill(Isb, ZPX, 6),
    op(Sed, IMP, 2), op(Sbc, ABY, 4), ill(Nop, IMP, 2), ill(Isb, ABY, 7),
    ill(Nop, ABX, 4), op(Sbc, ABX, 4), op(Inc, ABX, 7), ill(Isb, ABX, 7),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn official_opcode_count() {
        assert_eq!(OPCODES.iter().filter(|op| op.official).count(), 151);
    }

    #[test]
    fn halt_opcodes() {
        let jams: Vec<usize> = (0..256)
            .filter(|&i| OPCODES[i].instruction == Instruction::Jam)
            .collect();
        assert_eq!(
            jams,
            vec![0x02, 0x12, 0x22, 0x32, 0x42, 0x52, 0x62, 0x72, 0x92, 0xB2, 0xD2, 0xF2]
        );
    }

    #[test]
    fn spot_check_decodes() {
        assert_eq!(decode(0x6C).mode, AddressingMode::Indirect);
        assert_eq!(decode(0xB1).instruction, Instruction::Lda);
        assert_eq!(decode(0xB1).mode, AddressingMode::IndirectIndexed);
        assert_eq!(decode(0x9E).instruction, Instruction::Shx);
        assert_eq!(decode(0xEB).instruction, Instruction::Sbc);
        assert!(!decode(0xEB).official);
        assert!(decode(0xEA).official);
        assert_eq!(decode(0x20).byte_len(), 3);
        assert_eq!(decode(0x0A).byte_len(), 1);
    }
}
