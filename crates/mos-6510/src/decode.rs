//! Opcode decode tables.
//!
//! Every opcode, legal or not, carries an addressing mode tag. The tables
//! here drive disassembly and inspection; the executor itself dispatches
//! directly on the opcode byte.

/// 6510 addressing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    /// No operand (or the accumulator).
    Implied,
    /// Operand is the next byte.
    Immediate,
    /// 8-bit zero page address.
    ZeroPage,
    /// Zero page address indexed by X (wraps in page zero).
    ZeroPageX,
    /// Zero page address indexed by Y (wraps in page zero).
    ZeroPageY,
    /// 16-bit absolute address.
    Absolute,
    /// Absolute address indexed by X.
    AbsoluteX,
    /// Absolute address indexed by Y.
    AbsoluteY,
    /// Indirect jump target (JMP only, with the page-wrap bug).
    Indirect,
    /// ($zp,X): pointer in page zero, indexed before dereference.
    IndexedIndirect,
    /// ($zp),Y: pointer in page zero, indexed after dereference.
    IndirectIndexed,
    /// Signed 8-bit branch displacement.
    Relative,
}

/// Addressing mode for an opcode.
#[must_use]
pub const fn addressing_mode(opcode: u8) -> AddressingMode {
    use AddressingMode::*;
    match opcode {
        // Branches
        0x10 | 0x30 | 0x50 | 0x70 | 0x90 | 0xB0 | 0xD0 | 0xF0 => Relative,

        // Column 1/3: ($zp,X) and ($zp),Y pairs
        0x01 | 0x21 | 0x41 | 0x61 | 0x81 | 0xA1 | 0xC1 | 0xE1 => IndexedIndirect,
        0x03 | 0x23 | 0x43 | 0x63 | 0x83 | 0xA3 | 0xC3 | 0xE3 => IndexedIndirect,
        0x11 | 0x31 | 0x51 | 0x71 | 0x91 | 0xB1 | 0xD1 | 0xF1 => IndirectIndexed,
        0x13 | 0x33 | 0x53 | 0x73 | 0x93 | 0xB3 | 0xD3 | 0xF3 => IndirectIndexed,

        // Immediate operands, including the immediate-only illegals
        0x09 | 0x29 | 0x49 | 0x69 | 0xA9 | 0xC9 | 0xE9 => Immediate,
        0xA0 | 0xA2 | 0xC0 | 0xE0 => Immediate,
        0x80 | 0x82 | 0x89 | 0xC2 | 0xE2 => Immediate,
        0x0B | 0x2B | 0x4B | 0x6B | 0x8B | 0xAB | 0xCB | 0xEB => Immediate,

        // Zero page
        0x04 | 0x05 | 0x06 | 0x07 | 0x24 | 0x25 | 0x26 | 0x27 => ZeroPage,
        0x44 | 0x45 | 0x46 | 0x47 | 0x64 | 0x65 | 0x66 | 0x67 => ZeroPage,
        0x84 | 0x85 | 0x86 | 0x87 | 0xA4 | 0xA5 | 0xA6 | 0xA7 => ZeroPage,
        0xC4 | 0xC5 | 0xC6 | 0xC7 | 0xE4 | 0xE5 | 0xE6 | 0xE7 => ZeroPage,

        // Zero page,X (plus the two zero page,Y stores/loads)
        0x14 | 0x15 | 0x16 | 0x17 | 0x34 | 0x35 | 0x36 | 0x37 => ZeroPageX,
        0x54 | 0x55 | 0x56 | 0x57 | 0x74 | 0x75 | 0x76 | 0x77 => ZeroPageX,
        0x94 | 0x95 | 0xB4 | 0xB5 => ZeroPageX,
        0xD4 | 0xD5 | 0xD6 | 0xD7 | 0xF4 | 0xF5 | 0xF6 | 0xF7 => ZeroPageX,
        0x96 | 0x97 | 0xB6 | 0xB7 => ZeroPageY,

        // Absolute
        0x0C | 0x0D | 0x0E | 0x0F | 0x20 | 0x2C | 0x2D | 0x2E | 0x2F => Absolute,
        0x4C | 0x4D | 0x4E | 0x4F | 0x6D | 0x6E | 0x6F => Absolute,
        0x8C | 0x8D | 0x8E | 0x8F | 0xAC | 0xAD | 0xAE | 0xAF => Absolute,
        0xCC | 0xCD | 0xCE | 0xCF | 0xEC | 0xED | 0xEE | 0xEF => Absolute,
        0x6C => Indirect,

        // Absolute,X
        0x1C | 0x1D | 0x1E | 0x1F | 0x3C | 0x3D | 0x3E | 0x3F => AbsoluteX,
        0x5C | 0x5D | 0x5E | 0x5F | 0x7C | 0x7D | 0x7E | 0x7F => AbsoluteX,
        0x9C | 0x9D | 0xBC | 0xBD => AbsoluteX,
        0xDC | 0xDD | 0xDE | 0xDF | 0xFC | 0xFD | 0xFE | 0xFF => AbsoluteX,

        // Absolute,Y
        0x19 | 0x1B | 0x39 | 0x3B | 0x59 | 0x5B | 0x79 | 0x7B => AbsoluteY,
        0x99 | 0x9B | 0x9E | 0x9F | 0xB9 | 0xBB | 0xBE | 0xBF => AbsoluteY,
        0xD9 | 0xDB | 0xF9 | 0xFB => AbsoluteY,

        // Everything else is implied (or accumulator, which decodes alike)
        _ => Implied,
    }
}

/// Mnemonic for an opcode. Illegal opcodes use their community names.
#[must_use]
pub const fn mnemonic(opcode: u8) -> &'static str {
    match opcode {
        0x00 => "BRK",
        0x01 | 0x05 | 0x09 | 0x0D | 0x11 | 0x15 | 0x19 | 0x1D => "ORA",
        0x21 | 0x25 | 0x29 | 0x2D | 0x31 | 0x35 | 0x39 | 0x3D => "AND",
        0x41 | 0x45 | 0x49 | 0x4D | 0x51 | 0x55 | 0x59 | 0x5D => "EOR",
        0x61 | 0x65 | 0x69 | 0x6D | 0x71 | 0x75 | 0x79 | 0x7D => "ADC",
        0xE1 | 0xE5 | 0xE9 | 0xEB | 0xED | 0xF1 | 0xF5 | 0xF9 | 0xFD => "SBC",
        0xA1 | 0xA5 | 0xA9 | 0xAD | 0xB1 | 0xB5 | 0xB9 | 0xBD => "LDA",
        0xA2 | 0xA6 | 0xAE | 0xB6 | 0xBE => "LDX",
        0xA0 | 0xA4 | 0xAC | 0xB4 | 0xBC => "LDY",
        0x81 | 0x85 | 0x8D | 0x91 | 0x95 | 0x99 | 0x9D => "STA",
        0x86 | 0x8E | 0x96 => "STX",
        0x84 | 0x8C | 0x94 => "STY",
        0xC1 | 0xC5 | 0xC9 | 0xCD | 0xD1 | 0xD5 | 0xD9 | 0xDD => "CMP",
        0xE0 | 0xE4 | 0xEC => "CPX",
        0xC0 | 0xC4 | 0xCC => "CPY",
        0x06 | 0x0A | 0x0E | 0x16 | 0x1E => "ASL",
        0x26 | 0x2A | 0x2E | 0x36 | 0x3E => "ROL",
        0x46 | 0x4A | 0x4E | 0x56 | 0x5E => "LSR",
        0x66 | 0x6A | 0x6E | 0x76 | 0x7E => "ROR",
        0xC6 | 0xCE | 0xD6 | 0xDE => "DEC",
        0xE6 | 0xEE | 0xF6 | 0xFE => "INC",
        0x24 | 0x2C => "BIT",
        0x4C | 0x6C => "JMP",
        0x20 => "JSR",
        0x40 => "RTI",
        0x60 => "RTS",
        0x10 => "BPL",
        0x30 => "BMI",
        0x50 => "BVC",
        0x70 => "BVS",
        0x90 => "BCC",
        0xB0 => "BCS",
        0xD0 => "BNE",
        0xF0 => "BEQ",
        0x08 => "PHP",
        0x28 => "PLP",
        0x48 => "PHA",
        0x68 => "PLA",
        0x18 => "CLC",
        0x38 => "SEC",
        0x58 => "CLI",
        0x78 => "SEI",
        0xB8 => "CLV",
        0xD8 => "CLD",
        0xF8 => "SED",
        0xAA => "TAX",
        0xA8 => "TAY",
        0x8A => "TXA",
        0x98 => "TYA",
        0x9A => "TXS",
        0xBA => "TSX",
        0xC8 => "INY",
        0xE8 => "INX",
        0xCA => "DEX",
        0x88 => "DEY",
        // Illegals
        0x07 | 0x0F | 0x13 | 0x17 | 0x1B | 0x1F | 0x03 => "SLO",
        0x27 | 0x2F | 0x33 | 0x37 | 0x3B | 0x3F | 0x23 => "RLA",
        0x47 | 0x4F | 0x53 | 0x57 | 0x5B | 0x5F | 0x43 => "SRE",
        0x67 | 0x6F | 0x73 | 0x77 | 0x7B | 0x7F | 0x63 => "RRA",
        0x83 | 0x87 | 0x8F | 0x97 => "SAX",
        0xA3 | 0xA7 | 0xAB | 0xAF | 0xB3 | 0xB7 | 0xBF => "LAX",
        0xC3 | 0xC7 | 0xCF | 0xD3 | 0xD7 | 0xDB | 0xDF => "DCP",
        0xE3 | 0xE7 | 0xEF | 0xF3 | 0xF7 | 0xFB | 0xFF => "ISC",
        0x0B | 0x2B => "ANC",
        0x4B => "ALR",
        0x6B => "ARR",
        0x8B => "XAA",
        0xCB => "SBX",
        0x93 | 0x9F => "AHX",
        0x9C => "SHY",
        0x9E => "SHX",
        0x9B => "TAS",
        0xBB => "LAS",
        0x02 | 0x12 | 0x22 | 0x32 | 0x42 | 0x52 | 0x62 | 0x72 => "KIL",
        0x92 | 0xB2 | 0xD2 | 0xF2 => "KIL",
        _ => "NOP",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_modes() {
        assert_eq!(addressing_mode(0x85), AddressingMode::ZeroPage);
        assert_eq!(addressing_mode(0x91), AddressingMode::IndirectIndexed);
        assert_eq!(addressing_mode(0x96), AddressingMode::ZeroPageY);
        assert_eq!(addressing_mode(0x9D), AddressingMode::AbsoluteX);
    }

    #[test]
    fn illegal_modes() {
        assert_eq!(addressing_mode(0xAB), AddressingMode::Immediate);
        assert_eq!(addressing_mode(0x9F), AddressingMode::AbsoluteY);
        assert_eq!(addressing_mode(0x9C), AddressingMode::AbsoluteX);
        assert_eq!(mnemonic(0xA7), "LAX");
        assert_eq!(mnemonic(0x02), "KIL");
    }

    #[test]
    fn every_opcode_has_a_mnemonic() {
        for op in 0..=255u8 {
            assert!(!mnemonic(op).is_empty());
        }
    }
}
