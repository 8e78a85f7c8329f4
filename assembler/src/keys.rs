//! The TI-58/59 key table.
//!
//! Every programmable key is described once here: the opcodes it produces,
//! the spellings accepted in source text (the first one is canonical), whether
//! `INV` may prefix it, and the operand shape the statement parser expects
//! after it.

use std::collections::HashMap;
use std::sync::LazyLock;

use itertools::Itertools;

pub const INV: u8 = 22;
pub const PGM: u8 = 36;
pub const IND: u8 = 40;
pub const EE: u8 = 52;
pub const FIX: u8 = 58;
pub const SBR: u8 = 71;
pub const LBL: u8 = 76;
pub const RTN: u8 = 92;
pub const DOT: u8 = 93;
pub const CHANGE_SIGN: u8 = 94;

/// Opcode pair written for a tag reference until the tag address is known.
pub const TAG_PLACEHOLDER: u8 = 100;

/// What the parser expects to follow a mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxShape {
    Atomic,
    /// Two-digit register or value (`HIR 05`).
    Direct,
    /// Register holding the real operand (`RC* 12`).
    Indirect,
    /// Either a direct operand or `Ind` and an indirect one (`STO 12`, `STO Ind 12`).
    DirectOrIndirect,
    /// Label, absolute address, tag, or `Ind` register (`GTO A`, `GTO 123`).
    BranchTarget,
    /// A flag or register, then a branch target (`Dsz 3 A`, `If flg 1 @Done`).
    ArgThenBranch,
    LabelOnly,
    /// `Ind`, which is never a statement on its own.
    IndirectPrefixOnly,
}

#[derive(Debug, PartialEq, Eq)]
pub struct InstructionKey {
    pub opcodes: &'static [u8],
    pub mnemonics: &'static [&'static str],
    pub invertible: bool,
    pub shape: SyntaxShape,
    /// Opcode of the combined key when this one is directly followed by `Ind`.
    pub indirect_merge: Option<u8>,
    pub operand_width: usize,
}

impl InstructionKey {
    const fn inv(mut self) -> Self {
        self.invertible = true;
        self
    }

    const fn star(mut self, merged: u8) -> Self {
        self.indirect_merge = Some(merged);
        self
    }

    const fn narrow(mut self) -> Self {
        self.operand_width = 1;
        self
    }

    pub fn mnemonic(&self) -> &'static str {
        self.mnemonics[0]
    }

    /// True when this key produces exactly `opcode`.
    pub fn is(&self, opcode: u8) -> bool {
        self.opcodes == [opcode]
    }

    pub fn is_digit(&self) -> bool {
        matches!(self.opcodes, [d] if *d < 10)
    }

    /// Keys usable as a label: any single-opcode key but `Ind`.
    pub fn is_label(&self) -> bool {
        self.opcodes.len() == 1 && !self.is(IND)
    }
}

const fn key(opcodes: &'static [u8], mnemonics: &'static [&'static str], shape: SyntaxShape) -> InstructionKey {
    InstructionKey { opcodes, mnemonics, invertible: false, shape, indirect_merge: None, operand_width: 2 }
}

use SyntaxShape::*;

static KEYS: &[InstructionKey] = &[
    key(&[0], &["0"], Atomic),
    key(&[1], &["1"], Atomic),
    key(&[2], &["2"], Atomic),
    key(&[3], &["3"], Atomic),
    key(&[4], &["4"], Atomic),
    key(&[5], &["5"], Atomic),
    key(&[6], &["6"], Atomic),
    key(&[7], &["7"], Atomic),
    key(&[8], &["8"], Atomic),
    key(&[9], &["9"], Atomic),

    key(&[10], &["E'", "E´", "E’"], Atomic),
    key(&[11], &["A"], Atomic),
    key(&[12], &["B"], Atomic),
    key(&[13], &["C"], Atomic),
    key(&[14], &["D"], Atomic),
    key(&[15], &["E"], Atomic),
    key(&[16], &["A'", "A´", "A’"], Atomic),
    key(&[17], &["B'", "B´", "B’"], Atomic),
    key(&[18], &["C'", "C´", "C’"], Atomic),
    key(&[19], &["D'", "D´", "D’"], Atomic),

    key(&[22], &["INV"], Atomic),
    key(&[23], &["lnx", "ln x"], Atomic).inv(),
    key(&[24], &["CE"], Atomic),
    key(&[25], &["CLR"], Atomic),
    key(&[28], &["log"], Atomic).inv(),
    key(&[29], &["CP"], Atomic).inv(),

    key(&[30], &["tan"], Atomic).inv(),
    key(&[32], &["x<>t", "x⇌t", "x~t", "x<->t"], Atomic),
    key(&[33], &["x²", "x^2"], Atomic),
    key(&[34], &["√x", "sqrt"], Atomic),
    key(&[35], &["1/x"], Atomic),
    key(&[36], &["Pgm"], DirectOrIndirect).star(62),
    key(&[37], &["P->R", "P→R", "P/R"], Atomic).inv(),
    key(&[38], &["sin"], Atomic).inv(),
    key(&[39], &["cos"], Atomic).inv(),

    key(&[40], &["Ind"], IndirectPrefixOnly),
    key(&[42], &["STO"], DirectOrIndirect).star(72),
    key(&[43], &["RCL"], DirectOrIndirect).star(73),
    key(&[44], &["SUM"], DirectOrIndirect).inv().star(74),
    key(&[45], &["y^x", "yˣ", "y**x"], Atomic).inv(),
    key(&[47], &["CMs"], Atomic),
    key(&[48], &["Exc"], DirectOrIndirect).star(63),
    key(&[49], &["Prd"], DirectOrIndirect).inv().star(64),

    key(&[50], &["|x|", "abs"], Atomic),
    key(&[52], &["EE"], Atomic).inv(),
    key(&[53], &["("], Atomic),
    key(&[54], &[")"], Atomic),
    key(&[55], &["÷", "/"], Atomic),
    key(&[57], &["Eng"], Atomic).inv(),
    key(&[58], &["Fix"], DirectOrIndirect).inv(),
    key(&[59], &["Int"], Atomic).inv(),

    key(&[60], &["Deg"], Atomic),
    key(&[61], &["GTO", "GO TO"], BranchTarget).star(83),
    key(&[62], &["Pg*", "Pgm*"], Indirect),
    key(&[63], &["Ex*", "Exc*"], Indirect),
    key(&[64], &["Pd*", "Prd*"], Indirect).inv(),
    key(&[65], &["×", "*"], Atomic),
    key(&[66], &["Pause"], Atomic),
    key(&[67], &["x=t"], BranchTarget).inv(),
    key(&[68], &["Nop"], Atomic),
    key(&[69], &["Op"], DirectOrIndirect).star(84),

    key(&[70], &["Rad"], Atomic),
    key(&[71], &["SBR"], BranchTarget).inv(),
    key(&[72], &["ST*", "STO*"], Indirect),
    key(&[73], &["RC*", "RCL*"], Indirect),
    key(&[74], &["SM*", "SUM*"], Indirect).inv(),
    key(&[75], &["-", "−"], Atomic),
    key(&[76], &["Lbl"], LabelOnly),
    key(&[77], &["x≥t", "x>=t"], BranchTarget).inv(),
    key(&[78], &["Σ+", "∑+", "S+"], Atomic).inv(),
    key(&[79], &["x̄", "mean"], Atomic).inv(),

    key(&[80], &["Grad"], Atomic),
    key(&[81], &["RST"], Atomic),
    key(&[82], &["HIR"], Direct),
    key(&[83], &["GO*", "GT*", "GTO*"], Indirect),
    key(&[84], &["Op*"], Indirect),
    key(&[85], &["+"], Atomic),
    key(&[86], &["St flg", "Stflg", "STF"], DirectOrIndirect).inv().narrow(),
    key(&[87], &["If flg", "Ifflg", "IFF"], ArgThenBranch).inv().narrow(),
    key(&[88], &["D.MS"], Atomic).inv(),
    key(&[89], &["π", "pi"], Atomic),

    key(&[90], &["List"], Atomic).inv(),
    key(&[91], &["R/S"], Atomic),
    key(&[92], &["RTN"], Atomic),
    key(&[93], &["."], Atomic),
    key(&[94], &["+/-"], Atomic),
    key(&[95], &["="], Atomic),
    key(&[96], &["Write"], Atomic).inv(),
    key(&[97], &["Dsz"], ArgThenBranch).inv().narrow(),
    key(&[98], &["Adv"], Atomic),
    key(&[99], &["Prt"], Atomic).inv(),

    key(&[22, 23], &["e^x", "eˣ"], Atomic),
    key(&[22, 28], &["10^x", "10ˣ"], Atomic),
];

fn normalize(spelling: &str) -> String {
    spelling.split_whitespace().map(str::to_lowercase).join(" ")
}

static BY_SPELLING: LazyLock<HashMap<String, &'static InstructionKey>> = LazyLock::new(|| {
    spellings()
        .map(|(spelling, key)| (normalize(spelling), key))
        .collect()
});

static BY_OPCODE: LazyLock<HashMap<u8, &'static InstructionKey>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for key in KEYS.iter() {
        if let [opcode] = key.opcodes {
            map.entry(*opcode).or_insert(key);
        }
    }
    map
});

/// Every source spelling of every key that can appear as a mnemonic.
/// Digits are lexed as operands, not as mnemonics, so they are left out.
pub fn spellings() -> impl Iterator<Item = (&'static str, &'static InstructionKey)> {
    KEYS.iter()
        .filter(|key| !key.is_digit())
        .flat_map(|key| key.mnemonics.iter().map(move |spelling| (*spelling, key)))
}

/// Case-insensitive lookup; runs of whitespace inside the spelling don't matter.
pub fn lookup(spelling: &str) -> Option<&'static InstructionKey> {
    BY_SPELLING.get(&normalize(spelling)).copied()
}

pub fn by_opcode(opcode: u8) -> Option<&'static InstructionKey> {
    BY_OPCODE.get(&opcode).copied()
}

pub fn digit(value: u8) -> Option<&'static InstructionKey> {
    by_opcode(value).filter(|key| key.is_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    #[test]
    fn spellings_are_unique() {
        let mut seen = HashSet::new();
        for (spelling, _) in spellings() {
            assert!(seen.insert(normalize(spelling)), "{} listed twice", spelling);
        }
    }

    #[test]
    fn lookup_ignores_case_and_spacing() {
        assert_eq!(lookup("sto").map(|k| k.opcodes), Some(&[42u8][..]));
        assert_eq!(lookup("ST  FLG").map(InstructionKey::mnemonic), Some("St flg"));
        assert_eq!(lookup("∑+").map(InstructionKey::mnemonic), Some("Σ+"));
        assert_eq!(lookup("e^x").map(|k| k.opcodes), Some(&[22u8, 23][..]));
        assert_eq!(lookup("frobnicate"), None);
    }

    #[test]
    fn indirect_merges_point_at_indirect_keys() {
        for key in KEYS.iter() {
            if let Some(merged) = key.indirect_merge {
                let merged = by_opcode(merged).unwrap();
                assert!(merged.mnemonic().ends_with('*'), "{} merges into {}", key.mnemonic(), merged.mnemonic());
            }
        }
    }

    #[test]
    fn digits_are_not_mnemonics() {
        assert_eq!(lookup("7"), None);
        assert_eq!(digit(7).map(|k| k.opcodes), Some(&[7u8][..]));
        assert_eq!(digit(12), None);
    }

    #[test]
    fn shapes() {
        assert_eq!(lookup("GTO").unwrap().shape, SyntaxShape::BranchTarget);
        assert_eq!(lookup("Dsz").unwrap().shape, SyntaxShape::ArgThenBranch);
        assert_eq!(lookup("Dsz").unwrap().operand_width, 1);
        assert_eq!(lookup("Ind").unwrap().shape, SyntaxShape::IndirectPrefixOnly);
        assert!(lookup("Fix").unwrap().invertible);
        assert!(!lookup("CLR").unwrap().invertible);
    }
}
