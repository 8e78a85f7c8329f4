use std::fmt;
use std::mem;

use itertools::Itertools;
use tracing::{debug, trace};

use crate::ir1_semantic_tokens::{SemanticKind, SemanticToken, SyntaxCategory};
use crate::ir2_statements::{Instruction, Merge, Number, Statement};
use crate::keys::{self, CHANGE_SIGN, DOT, EE, IND, INV, RTN, SBR, TAG_PLACEHOLDER};

/// Fills in opcodes and addresses. Digits and `.` keys that spell out a
/// number are merged into one number statement on the way. Returns the
/// program size in opcodes.
pub fn encode(statements: &mut Vec<Statement>) -> usize {
    for statement in statements.iter_mut() {
        match statement {
            Statement::Instruction(instruction) => encode_instruction(instruction),
            Statement::Number(number) => number.opcodes = literal_opcodes(&number.tokens),
            Statement::Eof(_) | Statement::LineComment(_) | Statement::Tag(_) | Statement::Invalid(_) => {}
        }
    }
    merge_numbers(statements);
    assign_addresses(statements)
}

pub fn encode_instruction(instruction: &mut Instruction) {
    let mut opcodes = Vec::new();
    for token in &instruction.tokens {
        match token.kind {
            SemanticKind::Instruction(key) => opcodes.extend_from_slice(key.opcodes),
            SemanticKind::Digits1 | SemanticKind::Digits2 => opcodes.push(token.value().unwrap_or(0) as u8),
            SemanticKind::Digits3 => {
                let address = token.value().unwrap_or(0);
                opcodes.push((address / 100) as u8);
                opcodes.push((address % 100) as u8);
            }
            SemanticKind::Tag => opcodes.extend_from_slice(&[TAG_PLACEHOLDER; 2]),
            SemanticKind::Eof
            | SemanticKind::Separator
            | SemanticKind::Comment
            | SemanticKind::Invalid
            | SemanticKind::Number
            | SemanticKind::Colon => {}
        }
    }
    instruction.opcodes = opcodes;
    instruction.merge = None;

    if instruction.opcodes == [INV, SBR] {
        merge(instruction, 0, RTN);
        return;
    }

    let index = if instruction.is_inverted() { 1 } else { 0 };
    let merged = instruction.tokens.get(index).and_then(SemanticToken::key).and_then(|key| key.indirect_merge);
    let before_ind = instruction.tokens.get(index + 1).map_or(false, |token| token.is_key(IND));
    if let (Some(opcode), true) = (merged, before_ind) {
        merge(instruction, index, opcode);
    }
}

// Only an `INV` can come before the merged pair, so token and opcode indices agree.
fn merge(instruction: &mut Instruction, index: usize, opcode: u8) {
    if let Some(key) = keys::by_opcode(opcode) {
        instruction.opcodes.remove(index);
        instruction.opcodes[index] = opcode;
        instruction.merge = Some(Merge { index, key });
        debug!(statement = %instruction.tokens.iter().map(SemanticToken::text).join(" "), merged = key.mnemonic(), "merged keys");
    }
}

fn literal_opcodes(tokens: &[SemanticToken]) -> Vec<u8> {
    let text: String = tokens.iter().map(SemanticToken::text).collect();
    text.chars()
        .filter_map(|c| match c {
            '0'..='9' => c.to_digit(10).map(|digit| digit as u8),
            '.' => Some(DOT),
            '-' => Some(CHANGE_SIGN),
            'e' | 'E' => Some(EE),
            _ => None,
        })
        .collect()
}

/// What has been keyed in so far while reading a number.
#[derive(Debug, Clone, Copy, Default)]
struct NumberContext {
    point: bool,
    exponent: bool,
    mantissa_digits: usize,
    exponent_digits: usize,
    mantissa_sign: bool,
    exponent_sign: bool,
}

impl NumberContext {
    const MAX_MANTISSA_DIGITS: usize = 10;
    const MAX_EXPONENT_DIGITS: usize = 2;

    fn accept(&mut self, opcodes: &[u8]) -> bool {
        for &opcode in opcodes {
            match opcode {
                0..=9 if self.exponent => {
                    self.exponent_digits += 1;
                    if self.exponent_digits > Self::MAX_EXPONENT_DIGITS {
                        return false;
                    }
                }
                0..=9 => {
                    self.mantissa_digits += 1;
                    if self.mantissa_digits > Self::MAX_MANTISSA_DIGITS {
                        return false;
                    }
                }
                DOT => {
                    if self.point {
                        return false;
                    }
                    self.point = true;
                }
                EE => {
                    if self.exponent {
                        return false;
                    }
                    self.exponent = true;
                }
                CHANGE_SIGN => {
                    let sign = if self.exponent { &mut self.exponent_sign } else { &mut self.mantissa_sign };
                    if *sign {
                        return false;
                    }
                    *sign = true;
                }
                _ => return false,
            }
        }
        true
    }
}

fn number_start(statement: &Statement) -> Option<NumberContext> {
    let mut context = NumberContext::default();
    match statement {
        // A literal already over the limits doesn't grow.
        Statement::Number(number) => context.accept(&number.opcodes).then_some(context),
        Statement::Instruction(instruction) if instruction.tokens.len() == 1 => match instruction.opcodes.as_slice() {
            [opcode] if *opcode <= 9 || *opcode == DOT => {
                context.accept(&instruction.opcodes);
                Some(context)
            }
            _ => None,
        },
        _ => None,
    }
}

fn continues_number(statement: &Statement) -> bool {
    match statement {
        Statement::Number(_) => true,
        Statement::Instruction(instruction) => {
            instruction.tokens.len() == 1
                && matches!(instruction.opcodes.as_slice(), [opcode] if *opcode <= 9 || [DOT, EE, CHANGE_SIGN].contains(opcode))
        }
        Statement::Eof(_) | Statement::LineComment(_) | Statement::Tag(_) | Statement::Invalid(_) => false,
    }
}

/// Merges runs like `1 . 6 +/- EE +/- 1 9` into one number statement.
/// A run starts at a literal, a digit key or a `.` key and stops at the
/// first statement that would make an impossible number.
pub fn merge_numbers(statements: &mut Vec<Statement>) {
    let mut index = 0;
    while index < statements.len() {
        if let Some(mut context) = number_start(&statements[index]) {
            while index + 1 < statements.len() && continues_number(&statements[index + 1]) {
                let mut extended = context;
                if !extended.accept(statements[index + 1].opcodes()) {
                    trace!(text = %statements[index + 1].text(), "number can't absorb next statement");
                    break;
                }
                context = extended;
                let next = statements.remove(index + 1);
                absorb(&mut statements[index], next);
            }
        }
        index += 1;
    }
}

fn as_number<'input>(tokens: Vec<SemanticToken<'input>>) -> impl Iterator<Item = SemanticToken<'input>> {
    tokens.into_iter().map(|token| token.with_category(SyntaxCategory::Number))
}

fn absorb<'input>(target: &mut Statement<'input>, next: Statement<'input>) {
    if let Statement::Instruction(instruction) = target {
        let instruction = mem::take(instruction);
        *target = Statement::Number(Number {
            tokens: as_number(instruction.tokens).collect(),
            opcodes: instruction.opcodes,
            address: instruction.address,
        });
    }

    let (tokens, opcodes) = match next {
        Statement::Number(number) => (number.tokens, number.opcodes),
        Statement::Instruction(instruction) => (instruction.tokens, instruction.opcodes),
        Statement::Eof(_) | Statement::LineComment(_) | Statement::Tag(_) | Statement::Invalid(_) => return,
    };
    if let Statement::Number(number) = target {
        number.tokens.extend(as_number(tokens));
        number.opcodes.extend(opcodes);
    }
}

/// Addresses are a running count of opcodes; a tag takes the address of
/// whatever comes after it.
pub fn assign_addresses(statements: &mut [Statement]) -> usize {
    let mut address = 0;
    for statement in statements.iter_mut() {
        match statement {
            Statement::Instruction(instruction) => {
                instruction.address = address;
                address += instruction.opcodes.len();
            }
            Statement::Number(number) => {
                number.address = address;
                address += number.opcodes.len();
            }
            Statement::Tag(tag) => tag.address = address,
            Statement::Eof(_) | Statement::LineComment(_) | Statement::Invalid(_) => {}
        }
    }
    address
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandWidth {
    /// As written (flags and `Dsz` registers).
    One,
    /// Zero-padded to two digits.
    Two,
    /// Three digits; the leading zero of the `02 45` form is dropped.
    Address,
}

/// Joins digit groups into one operand in its canonical width. Grouping an
/// already grouped operand gives it back unchanged.
pub fn group_digits<'a>(groups: impl IntoIterator<Item = &'a str>, width: OperandWidth) -> String {
    let digits: String = groups.into_iter().collect();
    match width {
        OperandWidth::One => digits,
        OperandWidth::Two => format!("{:0>2}", digits),
        OperandWidth::Address => {
            let digits = match digits.strip_prefix('0') {
                Some(rest) if digits.len() == 4 => rest,
                _ => digits.as_str(),
            };
            format!("{:0>3}", digits)
        }
    }
}

impl<'input> Instruction<'input> {
    /// Canonical spelling: standard mnemonics, merged keys, grouped operands.
    pub fn formatted(&self) -> String {
        let width = match self.main_key() {
            Some(key) if key.operand_width == 1 => OperandWidth::One,
            _ => OperandWidth::Two,
        };

        let mut parts = Vec::new();
        let mut index = 0;
        while index < self.tokens.len() {
            if let Some(Merge { index: merged, key }) = self.merge {
                if merged == index {
                    parts.push(key.mnemonic().to_string());
                    index += 2;
                    continue;
                }
            }

            let token = &self.tokens[index];
            let part = match (token.category, token.kind) {
                (_, SemanticKind::Instruction(key)) => key.mnemonic().to_string(),
                (SyntaxCategory::DirectAddress, _) => {
                    let run = self.tokens[index..]
                        .iter()
                        .take_while(|t| t.category == SyntaxCategory::DirectAddress)
                        .map(SemanticToken::text)
                        .collect::<Vec<_>>();
                    index += run.len() - 1;
                    group_digits(run.iter().map(String::as_str), OperandWidth::Address)
                }
                (SyntaxCategory::DirectOperand, _) => group_digits([token.text().as_str()], width),
                (SyntaxCategory::IndirectOperand, _) => group_digits([token.text().as_str()], OperandWidth::Two),
                _ => token.text(),
            };
            parts.push(part);
            index += 1;
        }
        parts.join(" ")
    }
}

/// A number literal read back from its keystrokes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedNumber {
    pub mantissa: String,
    pub exponent: Option<String>,
}

impl fmt::Display for DecodedNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mantissa)?;
        if let Some(exponent) = &self.exponent {
            write!(f, "E{}", exponent)?;
        }
        Ok(())
    }
}

impl<'input> Number<'input> {
    pub fn decode(&self) -> DecodedNumber {
        let mut mantissa = String::new();
        let mut exponent: Option<String> = None;
        let mut mantissa_negative = false;
        let mut exponent_negative = false;

        for &opcode in &self.opcodes {
            match opcode {
                0..=9 => {
                    let digit = char::from(b'0' + opcode);
                    exponent.as_mut().unwrap_or(&mut mantissa).push(digit);
                }
                DOT => mantissa.push('.'),
                EE => {
                    exponent.get_or_insert_with(String::new);
                }
                CHANGE_SIGN if exponent.is_some() => exponent_negative = !exponent_negative,
                CHANGE_SIGN => mantissa_negative = !mantissa_negative,
                _ => {}
            }
        }

        let signed = |negative: bool, digits: String| {
            let digits = if digits.is_empty() { "0".to_string() } else { digits };
            if negative { format!("-{}", digits) } else { digits }
        };
        DecodedNumber {
            mantissa: signed(mantissa_negative, mantissa),
            exponent: exponent.map(|digits| signed(exponent_negative, digits)),
        }
    }
}

impl<'input> Statement<'input> {
    /// The statement as the listing shows it.
    pub fn formatted(&self) -> String {
        match self {
            Statement::Eof(_) => String::new(),
            Statement::LineComment(_) | Statement::Invalid(_) => self.text(),
            Statement::Tag(tag) => tag.tokens.iter().map(SemanticToken::text).collect(),
            Statement::Instruction(instruction) => instruction.formatted(),
            Statement::Number(number) => number.decode().to_string(),
        }
    }
}
