//! Plain-text listings, one statement per line:
//!
//! ```text
//! 000: 76 11             ■ Lbl A
//! 002: 42 12               STO 12
//! 004: 61 00 00          ? GTO @Nowhere
//! ```
//!
//! Markers: `■` label, `›` branch target, `?` statement with an error.

use itertools::Itertools;

use crate::ir2_statements::Statement;
use crate::keys::TAG_PLACEHOLDER;
use crate::program::Program;

const OPCODES_PER_LINE: usize = 6;
const CODE_COLUMN_WIDTH: usize = OPCODES_PER_LINE * 3 - 1;

fn opcode_text(opcode: u8) -> String {
    if opcode == TAG_PLACEHOLDER {
        "??".to_string()
    } else {
        format!("{:02}", opcode)
    }
}

fn marker(program: &Program, index: usize, statement: &Statement) -> char {
    if program.diagnostics_for(index).any(|diagnostic| diagnostic.is_error()) {
        return '?';
    }
    match statement {
        Statement::Instruction(instruction) if instruction.label_definition().is_some() => '■',
        Statement::Instruction(_) | Statement::Number(_) => match statement.address() {
            Some(address) if program.is_branch_target(address) => '›',
            _ => ' ',
        },
        Statement::Eof(_) | Statement::LineComment(_) | Statement::Tag(_) | Statement::Invalid(_) => ' ',
    }
}

pub fn listing(program: &Program) -> String {
    let mut lines = Vec::new();
    for (index, statement) in program.statements().iter().enumerate() {
        let marker = marker(program, index, statement);
        match statement {
            Statement::Instruction(_) | Statement::Number(_) => {
                let address = statement.address().unwrap_or(0);
                for (row, chunk) in statement.opcodes().chunks(OPCODES_PER_LINE).enumerate() {
                    let codes = chunk.iter().map(|&opcode| opcode_text(opcode)).join(" ");
                    let row_address = address + row * OPCODES_PER_LINE;
                    if row == 0 {
                        lines.push(format!(
                            "{:03}: {:<width$} {} {}",
                            row_address,
                            codes,
                            marker,
                            statement.formatted(),
                            width = CODE_COLUMN_WIDTH
                        ));
                    } else {
                        lines.push(format!("{:03}: {}", row_address, codes));
                    }
                }
            }
            Statement::Tag(_) | Statement::LineComment(_) | Statement::Invalid(_) => {
                let indent = CODE_COLUMN_WIDTH + 5;
                lines.push(format!("{:indent$} {} {}", "", marker, statement.formatted(), indent = indent));
            }
            Statement::Eof(_) => {}
        }
    }
    lines.join("\n")
}

/// Labels and tags with their addresses, in program order.
pub fn labels(program: &Program) -> String {
    program
        .statements()
        .iter()
        .filter_map(|statement| match statement {
            Statement::Tag(tag) => Some(format!("{:03}: @{}", tag.address, tag.name)),
            Statement::Instruction(instruction) if instruction.label_definition().is_some() => {
                Some(format!("{:03}: {}", instruction.address, instruction.formatted()))
            }
            _ => None,
        })
        .join("\n")
}
