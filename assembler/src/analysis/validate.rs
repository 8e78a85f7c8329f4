use std::mem;

use tracing::debug;

use crate::analysis::symbol_table::SymbolTable;
use crate::analysis::targets::AddressTargets;
use crate::error::{Diagnostic, DiagnosticKind, Reference};
use crate::ir2_statements::{Instruction, Statement, Target};
use crate::keys::{PGM, TAG_PLACEHOLDER};

pub fn report_invalid_statements(statements: &[Statement], diagnostics: &mut Vec<Diagnostic>) {
    for (index, statement) in statements.iter().enumerate() {
        if statement.is_invalid() {
            let kind = DiagnosticKind::InvalidStatement(statement.text());
            diagnostics.push(Diagnostic::error(kind, index, None, statement.span()));
        }
    }
}

/// Checks every branch target and patches tag addresses into the opcodes.
///
/// `Lbl` statements define rather than reference. The instruction right
/// after `Pgm nn` runs in another program, so its address or label isn't
/// ours to check; a tag there is still ours and still gets patched.
pub fn resolve_references(
    statements: &mut [Statement],
    symbols: &mut SymbolTable,
    targets: &mut AddressTargets,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let mut after_program_call = false;

    for (index, statement) in statements.iter_mut().enumerate() {
        let span = statement.span();
        let instruction = match statement {
            Statement::Instruction(instruction) => instruction,
            Statement::Eof(_) | Statement::LineComment(_) | Statement::Tag(_) | Statement::Number(_) | Statement::Invalid(_) => continue,
        };

        let calls_program = instruction.opcodes.first() == Some(&PGM);
        let in_other_program = mem::replace(&mut after_program_call, calls_program);
        if instruction.label_definition().is_some() {
            continue;
        }

        let (reference, token) = match instruction.target() {
            None => continue,
            Some(Target::Address { .. } | Target::Label { .. }) if in_other_program => continue,
            Some(Target::Address { address, token }) => {
                if targets.reference(address) {
                    continue;
                }
                (Reference::Address(address), token)
            }
            Some(Target::Label { code, name, token }) => {
                if let Some(address) = symbols.reference_label(code) {
                    targets.reference(address);
                    continue;
                }
                (Reference::Label(name), token)
            }
            Some(Target::Tag { name, token }) => match symbols.reference_tag(&name) {
                Some(address) => {
                    patch_tag_address(instruction, address);
                    targets.reference(address);
                    continue;
                }
                None => (Reference::Tag(name), token),
            },
        };

        debug!(statement = index, %reference, "unresolved reference");
        let token_span = instruction.tokens.get(token).map_or(span, |token| token.span());
        let kind = DiagnosticKind::UnresolvedReference(reference);
        diagnostics.push(Diagnostic::error(kind, index, Some(token), token_span));
    }
}

fn patch_tag_address(instruction: &mut Instruction, address: usize) {
    if let Some(at) = instruction.opcodes.iter().position(|&opcode| opcode == TAG_PLACEHOLDER) {
        instruction.opcodes[at] = (address / 100) as u8;
        instruction.opcodes[at + 1] = (address % 100) as u8;
    }
}

pub fn report_unreferenced_tags(symbols: &SymbolTable, statements: &[Statement], diagnostics: &mut Vec<Diagnostic>) {
    for tag in symbols.tags().into_iter().filter(|tag| !tag.referenced) {
        let span = statements.get(tag.statement).map_or(0..0, Statement::span);
        let kind = DiagnosticKind::UnreferencedTag { name: tag.name.clone() };
        diagnostics.push(Diagnostic::warning(kind, tag.statement, Some(0), span));
    }
}
