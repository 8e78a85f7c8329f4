/// These modules check a fully encoded statement list: where labels and tags
/// live, which addresses a branch may land on, and whether every branch does.

/// Label and tag locations, collected in one forward pass.
pub mod symbol_table;

/// Addresses that start an instruction or a digit of a number.
pub mod targets;

/// Reference resolution and the diagnostics that come out of it.
pub mod validate;

use crate::error::Diagnostic;
use crate::ir2_statements::Statement;
use symbol_table::{build_symbol_table, SymbolTable};
use targets::AddressTargets;

#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub symbols: SymbolTable,
    pub targets: AddressTargets,
    pub diagnostics: Vec<Diagnostic>,
}

/// Resolves tag references in place (their placeholder opcodes get the tag
/// address) and reports everything that can't be resolved.
pub fn analyze(statements: &mut [Statement]) -> Analysis {
    let mut diagnostics = Vec::new();
    let mut symbols = build_symbol_table(statements, &mut diagnostics);
    let mut targets = AddressTargets::build(statements);

    validate::report_invalid_statements(statements, &mut diagnostics);
    validate::resolve_references(statements, &mut symbols, &mut targets, &mut diagnostics);
    validate::report_unreferenced_tags(&symbols, statements, &mut diagnostics);

    diagnostics.sort_by_key(|diagnostic| diagnostic.statement);
    Analysis { symbols, targets, diagnostics }
}
