use tracing::debug;

use crate::analysis::symbol_table::SymbolTable;
use crate::analysis::targets::AddressTargets;
use crate::analysis::{analyze, Analysis};
use crate::error::Diagnostic;
use crate::ir2_statements::Statement;
use crate::ir3_encode::encode;
use crate::keys;
use crate::util::reconstruct_src;

/// One assembled program: its statements in source order, with opcodes,
/// addresses and everything found wrong with them.
#[derive(Debug, Clone)]
pub struct Program<'input> {
    statements: Vec<Statement<'input>>,
    size: usize,
    symbols: SymbolTable,
    targets: AddressTargets,
    diagnostics: Vec<Diagnostic>,
}

impl<'input> Program<'input> {
    /// Encodes and checks a complete statement list, ending with `Eof`.
    pub fn build(mut statements: Vec<Statement<'input>>) -> Self {
        let size = encode(&mut statements);
        let Analysis { symbols, targets, diagnostics } = analyze(&mut statements);
        debug!(statements = statements.len(), size, diagnostics = diagnostics.len(), "program assembled");
        Program { statements, size, symbols, targets, diagnostics }
    }

    pub fn statements(&self) -> &[Statement<'input>] {
        &self.statements
    }

    /// Number of program steps.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn opcodes(&self) -> Vec<u8> {
        self.statements
            .iter()
            .flat_map(|statement| statement.opcodes().iter().copied())
            .collect()
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn label_address(&self, code: u8) -> Option<usize> {
        self.symbols.label(code).map(|label| label.address)
    }

    pub fn tag_address(&self, name: &str) -> Option<usize> {
        self.symbols.tag(name.trim_start_matches('@')).map(|tag| tag.address)
    }

    /// Address of a label written the way a branch would name it:
    /// `@Loop`, `A'`, `x²` or `25`.
    pub fn address_of(&self, name: &str) -> Option<usize> {
        if name.starts_with('@') {
            return self.tag_address(name);
        }
        if let Ok(code) = name.parse::<u8>() {
            return self.label_address(code);
        }
        keys::lookup(name)
            .filter(|key| key.is_label())
            .and_then(|key| self.label_address(key.opcodes[0]))
    }

    /// True if some branch in the program lands on `address`.
    pub fn is_branch_target(&self, address: usize) -> bool {
        self.targets.is_referenced(address)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn diagnostics_for(&self, statement: usize) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |diagnostic| diagnostic.statement == statement)
    }

    /// The source text this program was read from, whitespace and all.
    pub fn reconstruct_source(&self) -> String {
        reconstruct_src(self.statements.iter().flat_map(Statement::tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DiagnosticKind, Reference, Severity};
    use crate::parser::{assemble, LeniencyLevel};
    use pretty_assertions::assert_eq;

    fn program(src: &str) -> Program {
        assemble(src, LeniencyLevel::Lenient).remove(0)
    }

    fn kinds(program: &Program) -> Vec<DiagnosticKind> {
        program.diagnostics().iter().map(|diagnostic| diagnostic.kind.clone()).collect()
    }

    #[test]
    fn forward_tag_reference_is_patched() {
        let program = program("GTO @End CLR @End: R/S");
        assert_eq!(program.opcodes(), vec![61, 0, 4, 25, 91]);
        assert_eq!(program.tag_address("end"), Some(4));
        assert!(program.is_branch_target(4));
        assert_eq!(kinds(&program), vec![]);
    }

    #[test]
    fn unknown_tag_keeps_the_placeholder() {
        let program = program("GTO @Nowhere");
        assert_eq!(program.opcodes(), vec![61, 100, 100]);
        let diagnostic = &program.diagnostics()[0];
        assert_eq!(diagnostic.kind, DiagnosticKind::UnresolvedReference(Reference::Tag("Nowhere".to_string())));
        assert_eq!((diagnostic.statement, diagnostic.token, diagnostic.span.clone()), (0, Some(1), 4..12));
    }

    #[test]
    fn labels_resolve_by_key() {
        let program = program("Lbl A' CLR GTO A' SBR 25 Lbl 25");
        assert_eq!(program.address_of("A'"), Some(0));
        assert_eq!(program.address_of("25"), Some(7));
        assert_eq!(kinds(&program), vec![]);
        assert!(program.is_branch_target(0));
    }

    #[test]
    fn missing_label() {
        let program = program("GTO B");
        assert_eq!(kinds(&program), vec![DiagnosticKind::UnresolvedReference(Reference::Label("B".to_string()))]);
    }

    #[test]
    fn absolute_addresses_must_start_an_instruction() {
        let program = program("GTO 003 CLR CLR 1.5 GTO 001 GTO 006 INV SUM 01 GTO 015");
        assert_eq!(
            kinds(&program),
            vec![DiagnosticKind::UnresolvedReference(Reference::Address(1))]
        );
    }

    #[test]
    fn duplicates_are_reported_and_first_wins() {
        let program = program("Lbl A @x: CLR Lbl A @X: GTO A GTO @x");
        assert_eq!(
            kinds(&program),
            vec![
                DiagnosticKind::DuplicateLabel { label: "A".to_string(), first: 0 },
                DiagnosticKind::DuplicateTag { name: "X".to_string(), first: 2 },
            ]
        );
        assert_eq!(program.address_of("A"), Some(0));
        assert_eq!(program.address_of("@X"), Some(2));
    }

    #[test]
    fn unused_tag_is_a_warning() {
        let program = program("@Unused: CLR");
        assert_eq!(program.diagnostics()[0].severity, Severity::Warning);
        assert_eq!(kinds(&program), vec![DiagnosticKind::UnreferencedTag { name: "Unused".to_string() }]);
        assert!(!program.has_errors());
    }

    #[test]
    fn call_into_another_program_is_not_checked() {
        let program = program("Pgm 02 SBR 240 SBR 240");
        assert_eq!(kinds(&program), vec![DiagnosticKind::UnresolvedReference(Reference::Address(240))]);
        assert_eq!(program.diagnostics()[0].statement, 2);
    }

    #[test]
    fn tag_after_program_call_is_still_patched() {
        let program = program("Pgm 02 SBR @x @x: CLR");
        assert_eq!(program.opcodes(), vec![36, 2, 71, 0, 5, 25]);
        assert_eq!(kinds(&program), vec![]);
        assert!(program.is_branch_target(5));
    }

    #[test]
    fn invalid_statements_are_errors() {
        let program = program("STO");
        assert_eq!(kinds(&program), vec![DiagnosticKind::InvalidStatement("STO".to_string())]);
        assert!(program.has_errors());
        assert_eq!(program.diagnostics_for(0).count(), 1);
    }

    #[test]
    fn source_is_reconstructed() {
        let src = "  Lbl A // start\n\tSTO 12 ZZ? 1 . 6\n@t: GTO @t   ";
        assert_eq!(program(src).reconstruct_source(), src);
    }
}
