use tracing::warn;

use crate::ir1_semantic_tokens::{SemanticKind, SemanticTokenizer};
use crate::ir2_statements::{Statement, StatementParser};
use crate::lexer::Lexer;
use crate::program::Program;

/// Runs the whole pipeline. A program separator in the source starts a new
/// program, so there is always at least one.
pub fn parse(mut tokens: Lexer, leniency: LeniencyLevel) -> Vec<Program> {
    let mut programs = Vec::new();
    loop {
        let statements = StatementParser::new(SemanticTokenizer::new(&mut tokens), leniency).collect::<Vec<_>>();
        if statements.is_empty() {
            break;
        }
        let separated = matches!(
            statements.last(),
            Some(Statement::Eof(end)) if end.first().map_or(false, |token| token.kind == SemanticKind::Separator)
        );
        programs.push(Program::build(statements));
        if !separated {
            break;
        }
    }
    programs
}

/// `parse` with lexical errors going to the log.
pub fn assemble(src: &str, leniency: LeniencyLevel) -> Vec<Program> {
    let lexer = Lexer::new(src).with_listener(|line: usize, column: usize, message: &str| {
        warn!(line, column, "{}", message);
    });
    parse(lexer, leniency)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeniencyLevel {
    #[default]
    Lenient,
    Strict,
}

impl LeniencyLevel {
    /// `Lbl 25`, `GTO 25`: two-digit labels aren't keys on the calculator.
    pub fn numeric_labels_allowed(&self) -> bool {
        match self {
            LeniencyLevel::Lenient => true,
            LeniencyLevel::Strict => false,
        }
    }

    /// `GTO 02 45`, the address form of printed listings.
    pub fn split_addresses_allowed(&self) -> bool {
        match self {
            LeniencyLevel::Lenient => true,
            LeniencyLevel::Strict => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn separators_split_programs() {
        let programs = assemble("STO 12 ---- RCL 12\n---\n", LeniencyLevel::Lenient);
        assert_eq!(programs.len(), 3);
        assert_eq!(programs.iter().map(Program::size).collect::<Vec<_>>(), vec![2, 2, 0]);
        assert_eq!(programs[1].statements()[0].address(), Some(0));
    }

    #[test]
    fn empty_source_is_one_empty_program() {
        let programs = assemble("", LeniencyLevel::default());
        assert_eq!(programs.len(), 1);
        assert_eq!(programs[0].statements().len(), 1);
        assert!(matches!(programs[0].statements()[0], Statement::Eof(_)));
    }

    #[test]
    fn listener_receives_lexical_errors() {
        let mut errors = Vec::new();
        let lexer = Lexer::new("CLR ¿").with_listener(|line: usize, column: usize, _: &str| errors.push((line, column)));
        let statement_count = parse(lexer, LeniencyLevel::Lenient)[0].statements().len();
        assert_eq!(statement_count, 3);
        assert_eq!(errors, vec![(1, 4)]);
    }
}
