use std::collections::{BTreeMap, HashMap};

use crate::error::{Diagnostic, DiagnosticKind};
use crate::ir2_statements::{Statement, Target};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub address: usize,
    /// Index of the defining statement.
    pub statement: usize,
    pub referenced: bool,
}

/// Labels are keyed by the code of the key that names them (`Lbl A` is 11),
/// tags by their lowercased name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    labels: BTreeMap<u8, Symbol>,
    tags: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn label(&self, code: u8) -> Option<&Symbol> {
        self.labels.get(&code)
    }

    pub fn tag(&self, name: &str) -> Option<&Symbol> {
        self.tags.get(&name.to_lowercase())
    }

    pub fn labels(&self) -> impl Iterator<Item = (u8, &Symbol)> {
        self.labels.iter().map(|(code, symbol)| (*code, symbol))
    }

    /// Tags in address order.
    pub fn tags(&self) -> Vec<&Symbol> {
        let mut tags = self.tags.values().collect::<Vec<_>>();
        tags.sort_by_key(|tag| (tag.address, tag.statement));
        tags
    }

    pub(crate) fn reference_label(&mut self, code: u8) -> Option<usize> {
        self.labels.get_mut(&code).map(|label| {
            label.referenced = true;
            label.address
        })
    }

    pub(crate) fn reference_tag(&mut self, name: &str) -> Option<usize> {
        self.tags.get_mut(&name.to_lowercase()).map(|tag| {
            tag.referenced = true;
            tag.address
        })
    }
}

/// The first definition of a label or tag wins; later ones are reported.
pub fn build_symbol_table(statements: &[Statement], diagnostics: &mut Vec<Diagnostic>) -> SymbolTable {
    let mut table = SymbolTable::default();

    for (index, statement) in statements.iter().enumerate() {
        match statement {
            Statement::Instruction(instruction) => {
                let code = match instruction.label_definition() {
                    Some(code) => code,
                    None => continue,
                };
                let name = match instruction.target() {
                    Some(Target::Label { name, .. }) => name,
                    _ => code.to_string(),
                };
                if let Some(first) = table.labels.get(&code) {
                    let kind = DiagnosticKind::DuplicateLabel { label: name, first: first.address };
                    diagnostics.push(Diagnostic::error(kind, index, Some(1), statement.span()));
                    continue;
                }
                let symbol = Symbol { name, address: instruction.address, statement: index, referenced: false };
                table.labels.insert(code, symbol);
            }
            Statement::Tag(tag) => {
                let key = tag.name.to_lowercase();
                if let Some(first) = table.tags.get(&key) {
                    let kind = DiagnosticKind::DuplicateTag { name: tag.name.clone(), first: first.address };
                    diagnostics.push(Diagnostic::error(kind, index, Some(0), statement.span()));
                    continue;
                }
                let symbol = Symbol { name: tag.name.clone(), address: tag.address, statement: index, referenced: false };
                table.tags.insert(key, symbol);
            }
            Statement::Eof(_) | Statement::LineComment(_) | Statement::Number(_) | Statement::Invalid(_) => {}
        }
    }

    table
}
