use std::collections::BTreeMap;

use crate::ir2_statements::Statement;

/// Addresses a branch may land on, and whether one does.
///
/// That is the first address of every instruction, the address right after
/// an `INV` (skipping the invert is legal), and every address inside a
/// number (jumping into the middle of a literal keys in its tail).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressTargets {
    addresses: BTreeMap<usize, bool>,
}

impl AddressTargets {
    pub fn build(statements: &[Statement]) -> Self {
        let mut addresses = BTreeMap::new();
        for statement in statements {
            match statement {
                Statement::Instruction(instruction) => {
                    addresses.insert(instruction.address, false);
                    if instruction.is_inverted() && instruction.opcodes.len() > 1 {
                        addresses.insert(instruction.address + 1, false);
                    }
                }
                Statement::Number(number) => {
                    for offset in 0..number.opcodes.len() {
                        addresses.insert(number.address + offset, false);
                    }
                }
                Statement::Eof(_) | Statement::LineComment(_) | Statement::Tag(_) | Statement::Invalid(_) => {}
            }
        }
        AddressTargets { addresses }
    }

    pub fn is_valid(&self, address: usize) -> bool {
        self.addresses.contains_key(&address)
    }

    pub fn is_referenced(&self, address: usize) -> bool {
        self.addresses.get(&address).copied().unwrap_or(false)
    }

    /// Marks `address` as a branch destination; false if nothing starts there.
    pub(crate) fn reference(&mut self, address: usize) -> bool {
        match self.addresses.get_mut(&address) {
            Some(referenced) => {
                *referenced = true;
                true
            }
            None => false,
        }
    }
}
