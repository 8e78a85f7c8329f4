use std::collections::VecDeque;
use std::mem;
use std::ops::Range;

use itertools::Itertools;
use tracing::debug;

use crate::ir1_semantic_tokens::{SemanticKind, SemanticToken, SyntaxCategory};
use crate::keys::{InstructionKey, SyntaxShape, FIX, IND, INV, LBL, SBR};
use crate::parser::LeniencyLevel;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement<'input> {
    /// End of input or a program separator. Always the last statement.
    Eof(Vec<SemanticToken<'input>>),
    LineComment(Vec<SemanticToken<'input>>),
    Tag(Tag<'input>),
    Instruction(Instruction<'input>),
    Number(Number<'input>),
    Invalid(Vec<SemanticToken<'input>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tag<'input> {
    pub name: String,
    pub address: usize,
    pub tokens: Vec<SemanticToken<'input>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Instruction<'input> {
    pub tokens: Vec<SemanticToken<'input>>,
    pub opcodes: Vec<u8>,
    pub address: usize,
    pub merge: Option<Merge>,
}

/// Tokens `index` and `index + 1` encode as the single key `key`
/// (`INV SBR` is `RTN`, `STO Ind` is `ST*`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    pub index: usize,
    pub key: &'static InstructionKey,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Number<'input> {
    pub tokens: Vec<SemanticToken<'input>>,
    pub opcodes: Vec<u8>,
    pub address: usize,
}

/// Where a branching instruction goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Address { address: usize, token: usize },
    Label { code: u8, name: String, token: usize },
    Tag { name: String, token: usize },
}

impl<'input> Statement<'input> {
    pub fn tokens(&self) -> &[SemanticToken<'input>] {
        match self {
            Statement::Eof(tokens) => tokens,
            Statement::LineComment(tokens) => tokens,
            Statement::Tag(tag) => &tag.tokens,
            Statement::Instruction(instruction) => &instruction.tokens,
            Statement::Number(number) => &number.tokens,
            Statement::Invalid(tokens) => tokens,
        }
    }

    pub fn opcodes(&self) -> &[u8] {
        match self {
            Statement::Instruction(instruction) => &instruction.opcodes,
            Statement::Number(number) => &number.opcodes,
            Statement::Eof(_) | Statement::LineComment(_) | Statement::Tag(_) | Statement::Invalid(_) => &[],
        }
    }

    /// Address of the first opcode, or for a tag, of the next one.
    pub fn address(&self) -> Option<usize> {
        match self {
            Statement::Tag(tag) => Some(tag.address),
            Statement::Instruction(instruction) => Some(instruction.address),
            Statement::Number(number) => Some(number.address),
            Statement::Eof(_) | Statement::LineComment(_) | Statement::Invalid(_) => None,
        }
    }

    pub fn span(&self) -> Range<usize> {
        let tokens = self.tokens();
        let start = tokens.first().map_or(0, |token| token.span().start);
        let end = tokens.last().map_or(start, |token| token.span().end);
        start..end
    }

    /// The statement's tokens as written, without leading whitespace.
    pub fn text(&self) -> String {
        self.tokens().iter().map(SemanticToken::text).join(" ")
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Statement::Invalid(_))
    }
}

impl<'input> Instruction<'input> {
    pub fn new(tokens: Vec<SemanticToken<'input>>) -> Self {
        Instruction { tokens, ..Default::default() }
    }

    pub fn is_inverted(&self) -> bool {
        self.tokens.len() > 1 && self.tokens[0].is_key(INV)
    }

    /// The key that gives the statement its shape: the first one after `INV`.
    pub fn main_key(&self) -> Option<&'static InstructionKey> {
        let skip = if self.is_inverted() { 1 } else { 0 };
        self.tokens.get(skip).and_then(SemanticToken::key)
    }

    /// Label code defined by a `Lbl x` statement.
    pub fn label_definition(&self) -> Option<u8> {
        match self.opcodes.as_slice() {
            [LBL, code] => Some(*code),
            _ => None,
        }
    }

    pub fn target(&self) -> Option<Target> {
        if let Some(token) = self.tokens.iter().position(|t| t.category == SyntaxCategory::DirectAddress) {
            let address = self.tokens[token..]
                .iter()
                .take_while(|t| t.category == SyntaxCategory::DirectAddress)
                .fold(0usize, |acc, t| {
                    let digits = t.text();
                    acc * 10usize.pow(digits.len() as u32) + usize::from(t.value().unwrap_or(0))
                });
            return Some(Target::Address { address, token });
        }

        self.tokens.iter().enumerate().find_map(|(index, token)| match (token.category, token.kind) {
            (SyntaxCategory::Label, SemanticKind::Instruction(key)) => {
                Some(Target::Label { code: key.opcodes[0], name: key.mnemonic().to_string(), token: index })
            }
            (SyntaxCategory::Label, _) => token
                .value()
                .map(|value| Target::Label { code: value as u8, name: token.text(), token: index }),
            (_, SemanticKind::Tag) => token.tag_name().map(|name| Target::Tag { name, token: index }),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Zero,
    ExpectDirect,
    ExpectIndirect,
    ExpectDirectOrIndirect,
    ExpectBranchTarget,
    ExpectArgThenBranch,
    ExpectArgDirect,
    ExpectArgIndirect,
    ExpectLabelOnly,
    ExpectAddressSecondHalf,
    ExpectColon,
}

enum Step<'input> {
    Consumed,
    /// Look at the same token again in the (already changed) state.
    Reprocess(SemanticToken<'input>),
    /// Flush what we have as invalid, then start over from `Zero` with this token.
    Rejected(SemanticToken<'input>),
}

/// Groups semantic tokens into statements.
///
/// The parser keeps at most one unfinished statement in `context`. Any token
/// that can't continue it gets the context flushed as an invalid statement
/// and is then looked at again from the initial state, so every token ends
/// up in exactly one statement and the parse always reaches `Eof`.
pub struct StatementParser<'input, I> {
    tokens: I,
    leniency: LeniencyLevel,
    state: State,
    context: Vec<SemanticToken<'input>>,
    ready: VecDeque<Statement<'input>>,
    finished: bool,
}

use Step::*;

impl<'input, I> StatementParser<'input, I>
where
    I: Iterator<Item = SemanticToken<'input>>,
{
    pub fn new(tokens: I, leniency: LeniencyLevel) -> Self {
        StatementParser {
            tokens,
            leniency,
            state: State::Zero,
            context: Vec::new(),
            ready: VecDeque::new(),
            finished: false,
        }
    }

    fn process(&mut self, token: SemanticToken<'input>) {
        let mut current = token;
        loop {
            match self.step(current) {
                Consumed => return,
                Reprocess(token) => current = token,
                Rejected(token) => {
                    self.flush_context(false);
                    self.state = State::Zero;
                    current = token;
                }
            }
        }
    }

    fn step(&mut self, token: SemanticToken<'input>) -> Step<'input> {
        use SemanticKind as K;
        use SyntaxCategory as C;

        match self.state {
            State::Zero => self.at_zero(token),

            State::ExpectDirect => match token.kind {
                K::Digits1 | K::Digits2 => self.finish_with(token.with_category(C::DirectOperand)),
                _ => Rejected(token),
            },
            State::ExpectIndirect => match token.kind {
                K::Digits1 | K::Digits2 => self.finish_with(token.with_category(C::IndirectOperand)),
                _ => Rejected(token),
            },
            State::ExpectDirectOrIndirect => {
                if token.is_key(IND) {
                    self.push(token, State::ExpectIndirect)
                } else {
                    self.state = State::ExpectDirect;
                    Reprocess(token)
                }
            }

            State::ExpectBranchTarget => self.branch_target(token),

            State::ExpectArgThenBranch => {
                if token.is_key(IND) {
                    self.push(token, State::ExpectArgIndirect)
                } else {
                    self.state = State::ExpectArgDirect;
                    Reprocess(token)
                }
            }
            State::ExpectArgDirect => match token.kind {
                K::Digits1 | K::Digits2 => self.push(token.with_category(C::DirectOperand), State::ExpectBranchTarget),
                _ => Rejected(token),
            },
            State::ExpectArgIndirect => match token.kind {
                K::Digits1 | K::Digits2 => self.push(token.with_category(C::IndirectOperand), State::ExpectBranchTarget),
                _ => Rejected(token),
            },

            State::ExpectLabelOnly => {
                if is_label_key(&token) || self.is_numeric_label(&token) {
                    self.finish_with(token.with_category(C::Label))
                } else {
                    Rejected(token)
                }
            }

            State::ExpectAddressSecondHalf => match token.kind {
                K::Digits2 => self.finish_with(token.with_category(C::DirectAddress)),
                _ => Rejected(token),
            },

            State::ExpectColon => match token.kind {
                K::Colon => {
                    self.context.push(token);
                    let tokens = mem::take(&mut self.context);
                    let name = tokens[0].tag_name().unwrap_or_default();
                    self.ready.push_back(Statement::Tag(Tag { name, address: 0, tokens }));
                    self.state = State::Zero;
                    Consumed
                }
                _ => Rejected(token),
            },
        }
    }

    fn at_zero(&mut self, token: SemanticToken<'input>) -> Step<'input> {
        use SemanticKind as K;
        use SyntaxCategory as C;

        if token.kind == K::Invalid {
            self.context.push(token);
            return Consumed;
        }

        let invertible = token.key().map_or(false, |key| key.invertible);
        self.flush_context(invertible);

        match token.kind {
            K::Eof | K::Separator => {
                self.ready.push_back(Statement::Eof(vec![token]));
                self.finished = true;
            }
            K::Comment => self.ready.push_back(Statement::LineComment(vec![token])),
            K::Tag => {
                self.context.push(token);
                self.state = State::ExpectColon;
            }
            K::Colon | K::Invalid => {
                self.context.push(token);
                self.flush_context(false);
            }
            K::Number | K::Digits2 | K::Digits3 => {
                let number = Number { tokens: vec![token.with_category(C::Number)], ..Default::default() };
                self.ready.push_back(Statement::Number(number));
            }
            K::Digits1 => {
                let instruction = Instruction::new(vec![token.with_category(C::Instruction)]);
                self.ready.push_back(Statement::Instruction(instruction));
            }
            K::Instruction(key) => return self.dispatch(token, key),
        }
        Consumed
    }

    fn dispatch(&mut self, token: SemanticToken<'input>, key: &'static InstructionKey) -> Step<'input> {
        // `INV Fix` and `INV SBR` take no operand.
        if self.context_starts_with_invert() && (key.is(FIX) || key.is(SBR)) {
            return self.finish_with(token);
        }

        match key.shape {
            SyntaxShape::Atomic if key.is(INV) => self.push(token, State::Zero),
            SyntaxShape::Atomic => self.finish_with(token),
            SyntaxShape::Direct => self.push(token, State::ExpectDirect),
            SyntaxShape::Indirect => self.push(token, State::ExpectIndirect),
            SyntaxShape::DirectOrIndirect => self.push(token, State::ExpectDirectOrIndirect),
            SyntaxShape::BranchTarget => self.push(token, State::ExpectBranchTarget),
            SyntaxShape::ArgThenBranch => self.push(token, State::ExpectArgThenBranch),
            SyntaxShape::LabelOnly => self.push(token, State::ExpectLabelOnly),
            SyntaxShape::IndirectPrefixOnly => {
                self.context.push(token);
                self.flush_context(false);
                Consumed
            }
        }
    }

    fn branch_target(&mut self, token: SemanticToken<'input>) -> Step<'input> {
        use SemanticKind as K;
        use SyntaxCategory as C;

        if is_label_key(&token) {
            return self.finish_with(token.with_category(C::Label));
        }

        match token.kind {
            K::Digits3 | K::Tag => self.finish_with(token),
            K::Digits2 if token.text() != "40" => {
                if !token.text().starts_with('0') {
                    if self.leniency.numeric_labels_allowed() {
                        self.finish_with(token.with_category(C::Label))
                    } else {
                        Rejected(token)
                    }
                } else if self.leniency.split_addresses_allowed() {
                    self.push(token.with_category(C::DirectAddress), State::ExpectAddressSecondHalf)
                } else {
                    Rejected(token)
                }
            }
            K::Instruction(key) if key.is(IND) => self.push(token, State::ExpectIndirect),
            _ => Rejected(token),
        }
    }

    fn is_numeric_label(&self, token: &SemanticToken<'input>) -> bool {
        let text = token.text();
        token.kind == SemanticKind::Digits2
            && text != "40"
            && !text.starts_with('0')
            && self.leniency.numeric_labels_allowed()
    }

    fn push(&mut self, token: SemanticToken<'input>, next: State) -> Step<'input> {
        self.context.push(token);
        self.state = next;
        Consumed
    }

    fn finish_with(&mut self, token: SemanticToken<'input>) -> Step<'input> {
        self.context.push(token);
        let tokens = mem::take(&mut self.context);
        self.ready.push_back(Statement::Instruction(Instruction::new(tokens)));
        self.state = State::Zero;
        Consumed
    }

    fn context_starts_with_invert(&self) -> bool {
        self.context.first().map_or(false, |token| token.is_key(INV))
    }

    // A leading `INV` is a statement of its own; whatever follows it is not.
    // With `keep_lone_invert`, an `INV` with nothing behind it stays put so
    // the invertible key about to be read can take it.
    fn flush_context(&mut self, keep_lone_invert: bool) {
        if self.context_starts_with_invert() {
            if keep_lone_invert && self.context.len() == 1 {
                return;
            }
            let invert = self.context.remove(0);
            self.ready.push_back(Statement::Instruction(Instruction::new(vec![invert])));
        }

        if !self.context.is_empty() {
            let tokens = mem::take(&mut self.context);
            debug!(
                line = tokens[0].line(),
                column = tokens[0].column(),
                text = %tokens.iter().map(SemanticToken::text).join(" "),
                "invalid statement"
            );
            self.ready.push_back(Statement::Invalid(tokens));
        }
    }
}

fn is_label_key(token: &SemanticToken) -> bool {
    token.key().map_or(false, InstructionKey::is_label)
}

impl<'input, I> Iterator for StatementParser<'input, I>
where
    I: Iterator<Item = SemanticToken<'input>>,
{
    type Item = Statement<'input>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(statement) = self.ready.pop_front() {
                return Some(statement);
            }
            if self.finished {
                return None;
            }
            match self.tokens.next() {
                Some(token) => self.process(token),
                None => {
                    self.flush_context(false);
                    self.finished = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir1_semantic_tokens::SemanticTokenizer;
    use crate::lexer::Lexer;
    use pretty_assertions::assert_eq;

    fn statements_with(src: &str, leniency: LeniencyLevel) -> Vec<Statement> {
        StatementParser::new(SemanticTokenizer::new(Lexer::new(src)), leniency).collect()
    }

    fn shapes_with(src: &str, leniency: LeniencyLevel) -> Vec<(&'static str, Vec<String>)> {
        statements_with(src, leniency)
            .iter()
            .map(|statement| {
                let kind = match statement {
                    Statement::Eof(_) => "eof",
                    Statement::LineComment(_) => "comment",
                    Statement::Tag(_) => "tag",
                    Statement::Instruction(_) => "instruction",
                    Statement::Number(_) => "number",
                    Statement::Invalid(_) => "invalid",
                };
                (kind, statement.tokens().iter().map(SemanticToken::text).collect())
            })
            .collect()
    }

    fn shapes(src: &str) -> Vec<(&'static str, Vec<String>)> {
        shapes_with(src, LeniencyLevel::Lenient)
    }

    fn s(kind: &'static str, texts: &[&str]) -> (&'static str, Vec<String>) {
        (kind, texts.iter().map(|text| text.to_string()).collect())
    }

    #[test]
    fn store_with_register() {
        assert_eq!(shapes("STO 12"), vec![s("instruction", &["STO", "12"]), s("eof", &[""])]);
    }

    #[test]
    fn store_at_end_of_input() {
        assert_eq!(shapes("STO"), vec![s("invalid", &["STO"]), s("eof", &[""])]);
    }

    #[test]
    fn indirect_branch() {
        assert_eq!(shapes("GTO IND 33"), vec![s("instruction", &["GTO", "IND", "33"]), s("eof", &[""])]);
    }

    #[test]
    fn inverted_fix_takes_no_operand() {
        assert_eq!(
            shapes("Fix 4 INV Fix"),
            vec![s("instruction", &["Fix", "4"]), s("instruction", &["INV", "Fix"]), s("eof", &[""])]
        );
    }

    #[test]
    fn invert_before_non_invertible_key_stands_alone() {
        assert_eq!(
            shapes("INV CLR"),
            vec![s("instruction", &["INV"]), s("instruction", &["CLR"]), s("eof", &[""])]
        );
    }

    #[test]
    fn invert_survives_a_rejected_operand() {
        assert_eq!(
            shapes("INV SUM Z"),
            vec![
                s("instruction", &["INV"]),
                s("invalid", &["SUM"]),
                s("invalid", &["Z"]),
                s("eof", &[""]),
            ]
        );
    }

    #[test]
    fn invert_then_indirect_prefix() {
        assert_eq!(
            shapes("INV Ind 12"),
            vec![s("instruction", &["INV"]), s("invalid", &["Ind"]), s("number", &["12"]), s("eof", &[""])]
        );
    }

    #[test]
    fn split_address() {
        let statements = statements_with("GTO 02 45", LeniencyLevel::Lenient);
        let categories = statements[0].tokens().iter().map(|t| t.category).collect::<Vec<_>>();
        assert_eq!(
            categories,
            vec![SyntaxCategory::Instruction, SyntaxCategory::DirectAddress, SyntaxCategory::DirectAddress]
        );
        if let Statement::Instruction(instruction) = &statements[0] {
            assert_eq!(instruction.target(), Some(Target::Address { address: 245, token: 1 }));
        } else {
            panic!("expected an instruction");
        }
    }

    #[test]
    fn incomplete_split_address() {
        assert_eq!(
            shapes("GTO 04 CLR"),
            vec![s("invalid", &["GTO", "04"]), s("instruction", &["CLR"]), s("eof", &[""])]
        );
    }

    #[test]
    fn branch_targets() {
        assert_eq!(
            shapes("GTO A SBR 123 x=t @Loop GTO 25 SBR 40"),
            vec![
                s("instruction", &["GTO", "A"]),
                s("instruction", &["SBR", "123"]),
                s("instruction", &["x=t", "@Loop"]),
                s("instruction", &["GTO", "25"]),
                s("invalid", &["SBR"]),
                s("number", &["40"]),
                s("eof", &[""]),
            ]
        );
    }

    #[test]
    fn decrement_and_skip() {
        assert_eq!(
            shapes("Dsz 3 B Dsz Ind 12 345 If flg 1 @Done"),
            vec![
                s("instruction", &["Dsz", "3", "B"]),
                s("instruction", &["Dsz", "Ind", "12", "345"]),
                s("instruction", &["If flg", "1", "@Done"]),
                s("eof", &[""]),
            ]
        );
    }

    #[test]
    fn labels() {
        assert_eq!(
            shapes("Lbl A Lbl 99 Lbl 40 Lbl Ind"),
            vec![
                s("instruction", &["Lbl", "A"]),
                s("instruction", &["Lbl", "99"]),
                s("invalid", &["Lbl"]),
                s("number", &["40"]),
                s("invalid", &["Lbl"]),
                s("invalid", &["Ind"]),
                s("eof", &[""]),
            ]
        );
    }

    #[test]
    fn strict_rejects_extensions() {
        assert_eq!(
            shapes_with("GTO 25 GTO 02 45", LeniencyLevel::Strict),
            vec![
                s("invalid", &["GTO"]),
                s("number", &["25"]),
                s("invalid", &["GTO"]),
                s("number", &["02"]),
                s("number", &["45"]),
                s("eof", &[""]),
            ]
        );
    }

    #[test]
    fn tags_need_a_colon() {
        assert_eq!(
            shapes("@Loop: CLR @Oops CE :"),
            vec![
                s("tag", &["@Loop", ":"]),
                s("instruction", &["CLR"]),
                s("invalid", &["@Oops"]),
                s("instruction", &["CE"]),
                s("invalid", &[":"]),
                s("eof", &[""]),
            ]
        );
        if let Statement::Tag(tag) = &statements_with("@Loop:", LeniencyLevel::Lenient)[0] {
            assert_eq!(tag.name, "Loop");
        } else {
            panic!("expected a tag");
        }
    }

    #[test]
    fn invalid_tokens_collect_until_something_valid() {
        assert_eq!(
            shapes("ZYP ?? // note\n1 . 6"),
            vec![
                s("invalid", &["ZYP", "??"]),
                s("comment", &["// note"]),
                s("instruction", &["1"]),
                s("instruction", &["."]),
                s("instruction", &["6"]),
                s("eof", &[""]),
            ]
        );
    }

    #[test]
    fn every_token_lands_in_one_statement() {
        let src = "INV SUM Ind GTO 0 Lbl @x STO ? 12 Dsz Ind : RC* 4 INV INV SBR 05 44 ---";
        let token_count = SemanticTokenizer::new(Lexer::new(src)).count();
        let statements = statements_with(src, LeniencyLevel::Lenient);
        assert_eq!(statements.iter().map(|s| s.tokens().len()).sum::<usize>(), token_count);
        assert_eq!(statements.iter().filter(|s| matches!(s, Statement::Eof(_))).count(), 1);
        assert!(matches!(statements.last(), Some(Statement::Eof(_))));
    }
}
