use std::ops::Range;

use itertools::Itertools;
use tracing::trace;

use crate::keys::InstructionKey;
use crate::lexer::{Token, TokenType};

/// What a token means in its statement. Provisional out of the tokenizer,
/// settled by the statement parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxCategory {
    Unknown,
    Invalid,
    Eof,
    Comment,
    Number,
    Tag,
    Colon,
    Instruction,
    DirectOperand,
    IndirectOperand,
    DirectAddress,
    Label,
    LineSeparator,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SemanticKind {
    Eof,
    Separator,
    Comment,
    Invalid,
    Digits1,
    Digits2,
    Digits3,
    Number,
    Tag,
    Colon,
    Instruction(&'static InstructionKey),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticToken<'input> {
    /// Whitespace in front of the token.
    pub trivia: Vec<Token<'input>>,
    /// One raw token, or a run of invalid characters.
    pub raw: Vec<Token<'input>>,
    pub kind: SemanticKind,
    pub category: SyntaxCategory,
}

impl<'input> SemanticToken<'input> {
    fn new(trivia: Vec<Token<'input>>, raw: Vec<Token<'input>>, kind: SemanticKind, category: SyntaxCategory) -> Self {
        SemanticToken { trivia, raw, kind, category }
    }

    pub fn with_category(mut self, category: SyntaxCategory) -> Self {
        self.category = category;
        self
    }

    pub fn text(&self) -> String {
        self.raw.iter().map(|token| token.src).join("")
    }

    /// Text including leading whitespace, exactly as it was in the source.
    pub fn source_text(&self) -> String {
        self.trivia.iter().chain(self.raw.iter()).map(|token| token.src).join("")
    }

    pub fn span(&self) -> Range<usize> {
        let start = self.raw.first().map_or(0, |token| token.start);
        let end = self.raw.last().map_or(start, |token| token.end);
        start..end
    }

    pub fn line(&self) -> usize {
        self.raw.first().map_or(0, |token| token.line)
    }

    pub fn column(&self) -> usize {
        self.raw.first().map_or(0, |token| token.column)
    }

    pub fn key(&self) -> Option<&'static InstructionKey> {
        match self.kind {
            SemanticKind::Instruction(key) => Some(key),
            _ => None,
        }
    }

    pub fn is_key(&self, opcode: u8) -> bool {
        self.key().map_or(false, |key| key.is(opcode))
    }

    pub fn is_digits(&self) -> bool {
        matches!(self.kind, SemanticKind::Digits1 | SemanticKind::Digits2 | SemanticKind::Digits3)
    }

    /// Value of a digit group.
    pub fn value(&self) -> Option<u16> {
        if self.is_digits() {
            self.text().parse().ok()
        } else {
            None
        }
    }

    /// Tag name without the `@` or the quotes.
    pub fn tag_name(&self) -> Option<String> {
        if self.kind != SemanticKind::Tag {
            return None;
        }
        let text = self.text();
        let name = text.strip_prefix('@').unwrap_or_else(|| text.trim_matches('"'));
        Some(name.to_string())
    }
}

/// Turns raw tokens into semantic tokens. Stops after the end of input or a
/// program separator, so one lexer can feed several tokenizers in turn.
pub struct SemanticTokenizer<'input, I> {
    tokens: I,
    pending: Option<Token<'input>>,
    trivia: Vec<Token<'input>>,
    done: bool,
}

impl<'input, I> SemanticTokenizer<'input, I>
where
    I: Iterator<Item = Token<'input>>,
{
    pub fn new(tokens: I) -> Self {
        SemanticTokenizer { tokens, pending: None, trivia: Vec::new(), done: false }
    }

    fn next_raw(&mut self) -> Option<Token<'input>> {
        self.pending.take().or_else(|| self.tokens.next())
    }

    fn wrap(&mut self, raw: Vec<Token<'input>>, kind: SemanticKind, category: SyntaxCategory) -> SemanticToken<'input> {
        let token = SemanticToken::new(std::mem::take(&mut self.trivia), raw, kind, category);
        trace!(kind = ?token.kind, text = %token.text(), line = token.line(), "semantic token");
        token
    }
}

impl<'input, I> Iterator for SemanticTokenizer<'input, I>
where
    I: Iterator<Item = Token<'input>>,
{
    type Item = SemanticToken<'input>;

    fn next(&mut self) -> Option<Self::Item> {
        use SemanticKind as K;
        use SyntaxCategory as C;

        if self.done {
            return None;
        }

        loop {
            let token = match self.next_raw() {
                Some(token) => token,
                None => {
                    self.done = true;
                    return None;
                }
            };

            let (kind, category) = match token.ty {
                TokenType::Whitespace => {
                    self.trivia.push(token);
                    continue;
                }
                TokenType::InvalidChar => {
                    let mut run = vec![token];
                    loop {
                        match self.tokens.next() {
                            Some(next) if next.ty == TokenType::InvalidChar => run.push(next),
                            other => {
                                self.pending = other;
                                break;
                            }
                        }
                    }
                    return Some(self.wrap(run, K::Invalid, C::Invalid));
                }
                TokenType::Eof => {
                    self.done = true;
                    (K::Eof, C::Eof)
                }
                TokenType::ProgramSeparator => {
                    self.done = true;
                    (K::Separator, C::LineSeparator)
                }
                TokenType::Comment => (K::Comment, C::Comment),
                TokenType::Mnemonic(key) => (K::Instruction(key), C::Instruction),
                TokenType::Digits1 => (K::Digits1, C::Unknown),
                TokenType::Digits2 => (K::Digits2, C::Unknown),
                TokenType::Digits3 => (K::Digits3, C::DirectAddress),
                TokenType::Number => (K::Number, C::Number),
                TokenType::Tag => (K::Tag, C::Tag),
                TokenType::Colon => (K::Colon, C::Colon),
            };
            return Some(self.wrap(vec![token], kind, category));
        }
    }
}
