use std::sync::LazyLock;

use itertools::Itertools;
use regex::Regex;
use tracing::trace;

use crate::keys::{self, InstructionKey};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'input> {
    pub src: &'input str,
    pub start: usize,
    pub end: usize,
    /// 1-based.
    pub line: usize,
    /// 0-based, counted in characters.
    pub column: usize,
    pub ty: TokenType,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenType {
    Whitespace,

    // `//` or `;` up to the end of the line.
    Comment,

    // Run of three or more dashes; ends the current program.
    ProgramSeparator,

    Mnemonic(&'static InstructionKey),

    // Digit groups are kept apart by width: their meaning (register, label,
    // address half, literal) depends on the mnemonic in front of them.
    Digits1,
    Digits2,
    Digits3,

    // Anything with a decimal point or an exponent, or four digits and up.
    Number,

    // `@name` or `"name"`
    Tag,
    Colon,

    InvalidChar,
    Eof,
}

/// Receives lexical errors; the offending character is still emitted as an
/// `InvalidChar` token.
pub trait LexErrorListener {
    fn lex_error(&mut self, line: usize, column: usize, message: &str);
}

impl<F> LexErrorListener for F
where
    F: FnMut(usize, usize, &str),
{
    fn lex_error(&mut self, line: usize, column: usize, message: &str) {
        self(line, column, message)
    }
}

use TokenType::*;

// Tried in this order; the first pattern that matches wins. Mnemonics are
// slotted in between NUMBER_PATTERNS and OPERAND_PATTERNS, longest spelling first.
// Registering a pattern adds ^ and case-insensitivity, so don't use ^.
const NUMBER_PATTERNS: [(&str, TokenType); 4] = [
    (r"\s+", Whitespace),
    (r"(//|;)[^\r\n]*", Comment),
    (r"-{3,}", ProgramSeparator),
    (r"([0-9]+\.[0-9]*|\.[0-9]+)([e][+-]?[0-9]+)?|[0-9]+e[+-]?[0-9]+|[0-9]{4,}", Number),
];

const OPERAND_PATTERNS: [(&str, TokenType); 6] = [
    (r"[0-9]{3}", Digits3),
    (r"[0-9]{2}", Digits2),
    (r"[0-9]", Digits1),
    (r"@[a-z_][a-z0-9_]*", Tag),
    (r#""[^"\r\n]*""#, Tag),
    (r":", Colon),
];

fn register_pattern(pattern: &str) -> Regex {
    assert!(!pattern.starts_with('^'));
    let pattern = format!("^(?i)(?:{})", pattern);
    Regex::new(pattern.as_str()).expect("Invalid regex")
}

fn mnemonic_pattern(spelling: &str) -> String {
    spelling
        .split_whitespace()
        .map(regex::escape)
        .join(r"\s+")
}

static PATTERNS: LazyLock<Vec<(Regex, TokenType)>> = LazyLock::new(|| {
    let mnemonics = keys::spellings()
        .sorted_by_key(|(spelling, _)| std::cmp::Reverse(spelling.chars().count()))
        .map(|(spelling, key)| (mnemonic_pattern(spelling), Mnemonic(key)));

    NUMBER_PATTERNS
        .iter()
        .map(|(pattern, ty)| (pattern.to_string(), *ty))
        .chain(mnemonics)
        .chain(OPERAND_PATTERNS.iter().map(|(pattern, ty)| (pattern.to_string(), *ty)))
        .map(|(pattern, ty)| (register_pattern(&pattern), ty))
        .collect()
});

pub struct Lexer<'input> {
    src: &'input str,
    cur_pos: usize,
    line: usize,
    column: usize,
    finished: bool,
    listener: Option<Box<dyn LexErrorListener + 'input>>,
}

impl<'input> Lexer<'input> {
    pub fn new(src: &'input str) -> Lexer<'input> {
        Lexer {
            src,
            cur_pos: 0,
            line: 1,
            column: 0,
            finished: false,
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: impl LexErrorListener + 'input) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    fn tail(&self) -> &'input str {
        &self.src[self.cur_pos..]
    }

    // A mnemonic that starts or ends with a letter or digit can't be glued to
    // another letter or digit: `SAM` is garbage, not `S`, `A`, `M`.
    fn on_word_boundary(&self, start: usize, end: usize) -> bool {
        fn glued(left: Option<char>, right: Option<char>) -> bool {
            matches!((left, right), (Some(l), Some(r)) if l.is_alphanumeric() && r.is_alphanumeric())
        }

        let text = &self.src[start..end];
        let before = self.src[..start].chars().next_back();
        let after = self.src[end..].chars().next();
        !glued(before, text.chars().next()) && !glued(text.chars().next_back(), after)
    }

    fn report(&mut self, text: &str) {
        let message = format!("token recognition error at: '{}'", text);
        trace!(line = self.line, column = self.column, "{}", message);
        if let Some(listener) = self.listener.as_mut() {
            listener.lex_error(self.line, self.column, &message);
        }
    }

    fn emit(&mut self, start: usize, ty: TokenType) -> Token<'input> {
        let src = &self.src[start..self.cur_pos];
        let token = Token { src, start, end: self.cur_pos, line: self.line, column: self.column, ty };
        for c in src.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        token
    }
}

impl<'input> Iterator for Lexer<'input> {
    type Item = Token<'input>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let start = self.cur_pos;
        if self.src.len() <= start {
            self.finished = true;
            return Some(self.emit(start, Eof));
        }

        let tail = self.tail();
        let matched = PATTERNS
            .iter()
            .filter_map(|(pattern, ty)| pattern.find(tail).map(|found| (start + found.end(), *ty)))
            .find(|(end, ty)| {
                *end > start && (!matches!(ty, Mnemonic(_)) || self.on_word_boundary(start, *end))
            });

        let (end, ty) = match matched {
            Some(found) => found,
            None => {
                let width = tail.chars().next().map_or(1, char::len_utf8);
                self.report(&tail[..width]);
                (start + width, InvalidChar)
            }
        };

        self.cur_pos = end;
        Some(self.emit(start, ty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::lookup;
    use pretty_assertions::assert_eq;

    fn types(src: &str) -> Vec<TokenType> {
        Lexer::new(src).map(|token| token.ty).collect()
    }

    fn mnemonic(spelling: &str) -> TokenType {
        Mnemonic(lookup(spelling).unwrap())
    }

    #[test]
    fn operation_with_operand() {
        assert_eq!(types("STO 12"), vec![mnemonic("STO"), Whitespace, Digits2, Eof]);
    }

    #[test]
    fn digit_widths() {
        assert_eq!(
            types("1 12 123 1234"),
            vec![Digits1, Whitespace, Digits2, Whitespace, Digits3, Whitespace, Number, Eof]
        );
    }

    #[test]
    fn literals_after_other_tokens() {
        assert_eq!(
            types("STO 12 1e5"),
            vec![mnemonic("STO"), Whitespace, Digits2, Whitespace, Number, Eof]
        );
        assert_eq!(
            types("CLR RCL 05 1234"),
            vec![mnemonic("CLR"), Whitespace, mnemonic("RCL"), Whitespace, Digits2, Whitespace, Number, Eof]
        );
        let tokens = Lexer::new("Lbl E' 6.02e23 R/S").collect::<Vec<_>>();
        assert_eq!(
            tokens.iter().map(|token| token.src).collect::<Vec<_>>(),
            vec!["Lbl", " ", "E'", " ", "6.02e23", " ", "R/S", ""]
        );
    }

    #[test]
    fn literals() {
        assert_eq!(
            types("1.5e-3 .5 2. 6E23"),
            vec![Number, Whitespace, Number, Whitespace, Number, Whitespace, Number, Eof]
        );
    }

    #[test]
    fn mnemonics_starting_with_digits() {
        assert_eq!(types("1/x 10^x 1"), vec![mnemonic("1/x"), Whitespace, mnemonic("10^x"), Whitespace, Digits1, Eof]);
    }

    #[test]
    fn lone_point_is_a_key() {
        assert_eq!(types("1 . 6"), vec![Digits1, Whitespace, mnemonic("."), Whitespace, Digits1, Eof]);
    }

    #[test]
    fn spellings_are_case_insensitive() {
        assert_eq!(
            types("lbl A inv sbr x≥t ∑+"),
            vec![
                mnemonic("Lbl"), Whitespace, mnemonic("A"), Whitespace,
                mnemonic("INV"), Whitespace, mnemonic("SBR"), Whitespace,
                mnemonic("x>=t"), Whitespace, mnemonic("Σ+"), Eof,
            ]
        );
    }

    #[test]
    fn multi_word_mnemonic() {
        let tokens = Lexer::new("st  flg 3").collect::<Vec<_>>();
        assert_eq!(tokens[0].ty, mnemonic("St flg"));
        assert_eq!(tokens[0].src, "st  flg");
        let tokens = Lexer::new("If\n  flg 1 A").collect::<Vec<_>>();
        assert_eq!((tokens[0].ty, tokens[0].src), (mnemonic("If flg"), "If\n  flg"));
        assert_eq!((tokens[2].src, tokens[2].line, tokens[2].column), ("1", 2, 6));
    }

    #[test]
    fn longest_spelling_wins() {
        assert_eq!(types("EE E E'"), vec![mnemonic("EE"), Whitespace, mnemonic("E"), Whitespace, mnemonic("E'"), Eof]);
        assert_eq!(types("+/-"), vec![mnemonic("+/-"), Eof]);
    }

    #[test]
    fn mnemonic_glued_to_letters_is_invalid() {
        assert_eq!(types("SAM"), vec![InvalidChar, InvalidChar, InvalidChar, Eof]);
    }

    #[test]
    fn tags_and_comments() {
        assert_eq!(
            types("@Loop: GTO \"end\" // done"),
            vec![Tag, Colon, Whitespace, mnemonic("GTO"), Whitespace, Tag, Whitespace, Comment, Eof]
        );
        assert_eq!(types("; note"), vec![Comment, Eof]);
    }

    #[test]
    fn program_separator() {
        assert_eq!(types("CLR\n----\nCE"), vec![mnemonic("CLR"), Whitespace, ProgramSeparator, Whitespace, mnemonic("CE"), Eof]);
    }

    #[test]
    fn positions() {
        let tokens = Lexer::new("CLR\n  RCL 05").collect::<Vec<_>>();
        let rcl = tokens[2];
        assert_eq!((rcl.src, rcl.line, rcl.column, rcl.start, rcl.end), ("RCL", 2, 2, 6, 9));
        let eof = tokens.last().unwrap();
        assert_eq!((eof.ty, eof.src, eof.start), (Eof, "", 12));
    }

    #[test]
    fn listener_sees_every_bad_character() {
        let mut errors = Vec::new();
        let count = Lexer::new("CLR\nZ?")
            .with_listener(|line: usize, column: usize, message: &str| errors.push((line, column, message.to_string())))
            .count();
        assert_eq!(count, 5);
        assert_eq!(
            errors,
            vec![
                (2, 0, "token recognition error at: 'Z'".to_string()),
                (2, 1, "token recognition error at: '?'".to_string()),
            ]
        );
    }

    #[test]
    fn lexing_is_lossless() {
        let src = "  lbl A' STO 12 ?? 1.5 // ok\n@x:";
        let rebuilt: String = Lexer::new(src).map(|token| token.src).collect();
        assert_eq!(rebuilt, src);
    }
}
