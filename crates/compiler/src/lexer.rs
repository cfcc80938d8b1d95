//! Hand-written lexer for Mica source text.
//!
//! Produces a flat token stream terminated by an `Eof` sentinel. Recognition
//! is longest-match: keywords and type names are disambiguated from
//! identifiers after the identifier characters are consumed, and two-character
//! operators are tried before their one-character prefixes (`==` before `=`,
//! `&&` before `&`, `->` before `-`). Whitespace, newlines, and `//` line
//! comments are discarded. Unknown characters are reported as diagnostics and
//! skipped, so a single stray byte does not abort the scan.

use std::fmt;

/// Token classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    Fn,
    Function,
    Extern,
    Var,
    If,
    Then,
    Else,
    End,
    Return,
    While,
    As,
    Null,

    // Type names
    IntType,
    StringType,
    BoolType,
    FloatType,
    PointerType,
    NoneType,

    // Literals
    IntLiteral,
    FloatLiteral,
    StringLiteral,
    BoolLiteral,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    EqEq,
    BangEq,
    Lt,
    Gt,
    Assign,
    AndAnd,
    OrOr,
    Bang,
    Amp,
    Pipe,
    Arrow,
    Ellipsis,

    // Punctuation
    Semicolon,
    Comma,
    Colon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Hash,

    Identifier,
    Eof,
}

impl TokenKind {
    /// True for the six type-name tokens.
    pub fn is_type_name(self) -> bool {
        matches!(
            self,
            TokenKind::IntType
                | TokenKind::StringType
                | TokenKind::BoolType
                | TokenKind::FloatType
                | TokenKind::PointerType
                | TokenKind::NoneType
        )
    }
}

/// A lexeme with its classification and 1-indexed source position.
///
/// For string literals `text` holds the decoded contents (quotes stripped,
/// escapes resolved); for everything else it is the raw lexeme.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, line: usize, column: usize) -> Self {
        Token {
            kind,
            text: text.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == TokenKind::Eof {
            write!(f, "end of input")
        } else {
            write!(f, "'{}'", self.text)
        }
    }
}

/// Non-fatal lexical diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub enum LexError {
    UnknownChar { ch: char, line: usize, column: usize },
    UnterminatedString { line: usize, column: usize },
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::UnknownChar { ch, line, column } => write!(
                f,
                "lexical error at line {}, column {}: unexpected character '{}'",
                line, column, ch
            ),
            LexError::UnterminatedString { line, column } => write!(
                f,
                "lexical error at line {}, column {}: unterminated string literal",
                line, column
            ),
        }
    }
}

impl std::error::Error for LexError {}

fn keyword_kind(word: &str) -> Option<TokenKind> {
    let kind = match word {
        "fn" => TokenKind::Fn,
        "function" => TokenKind::Function,
        "extern" => TokenKind::Extern,
        "var" => TokenKind::Var,
        "if" => TokenKind::If,
        "then" => TokenKind::Then,
        "else" => TokenKind::Else,
        "end" => TokenKind::End,
        "return" => TokenKind::Return,
        "while" => TokenKind::While,
        "as" => TokenKind::As,
        "null" => TokenKind::Null,
        "int" => TokenKind::IntType,
        "string" => TokenKind::StringType,
        "bool" => TokenKind::BoolType,
        "float" => TokenKind::FloatType,
        "pointer" => TokenKind::PointerType,
        "none" => TokenKind::NoneType,
        "true" | "false" => TokenKind::BoolLiteral,
        _ => return None,
    };
    Some(kind)
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Scan the whole input. Always produces a token stream ending in `Eof`;
    /// unknown characters are collected as diagnostics rather than stopping
    /// the scan.
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<LexError>) {
        let mut tokens = Vec::new();
        let mut errors = Vec::new();

        while let Some(ch) = self.peek() {
            let (line, column) = (self.line, self.column);

            if ch.is_whitespace() {
                self.advance();
                continue;
            }

            if ch == '/' && self.peek_at(1) == Some('/') {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
                continue;
            }

            if ch.is_ascii_digit() {
                tokens.push(self.scan_number(line, column));
                continue;
            }

            if ch.is_ascii_alphabetic() || ch == '_' {
                tokens.push(self.scan_word(line, column));
                continue;
            }

            if ch == '"' {
                match self.scan_string(line, column) {
                    Ok(token) => tokens.push(token),
                    Err(e) => errors.push(e),
                }
                continue;
            }

            match self.scan_operator(line, column) {
                Ok(token) => tokens.push(token),
                Err(e) => errors.push(e),
            }
        }

        tokens.push(Token::new(TokenKind::Eof, "", self.line, self.column));
        (tokens, errors)
    }

    fn scan_number(&mut self, line: usize, column: usize) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            text.push(c);
            self.advance();
        }

        // A float needs a digit on both sides of the dot; `1.` stays an
        // integer followed by a stray dot.
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            text.push('.');
            self.advance();
            while let Some(c) = self.peek() {
                if !c.is_ascii_digit() {
                    break;
                }
                text.push(c);
                self.advance();
            }
            return Token::new(TokenKind::FloatLiteral, text, line, column);
        }

        Token::new(TokenKind::IntLiteral, text, line, column)
    }

    fn scan_word(&mut self, line: usize, column: usize) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            text.push(c);
            self.advance();
        }
        let kind = keyword_kind(&text).unwrap_or(TokenKind::Identifier);
        Token::new(kind, text, line, column)
    }

    fn scan_string(&mut self, line: usize, column: usize) -> Result<Token, LexError> {
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.peek() {
                None => return Err(LexError::UnterminatedString { line, column }),
                Some('"') => {
                    self.advance();
                    return Ok(Token::new(TokenKind::StringLiteral, text, line, column));
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some('"') => text.push('"'),
                        Some('\'') => text.push('\''),
                        Some('\\') => text.push('\\'),
                        // Unknown escapes pass through verbatim.
                        Some(other) => {
                            text.push('\\');
                            text.push(other);
                        }
                        None => return Err(LexError::UnterminatedString { line, column }),
                    }
                    self.advance();
                }
                Some(c) => {
                    text.push(c);
                    self.advance();
                }
            }
        }
    }

    fn scan_operator(&mut self, line: usize, column: usize) -> Result<Token, LexError> {
        let ch = self.peek().expect("scan_operator called at end of input");
        let (kind, len) = match ch {
            '=' if self.peek_at(1) == Some('=') => (TokenKind::EqEq, 2),
            '=' => (TokenKind::Assign, 1),
            '!' if self.peek_at(1) == Some('=') => (TokenKind::BangEq, 2),
            '!' => (TokenKind::Bang, 1),
            '&' if self.peek_at(1) == Some('&') => (TokenKind::AndAnd, 2),
            '&' => (TokenKind::Amp, 1),
            '|' if self.peek_at(1) == Some('|') => (TokenKind::OrOr, 2),
            '|' => (TokenKind::Pipe, 1),
            '-' if self.peek_at(1) == Some('>') => (TokenKind::Arrow, 2),
            '-' => (TokenKind::Minus, 1),
            '.' if self.peek_at(1) == Some('.') && self.peek_at(2) == Some('.') => {
                (TokenKind::Ellipsis, 3)
            }
            '+' => (TokenKind::Plus, 1),
            '*' => (TokenKind::Star, 1),
            '/' => (TokenKind::Slash, 1),
            '<' => (TokenKind::Lt, 1),
            '>' => (TokenKind::Gt, 1),
            ';' => (TokenKind::Semicolon, 1),
            ',' => (TokenKind::Comma, 1),
            ':' => (TokenKind::Colon, 1),
            '(' => (TokenKind::LParen, 1),
            ')' => (TokenKind::RParen, 1),
            '{' => (TokenKind::LBrace, 1),
            '}' => (TokenKind::RBrace, 1),
            '#' => (TokenKind::Hash, 1),
            other => {
                self.advance();
                return Err(LexError::UnknownChar {
                    ch: other,
                    line,
                    column,
                });
            }
        };

        let mut text = String::new();
        for _ in 0..len {
            text.push(self.peek().expect("operator lexeme ends early"));
            self.advance();
        }
        Ok(Token::new(kind, text, line, column))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.peek() {
            self.pos += 1;
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, errors) = Lexer::new(source).tokenize();
        assert!(errors.is_empty(), "unexpected lex errors: {:?}", errors);
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_keywords_vs_identifiers() {
        assert_eq!(
            kinds("int interval fn fnord"),
            vec![
                TokenKind::IntType,
                TokenKind::Identifier,
                TokenKind::Fn,
                TokenKind::Identifier,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_longest_match_operators() {
        assert_eq!(
            kinds("== = != ! && & || | -> - ..."),
            vec![
                TokenKind::EqEq,
                TokenKind::Assign,
                TokenKind::BangEq,
                TokenKind::Bang,
                TokenKind::AndAnd,
                TokenKind::Amp,
                TokenKind::OrOr,
                TokenKind::Pipe,
                TokenKind::Arrow,
                TokenKind::Minus,
                TokenKind::Ellipsis,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_number_literals() {
        let (tokens, _) = Lexer::new("12 3.5 7.").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::IntLiteral);
        assert_eq!(tokens[0].text, "12");
        assert_eq!(tokens[1].kind, TokenKind::FloatLiteral);
        assert_eq!(tokens[1].text, "3.5");
        // Trailing dot is not part of the integer.
        assert_eq!(tokens[2].kind, TokenKind::IntLiteral);
        assert_eq!(tokens[2].text, "7");
    }

    #[test]
    fn test_string_escapes() {
        let (tokens, errors) = Lexer::new(r#""a\nb\t\"q\"\\""#).tokenize();
        assert!(errors.is_empty());
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[0].text, "a\nb\t\"q\"\\");
    }

    #[test]
    fn test_unterminated_string() {
        let (tokens, errors) = Lexer::new("\"oops").tokenize();
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
        assert_eq!(
            errors,
            vec![LexError::UnterminatedString { line: 1, column: 1 }]
        );
    }

    #[test]
    fn test_comments_and_positions() {
        let source = "fn main // ignored\n  x";
        let (tokens, errors) = Lexer::new(source).tokenize();
        assert!(errors.is_empty());
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[0].column, 1);
        assert_eq!(tokens[1].text, "main");
        assert_eq!(tokens[1].column, 4);
        assert_eq!(tokens[2].text, "x");
        assert_eq!(tokens[2].line, 2);
        assert_eq!(tokens[2].column, 3);
    }

    #[test]
    fn test_unknown_character_is_skipped() {
        let (tokens, errors) = Lexer::new("1 @ 2").tokenize();
        assert_eq!(
            errors,
            vec![LexError::UnknownChar {
                ch: '@',
                line: 1,
                column: 3
            }]
        );
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TokenKind::IntLiteral, TokenKind::IntLiteral, TokenKind::Eof]
        );
    }

    #[test]
    fn test_bool_literals() {
        let (tokens, _) = Lexer::new("true false truely").tokenize();
        assert_eq!(tokens[0].kind, TokenKind::BoolLiteral);
        assert_eq!(tokens[1].kind, TokenKind::BoolLiteral);
        assert_eq!(tokens[2].kind, TokenKind::Identifier);
    }

    #[test]
    fn test_multiline_string_tracks_lines() {
        let (tokens, errors) = Lexer::new("\"a\nb\" x").tokenize();
        assert!(errors.is_empty());
        assert_eq!(tokens[0].text, "a\nb");
        assert_eq!(tokens[1].text, "x");
        assert_eq!(tokens[1].line, 2);
    }
}
