//! Tokenizer for the expression language.
//!
//! The lexer is lazy: the parser pulls one token at a time and never holds
//! more than the current token plus one lookahead. Characters outside the
//! grammar become [`TokenType::Illegal`] tokens instead of errors, so the
//! parser decides how to report them.

use std::fmt;

/// Classification of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    /// A bare word: attribute name or function name.
    Ident,
    /// `:name`
    ValuePlaceholder,
    /// `#name`
    NamePlaceholder,
    /// A run of digits, used for list indexes.
    Number,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    And,
    Or,
    Not,
    Between,
    In,
    Set,
    Remove,
    Add,
    Delete,
    /// Anything the grammar does not know.
    Illegal,
    Eof,
}

impl TokenType {
    /// Human-readable name used in syntax errors.
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::Ident => "identifier",
            Self::ValuePlaceholder => "value placeholder",
            Self::NamePlaceholder => "name placeholder",
            Self::Number => "number",
            Self::Eq => "'='",
            Self::Ne => "'<>'",
            Self::Lt => "'<'",
            Self::Le => "'<='",
            Self::Gt => "'>'",
            Self::Ge => "'>='",
            Self::Plus => "'+'",
            Self::Minus => "'-'",
            Self::Dot => "'.'",
            Self::Comma => "','",
            Self::LParen => "'('",
            Self::RParen => "')'",
            Self::LBracket => "'['",
            Self::RBracket => "']'",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Not => "NOT",
            Self::Between => "BETWEEN",
            Self::In => "IN",
            Self::Set => "SET",
            Self::Remove => "REMOVE",
            Self::Add => "ADD",
            Self::Delete => "DELETE",
            Self::Illegal => "illegal token",
            Self::Eof => "end of expression",
        }
    }

    fn keyword(word: &str) -> Option<Self> {
        Some(match word {
            "AND" => Self::And,
            "OR" => Self::Or,
            "NOT" => Self::Not,
            "BETWEEN" => Self::Between,
            "IN" => Self::In,
            "SET" => Self::Set,
            "REMOVE" => Self::Remove,
            "ADD" => Self::Add,
            "DELETE" => Self::Delete,
            _ => return None,
        })
    }
}

/// One lexical unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenType,
    /// The source text of the token. Placeholders keep their prefix.
    pub literal: String,
    /// Byte offset of the first character.
    pub position: usize,
}

impl Token {
    fn new(kind: TokenType, literal: impl Into<String>, position: usize) -> Self {
        Self {
            kind,
            literal: literal.into(),
            position,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == TokenType::Eof {
            f.write_str("EOF")
        } else {
            f.write_str(&self.literal)
        }
    }
}

/// Lazy tokenizer over an expression string.
///
/// A clone resumes from the same position, so a token stream can be replayed.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    done: bool,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            done: false,
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek_char().is_some_and(&pred) {
            self.bump();
        }
        &self.input[start..self.pos]
    }

    /// Produce the next token. After the end of input this keeps returning EOF.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        let start = self.pos;
        let Some(c) = self.bump() else {
            return Token::new(TokenType::Eof, "", start);
        };

        let single = |kind| Token::new(kind, c.to_string(), start);
        match c {
            '=' => single(TokenType::Eq),
            '+' => single(TokenType::Plus),
            '-' => single(TokenType::Minus),
            '.' => single(TokenType::Dot),
            ',' => single(TokenType::Comma),
            '(' => single(TokenType::LParen),
            ')' => single(TokenType::RParen),
            '[' => single(TokenType::LBracket),
            ']' => single(TokenType::RBracket),
            '<' => match self.peek_char() {
                Some('=') => {
                    self.bump();
                    Token::new(TokenType::Le, "<=", start)
                }
                Some('>') => {
                    self.bump();
                    Token::new(TokenType::Ne, "<>", start)
                }
                _ => single(TokenType::Lt),
            },
            '>' => {
                if self.peek_char() == Some('=') {
                    self.bump();
                    Token::new(TokenType::Ge, ">=", start)
                } else {
                    single(TokenType::Gt)
                }
            }
            ':' | '#' => {
                let name = self.take_while(is_ident_continue);
                let kind = match (c, name.is_empty()) {
                    (_, true) => TokenType::Illegal,
                    (':', false) => TokenType::ValuePlaceholder,
                    _ => TokenType::NamePlaceholder,
                };
                Token::new(kind, &self.input[start..self.pos], start)
            }
            c if c.is_ascii_digit() => {
                self.take_while(|c| c.is_ascii_digit());
                Token::new(TokenType::Number, &self.input[start..self.pos], start)
            }
            c if is_ident_start(c) => {
                self.take_while(is_ident_continue);
                let word = &self.input[start..self.pos];
                let kind = TokenType::keyword(word).unwrap_or(TokenType::Ident);
                Token::new(kind, word, start)
            }
            _ => single(TokenType::Illegal),
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    /// Yields every token including the final EOF, then stops.
    fn next(&mut self) -> Option<Token> {
        if self.done {
            return None;
        }
        let token = self.next_token();
        if token.kind == TokenType::Eof {
            self.done = true;
        }
        Some(token)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
